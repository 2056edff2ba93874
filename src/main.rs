//! credforge - issue namespace-scoped Kubernetes client credentials

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::info;

use credforge::authority::kubernetes::KubeSigningAuthority;
use credforge::config::{IssuanceConfig, DEFAULT_SIGNER_NAME};
use credforge::export::{self, ExportTarget};
use credforge::pipeline::IssuancePipeline;
use credforge::pki::{self, Identity};
use credforge::poll::{PollPolicy, DEFAULT_MAX_ATTEMPTS};
use credforge::profile::{self, AdminProfile};
use credforge::telemetry::{self, LogFormat};

/// credforge - scoped client credentials signed by the cluster CA
#[derive(Parser, Debug)]
#[command(name = "credforge", version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true, env = "CREDFORGE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Issue a kubeconfig for a new identity scoped to one namespace
    ///
    /// Generates a key pair, has the cluster CA sign it through the
    /// CertificateSigningRequest API, and exports a kubeconfig whose only
    /// context defaults to the target namespace.
    Issue(IssueArgs),
}

/// Issue mode arguments
#[derive(Parser, Debug)]
struct IssueArgs {
    /// Identity name, used as the certificate CN and kubeconfig user
    #[arg(long, env = "CREDFORGE_NAME")]
    name: String,

    /// Group the identity belongs to (certificate O)
    #[arg(long, env = "CREDFORGE_GROUP")]
    group: String,

    /// Namespace the issued context is bound to
    #[arg(long, short = 'n', env = "CREDFORGE_NAMESPACE")]
    namespace: String,

    /// Administrative kubeconfig (defaults to KUBECONFIG or ~/.kube/config)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Signer asked to issue the certificate
    #[arg(long, env = "CREDFORGE_SIGNER_NAME", default_value = DEFAULT_SIGNER_NAME)]
    signer_name: String,

    /// Maximum number of status reads while waiting for the certificate
    #[arg(
        long,
        env = "CREDFORGE_MAX_ATTEMPTS",
        default_value_t = DEFAULT_MAX_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    max_attempts: u32,

    /// Seconds between status reads
    #[arg(long, env = "CREDFORGE_INTERVAL_SECS", default_value_t = 2)]
    interval_secs: u64,

    /// Write the kubeconfig to this file (mode 0600) instead of stdout
    #[arg(long, short = 'o', conflicts_with = "secret_name")]
    output: Option<PathBuf>,

    /// Store the kubeconfig in a Secret with this name in the target namespace
    #[arg(long)]
    secret_name: Option<String>,
}

impl IssueArgs {
    fn issuance_config(&self) -> IssuanceConfig {
        IssuanceConfig::default()
            .with_signer_name(&self.signer_name)
            .with_poll_policy(PollPolicy::new(
                self.max_attempts,
                Duration::from_secs(self.interval_secs),
            ))
    }

    fn export_target(&self) -> ExportTarget {
        match (&self.output, &self.secret_name) {
            (Some(path), _) => ExportTarget::File(path.clone()),
            (None, Some(name)) => ExportTarget::Secret { name: name.clone() },
            (None, None) => ExportTarget::Stdout,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("failed to install aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();
    telemetry::init_tracing(LogFormat::from_json_flag(cli.log_json))?;

    match cli.command {
        Commands::Issue(args) => run_issue(args).await,
    }
}

/// Issue a credential and export it
async fn run_issue(args: IssueArgs) -> anyhow::Result<()> {
    let profile = AdminProfile::load(args.kubeconfig.as_deref())
        .context("failed to load administrative kubeconfig")?;
    let endpoint = profile.endpoint()?;
    let client = profile.client().await?;

    profile::verify_namespace(&client, &args.namespace).await?;

    let authority = KubeSigningAuthority::new(client.clone());
    let pipeline = IssuancePipeline::new(&authority, args.issuance_config());
    let identity = Identity::new(&args.name, &args.group);

    let bundle = pipeline
        .run(&identity, &endpoint, &args.namespace)
        .await
        .with_context(|| format!("failed to issue credential for {}", identity.common_name))?;

    match pki::summarize_certificate(bundle.client_cert_data()) {
        Ok(summary) => info!(
            subject = %summary.common_name,
            groups = ?summary.organizations,
            not_after = %summary.not_after,
            "Issued client certificate"
        ),
        Err(e) => tracing::warn!(error = %e, "Could not parse issued certificate"),
    }

    export::export(&bundle, &args.export_target(), &client).await?;

    eprintln!(
        "Issued credential for {} (context {}, namespace {})",
        bundle.user_name(),
        bundle.context_name(),
        bundle.context_namespace()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_defaults_match_library_defaults() {
        let cli = Cli::parse_from([
            "credforge",
            "issue",
            "--name",
            "svc-a",
            "--group",
            "svc-a-group",
            "--namespace",
            "team-a",
        ]);
        let Commands::Issue(args) = cli.command;

        assert_eq!(args.issuance_config(), IssuanceConfig::default());
        assert_eq!(args.export_target(), ExportTarget::Stdout);
    }

    #[test]
    fn output_and_secret_select_targets() {
        let cli = Cli::parse_from([
            "credforge", "issue", "--name", "a", "--group", "g", "-n", "ns", "-o", "/tmp/kc",
        ]);
        let Commands::Issue(args) = cli.command;
        assert_eq!(
            args.export_target(),
            ExportTarget::File(PathBuf::from("/tmp/kc"))
        );

        let cli = Cli::parse_from([
            "credforge", "issue", "--name", "a", "--group", "g", "-n", "ns", "--secret-name", "kc",
        ]);
        let Commands::Issue(args) = cli.command;
        assert_eq!(
            args.export_target(),
            ExportTarget::Secret {
                name: "kc".to_string()
            }
        );
    }

    #[test]
    fn output_conflicts_with_secret() {
        let result = Cli::try_parse_from([
            "credforge", "issue", "--name", "a", "--group", "g", "-n", "ns", "-o", "/tmp/kc",
            "--secret-name", "kc",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn zero_max_attempts_is_rejected() {
        let result = Cli::try_parse_from([
            "credforge", "issue", "--name", "a", "--group", "g", "-n", "ns", "--max-attempts", "0",
        ]);
        assert!(result.is_err());

        let cli = Cli::parse_from([
            "credforge", "issue", "--name", "a", "--group", "g", "-n", "ns", "--max-attempts", "1",
        ]);
        let Commands::Issue(args) = cli.command;
        assert_eq!(args.issuance_config().poll.max_attempts, 1);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
