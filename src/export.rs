//! Delivering an assembled bundle
//!
//! A bundle can be printed, written to a private file, or stored as a Secret
//! in the namespace it is scoped to.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tracing::info;
use zeroize::Zeroize;

use crate::bundle::CredentialBundle;
use crate::{Error, Result, LABEL_MANAGED_BY, LABEL_MANAGED_BY_CREDFORGE};

/// Key holding the kubeconfig inside an exported Secret
pub const SECRET_KEY: &str = "kubeconfig";

/// Field manager used for server-side apply
const FIELD_MANAGER: &str = "credforge";

/// Where an issued bundle goes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportTarget {
    /// Print the kubeconfig on stdout
    Stdout,
    /// Write the kubeconfig to a file readable only by the owner
    File(PathBuf),
    /// Store the kubeconfig in a Secret in the bundle's namespace
    Secret {
        /// Secret name
        name: String,
    },
}

impl std::fmt::Display for ExportTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportTarget::Stdout => write!(f, "stdout"),
            ExportTarget::File(path) => write!(f, "{}", path.display()),
            ExportTarget::Secret { name } => write!(f, "secret/{}", name),
        }
    }
}

/// Export a bundle to `target`
pub async fn export(bundle: &CredentialBundle, target: &ExportTarget, client: &Client) -> Result<()> {
    match target {
        ExportTarget::Stdout => {
            let stdout = std::io::stdout();
            write_to(bundle, &mut stdout.lock(), "stdout")
        }
        ExportTarget::File(path) => write_file(bundle, path),
        ExportTarget::Secret { name } => apply_secret(client, bundle, name).await,
    }?;

    info!(
        target = %target,
        namespace = %bundle.context_namespace(),
        context = %bundle.context_name(),
        "Exported credential bundle"
    );
    Ok(())
}

/// Write the kubeconfig YAML to `writer`
pub fn write_kubeconfig<W: Write>(bundle: &CredentialBundle, writer: &mut W) -> Result<()> {
    write_to(bundle, writer, "writer")
}

fn write_to<W: Write>(bundle: &CredentialBundle, writer: &mut W, target: &str) -> Result<()> {
    let yaml = bundle.to_kubeconfig_yaml()?;
    writer
        .write_all(yaml.as_bytes())
        .and_then(|()| writer.flush())
        .map_err(|e| Error::export(target, e.to_string()))
}

/// Write the kubeconfig YAML to `path` with mode 0600
pub fn write_file(bundle: &CredentialBundle, path: &Path) -> Result<()> {
    let yaml = bundle.to_kubeconfig_yaml()?;
    let target = path.display().to_string();

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .map_err(|e| Error::export(&target, e.to_string()))?;

    // mode() only applies on create; tighten a pre-existing file too
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::export(&target, e.to_string()))?;
    }

    file.write_all(yaml.as_bytes())
        .map_err(|e| Error::export(&target, e.to_string()))
}

/// Build the Opaque Secret holding the kubeconfig.
///
/// The returned object carries the private key in plain bytes; pass it to
/// [`scrub_secret`] once it is no longer needed.
pub fn build_secret(bundle: &CredentialBundle, name: &str) -> Result<Secret> {
    let yaml = bundle.to_kubeconfig_yaml()?;

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(bundle.context_namespace().to_string()),
            labels: Some(BTreeMap::from([(
                LABEL_MANAGED_BY.to_string(),
                LABEL_MANAGED_BY_CREDFORGE.to_string(),
            )])),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::from([(
            SECRET_KEY.to_string(),
            ByteString(yaml.as_bytes().to_vec()),
        )])),
        ..Default::default()
    })
}

/// Overwrite the data buffers of a Secret built by [`build_secret`]
pub fn scrub_secret(secret: &mut Secret) {
    for value in secret.data.iter_mut().flat_map(|data| data.values_mut()) {
        value.0.zeroize();
    }
}

/// Create or update the kubeconfig Secret via server-side apply.
///
/// The local copy of the Secret is scrubbed whether or not the apply
/// succeeds. The request body kube serializes internally is not.
pub async fn apply_secret(client: &Client, bundle: &CredentialBundle, name: &str) -> Result<()> {
    let mut secret = build_secret(bundle, name)?;
    let secrets: Api<Secret> = Api::namespaced(client.clone(), bundle.context_namespace());

    let result = secrets
        .patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&secret),
        )
        .await;
    scrub_secret(&mut secret);

    result.map_err(|e| Error::export(format!("secret/{}", name), e.to_string()))?;
    Ok(())
}
