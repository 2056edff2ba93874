//! Administrative profile
//!
//! The operator's kubeconfig is the source of truth for where the cluster
//! lives and which CA to trust. Issued bundles copy the endpoint from the
//! current context verbatim; the admin credentials themselves never leave
//! this module except through [`AdminProfile::client`].

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use k8s_openapi::api::core::v1::Namespace;
use kube::config::{Config, KubeConfigOptions, Kubeconfig, NamedCluster};
use kube::{Api, Client};
use tracing::debug;

use crate::bundle::TrustedClusterEndpoint;
use crate::{Error, Result};

/// Loaded administrative kubeconfig
#[derive(Clone, Debug)]
pub struct AdminProfile {
    kubeconfig: Kubeconfig,
}

impl AdminProfile {
    /// Load from an explicit path, or from `KUBECONFIG` / `~/.kube/config`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let kubeconfig = match path {
            Some(path) => Kubeconfig::read_from(path).map_err(|e| {
                Error::config(format!(
                    "failed to read kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => Kubeconfig::read()
                .map_err(|e| Error::config(format!("failed to read kubeconfig: {}", e)))?,
        };
        Ok(Self { kubeconfig })
    }

    /// Parse from kubeconfig YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let kubeconfig = Kubeconfig::from_yaml(yaml)
            .map_err(|e| Error::config(format!("failed to parse kubeconfig: {}", e)))?;
        Ok(Self { kubeconfig })
    }

    /// Name of the current context
    pub fn current_context(&self) -> Result<&str> {
        self.kubeconfig
            .current_context
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::config("kubeconfig has no current-context"))
    }

    /// Name of the cluster the current context points at
    pub fn cluster_name(&self) -> Result<&str> {
        let current = self.current_context()?;
        let context = self
            .kubeconfig
            .contexts
            .iter()
            .find(|c| c.name == current)
            .and_then(|c| c.context.as_ref())
            .ok_or_else(|| {
                Error::config(format!("context {} not found in kubeconfig", current))
            })?;
        Ok(context.cluster.as_str())
    }

    fn current_cluster(&self) -> Result<&NamedCluster> {
        let name = self.cluster_name()?;
        self.kubeconfig
            .clusters
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::config(format!("cluster {} not found in kubeconfig", name)))
    }

    /// Server URL and CA bundle of the current cluster
    pub fn endpoint(&self) -> Result<TrustedClusterEndpoint> {
        let named = self.current_cluster()?;
        let cluster = named.cluster.as_ref().ok_or_else(|| {
            Error::config(format!("cluster {} has no connection details", named.name))
        })?;

        let server = cluster
            .server
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::config(format!("cluster {} has no server", named.name)))?;

        let ca_data = match (
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
        ) {
            (Some(data), _) if !data.is_empty() => STANDARD.decode(data.trim()).map_err(|e| {
                Error::config(format!(
                    "cluster {} has invalid certificate-authority-data: {}",
                    named.name, e
                ))
            })?,
            (_, Some(file)) if !file.is_empty() => std::fs::read(file).map_err(|e| {
                Error::config(format!(
                    "failed to read certificate-authority {}: {}",
                    file, e
                ))
            })?,
            _ => {
                return Err(Error::config(format!(
                    "cluster {} has no certificate authority",
                    named.name
                )))
            }
        };

        Ok(TrustedClusterEndpoint {
            cluster_name: named.name.clone(),
            server,
            ca_data,
        })
    }

    /// Build an API client authenticated as the administrator
    pub async fn client(&self) -> Result<Client> {
        let config =
            Config::from_custom_kubeconfig(self.kubeconfig.clone(), &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::config(format!("invalid kubeconfig: {}", e)))?;
        Client::try_from(config).map_err(Error::from)
    }
}

/// Fail early when the target namespace does not exist
pub async fn verify_namespace(client: &Client, namespace: &str) -> Result<()> {
    let api: Api<Namespace> = Api::all(client.clone());
    match api.get_opt(namespace).await? {
        Some(_) => {
            debug!(namespace = %namespace, "Target namespace exists");
            Ok(())
        }
        None => Err(Error::config(format!(
            "namespace {} does not exist",
            namespace
        ))),
    }
}
