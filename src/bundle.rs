//! Credential bundle assembly and kubeconfig rendering
//!
//! A bundle pairs the cluster endpoint from the administrative profile with the
//! newly signed certificate and private key, and binds its only context to the
//! target namespace. Assembly is pure; every fallible network step happens
//! before it.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{Error, Result};

/// Cluster endpoint copied from the administrative connection profile
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustedClusterEndpoint {
    /// Cluster entry name in the administrative profile
    pub cluster_name: String,
    /// API server URL
    pub server: String,
    /// PEM-encoded trust anchor for the API server
    pub ca_data: Vec<u8>,
}

/// Self-contained, namespace-scoped connection credential.
///
/// Only constructed by [`assemble`], so every field is non-empty.
pub struct CredentialBundle {
    cluster_name: String,
    server: String,
    ca_data: Vec<u8>,
    user_name: String,
    client_cert_data: Vec<u8>,
    client_key_data: Zeroizing<String>,
    context_namespace: String,
}

impl CredentialBundle {
    /// Cluster entry name
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// API server URL
    pub fn server(&self) -> &str {
        &self.server
    }

    /// PEM trust anchor
    pub fn ca_data(&self) -> &[u8] {
        &self.ca_data
    }

    /// Kubernetes user name (the certificate CN)
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Signed client certificate PEM
    pub fn client_cert_data(&self) -> &[u8] {
        &self.client_cert_data
    }

    /// Client private key PEM
    pub fn client_key_data(&self) -> &[u8] {
        self.client_key_data.as_bytes()
    }

    /// Namespace the default context is bound to
    pub fn context_namespace(&self) -> &str {
        &self.context_namespace
    }

    /// Name of the bundle's only context
    pub fn context_name(&self) -> String {
        format!("{}-context", self.user_name)
    }

    /// Build the kubeconfig document for this bundle
    pub fn to_kubeconfig(&self) -> Kubeconfig {
        let context_name = self.context_name();
        Kubeconfig {
            api_version: "v1".into(),
            kind: "Config".into(),
            clusters: vec![KubeconfigCluster {
                name: self.cluster_name.clone(),
                cluster: ClusterConfig {
                    server: self.server.clone(),
                    certificate_authority_data: STANDARD.encode(&self.ca_data),
                },
            }],
            users: vec![KubeconfigUser {
                name: self.user_name.clone(),
                user: UserConfig {
                    client_certificate_data: STANDARD.encode(&self.client_cert_data),
                    client_key_data: Zeroizing::new(
                        STANDARD.encode(self.client_key_data.as_bytes()),
                    ),
                },
            }],
            contexts: vec![KubeconfigContext {
                name: context_name.clone(),
                context: ContextConfig {
                    cluster: self.cluster_name.clone(),
                    user: self.user_name.clone(),
                    namespace: self.context_namespace.clone(),
                },
            }],
            current_context: context_name,
        }
    }

    /// Render the kubeconfig as YAML. The result is secret material.
    pub fn to_kubeconfig_yaml(&self) -> Result<Zeroizing<String>> {
        serde_yaml::to_string(&self.to_kubeconfig())
            .map(Zeroizing::new)
            .map_err(|e| Error::serialization(format!("failed to serialize kubeconfig: {}", e)))
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("cluster_name", &self.cluster_name)
            .field("server", &self.server)
            .field("user_name", &self.user_name)
            .field("context_namespace", &self.context_namespace)
            .field("client_cert_data", &"[REDACTED]")
            .field("client_key_data", &"[REDACTED]")
            .finish()
    }
}

/// Combine the endpoint, signed certificate and private key into a bundle.
///
/// Fails with [`Error::IncompleteBundle`] if any required input is empty.
pub fn assemble(
    endpoint: &TrustedClusterEndpoint,
    certificate: Vec<u8>,
    private_key_pem: Zeroizing<String>,
    identity_name: &str,
    namespace: &str,
) -> Result<CredentialBundle> {
    let required: [(&'static str, bool); 7] = [
        ("cluster name", endpoint.cluster_name.is_empty()),
        ("server", endpoint.server.is_empty()),
        ("CA data", endpoint.ca_data.is_empty()),
        ("client certificate", certificate.is_empty()),
        ("client key", private_key_pem.is_empty()),
        ("identity name", identity_name.is_empty()),
        ("namespace", namespace.is_empty()),
    ];
    if let Some((field, _)) = required.iter().find(|(_, empty)| *empty) {
        return Err(Error::IncompleteBundle { field: *field });
    }

    Ok(CredentialBundle {
        cluster_name: endpoint.cluster_name.clone(),
        server: endpoint.server.clone(),
        ca_data: endpoint.ca_data.clone(),
        user_name: identity_name.to_string(),
        client_cert_data: certificate,
        client_key_data: private_key_pem,
        context_namespace: namespace.to_string(),
    })
}

/// Kubeconfig document
#[derive(Debug, Serialize, Deserialize)]
pub struct Kubeconfig {
    /// API version
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Kind (always "Config")
    pub kind: String,
    /// Clusters
    pub clusters: Vec<KubeconfigCluster>,
    /// Users
    pub users: Vec<KubeconfigUser>,
    /// Contexts
    pub contexts: Vec<KubeconfigContext>,
    /// Current context
    #[serde(rename = "current-context")]
    pub current_context: String,
}

/// Cluster entry in kubeconfig
#[derive(Debug, Serialize, Deserialize)]
pub struct KubeconfigCluster {
    /// Cluster name
    pub name: String,
    /// Cluster config
    pub cluster: ClusterConfig,
}

/// Cluster configuration
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterConfig {
    /// API server URL
    pub server: String,
    /// CA certificate (base64 encoded)
    pub certificate_authority_data: String,
}

/// User entry in kubeconfig
#[derive(Debug, Serialize, Deserialize)]
pub struct KubeconfigUser {
    /// User name
    pub name: String,
    /// User config
    pub user: UserConfig,
}

/// Client certificate credentials
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserConfig {
    /// Client certificate (base64 encoded)
    pub client_certificate_data: String,
    /// Client private key (base64 encoded, zeroized on drop)
    pub client_key_data: Zeroizing<String>,
}

impl fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserConfig")
            .field("client_certificate_data", &"[REDACTED]")
            .field("client_key_data", &"[REDACTED]")
            .finish()
    }
}

/// Context entry in kubeconfig
#[derive(Debug, Serialize, Deserialize)]
pub struct KubeconfigContext {
    /// Context name
    pub name: String,
    /// Context config
    pub context: ContextConfig,
}

/// Context configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Cluster name (reference)
    pub cluster: String,
    /// User name (reference)
    pub user: String,
    /// Default namespace
    pub namespace: String,
}
