//! credforge - scoped client credential issuance for Kubernetes
//!
//! Issues a namespace-scoped kubeconfig for a new identity by having the
//! cluster's own certificate authority sign a freshly generated key.
//!
//! # Flow
//!
//! 1. Generate an RSA key and a CSR whose subject carries the identity
//!    (CN) and its group (O)
//! 2. Submit the CSR as a signing request, replacing any stale request of
//!    the same name
//! 3. Approve the request using administrative credentials
//! 4. Poll at a fixed interval until the signer attaches a certificate
//! 5. Assemble a kubeconfig whose only context is bound to the target
//!    namespace, and export it
//!
//! Authorization of the new identity inside the namespace is out of scope;
//! the certificate only proves who the holder is.
//!
//! # Modules
//!
//! - [`pki`] - Key pair and CSR generation
//! - [`authority`] - Signing authority abstraction and the Kubernetes CSR backend
//! - [`poll`] - Bounded polling for the issued certificate
//! - [`bundle`] - Credential bundle assembly and kubeconfig rendering
//! - [`pipeline`] - End-to-end issuance
//! - [`profile`] - Administrative kubeconfig loading
//! - [`export`] - Writing bundles to stdout, files or Secrets
//! - [`config`] - Issuance parameters
//! - [`telemetry`] - Log subscriber setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod authority;
pub mod bundle;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod pki;
pub mod poll;
pub mod profile;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Standard Kubernetes label recording which tool manages an object
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] on objects created by credforge
pub const LABEL_MANAGED_BY_CREDFORGE: &str = "credforge";
