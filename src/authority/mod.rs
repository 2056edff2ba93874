//! Signing request protocol against the cluster certificate authority
//!
//! The authority is an external service exposing create/get/delete of named
//! signing requests plus an approval update. [`SigningAuthority`] is the seam;
//! [`kubernetes::KubeSigningAuthority`] talks to the Kubernetes
//! `certificates.k8s.io/v1` API and tests substitute their own.
//!
//! Submission is a reconciliation step: any prior request with the same name is
//! removed ([`SigningRequestClient::ensure_absent`]) before a fresh one is
//! created. Requests are never updated or patched in place.

pub mod kubernetes;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::{Error, Result};

/// Failure reported by the certificate authority
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorityError {
    /// The named signing request does not exist
    #[error("signing request not found: {0}")]
    NotFound(String),

    /// The authority answered with an error status
    #[error("authority rejected the call ({code}): {message}")]
    Rejected {
        /// HTTP status code returned by the authority
        code: u16,
        /// Message returned by the authority
        message: String,
    },

    /// The authority could not be reached or the response was unusable
    #[error("authority unavailable: {0}")]
    Unavailable(String),
}

impl AuthorityError {
    /// Whether this error means the request is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Key usage requested for the issued certificate
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyUsage {
    /// TLS client authentication
    ClientAuth,
    /// Digital signature
    DigitalSignature,
    /// Key encipherment
    KeyEncipherment,
    /// TLS server authentication
    ServerAuth,
    /// Any other usage string the authority understands
    Other(String),
}

impl KeyUsage {
    /// Wire name used by the Kubernetes API
    pub fn as_str(&self) -> &str {
        match self {
            Self::ClientAuth => "client auth",
            Self::DigitalSignature => "digital signature",
            Self::KeyEncipherment => "key encipherment",
            Self::ServerAuth => "server auth",
            Self::Other(s) => s,
        }
    }

    /// Parse a wire name
    pub fn parse(s: &str) -> Self {
        match s {
            "client auth" => Self::ClientAuth,
            "digital signature" => Self::DigitalSignature,
            "key encipherment" => Self::KeyEncipherment,
            "server auth" => Self::ServerAuth,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a signing request as tracked by the authority
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    /// Submitted, no decision yet
    Pending,
    /// Approved, certificate not yet issued
    Approved,
    /// Denied or failed; no certificate will be issued
    Denied,
    /// Certificate issued
    Signed,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Denied => "Denied",
            Self::Signed => "Signed",
        };
        f.write_str(s)
    }
}

/// Desired state of a signing request to create
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningRequestSpec {
    /// Request name, unique per identity
    pub name: String,
    /// PEM-encoded PKCS#10 CSR
    pub csr_pem: String,
    /// Signer that should issue the certificate
    pub signer_name: String,
    /// Requested key usages
    pub usages: BTreeSet<KeyUsage>,
}

/// A signing request as observed on the authority
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningRequest {
    /// Request name
    pub name: String,
    /// PEM-encoded CSR bytes
    pub csr: Vec<u8>,
    /// Signer name
    pub signer_name: String,
    /// Requested key usages
    pub usages: BTreeSet<KeyUsage>,
    /// Current lifecycle state
    pub status: RequestStatus,
    /// Issued PEM certificate, empty until signed
    pub certificate: Vec<u8>,
}

impl SigningRequest {
    /// Whether the authority has issued a certificate
    pub fn is_signed(&self) -> bool {
        !self.certificate.is_empty()
    }
}

/// Approval condition appended to a request's status
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalCondition {
    /// Machine-readable reason
    pub reason: String,
    /// Human-readable message
    pub message: String,
    /// Time the approval was made
    pub timestamp: DateTime<Utc>,
}

impl ApprovalCondition {
    /// Create an approval condition stamped with the current time
    pub fn now(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Reference to a submitted signing request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningRequestHandle {
    name: String,
}

impl SigningRequestHandle {
    /// Refer to an already submitted request by name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Name of the submitted request
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Operations the certificate authority service exposes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SigningAuthority: Send + Sync {
    /// Read a signing request by name
    async fn get(&self, name: &str) -> std::result::Result<SigningRequest, AuthorityError>;

    /// Create a new signing request
    async fn create(
        &self,
        spec: &SigningRequestSpec,
    ) -> std::result::Result<SigningRequest, AuthorityError>;

    /// Delete a signing request by name
    async fn delete(&self, name: &str) -> std::result::Result<(), AuthorityError>;

    /// Append an approval condition through the approval subresource
    async fn approve(
        &self,
        name: &str,
        condition: &ApprovalCondition,
    ) -> std::result::Result<(), AuthorityError>;
}

/// Drives submission and approval of signing requests
pub struct SigningRequestClient<'a> {
    authority: &'a dyn SigningAuthority,
}

impl<'a> SigningRequestClient<'a> {
    /// Create a client over an authority
    pub fn new(authority: &'a dyn SigningAuthority) -> Self {
        Self { authority }
    }

    /// Make sure no signing request named `name` exists.
    ///
    /// A request that disappears between the read and the delete counts as
    /// absent. Any other failure is a submission error.
    pub async fn ensure_absent(&self, name: &str) -> Result<()> {
        let submission_err = |source: AuthorityError| Error::Submission {
            request: name.to_string(),
            source,
        };

        match self.authority.get(name).await {
            Ok(existing) => {
                info!(
                    csr = %name,
                    status = %existing.status,
                    "Deleting existing signing request before resubmission"
                );
                match self.authority.delete(name).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_not_found() => {
                        debug!(csr = %name, "Signing request already gone");
                        Ok(())
                    }
                    Err(e) => Err(submission_err(e)),
                }
            }
            Err(e) if e.is_not_found() => {
                debug!(csr = %name, "No prior signing request");
                Ok(())
            }
            Err(e) => Err(submission_err(e)),
        }
    }

    /// Replace any prior request with the same name and create a fresh one
    pub async fn submit(&self, spec: &SigningRequestSpec) -> Result<SigningRequestHandle> {
        self.ensure_absent(&spec.name).await?;

        let created = self
            .authority
            .create(spec)
            .await
            .map_err(|source| Error::Submission {
                request: spec.name.clone(),
                source,
            })?;

        info!(
            csr = %created.name,
            signer = %spec.signer_name,
            status = %created.status,
            "Submitted signing request"
        );

        Ok(SigningRequestHandle { name: created.name })
    }

    /// Approve a submitted request
    pub async fn approve(
        &self,
        handle: &SigningRequestHandle,
        condition: &ApprovalCondition,
    ) -> Result<()> {
        self.authority
            .approve(&handle.name, condition)
            .await
            .map_err(|source| Error::Approval {
                request: handle.name.clone(),
                source,
            })?;

        info!(csr = %handle.name, reason = %condition.reason, "Approved signing request");
        Ok(())
    }
}
