//! Error types for credential issuance
//!
//! Every variant is terminal for a run: nothing is retried beyond the fixed
//! polling budget, and no bundle is ever exposed after an error.

use std::time::Duration;

use thiserror::Error;

use crate::authority::AuthorityError;

/// Main error type for credforge operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Random source or key construction failure
    #[error("key generation failed for {identity}: {message}")]
    KeyGeneration {
        /// Common name of the identity being generated
        identity: String,
        /// Description of what failed
        message: String,
    },

    /// Authority rejected a create or delete of the signing request
    #[error("submission of signing request {request} failed: {source}")]
    Submission {
        /// Name of the signing request
        request: String,
        /// Underlying authority failure
        source: AuthorityError,
    },

    /// Authority rejected the approval update
    #[error("approval of signing request {request} failed: {source}")]
    Approval {
        /// Name of the signing request
        request: String,
        /// Underlying authority failure
        source: AuthorityError,
    },

    /// Authority could not be read while waiting for the certificate
    #[error("reading signing request {request} failed on attempt {attempt}: {source}")]
    Polling {
        /// Name of the signing request
        request: String,
        /// Attempt number (1-based) that failed
        attempt: u32,
        /// Underlying authority failure
        source: AuthorityError,
    },

    /// The authority did not sign within the polling budget
    #[error(
        "signing request {request} was not signed after {attempts} attempts ({waited:?})"
    )]
    IssuanceTimeout {
        /// Name of the signing request
        request: String,
        /// Number of status reads performed
        attempts: u32,
        /// Total time spent sleeping between reads
        waited: Duration,
    },

    /// A required credential bundle field was empty
    #[error("credential bundle is incomplete: {field} is empty")]
    IncompleteBundle {
        /// Name of the missing field
        field: &'static str,
    },

    /// Invalid or unusable configuration (admin profile, namespace, flags)
    #[error("configuration error: {message}")]
    Config {
        /// Description of what is wrong
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Writing the bundle to its destination failed
    #[error("export to {target} failed: {message}")]
    Export {
        /// Destination description (file path, secret name)
        target: String,
        /// Description of what failed
        message: String,
    },

    /// Kubernetes API error outside the signing request flow
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },
}

impl Error {
    /// Create a key generation error for an identity
    pub fn key_generation(identity: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::KeyGeneration {
            identity: identity.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an export error for a destination
    pub fn export(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Export {
            target: target.into(),
            message: msg.into(),
        }
    }

    /// Whether the authority was reachable but never produced a certificate
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::IssuanceTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: How failures surface from an issuance run
    // ==========================================================================

    /// Story: an unreachable authority is distinguishable from a slow one
    ///
    /// Operators need to know whether to check connectivity or the signer
    /// controller, so polling failures and timeouts carry different variants.
    #[test]
    fn story_polling_failure_is_not_a_timeout() {
        let err = Error::Polling {
            request: "svc-a-csr".to_string(),
            attempt: 4,
            source: AuthorityError::Unavailable("connection refused".to_string()),
        };
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("attempt 4"));
        assert!(err.to_string().contains("connection refused"));

        let err = Error::IssuanceTimeout {
            request: "svc-a-csr".to_string(),
            attempts: 30,
            waited: Duration::from_secs(58),
        };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("30 attempts"));
    }

    /// Story: submission errors name the request that could not be replaced
    #[test]
    fn story_submission_error_names_request() {
        let err = Error::Submission {
            request: "nginx-deployer-csr".to_string(),
            source: AuthorityError::Rejected {
                code: 403,
                message: "forbidden".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("nginx-deployer-csr"));
        assert!(msg.contains("403"));
    }

    /// Story: an incomplete bundle reports which field was missing
    #[test]
    fn story_incomplete_bundle_reports_field() {
        let err = Error::IncompleteBundle {
            field: "client certificate",
        };
        assert_eq!(
            err.to_string(),
            "credential bundle is incomplete: client certificate is empty"
        );
    }

    #[test]
    fn helpers_accept_str_and_string() {
        let err = Error::config(format!("context {} not found", "admin"));
        assert!(err.to_string().contains("context admin not found"));

        match Error::key_generation("svc-a", "rng unavailable") {
            Error::KeyGeneration { identity, message } => {
                assert_eq!(identity, "svc-a");
                assert_eq!(message, "rng unavailable");
            }
            _ => panic!("Expected KeyGeneration variant"),
        }

        let err = Error::export("/tmp/out", "permission denied");
        assert!(err.to_string().contains("/tmp/out"));
    }
}
