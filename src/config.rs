//! Issuance parameters
//!
//! Everything the pipeline needs beyond the identity and the administrative
//! profile. The core never reads the environment; the CLI fills this in.

use std::collections::BTreeSet;

use crate::authority::{ApprovalCondition, KeyUsage};
use crate::poll::PollPolicy;

/// Built-in signer for API server client certificates
pub const DEFAULT_SIGNER_NAME: &str = "kubernetes.io/kube-apiserver-client";

/// Reason recorded on the approval condition
pub const DEFAULT_APPROVAL_REASON: &str = "CredforgeApproval";

/// Message recorded on the approval condition
pub const DEFAULT_APPROVAL_MESSAGE: &str = "Approved by credforge issuance pipeline";

/// Parameters for one issuance run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuanceConfig {
    /// Signer asked to issue the certificate
    pub signer_name: String,
    /// Key usages requested on the signing request
    pub usages: BTreeSet<KeyUsage>,
    /// Polling budget while waiting for the certificate
    pub poll: PollPolicy,
    /// Reason recorded on approval
    pub approval_reason: String,
    /// Message recorded on approval
    pub approval_message: String,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            signer_name: DEFAULT_SIGNER_NAME.to_string(),
            usages: BTreeSet::from([KeyUsage::ClientAuth]),
            poll: PollPolicy::default(),
            approval_reason: DEFAULT_APPROVAL_REASON.to_string(),
            approval_message: DEFAULT_APPROVAL_MESSAGE.to_string(),
        }
    }
}

impl IssuanceConfig {
    /// Use a different polling budget
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Use a different signer
    pub fn with_signer_name(mut self, signer_name: impl Into<String>) -> Self {
        self.signer_name = signer_name.into();
        self
    }

    /// Approval condition stamped with the current time
    pub fn approval_condition(&self) -> ApprovalCondition {
        ApprovalCondition::now(&self.approval_reason, &self.approval_message)
    }
}
