//! Kubernetes `certificates.k8s.io/v1` signing authority
//!
//! Signing requests map onto `CertificateSigningRequest` objects. The cluster's
//! signer controller fills `status.certificate` asynchronously once a request
//! carries an `Approved` condition.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition, CertificateSigningRequestSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use tracing::debug;

use super::{
    ApprovalCondition, AuthorityError, KeyUsage, RequestStatus, SigningAuthority, SigningRequest,
    SigningRequestSpec,
};
use crate::{LABEL_MANAGED_BY, LABEL_MANAGED_BY_CREDFORGE};

/// Condition type set by an approver
const CONDITION_APPROVED: &str = "Approved";
/// Condition type set by a denier
const CONDITION_DENIED: &str = "Denied";
/// Condition type set by a signer that could not issue
const CONDITION_FAILED: &str = "Failed";

impl From<kube::Error> for AuthorityError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => AuthorityError::NotFound(ae.message),
            kube::Error::Api(ae) => AuthorityError::Rejected {
                code: ae.code,
                message: ae.message,
            },
            other => AuthorityError::Unavailable(other.to_string()),
        }
    }
}

/// Signing authority backed by the cluster's CertificateSigningRequest API
#[derive(Clone)]
pub struct KubeSigningAuthority {
    api: Api<CertificateSigningRequest>,
}

impl KubeSigningAuthority {
    /// Create an authority using a client for the target cluster
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl SigningAuthority for KubeSigningAuthority {
    async fn get(&self, name: &str) -> Result<SigningRequest, AuthorityError> {
        let csr = self.api.get(name).await?;
        Ok(to_signing_request(&csr))
    }

    async fn create(&self, spec: &SigningRequestSpec) -> Result<SigningRequest, AuthorityError> {
        let object = build_request_object(spec);
        let created = self.api.create(&PostParams::default(), &object).await?;
        Ok(to_signing_request(&created))
    }

    async fn delete(&self, name: &str) -> Result<(), AuthorityError> {
        self.api.delete(name, &DeleteParams::default()).await?;
        debug!(csr = %name, "Deleted CertificateSigningRequest");
        Ok(())
    }

    async fn approve(
        &self,
        name: &str,
        condition: &ApprovalCondition,
    ) -> Result<(), AuthorityError> {
        let mut csr = self.api.get(name).await?;
        append_approval(&mut csr, condition);

        let body = serde_json::to_vec(&csr).map_err(|e| {
            AuthorityError::Unavailable(format!("failed to encode approval: {}", e))
        })?;
        self.api
            .replace_subresource("approval", name, &PostParams::default(), body)
            .await?;
        Ok(())
    }
}

/// Build the CertificateSigningRequest object for a spec
fn build_request_object(spec: &SigningRequestSpec) -> CertificateSigningRequest {
    let labels = BTreeMap::from([(
        LABEL_MANAGED_BY.to_string(),
        LABEL_MANAGED_BY_CREDFORGE.to_string(),
    )]);

    CertificateSigningRequest {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: CertificateSigningRequestSpec {
            request: ByteString(spec.csr_pem.as_bytes().to_vec()),
            signer_name: spec.signer_name.clone(),
            usages: Some(spec.usages.iter().map(|u| u.as_str().to_string()).collect()),
            ..Default::default()
        },
        status: None,
    }
}

/// Append an `Approved=True` condition to the object's status
fn append_approval(csr: &mut CertificateSigningRequest, condition: &ApprovalCondition) {
    let status = csr.status.get_or_insert_with(Default::default);
    status
        .conditions
        .get_or_insert_with(Vec::new)
        .push(CertificateSigningRequestCondition {
            type_: CONDITION_APPROVED.to_string(),
            status: "True".to_string(),
            reason: Some(condition.reason.clone()),
            message: Some(condition.message.clone()),
            last_update_time: Some(Time(condition.timestamp)),
            ..Default::default()
        });
}

/// Derive the lifecycle state from certificate and conditions
fn status_of(csr: &CertificateSigningRequest) -> RequestStatus {
    let Some(status) = csr.status.as_ref() else {
        return RequestStatus::Pending;
    };

    if status
        .certificate
        .as_ref()
        .is_some_and(|cert| !cert.0.is_empty())
    {
        return RequestStatus::Signed;
    }

    let has_condition = |type_: &str| {
        status
            .conditions
            .iter()
            .flatten()
            .any(|c| c.type_ == type_ && c.status == "True")
    };

    if has_condition(CONDITION_DENIED) || has_condition(CONDITION_FAILED) {
        RequestStatus::Denied
    } else if has_condition(CONDITION_APPROVED) {
        RequestStatus::Approved
    } else {
        RequestStatus::Pending
    }
}

fn to_signing_request(csr: &CertificateSigningRequest) -> SigningRequest {
    SigningRequest {
        name: csr.metadata.name.clone().unwrap_or_default(),
        csr: csr.spec.request.0.clone(),
        signer_name: csr.spec.signer_name.clone(),
        usages: csr
            .spec
            .usages
            .iter()
            .flatten()
            .map(|u| KeyUsage::parse(u))
            .collect(),
        status: status_of(csr),
        certificate: csr
            .status
            .as_ref()
            .and_then(|s| s.certificate.as_ref())
            .map(|c| c.0.clone())
            .unwrap_or_default(),
    }
}
