//! End-to-end issuance: generate → submit → approve → poll → assemble
//!
//! Each run is a fresh attempt for one identity. No state survives between
//! runs; the only thing left on the authority is the signing request itself.

use tracing::info;

use crate::authority::{SigningAuthority, SigningRequestClient, SigningRequestSpec};
use crate::bundle::{self, CredentialBundle, TrustedClusterEndpoint};
use crate::config::IssuanceConfig;
use crate::pki::{self, Identity};
use crate::poll::ApprovalPoller;
use crate::Result;

/// Issues scoped credentials against one certificate authority
pub struct IssuancePipeline<'a> {
    authority: &'a dyn SigningAuthority,
    config: IssuanceConfig,
}

impl<'a> IssuancePipeline<'a> {
    /// Create a pipeline over an authority
    pub fn new(authority: &'a dyn SigningAuthority, config: IssuanceConfig) -> Self {
        Self { authority, config }
    }

    /// Issuance parameters in effect
    pub fn config(&self) -> &IssuanceConfig {
        &self.config
    }

    /// Issue a credential for `identity` scoped to `namespace`.
    ///
    /// The endpoint comes from the administrative profile and is copied into
    /// the bundle unchanged. Either a complete bundle is returned or nothing.
    pub async fn run(
        &self,
        identity: &Identity,
        endpoint: &TrustedClusterEndpoint,
        namespace: &str,
    ) -> Result<CredentialBundle> {
        info!(
            identity = %identity.common_name,
            group = %identity.organization,
            namespace = %namespace,
            cluster = %endpoint.cluster_name,
            "Issuing scoped credential"
        );

        let (private_key_pem, csr_pem) = pki::generate(identity)?.into_parts();

        let spec = SigningRequestSpec {
            name: identity.request_name(),
            csr_pem,
            signer_name: self.config.signer_name.clone(),
            usages: self.config.usages.clone(),
        };

        let client = SigningRequestClient::new(self.authority);
        let handle = client.submit(&spec).await?;
        client
            .approve(&handle, &self.config.approval_condition())
            .await?;

        let certificate = ApprovalPoller::new(self.authority, self.config.poll)
            .wait_for_certificate(&handle)
            .await?;

        let bundle = bundle::assemble(
            endpoint,
            certificate,
            private_key_pem,
            &identity.common_name,
            namespace,
        )?;

        info!(
            identity = %identity.common_name,
            context = %bundle.context_name(),
            "Credential bundle assembled"
        );
        Ok(bundle)
    }
}
