//! Key material generation for scoped identities
//!
//! Each run generates a fresh RSA key pair and a PKCS#10 certificate signing
//! request for the identity. The private key never leaves process memory until
//! it is embedded in the final credential bundle.

use std::fmt;

use rcgen::{
    CertificateParams, DistinguishedName, DnType, DnValue, KeyPair, RsaKeySize, PKCS_RSA_SHA256,
};
use x509_parser::prelude::*;
use zeroize::Zeroizing;

use crate::{Error, Result};

/// Subject of an issued credential
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Certificate CN, used as the Kubernetes user name
    pub common_name: String,
    /// Certificate O, used as the Kubernetes group
    pub organization: String,
}

impl Identity {
    /// Create an identity from a user name and group
    pub fn new(common_name: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            organization: organization.into(),
        }
    }

    /// Name of the signing request submitted for this identity
    pub fn request_name(&self) -> String {
        format!("{}-csr", self.common_name)
    }

    /// Name of the kubeconfig context bound to this identity
    pub fn context_name(&self) -> String {
        format!("{}-context", self.common_name)
    }

    fn validate(&self) -> Result<()> {
        if self.common_name.trim().is_empty() {
            return Err(Error::key_generation(
                &self.common_name,
                "identity common name is empty",
            ));
        }
        if self.organization.trim().is_empty() {
            return Err(Error::key_generation(
                &self.common_name,
                "identity organization is empty",
            ));
        }
        Ok(())
    }
}

/// A freshly generated private key and the CSR signed with it
pub struct KeyMaterial {
    /// PKCS#8 private key PEM (zeroized on drop)
    private_key_pem: Zeroizing<String>,
    /// PKCS#10 CSR PEM
    csr_pem: String,
}

impl KeyMaterial {
    /// CSR in PEM format (submitted to the authority)
    pub fn csr_pem(&self) -> &str {
        &self.csr_pem
    }

    /// Private key in PEM format
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    /// Split into the private key and CSR, handing key ownership to the caller
    pub fn into_parts(self) -> (Zeroizing<String>, String) {
        (self.private_key_pem, self.csr_pem)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key_pem", &"[REDACTED]")
            .field("csr_pem", &self.csr_pem)
            .finish()
    }
}

/// Generate a 2048-bit RSA key pair and a CSR with subject `{CN, O}`.
///
/// Key generation uses the aws-lc-rs system random source.
pub fn generate(identity: &Identity) -> Result<KeyMaterial> {
    identity.validate()?;

    let key_pair = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, RsaKeySize::_2048).map_err(|e| {
        Error::key_generation(
            &identity.common_name,
            format!("failed to generate RSA key: {}", e),
        )
    })?;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(identity.common_name.clone()),
    );
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(identity.organization.clone()),
    );
    params.distinguished_name = dn;

    let csr = params.serialize_request(&key_pair).map_err(|e| {
        Error::key_generation(&identity.common_name, format!("failed to create CSR: {}", e))
    })?;
    let csr_pem = csr.pem().map_err(|e| {
        Error::key_generation(
            &identity.common_name,
            format!("failed to serialize CSR: {}", e),
        )
    })?;

    Ok(KeyMaterial {
        private_key_pem: Zeroizing::new(key_pair.serialize_pem()),
        csr_pem,
    })
}

/// Parse PEM-encoded data and return the DER bytes of the first block
pub fn parse_pem(pem_data: &[u8]) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data)
        .map_err(|e| Error::serialization(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// Non-secret facts about an issued client certificate, safe to log
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateSummary {
    /// Subject common name
    pub common_name: String,
    /// Subject organizations
    pub organizations: Vec<String>,
    /// Expiry as RFC 2822 text
    pub not_after: String,
}

/// Summarize a PEM certificate returned by the authority
pub fn summarize_certificate(cert_pem: &[u8]) -> Result<CertificateSummary> {
    let der = parse_pem(cert_pem)?;
    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| Error::serialization(format!("failed to parse certificate: {}", e)))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();
    let organizations = cert
        .subject()
        .iter_organization()
        .filter_map(|o| o.as_str().ok())
        .map(str::to_string)
        .collect();
    let not_after = cert
        .validity()
        .not_after
        .to_rfc2822()
        .unwrap_or_else(|_| cert.validity().not_after.to_string());

    Ok(CertificateSummary {
        common_name,
        organizations,
        not_after,
    })
}
