use crate::ResourceKey;
use chrono::{DateTime, Utc};
use std::fmt;

/// Certificate material decoded from a TLS secret.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    /// The secret this record was decoded from.
    pub key: ResourceKey,

    /// The DER-encoded leaf certificate.
    pub certificate: Vec<u8>,

    /// DER-encoded intermediates that followed the leaf in `tls.crt`.
    pub chain: Vec<Vec<u8>>,

    /// DER-encoded issuers from `ca.crt`, if the secret provides one.
    pub ca: Vec<Vec<u8>>,

    /// The PEM-encoded private key.
    pub private_key: String,

    /// The subject common name and DNS subject alternative names.
    pub names: Vec<String>,

    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,

    /// Set by chain validation. Records are never removed because of a failed validation; serving
    /// logic decides how to treat them.
    pub chain_ok: bool,
}

impl CertificateRecord {
    /// Returns true if `now` falls within the certificate's validity window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

// NB: the private key is omitted.
impl fmt::Debug for CertificateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateRecord")
            .field("key", &self.key)
            .field("names", &self.names)
            .field("chain_len", &self.chain.len())
            .field("ca_len", &self.ca.len())
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("chain_ok", &self.chain_ok)
            .finish()
    }
}
