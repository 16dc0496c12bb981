//! Decodes TLS secrets into certificate records.

use chrono::{DateTime, Utc};
use ingress_store_core::{CertificateRecord, ResourceKey};
use ingress_store_k8s_api::{tls, Secret};
use x509_parser::prelude::*;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("secret has no {0} data")]
    MissingData(&'static str),

    #[error("invalid PEM: {0}")]
    Pem(String),

    #[error("{0} does not contain a certificate")]
    NoCertificate(&'static str),

    #[error("invalid certificate: {0}")]
    Certificate(String),

    #[error("invalid private key: {0}")]
    PrivateKey(String),

    #[error("private key does not match the certificate")]
    KeyMismatch,
}

/// Decodes the certificate, chain, and private key stored in a TLS secret.
///
/// The first certificate in `tls.crt` is the leaf; any following certificates are intermediates.
/// `ca.crt` is optional. The record's chain flag reflects validation at `now`.
pub fn decode(
    key: ResourceKey,
    secret: &Secret,
    now: DateTime<Utc>,
) -> Result<CertificateRecord, DecodeError> {
    let cert_pem = data(secret, tls::CERT_KEY)?;
    let key_pem = data(secret, tls::PRIVATE_KEY_KEY)?;

    let mut certs = parse_certificates(cert_pem)?.into_iter();
    let leaf = certs.next().ok_or(DecodeError::NoCertificate(tls::CERT_KEY))?;
    let chain = certs.collect::<Vec<_>>();

    let ca = match secret.data.as_ref().and_then(|d| d.get(tls::CA_KEY)) {
        Some(ca) => {
            let ca = parse_certificates(&ca.0)?;
            if ca.is_empty() {
                return Err(DecodeError::NoCertificate(tls::CA_KEY));
            }
            ca
        }
        None => vec![],
    };

    let (_, parsed) =
        X509Certificate::from_der(&leaf).map_err(|e| DecodeError::Certificate(e.to_string()))?;
    for der in chain.iter().chain(&ca) {
        X509Certificate::from_der(der).map_err(|e| DecodeError::Certificate(e.to_string()))?;
    }

    let private_key = std::str::from_utf8(key_pem)
        .map_err(|e| DecodeError::PrivateKey(e.to_string()))?
        .to_string();
    let key_pair =
        rcgen::KeyPair::from_pem(&private_key).map_err(|e| DecodeError::PrivateKey(e.to_string()))?;
    if key_pair.public_key_raw() != &*parsed.public_key().subject_public_key.data {
        return Err(DecodeError::KeyMismatch);
    }

    let validity = parsed.validity();
    let not_before = timestamp(validity.not_before.timestamp())?;
    let not_after = timestamp(validity.not_after.timestamp())?;
    let names = names(&parsed);
    drop(parsed);

    let mut record = CertificateRecord {
        key,
        certificate: leaf,
        chain,
        ca,
        private_key,
        names,
        not_before,
        not_after,
        chain_ok: false,
    };
    record.chain_ok = verify_chain(&record, now);
    Ok(record)
}

/// Returns true if the leaf is within its validity window and every certificate in the chain is
/// signed by the next one, ending at the first `ca.crt` certificate when one is present.
///
/// Revocation is not checked.
pub fn verify_chain(record: &CertificateRecord, now: DateTime<Utc>) -> bool {
    if !record.is_valid_at(now) {
        return false;
    }

    let ders = std::iter::once(&record.certificate)
        .chain(&record.chain)
        .chain(record.ca.first());
    let mut parsed = Vec::with_capacity(record.chain.len() + 2);
    for der in ders {
        match X509Certificate::from_der(der) {
            Ok((_, cert)) => parsed.push(cert),
            Err(_) => return false,
        }
    }

    parsed
        .windows(2)
        .all(|pair| pair[0].verify_signature(Some(pair[1].public_key())).is_ok())
}

fn data<'s>(secret: &'s Secret, key: &'static str) -> Result<&'s [u8], DecodeError> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|v| v.0.as_slice())
        .filter(|v| !v.is_empty())
        .ok_or(DecodeError::MissingData(key))
}

fn parse_certificates(pem: &[u8]) -> Result<Vec<Vec<u8>>, DecodeError> {
    let blocks = ::pem::parse_many(pem).map_err(|e| DecodeError::Pem(e.to_string()))?;
    Ok(blocks
        .into_iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .map(|p| p.into_contents())
        .collect())
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| DecodeError::Certificate(format!("invalid timestamp {secs}")))
}

fn names(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut names = cert
        .subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .map(str::to_string)
        .collect::<Vec<_>>();

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                if !names.iter().any(|n| n == dns) {
                    names.push(dns.to_string());
                }
            }
        }
    }

    names
}
