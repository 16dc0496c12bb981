use crate::{
    cert::{self, DecodeError},
    metrics::StoreMetrics,
};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use chrono::{DateTime, Utc};
use ingress_store_core::{CertificateRecord, ResourceKey};
use ingress_store_k8s_api::Secret;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type SharedSecretIndex = Arc<Mutex<SecretIndex>>;

/// Tracks which `Ingress` resources reference each TLS secret, along with the certificates decoded
/// from those secrets.
///
/// Both halves are updated together so that a reader never observes a reference without the
/// corresponding decode attempt having been made.
#[derive(Debug)]
pub struct SecretIndex {
    by_secret: HashMap<ResourceKey, HashSet<ResourceKey>>,
    by_ingress: HashMap<ResourceKey, HashSet<ResourceKey>>,
    certificates: HashMap<ResourceKey, Entry>,
    metrics: StoreMetrics,
}

#[derive(Clone, Debug)]
enum Entry {
    Ready(Arc<CertificateRecord>),
    Failed(DecodeError),
}

impl SecretIndex {
    pub fn shared(metrics: StoreMetrics) -> SharedSecretIndex {
        Arc::new(Mutex::new(Self {
            by_secret: HashMap::default(),
            by_ingress: HashMap::default(),
            certificates: HashMap::default(),
            metrics,
        }))
    }

    /// Returns the `Ingress` resources that reference the secret.
    pub fn tracking_for(&self, secret: &ResourceKey) -> HashSet<ResourceKey> {
        self.by_secret.get(secret).cloned().unwrap_or_default()
    }

    pub fn is_tracked(&self, secret: &ResourceKey) -> bool {
        self.by_secret.contains_key(secret)
    }

    pub fn tracked_secrets(&self) -> impl Iterator<Item = &ResourceKey> + '_ {
        self.by_secret.keys()
    }

    /// Replaces the set of secrets referenced by an `Ingress`.
    ///
    /// Secrets that are no longer referenced by any `Ingress` leave the index. Their certificates
    /// are kept until the secret itself is deleted.
    pub fn set_references(&mut self, ingress: &ResourceKey, secrets: HashSet<ResourceKey>) {
        let prior = if secrets.is_empty() {
            self.by_ingress.remove(ingress).unwrap_or_default()
        } else {
            self.by_ingress
                .insert(ingress.clone(), secrets.clone())
                .unwrap_or_default()
        };

        for secret in prior.difference(&secrets) {
            if let Some(ingresses) = self.by_secret.get_mut(secret) {
                ingresses.remove(ingress);
                if ingresses.is_empty() {
                    debug!(%secret, "Secret is no longer referenced");
                    self.by_secret.remove(secret);
                }
            }
        }

        for secret in secrets.difference(&prior) {
            self.by_secret
                .entry(secret.clone())
                .or_default()
                .insert(ingress.clone());
        }
    }

    pub fn remove_references(&mut self, ingress: &ResourceKey) {
        self.set_references(ingress, HashSet::default());
    }

    /// Returns the decoded certificate for a secret, if its last decode succeeded.
    pub fn certificate_for(&self, secret: &ResourceKey) -> Option<Arc<CertificateRecord>> {
        match self.certificates.get(secret)? {
            Entry::Ready(record) => Some(record.clone()),
            Entry::Failed(_) => None,
        }
    }

    pub fn decode_error(&self, secret: &ResourceKey) -> Option<&DecodeError> {
        match self.certificates.get(secret)? {
            Entry::Failed(error) => Some(error),
            Entry::Ready(_) => None,
        }
    }

    pub fn certificates(&self) -> Vec<Arc<CertificateRecord>> {
        self.certificates
            .values()
            .filter_map(|e| match e {
                Entry::Ready(record) => Some(record.clone()),
                Entry::Failed(_) => None,
            })
            .collect()
    }

    /// Returns true if the secret has no successfully decoded certificate.
    pub fn needs_sync(&self, secret: &ResourceKey) -> bool {
        !matches!(self.certificates.get(secret), Some(Entry::Ready(_)))
    }

    /// Decodes a secret into the certificate store, replacing any prior entry for the key.
    pub fn sync(
        &mut self,
        key: &ResourceKey,
        secret: &Secret,
        now: DateTime<Utc>,
    ) -> Result<Arc<CertificateRecord>, DecodeError> {
        let res = cert::decode(key.clone(), secret, now).map(Arc::new);
        let entry = match &res {
            Ok(record) => {
                info!(secret = %key, names = ?record.names, chain_ok = record.chain_ok, "Decoded certificate");
                Entry::Ready(record.clone())
            }
            Err(error) => {
                warn!(secret = %key, %error, "Failed to decode certificate");
                self.metrics.decode_failed();
                Entry::Failed(error.clone())
            }
        };
        self.certificates.insert(key.clone(), entry);
        self.update_gauge();
        res
    }

    /// Removes the certificate entry for a secret, returning true if one existed.
    pub fn remove_certificate(&mut self, secret: &ResourceKey) -> bool {
        let removed = self.certificates.remove(secret).is_some();
        if removed {
            debug!(%secret, "Removed certificate");
            self.update_gauge();
        }
        removed
    }

    /// Re-validates the chain of every decoded certificate, returning the number of certificates
    /// whose chain does not verify.
    pub fn validate_chains(&mut self, now: DateTime<Utc>) -> usize {
        let mut failed = 0;
        for entry in self.certificates.values_mut() {
            let Entry::Ready(record) = entry else {
                continue;
            };

            let chain_ok = cert::verify_chain(record, now);
            if !chain_ok {
                failed += 1;
            }
            if chain_ok != record.chain_ok {
                if chain_ok {
                    info!(secret = %record.key, "Certificate chain verified");
                } else {
                    warn!(
                        secret = %record.key,
                        not_after = %record.not_after,
                        "Certificate chain failed to verify"
                    );
                }
                Arc::make_mut(record).chain_ok = chain_ok;
            }
        }
        failed
    }

    fn update_gauge(&self) {
        let ready = self
            .certificates
            .values()
            .filter(|e| matches!(e, Entry::Ready(_)))
            .count();
        self.metrics.set_local_certificates(ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::tests::{mk_self_signed, mk_tls_secret};

    fn keys(keys: &[(&str, &str)]) -> HashSet<ResourceKey> {
        keys.iter().map(|(ns, n)| ResourceKey::new(ns, n)).collect()
    }

    #[test]
    fn references_follow_ingresses() {
        let index = SecretIndex::shared(StoreMetrics::default());
        let mut index = index.lock();
        let ing0 = ResourceKey::new("ns", "ing-0");
        let ing1 = ResourceKey::new("ns", "ing-1");
        let cert0 = ResourceKey::new("ns", "cert-0");
        let cert1 = ResourceKey::new("ns", "cert-1");

        index.set_references(&ing0, keys(&[("ns", "cert-0"), ("ns", "cert-1")]));
        index.set_references(&ing1, keys(&[("ns", "cert-1")]));
        assert_eq!(index.tracking_for(&cert0), keys(&[("ns", "ing-0")]));
        assert_eq!(
            index.tracking_for(&cert1),
            keys(&[("ns", "ing-0"), ("ns", "ing-1")])
        );

        index.set_references(&ing0, keys(&[("ns", "cert-1")]));
        assert!(!index.is_tracked(&cert0));
        assert!(index.tracking_for(&cert0).is_empty());

        index.remove_references(&ing0);
        index.remove_references(&ing1);
        assert!(!index.is_tracked(&cert1));
        assert_eq!(index.tracked_secrets().count(), 0);
    }

    #[test]
    fn certificates_outlive_references() {
        let metrics = StoreMetrics::default();
        let index = SecretIndex::shared(metrics.clone());
        let mut index = index.lock();
        let ing = ResourceKey::new("ns", "route1");
        let key = ResourceKey::new("ns", "cert1");
        let (cert, pk) = mk_self_signed(&["example.com"]);

        index.set_references(&ing, keys(&[("ns", "cert1")]));
        assert!(index.needs_sync(&key));
        index
            .sync(&key, &mk_tls_secret("ns", "cert1", &cert, &pk), Utc::now())
            .expect("secret must decode");
        assert!(!index.needs_sync(&key));
        assert_eq!(metrics.local_certificates_count(), 1);

        index.remove_references(&ing);
        assert!(index.certificate_for(&key).is_some());

        assert!(index.remove_certificate(&key));
        assert!(index.certificate_for(&key).is_none());
        assert_eq!(metrics.local_certificates_count(), 0);
    }

    #[test]
    fn failed_decode_replaces_certificate() {
        let index = SecretIndex::shared(StoreMetrics::default());
        let mut index = index.lock();
        let key = ResourceKey::new("ns", "bad1");
        let (cert, pk) = mk_self_signed(&["example.com"]);

        index
            .sync(&key, &mk_tls_secret("ns", "bad1", &cert, &pk), Utc::now())
            .expect("secret must decode");
        index
            .sync(&key, &mk_tls_secret("ns", "bad1", "garbage", &pk), Utc::now())
            .expect_err("secret must not decode");

        assert!(index.certificate_for(&key).is_none());
        assert!(index.decode_error(&key).is_some());
        assert!(index.needs_sync(&key));
        assert!(index.certificates().is_empty());
    }

    #[test]
    fn validation_updates_chain_flag() {
        let index = SecretIndex::shared(StoreMetrics::default());
        let mut index = index.lock();
        let key = ResourceKey::new("ns", "cert1");
        let (cert, pk) = mk_self_signed(&["example.com"]);
        let record = index
            .sync(&key, &mk_tls_secret("ns", "cert1", &cert, &pk), Utc::now())
            .expect("secret must decode");
        assert!(record.chain_ok);

        let later = record.not_after + chrono::Duration::days(1);
        assert_eq!(index.validate_chains(later), 1);
        let record = index.certificate_for(&key).expect("record must be retained");
        assert!(!record.chain_ok);

        assert_eq!(index.validate_chains(Utc::now()), 0);
        assert!(index.certificate_for(&key).unwrap().chain_ok);
    }
}
