use crate::{collection::Collection, ingress::secret_refs, secret_index::SharedSecretIndex};
use ahash::AHashSet as HashSet;
use chrono::Utc;
use ingress_store_k8s_api::{Ingress, IngressClass, Secret};
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Runs `reconcile` every `period` until shutdown is signaled. The first run happens one period
/// after the task starts.
pub(crate) async fn every(period: Duration, shutdown: drain::Watch, mut reconcile: impl FnMut()) {
    let mut timer = time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown.signaled();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            biased;
            _release = &mut shutdown => {
                debug!("Shutdown signaled");
                return;
            }
            _ = timer.tick() => reconcile(),
        }
    }
}

/// Decodes every secret that is referenced by an `Ingress` of this class but has no certificate
/// in the local store. Returns the number of certificates decoded.
pub(crate) fn repair_missing_secrets(
    class: &IngressClass,
    ingresses: &Collection<Ingress>,
    secrets: &Collection<Secret>,
    index: &SharedSecretIndex,
) -> usize {
    let referenced = ingresses
        .list_filtered(|ing| class.is_valid(ing))
        .iter()
        .flat_map(|ing| secret_refs(ing))
        .collect::<HashSet<_>>();

    let now = Utc::now();
    let mut repaired = 0;
    let mut index = index.lock();
    for key in referenced {
        if !index.needs_sync(&key) {
            continue;
        }
        let Some(secret) = secrets.get(&key) else {
            debug!(secret = %key, "Referenced secret not found");
            continue;
        };
        if index.sync(&key, &secret, now).is_ok() {
            info!(secret = %key, "Recovered missing certificate");
            repaired += 1;
        }
    }
    repaired
}

/// Re-validates every certificate chain. Returns the number of certificates that fail validation.
pub(crate) fn validate_certificate_chains(index: &SharedSecretIndex) -> usize {
    let failed = index.lock().validate_chains(Utc::now());
    if failed > 0 {
        warn!(failed, "Certificates with invalid chains");
    }
    failed
}
