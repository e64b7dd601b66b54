//! New-proxy broadcast: every repository that fetches fresh endpoints
//! shares them with its siblings over one process-wide channel, the way the
//! original used a Boost.Signals2 signal. `tokio::sync::broadcast` is the
//! natural multi-consumer replacement — each repository holds its own
//! receiver and filters incoming batches itself.

use tokio::sync::broadcast;
use wudi_config::ProxyProtocol;

use crate::endpoint::ProxyEndpoint;

/// Opaque identifier for the worker (OS-thread-equivalent) that owns a
/// repository. Assigned by the task executor at startup; two repositories
/// on the same worker share an id.
pub type WorkerId = u64;

/// A batch of freshly-fetched endpoints, tagged with enough provenance for
/// every other repository to decide whether it applies to them.
#[derive(Debug, Clone)]
pub struct ProxyBatch {
    pub source_worker: WorkerId,
    pub source_site_id: u32,
    pub protocol: ProxyProtocol,
    pub endpoints: Vec<ProxyEndpoint>,
}

/// Create the shared broadcast channel. `capacity` bounds how many batches
/// a slow subscriber can lag behind before it starts missing them.
pub fn channel(capacity: usize) -> (broadcast::Sender<ProxyBatch>, broadcast::Receiver<ProxyBatch>) {
    broadcast::channel(capacity)
}

/// A batch is accepted only when it came from a different worker, a
/// different site, and speaks the same proxy protocol as the receiver.
pub fn accepts(batch: &ProxyBatch, self_worker: WorkerId, self_site_id: u32, self_protocol: ProxyProtocol) -> bool {
    batch.source_worker != self_worker && batch.source_site_id != self_site_id && batch.protocol == self_protocol
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(worker: WorkerId, site: u32, protocol: ProxyProtocol) -> ProxyBatch {
        ProxyBatch {
            source_worker: worker,
            source_site_id: site,
            protocol,
            endpoints: Vec::new(),
        }
    }

    #[test]
    fn rejects_batch_from_same_worker() {
        let b = batch(1, 2, ProxyProtocol::Socks5);
        assert!(!accepts(&b, 1, 99, ProxyProtocol::Socks5));
    }

    #[test]
    fn rejects_batch_from_same_site() {
        let b = batch(1, 2, ProxyProtocol::Socks5);
        assert!(!accepts(&b, 99, 2, ProxyProtocol::Socks5));
    }

    #[test]
    fn rejects_mismatched_protocol() {
        let b = batch(1, 2, ProxyProtocol::Socks5);
        assert!(!accepts(&b, 99, 99, ProxyProtocol::Http));
    }

    #[test]
    fn accepts_unrelated_worker_and_site_with_matching_protocol() {
        let b = batch(1, 2, ProxyProtocol::Http);
        assert!(accepts(&b, 99, 99, ProxyProtocol::Http));
    }
}
