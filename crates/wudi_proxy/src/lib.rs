//! The shared proxy repository (spec.md §4.2): one [`ProxyRepository`] per
//! (worker, site) pair, owning a [`pool::ProxyPool`] and the rate-limited
//! vendor refresh that refills it. Generalizes the teacher's `migux_proxy`
//! connection-pool-plus-circuit-breaker (`DashMap`-guarded pool, round robin
//! over upstream addresses, health tracking) from pooling *inbound-serving*
//! connections to rotating *outbound* proxy endpoints.

pub mod broadcast;
pub mod endpoint;
pub mod error;
pub mod pool;
pub mod quota;
pub mod vendor;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, broadcast as tokio_broadcast};
use tracing::warn;
use wudi_config::{ProxyConfig, ProxyProtocol};

pub use broadcast::{ProxyBatch, WorkerId, channel as broadcast_channel};
pub use endpoint::{ProxyEndpoint, ProxyProperty};
pub use error::ProxyRepositoryError;
pub use pool::ProxyPool;
pub use quota::ExtractionQuota;

/// Minimum spacing between successful refreshes, per spec.md §4.2.
const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(120);

/// Fixed persistence file names per protocol, per spec.md §4.2.
fn persistence_path(protocol: ProxyProtocol) -> &'static str {
    match protocol {
        ProxyProtocol::Socks5 => "socks5_proxy_servers.txt",
        ProxyProtocol::Http => "http_proxy_servers.txt",
    }
}

#[derive(Debug, Default)]
struct RefreshState {
    last_refresh: Option<Instant>,
    in_flight: bool,
}

/// Owns one site's proxy pool for one worker. `next_endpoint` and
/// `add_more` are the two entry points named in spec.md §4.2; everything
/// else is internal plumbing for the refresh protocol.
pub struct ProxyRepository {
    worker_id: WorkerId,
    site_id: u32,
    protocol: ProxyProtocol,
    pool: Mutex<ProxyPool>,
    refresh: Mutex<RefreshState>,
    min_refresh_interval: Duration,
    persistence_path: String,
    broadcast_tx: tokio_broadcast::Sender<ProxyBatch>,
}

impl ProxyRepository {
    pub fn new(
        worker_id: WorkerId,
        site_id: u32,
        protocol: ProxyProtocol,
        broadcast_tx: tokio_broadcast::Sender<ProxyBatch>,
    ) -> Self {
        let path = persistence_path(protocol);
        let mut pool = ProxyPool::new();
        if let Err(e) = pool.load_from_file(path) {
            warn!(error = %e, path, "failed to load persisted proxy pool");
        }
        Self {
            worker_id,
            site_id,
            protocol,
            pool: Mutex::new(pool),
            refresh: Mutex::new(RefreshState::default()),
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            persistence_path: path.to_string(),
            broadcast_tx,
        }
    }

    /// Used by tests to shrink the refresh cooldown below the real 120s.
    #[doc(hidden)]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn protocol_type(&self) -> ProxyProtocol {
        self.protocol
    }

    pub async fn len(&self) -> usize {
        self.pool.lock().await.len()
    }

    /// Round-robin scan skipping non-`Active` entries. On a drained lap,
    /// triggers one refresh and retries once; a still-empty pool after that
    /// is a terminal drain signal to the caller (spec.md §4.2).
    pub async fn next_endpoint(&self, cfg: &ProxyConfig) -> Option<ProxyEndpoint> {
        {
            let mut pool = self.pool.lock().await;
            if let Some(ep) = pool.next_active() {
                return Some(ep);
            }
        }
        if let Err(e) = self.get_more_proxies(cfg).await {
            warn!(error = %e, "proxy refresh did not add new endpoints");
        }
        let mut pool = self.pool.lock().await;
        pool.next_active()
    }

    /// Mark the endpoint at `address` with a new liveness property, e.g.
    /// after a site adapter detects a ban or a handshake failure.
    pub async fn mark(&self, address: &str, property: ProxyProperty) {
        let mut pool = self.pool.lock().await;
        pool.mark(address, property);
    }

    /// Drop every `Blocked` entry from the pool. Run periodically by the
    /// task executor, per spec.md §3's "Blocked entries are pruned
    /// periodically."
    pub async fn prune_blocked(&self) {
        let mut pool = self.pool.lock().await;
        pool.prune_blocked();
    }

    /// Accept a broadcast batch from a sibling repository iff it came from
    /// a different worker, a different site, and speaks our protocol
    /// (spec.md §4.2, tested standalone in [`broadcast::accepts`]).
    pub async fn add_more(
        &self,
        peer_worker: WorkerId,
        peer_site_id: u32,
        protocol: ProxyProtocol,
        new_endpoints: Vec<ProxyEndpoint>,
    ) {
        if !broadcast::accepts(
            &ProxyBatch {
                source_worker: peer_worker,
                source_site_id: peer_site_id,
                protocol,
                endpoints: Vec::new(),
            },
            self.worker_id,
            self.site_id,
            self.protocol,
        ) {
            return;
        }
        let mut pool = self.pool.lock().await;
        pool.push_evicting(new_endpoints);
    }

    /// Spawn a background task that drains `rx` and feeds every accepted
    /// batch into [`Self::add_more`]. The task exits when the channel
    /// closes; a lagging receiver just skips the batches it missed.
    pub fn spawn_broadcast_listener(self: &Arc<Self>, mut rx: tokio_broadcast::Receiver<ProxyBatch>) {
        let repo = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(batch) => {
                        repo.add_more(batch.source_worker, batch.source_site_id, batch.protocol, batch.endpoints)
                            .await;
                    }
                    Err(tokio_broadcast::error::RecvError::Closed) => break,
                    Err(tokio_broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        });
    }

    /// The refresh protocol of spec.md §4.2: rate-limited, with in-flight
    /// coalescing so a sibling's concurrent refresh isn't duplicated.
    pub async fn get_more_proxies(&self, cfg: &ProxyConfig) -> Result<(), ProxyRepositoryError> {
        {
            let mut refresh = self.refresh.lock().await;
            if let Some(last) = refresh.last_refresh {
                let elapsed = last.elapsed();
                if elapsed < self.min_refresh_interval {
                    let wait = self.min_refresh_interval - elapsed;
                    if refresh.in_flight {
                        let size_before = self.pool.lock().await.len();
                        drop(refresh);
                        tokio::time::sleep(wait).await;
                        let size_after = self.pool.lock().await.len();
                        if size_after != size_before {
                            // a sibling's refresh already grew the pool
                            return Ok(());
                        }
                        refresh = self.refresh.lock().await;
                    } else {
                        return Err(ProxyRepositoryError::RateLimited(wait));
                    }
                }
            }
            refresh.in_flight = true;
        }

        let result = self.do_refresh(cfg).await;

        let mut refresh = self.refresh.lock().await;
        refresh.in_flight = false;
        refresh.last_refresh = Some(Instant::now());
        result
    }

    async fn do_refresh(&self, cfg: &ProxyConfig) -> Result<(), ProxyRepositoryError> {
        // Blocked entries are pruned periodically (spec.md §3); a refresh
        // attempt is as good a "periodically" as any, since it already runs
        // on the rate-limited cadence the rest of this protocol shares.
        self.prune_blocked().await;

        let user_agent = utils::agents::random_user_agent();

        let quota = quota::fetch_quota(&cfg.count_target, user_agent).await?;
        if !quota.allows_refresh() {
            return Err(if quota.available {
                ProxyRepositoryError::NoExtractionRemaining
            } else {
                ProxyRepositoryError::QuotaUnavailable
            });
        }

        let (status, body) = vendor::vendor_get(&cfg.host, user_agent).await?;
        if status != 200 {
            return Err(ProxyRepositoryError::MalformedResponse(format!(
                "extract endpoint returned status {status}"
            )));
        }

        let new_endpoints = parse_extracted_endpoints(&body);
        if new_endpoints.is_empty() {
            return Ok(());
        }

        let _ = self.broadcast_tx.send(ProxyBatch {
            source_worker: self.worker_id,
            source_site_id: self.site_id,
            protocol: self.protocol,
            endpoints: new_endpoints.clone(),
        });

        let mut pool = self.pool.lock().await;
        pool.push_evicting(new_endpoints);
        if let Err(e) = pool.save_to_file(&self.persistence_path) {
            warn!(error = %e, path = %self.persistence_path, "failed to persist proxy pool");
        }
        Ok(())
    }
}

/// Parse the extract endpoint's `host:port [user] [pass]` lines into fresh
/// `Active` endpoints, skipping malformed lines.
fn parse_extracted_endpoints(body: &str) -> Vec<ProxyEndpoint> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let mut parts = line.split_whitespace();
            let address = parts.next()?;
            let username = parts.next().unwrap_or("").to_string();
            let password = parts.next().unwrap_or("").to_string();
            let (host, port) = address.rsplit_once(':')?;
            let port: u16 = port.parse().ok()?;
            Some(ProxyEndpoint::new(host, port, username, password))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(host: &str, count_target: &str) -> ProxyConfig {
        let json = format!(
            r#"{{"proxy":{{"host":"{host}","target":"t","count_target":"{count_target}","username":"u","password":"p","socket_count":1,"per_fetch":10,"protocol":0,"fetch_interval":120}}}}"#
        );
        ProxyConfig::from_str(&json).unwrap()
    }

    #[tokio::test]
    async fn add_more_respects_broadcast_filter() {
        let (tx, _rx) = broadcast_channel(8);
        let repo = ProxyRepository::new(1, 10, ProxyProtocol::Socks5, tx);

        // same worker: rejected
        repo.add_more(
            1,
            99,
            ProxyProtocol::Socks5,
            vec![ProxyEndpoint::new("10.0.0.1", 1, "u", "p")],
        )
        .await;
        assert_eq!(repo.len().await, 0);

        // different worker, different site, matching protocol: accepted
        repo.add_more(
            2,
            99,
            ProxyProtocol::Socks5,
            vec![ProxyEndpoint::new("10.0.0.1", 1, "u", "p")],
        )
        .await;
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn next_endpoint_returns_none_on_empty_pool_with_unreachable_vendor() {
        let (tx, _rx) = broadcast_channel(8);
        let repo = ProxyRepository::new(1, 1, ProxyProtocol::Http, tx)
            .with_min_refresh_interval(Duration::from_millis(0));
        let cfg = test_config("http://127.0.0.1:1", "http://127.0.0.1:1");
        assert!(repo.next_endpoint(&cfg).await.is_none());
    }

    #[tokio::test]
    async fn refresh_prunes_blocked_entries_even_when_the_vendor_call_fails() {
        let (tx, _rx) = broadcast_channel(8);
        let repo = ProxyRepository::new(1, 1, ProxyProtocol::Http, tx)
            .with_min_refresh_interval(Duration::from_millis(0));
        repo.add_more(2, 2, ProxyProtocol::Http, vec![ProxyEndpoint::new("10.0.0.1", 1, "u", "p")])
            .await;
        repo.mark("10.0.0.1:1", ProxyProperty::Blocked).await;
        assert_eq!(repo.len().await, 1);

        let cfg = test_config("http://127.0.0.1:1", "http://127.0.0.1:1");
        let _ = repo.get_more_proxies(&cfg).await;
        assert_eq!(repo.len().await, 0);
    }

    #[tokio::test]
    async fn get_more_proxies_rate_limits_back_to_back_calls() {
        let (tx, _rx) = broadcast_channel(8);
        let repo = ProxyRepository::new(1, 1, ProxyProtocol::Http, tx);
        let cfg = test_config("http://127.0.0.1:1", "http://127.0.0.1:1");

        // first call always attempts (and fails to connect, which is fine -
        // we're only asserting the rate limiter's state transition).
        let _ = repo.get_more_proxies(&cfg).await;
        let second = repo.get_more_proxies(&cfg).await;
        assert!(matches!(second, Err(ProxyRepositoryError::RateLimited(_))));
    }

    #[tokio::test]
    async fn parse_extracted_endpoints_skips_malformed_lines() {
        let body = "10.0.0.1:1080 user1 pass1\nnot-a-line\n10.0.0.2:1080\n";
        let endpoints = parse_extracted_endpoints(body);
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].address(), "10.0.0.1:1080");
        assert_eq!(endpoints[1].username, "");
    }
}
