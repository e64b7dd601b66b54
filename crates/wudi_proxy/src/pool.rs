//! The in-memory proxy pool: a bounded, ordered collection with round-robin
//! hand-out and disk persistence. Grounded in `proxy_base`'s `endpoints_`
//! list (a `circular_buffer<endpoint_ptr>` in the original) and its
//! `save_proxies_to_file`/`load_proxy_file` pair.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::time::Duration;

use crate::endpoint::{ProxyEndpoint, ProxyProperty};

/// Capacity past which the oldest entries are evicted to make room for new
/// ones.
pub const CAPACITY: usize = 5_000;

/// Per-entry cooldown before a `ToldToWait` endpoint becomes eligible again
/// (spec.md §3: "ToldToWait entries are skipped until a per-entry cooldown
/// elapses").
pub const TOLD_TO_WAIT_COOLDOWN: Duration = Duration::from_secs(300);

/// Ordered, bounded collection of proxy endpoints with a round-robin
/// cursor. All mutation happens behind the repository's mutex; this type
/// itself does no locking.
#[derive(Debug, Default)]
pub struct ProxyPool {
    endpoints: Vec<ProxyEndpoint>,
    cursor: usize,
}

impl ProxyPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProxyEndpoint> {
        self.endpoints.iter()
    }

    /// Append `new_endpoints`, evicting the oldest entries first if the pool
    /// would otherwise exceed [`CAPACITY`].
    pub fn push_evicting(&mut self, new_endpoints: Vec<ProxyEndpoint>) {
        let incoming = new_endpoints.len();
        if incoming == 0 {
            return;
        }
        let projected = self.endpoints.len() + incoming;
        if projected > CAPACITY {
            let overflow = (projected - CAPACITY).min(self.endpoints.len());
            self.endpoints.drain(0..overflow);
        }
        self.endpoints.extend(new_endpoints);
        if self.cursor > self.endpoints.len() {
            self.cursor = 0;
        }
    }

    /// Drop every entry whose property is `Blocked`. Run after a refresh so
    /// dead weight doesn't stick around in the round-robin scan.
    pub fn prune_blocked(&mut self) {
        self.endpoints.retain(|e| e.property != ProxyProperty::Blocked);
        if self.cursor >= self.endpoints.len() {
            self.cursor = 0;
        }
    }

    /// Mark the endpoint matching `address` with a new property, e.g. after
    /// a site adapter detects a ban or a handshake failure.
    pub fn mark(&mut self, address: &str, property: ProxyProperty) {
        if let Some(ep) = self.endpoints.iter_mut().find(|e| e.address() == address) {
            ep.property = property;
        }
    }

    /// Round-robin scan for the next eligible entry, skipping everything
    /// else. `Active` entries are always eligible; `ToldToWait` entries
    /// become eligible again once their per-entry cooldown has elapsed, at
    /// which point they're promoted back to `Active` (spec.md §3). A full
    /// lap with nothing found returns `None` so the caller can trigger a
    /// refresh.
    pub fn next_active(&mut self) -> Option<ProxyEndpoint> {
        let len = self.endpoints.len();
        if len == 0 {
            return None;
        }
        if self.cursor >= len {
            self.cursor = 0;
        }
        for _ in 0..len {
            let idx = self.cursor;
            self.cursor = (self.cursor + 1) % len;
            let entry = &mut self.endpoints[idx];
            let eligible = match entry.property {
                ProxyProperty::Active => true,
                ProxyProperty::ToldToWait => entry.last_used.elapsed() >= TOLD_TO_WAIT_COOLDOWN,
                ProxyProperty::Unresponsive | ProxyProperty::Blocked => false,
            };
            if eligible {
                entry.property = ProxyProperty::Active;
                entry.touch();
                return Some(entry.clone());
            }
        }
        None
    }

    /// Truncate and rewrite `path`, deduplicating entries by `host:port` and
    /// keeping the first occurrence in pool order.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        let mut seen = HashSet::new();
        for ep in &self.endpoints {
            let address = ep.address();
            if !seen.insert(address.clone()) {
                continue;
            }
            writeln!(file, "{address} {} {}", ep.username, ep.password)?;
        }
        Ok(())
    }

    /// Load `host:port user pass` lines from `path`, skipping malformed
    /// ones. Missing files load as empty rather than erroring, matching a
    /// first run with no prior persisted pool.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(());
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut loaded = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let Some(address) = parts.next() else { continue };
            let username = parts.next().unwrap_or("").to_string();
            let password = parts.next().unwrap_or("").to_string();
            let Some((host, port)) = address.rsplit_once(':') else { continue };
            let Ok(port) = port.parse::<u16>() else { continue };
            loaded.push(ProxyEndpoint::new(host, port, username, password));
        }
        self.push_evicting(loaded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(host: &str, port: u16) -> ProxyEndpoint {
        ProxyEndpoint::new(host, port, "u", "p")
    }

    #[test]
    fn eviction_keeps_pool_at_or_under_capacity() {
        let mut pool = ProxyPool::new();
        let first_batch: Vec<_> = (0..CAPACITY).map(|i| ep("10.0.0.1", (i % 60000) as u16 + 1)).collect();
        pool.push_evicting(first_batch);
        assert_eq!(pool.len(), CAPACITY);

        pool.push_evicting(vec![ep("10.0.0.2", 1), ep("10.0.0.2", 2)]);
        assert!(pool.len() <= CAPACITY);
    }

    #[test]
    fn next_active_skips_non_active_and_reports_drain() {
        let mut pool = ProxyPool::new();
        let mut blocked = ep("10.0.0.1", 1);
        blocked.property = ProxyProperty::Blocked;
        pool.push_evicting(vec![blocked]);
        assert!(pool.next_active().is_none());
    }

    #[test]
    fn told_to_wait_is_skipped_before_cooldown_elapses() {
        let mut pool = ProxyPool::new();
        let mut waiting = ep("10.0.0.1", 1);
        waiting.property = ProxyProperty::ToldToWait;
        waiting.touch();
        pool.push_evicting(vec![waiting]);
        assert!(pool.next_active().is_none());
    }

    #[test]
    fn told_to_wait_becomes_eligible_again_once_cooldown_elapses() {
        let mut pool = ProxyPool::new();
        let mut waiting = ep("10.0.0.1", 1);
        waiting.property = ProxyProperty::ToldToWait;
        waiting.last_used = std::time::Instant::now() - TOLD_TO_WAIT_COOLDOWN - Duration::from_secs(1);
        pool.push_evicting(vec![waiting]);
        let endpoint = pool.next_active().expect("cooldown elapsed, should be eligible");
        assert_eq!(endpoint.property, ProxyProperty::Active);
    }

    #[test]
    fn next_active_round_robins_over_active_entries() {
        let mut pool = ProxyPool::new();
        pool.push_evicting(vec![ep("10.0.0.1", 1), ep("10.0.0.2", 2)]);
        let first = pool.next_active().unwrap();
        let second = pool.next_active().unwrap();
        let third = pool.next_active().unwrap();
        assert_ne!(first.address(), second.address());
        assert_eq!(first.address(), third.address());
    }

    #[test]
    fn round_trip_through_disk_deduplicates_by_address() {
        let mut pool = ProxyPool::new();
        pool.push_evicting(vec![ep("10.0.0.1", 1), ep("10.0.0.1", 1), ep("10.0.0.2", 2)]);

        let dir = std::env::temp_dir().join(format!("wudi-proxy-pool-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("proxies.txt");

        pool.save_to_file(&path).unwrap();

        let mut reloaded = ProxyPool::new();
        reloaded.load_from_file(&path).unwrap();
        assert_eq!(reloaded.len(), 2);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }
}
