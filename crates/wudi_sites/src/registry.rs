//! Exact-match `site_id -> Arc<dyn SiteAdapter>` lookup, generalizing the
//! teacher's longest-prefix `match_location` (`migux_router`) from
//! path-based routing to a flat per-site registry — there is no prefix
//! structure to match here, just one id per target site.

use std::sync::Arc;

use crate::adapter::SiteAdapter;
use crate::adapters::{autohome::AutoHomeAdapter, jjgames::JjGamesAdapter, passport::PassportAdapter, qunar::QunarAdapter};

/// Look up the adapter registered for `site_id`. Returns `None` for any id
/// outside the shipped set; the task executor surfaces that as a config
/// error rather than guessing at a fallback adapter.
pub fn adapter_for(site_id: u32) -> Option<Arc<dyn SiteAdapter>> {
    match site_id {
        1 => Some(Arc::new(PassportAdapter)),
        2 => Some(Arc::new(AutoHomeAdapter)),
        3 => Some(Arc::new(JjGamesAdapter)),
        4 => Some(Arc::new(QunarAdapter)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_shipped_site_id_resolves() {
        for id in 1..=4 {
            assert!(adapter_for(id).is_some(), "site id {id} should resolve");
        }
    }

    #[test]
    fn unknown_site_id_is_none() {
        assert!(adapter_for(999).is_none());
    }

    #[test]
    fn adapter_site_id_matches_its_registry_key() {
        for id in 1..=4 {
            let adapter = adapter_for(id).unwrap();
            assert_eq!(adapter.site_id(), id);
        }
    }
}
