//! Progressive tier upgrade: low-detail first, high-detail in the background
//!
//! Consumers always observe a whole `LoadedTextureSet` behind an `Arc`; a
//! tier swap replaces the arc, it never mutates a set in place. High-tier
//! failure keeps the low tier and is logged, never surfaced. Results carry a
//! request token so a stale load can never clobber a newer one.

use std::sync::Arc;

use crate::core::error::Error;
use crate::manifest::LoadedTextureSet;

/// Orchestrator state machine.
///
/// `LowTierLoaded` is a valid terminal state; the high tier is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierState {
    Empty,
    LowTierLoaded,
    HighTierLoaded,
}

/// Holds the currently displayed texture set and applies tier results in
/// last-applicable-wins order.
pub struct TierOrchestrator {
    state: TierState,
    current: Option<Arc<LoadedTextureSet>>,
    next_token: u64,
    applied_token: u64,
}

impl Default for TierOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl TierOrchestrator {
    pub fn new() -> Self {
        Self {
            state: TierState::Empty,
            current: None,
            next_token: 1,
            applied_token: 0,
        }
    }

    pub fn state(&self) -> TierState {
        self.state
    }

    /// The displayed set. Consumers clone the arc and keep rendering it even
    /// across a swap.
    pub fn current(&self) -> Option<Arc<LoadedTextureSet>> {
        self.current.clone()
    }

    /// Issue a token for a new load request. Tokens order results: a result
    /// older than the last applied one is discarded.
    pub fn begin_request(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    /// Apply a completed low-tier load. Returns whether it was applied.
    pub fn offer_low(&mut self, token: u64, set: Arc<LoadedTextureSet>) -> bool {
        if token <= self.applied_token {
            log::debug!("discarding stale low-tier result (token {})", token);
            return false;
        }
        self.applied_token = token;
        self.current = Some(set);
        self.state = TierState::LowTierLoaded;
        log::info!("low tier applied (token {})", token);
        true
    }

    /// Apply a completed high-tier load. Only upgrades an already-populated
    /// orchestrator; a stale result is discarded.
    pub fn offer_high(&mut self, token: u64, set: Arc<LoadedTextureSet>) -> bool {
        if self.state == TierState::Empty {
            log::debug!("discarding high-tier result before any low tier (token {})", token);
            return false;
        }
        if token < self.applied_token {
            log::debug!("discarding stale high-tier result (token {})", token);
            return false;
        }
        self.applied_token = token;
        self.current = Some(set);
        self.state = TierState::HighTierLoaded;
        log::info!("high tier applied (token {})", token);
        true
    }

    /// Record a failed high-tier load. The state never regresses and the
    /// failure is never surfaced to consumers.
    pub fn fail_high(&mut self, token: u64, error: &Error) {
        log::warn!(
            "high-tier load failed (token {}), keeping current tier: {}",
            token, error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn set(id: &str) -> Arc<LoadedTextureSet> {
        Arc::new(LoadedTextureSet {
            manifest_id: id.to_string(),
            textures: HashMap::new(),
            detail_tiles: HashMap::new(),
            total_bytes: 0,
            used_compressed: false,
        })
    }

    #[test]
    fn empty_to_low_to_high() {
        let mut orch = TierOrchestrator::new();
        assert_eq!(orch.state(), TierState::Empty);
        assert!(orch.current().is_none());

        let token = orch.begin_request();
        assert!(orch.offer_low(token, set("low")));
        assert_eq!(orch.state(), TierState::LowTierLoaded);
        assert_eq!(orch.current().unwrap().manifest_id, "low");

        assert!(orch.offer_high(token, set("high")));
        assert_eq!(orch.state(), TierState::HighTierLoaded);
        assert_eq!(orch.current().unwrap().manifest_id, "high");
    }

    #[test]
    fn high_before_low_is_discarded() {
        let mut orch = TierOrchestrator::new();
        let token = orch.begin_request();
        assert!(!orch.offer_high(token, set("high")));
        assert_eq!(orch.state(), TierState::Empty);
    }

    #[test]
    fn high_failure_keeps_low_tier() {
        let mut orch = TierOrchestrator::new();
        let token = orch.begin_request();
        orch.offer_low(token, set("low"));
        orch.fail_high(token, &Error::ManifestFetch("boom".to_string()));
        assert_eq!(orch.state(), TierState::LowTierLoaded);
        assert_eq!(orch.current().unwrap().manifest_id, "low");
    }

    #[test]
    fn stale_result_never_clobbers_newer_one() {
        let mut orch = TierOrchestrator::new();
        let old = orch.begin_request();
        let new = orch.begin_request();

        assert!(orch.offer_low(new, set("new-low")));
        // The older request finishes late; it must be discarded.
        assert!(!orch.offer_low(old, set("old-low")));
        assert!(!orch.offer_high(old, set("old-high")));
        assert_eq!(orch.current().unwrap().manifest_id, "new-low");
    }

    #[test]
    fn consumers_keep_old_set_across_swap() {
        let mut orch = TierOrchestrator::new();
        let token = orch.begin_request();
        orch.offer_low(token, set("low"));
        let held = orch.current().unwrap();
        orch.offer_high(token, set("high"));
        // The consumer's arc still points at the complete old set.
        assert_eq!(held.manifest_id, "low");
        assert_eq!(orch.current().unwrap().manifest_id, "high");
    }
}
