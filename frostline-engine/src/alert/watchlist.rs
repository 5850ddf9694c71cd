//! Soak watchlist.
//!
//! The first occurrence of a problem never alerts directly -- the pair
//! (sensor, problem kind) goes on the watchlist and must stay continuously
//! problematic for the soak period before anything is emitted. Transients
//! that resolve on their own (a quick restock, a sensor burp) fall off the
//! list without noise.

use std::collections::HashMap;

use super::ProblemKind;
use crate::types::MacAddr;

#[derive(Debug, Clone)]
pub struct WatchEntry {
    pub first_seen_ms: u64,
    pub message: String,
}

/// (sensor, problem kind) pairs currently in soak.
#[derive(Debug, Default)]
pub struct Watchlist {
    entries: HashMap<(MacAddr, ProblemKind), WatchEntry>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the problem is (still) present. Returns the first-seen
    /// timestamp; the stored message tracks the latest observation.
    pub fn observe(&mut self, mac: &MacAddr, kind: ProblemKind, message: &str, now_ms: u64) -> u64 {
        let entry = self
            .entries
            .entry((mac.clone(), kind))
            .or_insert_with(|| WatchEntry {
                first_seen_ms: now_ms,
                message: message.to_string(),
            });
        entry.message = message.to_string();
        entry.first_seen_ms
    }

    pub fn first_seen(&self, mac: &MacAddr, kind: ProblemKind) -> Option<u64> {
        self.entries
            .get(&(mac.clone(), kind))
            .map(|e| e.first_seen_ms)
    }

    /// Drop one (sensor, kind) entry -- the problem normalised.
    pub fn clear(&mut self, mac: &MacAddr, kind: ProblemKind) {
        self.entries.remove(&(mac.clone(), kind));
    }

    /// Drop every entry for a sensor (maintenance, defrost suppression).
    pub fn clear_sensor(&mut self, mac: &MacAddr) {
        self.entries.retain(|(m, _), _| m != mac);
    }

    /// Drop entries older than `max_age_ms`. Returns how many were removed.
    pub fn prune(&mut self, now_ms: u64, max_age_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now_ms.saturating_sub(e.first_seen_ms) <= max_age_ms);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddr {
        MacAddr::canonicalize("AC233FA04E21")
    }

    #[test]
    fn observe_keeps_first_seen() {
        let mut list = Watchlist::new();
        assert_eq!(list.observe(&mac(), ProblemKind::TempHigh, "alta", 1_000), 1_000);
        assert_eq!(list.observe(&mac(), ProblemKind::TempHigh, "alta", 9_000), 1_000);
    }

    #[test]
    fn kinds_are_tracked_independently() {
        let mut list = Watchlist::new();
        list.observe(&mac(), ProblemKind::TempHigh, "alta", 1_000);
        list.observe(&mac(), ProblemKind::HumidityHigh, "umidade", 2_000);

        assert_eq!(list.first_seen(&mac(), ProblemKind::TempHigh), Some(1_000));
        assert_eq!(
            list.first_seen(&mac(), ProblemKind::HumidityHigh),
            Some(2_000)
        );
    }

    #[test]
    fn clear_removes_single_kind() {
        let mut list = Watchlist::new();
        list.observe(&mac(), ProblemKind::TempHigh, "alta", 1_000);
        list.observe(&mac(), ProblemKind::DoorOpen, "porta", 1_000);

        list.clear(&mac(), ProblemKind::TempHigh);

        assert_eq!(list.first_seen(&mac(), ProblemKind::TempHigh), None);
        assert_eq!(list.first_seen(&mac(), ProblemKind::DoorOpen), Some(1_000));
    }

    #[test]
    fn clear_sensor_removes_all_kinds() {
        let mut list = Watchlist::new();
        list.observe(&mac(), ProblemKind::TempHigh, "alta", 1_000);
        list.observe(&mac(), ProblemKind::DoorOpen, "porta", 1_000);

        list.clear_sensor(&mac());
        assert!(list.is_empty());
    }

    #[test]
    fn prune_drops_stale_entries() {
        let mut list = Watchlist::new();
        list.observe(&mac(), ProblemKind::TempHigh, "alta", 0);
        list.observe(&mac(), ProblemKind::DoorOpen, "porta", 50_000);

        let removed = list.prune(60_000, 20_000);

        assert_eq!(removed, 1);
        assert_eq!(list.first_seen(&mac(), ProblemKind::DoorOpen), Some(50_000));
    }
}
