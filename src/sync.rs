// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Component D: fans out the main rig's frequency and mode to every enabled,
//! `follow_main` rig. One task, one main-rig watch subscription, a
//! remembered last-applied value per follower so unrelated snapshot changes
//! (PTT, debug events) don't cause redundant set commands.

use std::collections::HashMap;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::rig::client::Client;
use crate::rig::RigSnapshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Applied {
    frequency_hz: Option<u64>,
    mode: Option<u64>, // hash of (mode, passband) to detect change cheaply
}

/// Runs until the main rig's watch channel closes or `shutdown` fires.
/// `sync_enabled` lets a collaborator suspend fan-out without tearing down
/// the task (spec: a toggle, not a restart).
pub async fn run(
    mut main_rx: watch::Receiver<RigSnapshot>,
    followers: Vec<Client>,
    mut sync_enabled: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut applied: HashMap<usize, Applied> = HashMap::new();

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            changed = main_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if !*sync_enabled.borrow() {
                    continue;
                }
                let main_snap = main_rx.borrow().clone();
                fan_out(&main_snap, &followers, &mut applied).await;
            }
        }
    }
}

async fn fan_out(
    main_snap: &RigSnapshot,
    followers: &[Client],
    applied: &mut HashMap<usize, Applied>,
) {
    for follower in followers {
        let snap = follower.snapshot();
        if !snap.enabled || !snap.follow_main {
            continue;
        }
        let entry = applied.entry(snap.index).or_default();

        if entry.frequency_hz != Some(main_snap.frequency_hz) {
            match follower.set_frequency(main_snap.frequency_hz).await {
                Ok(()) => entry.frequency_hz = Some(main_snap.frequency_hz),
                Err(e) if e.kind == crate::error::RigErrorKind::Band => {
                    // Out-of-band for this follower is an expected steady
                    // state, not a fault; don't retry every tick.
                    debug!(rig = %snap.name, %e, "follower rejected main frequency, out of band");
                    entry.frequency_hz = Some(main_snap.frequency_hz);
                }
                Err(e) => warn!(rig = %snap.name, %e, "failed to sync frequency to follower"),
            }
        }

        if let (Some(mode), Some(passband)) = (&main_snap.mode, main_snap.passband_hz) {
            let mode_key = mode_hash(mode, passband);
            if entry.mode != Some(mode_key) {
                match follower.set_mode(mode.clone(), passband).await {
                    Ok(()) => entry.mode = Some(mode_key),
                    Err(e) => warn!(rig = %snap.name, %e, "failed to sync mode to follower"),
                }
            }
        }
    }
}

fn mode_hash(mode: &str, passband: u32) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    mode.hash(&mut hasher);
    passband.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_hash_changes_with_either_field() {
        let a = mode_hash("USB", 2400);
        let b = mode_hash("USB", 2700);
        let c = mode_hash("LSB", 2400);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn applied_default_has_no_remembered_values() {
        let applied = Applied::default();
        assert!(applied.frequency_hz.is_none());
        assert!(applied.mode.is_none());
    }
}
