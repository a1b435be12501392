// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-rig data model: configuration, derived capabilities, the debug ring
//! and the immutable snapshot subscribers read.

pub mod client;
pub mod connection;
pub mod machine;
pub mod policies;
pub mod transport;

use serde::{Deserialize, Serialize};

/// One labeled frequency range used for UI presentation and the band-policy
/// check in the Client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BandPreset {
    pub label: String,
    pub center_hz: u64,
    pub lower_hz: u64,
    pub upper_hz: u64,
    pub enabled: bool,
}

impl BandPreset {
    pub fn contains(&self, hz: u64) -> bool {
        self.enabled && self.lower_hz <= hz && hz <= self.upper_hz
    }

    /// `lower_hz <= center_hz <= upper_hz`, the only shape invariant a
    /// preset must satisfy.
    pub fn is_well_formed(&self) -> bool {
        self.lower_hz <= self.center_hz && self.center_hz <= self.upper_hz
    }
}

/// How a Client reaches its physical rig: a direct `rigctld`-compatible TCP
/// endpoint, or a `rigctl` process spawned and driven over its stdio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RigAccess {
    Tcp { host: String, port: u16 },
    Subprocess {
        model_id: u32,
        device_path: String,
        baud: u32,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Input configuration for one rig, as supplied by the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RigConfig {
    pub name: String,
    pub access: RigAccess,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub follow_main: bool,
    #[serde(default)]
    pub allow_out_of_band: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub band_presets: Vec<BandPreset>,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl RigConfig {
    /// `lower_hz <= center_hz <= upper_hz` on every preset, preset labels
    /// unique, and `poll_interval_ms >= 100`.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms < 100 {
            return Err(format!(
                "rig '{}': poll_interval_ms must be >= 100",
                self.name
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for preset in &self.band_presets {
            if !preset.is_well_formed() {
                return Err(format!(
                    "rig '{}': band preset '{}' has lower_hz > center_hz or center_hz > upper_hz",
                    self.name, preset.label
                ));
            }
            if !seen.insert(&preset.label) {
                return Err(format!(
                    "rig '{}': duplicate band preset label '{}'",
                    self.name, preset.label
                ));
            }
        }
        Ok(())
    }
}

/// Derived once per connect from `dump_caps`; cached until the connection
/// drops.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RigCapabilities {
    pub freq_get: bool,
    pub freq_set: bool,
    pub mode_get: bool,
    pub mode_set: bool,
    pub vfo_get: bool,
    pub vfo_set: bool,
    pub ptt_get: bool,
    pub ptt_set: bool,
    pub dual_vfo: bool,
}

/// The kind of traffic a debug event records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebugEventKind {
    Tx,
    Rx,
    ServerRx,
    ServerTx,
}

/// One entry in a rig's (or the listener's) debug ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebugEvent {
    pub ts_millis: u64,
    pub kind: DebugEventKind,
    pub semantic: String,
    pub payload: String,
}

/// Fixed-capacity ring of the last N debug events. Single writer, many
/// readers; cloned out wholesale for a snapshot rather than shared live.
#[derive(Debug, Clone)]
pub struct DebugRing {
    capacity: usize,
    events: std::collections::VecDeque<DebugEvent>,
}

impl DebugRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: std::collections::VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, event: DebugEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn snapshot(&self) -> Vec<DebugEvent> {
        self.events.iter().cloned().collect()
    }
}

impl Default for DebugRing {
    fn default() -> Self {
        Self::new(500)
    }
}

/// The core's source of truth for subscribers: an immutable per-tick view
/// of one rig's observable state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RigSnapshot {
    pub index: usize,
    pub name: String,
    pub connected: bool,
    pub enabled: bool,
    pub follow_main: bool,
    pub model_id: Option<u32>,
    pub frequency_hz: u64,
    pub frequency_a_hz: Option<u64>,
    pub frequency_b_hz: Option<u64>,
    pub vfo: Option<String>,
    pub mode: Option<String>,
    pub passband_hz: Option<u32>,
    pub ptt: bool,
    pub caps: Option<RigCapabilities>,
    pub modes: Vec<String>,
    pub band_presets: Vec<BandPreset>,
    pub allow_out_of_band: bool,
    pub connection_error: Option<String>,
    pub last_op_error: Option<String>,
    pub debug_events: Vec<DebugEvent>,
}

impl RigSnapshot {
    /// `connected ⇒ caps ≠ ∅` and `connection_error ≠ ∅ ⇒ connected = false`.
    pub fn upholds_invariants(&self) -> bool {
        if self.connected && self.caps.is_none() {
            return false;
        }
        if self.connection_error.is_some() && self.connected {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset(label: &str, lower: u64, center: u64, upper: u64) -> BandPreset {
        BandPreset {
            label: label.to_string(),
            center_hz: center,
            lower_hz: lower,
            upper_hz: upper,
            enabled: true,
        }
    }

    #[test]
    fn band_preset_contains_checks_bounds_and_enabled() {
        let p = preset("20m", 14_000_000, 14_175_000, 14_350_000);
        assert!(p.contains(14_200_000));
        assert!(!p.contains(7_000_000));

        let mut disabled = p.clone();
        disabled.enabled = false;
        assert!(!disabled.contains(14_200_000));
    }

    #[test]
    fn rig_config_rejects_sub_100ms_poll_interval() {
        let mut cfg = sample_config();
        cfg.poll_interval_ms = 50;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rig_config_rejects_duplicate_labels() {
        let mut cfg = sample_config();
        cfg.band_presets.push(preset("20m", 14_000_000, 14_175_000, 14_350_000));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rig_config_rejects_malformed_preset() {
        let mut cfg = sample_config();
        cfg.band_presets = vec![preset("bad", 14_350_000, 14_000_000, 14_175_000)];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn snapshot_invariant_connected_requires_caps() {
        let mut snap = RigSnapshot::default();
        snap.connected = true;
        assert!(!snap.upholds_invariants());
        snap.caps = Some(RigCapabilities::default());
        assert!(snap.upholds_invariants());
    }

    #[test]
    fn debug_ring_drops_oldest_past_capacity() {
        let mut ring = DebugRing::new(2);
        for i in 0..3 {
            ring.push(DebugEvent {
                ts_millis: i,
                kind: DebugEventKind::Tx,
                semantic: "x".into(),
                payload: i.to_string(),
            });
        }
        let snap = ring.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].payload, "1");
        assert_eq!(snap[1].payload, "2");
    }

    fn sample_config() -> RigConfig {
        RigConfig {
            name: "rig0".into(),
            access: RigAccess::Tcp {
                host: "127.0.0.1".into(),
                port: 4532,
            },
            enabled: true,
            follow_main: false,
            allow_out_of_band: false,
            poll_interval_ms: 500,
            band_presets: vec![preset("20m", 14_000_000, 14_175_000, 14_350_000)],
        }
    }
}
