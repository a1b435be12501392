// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Component C: the stateful per-rig façade. Owns a Connection, runs the
//! poll loop that keeps a `RigSnapshot` current, and enforces the band
//! policy on every frequency-changing operation.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::codec::{self, RawResponse, RigctlCommand};
use crate::error::RigError;
use crate::rig::connection::{spawn_connection, ConnectionHandle};
use crate::rig::machine::ConnState;
use crate::rig::policies::CONSECUTIVE_IO_FAILURE_LIMIT;
use crate::rig::{BandPreset, RigCapabilities, RigConfig, RigSnapshot};

/// Public handle to one rig. Cloning shares the same underlying Connection
/// and poll loop; cheap, `Send + Sync`.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Mutex<ClientState>>,
    conn: ConnectionHandle,
    snapshot_tx: watch::Sender<RigSnapshot>,
    snapshot_rx: watch::Receiver<RigSnapshot>,
}

struct ClientState {
    config: RigConfig,
    caps: Option<RigCapabilities>,
    modes: Vec<String>,
    consecutive_io_failures: u32,
    connection_error: Option<String>,
    last_op_error: Option<String>,
}

impl Client {
    pub fn spawn(
        index: usize,
        config: RigConfig,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (conn, conn_task) = spawn_connection(config.access.clone(), shutdown);
        let initial = RigSnapshot {
            index,
            name: config.name.clone(),
            enabled: config.enabled,
            follow_main: config.follow_main,
            allow_out_of_band: config.allow_out_of_band,
            band_presets: config.band_presets.clone(),
            ..Default::default()
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);
        let client = Self {
            inner: Arc::new(Mutex::new(ClientState {
                config,
                caps: None,
                modes: Vec::new(),
                consecutive_io_failures: 0,
                connection_error: None,
                last_op_error: None,
            })),
            conn,
            snapshot_tx,
            snapshot_rx,
        };
        (client, conn_task)
    }

    pub fn snapshot(&self) -> RigSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<RigSnapshot> {
        self.snapshot_rx.clone()
    }

    pub async fn enable(&self, enabled: bool) {
        let mut state = self.inner.lock().await;
        state.config.enabled = enabled;
        drop(state);
        self.publish_enabled(enabled).await;
    }

    pub async fn set_follow_main(&self, follow: bool) {
        let mut state = self.inner.lock().await;
        state.config.follow_main = follow;
        drop(state);
        let mut snap = self.snapshot();
        snap.follow_main = follow;
        let _ = self.snapshot_tx.send(snap);
    }

    async fn publish_enabled(&self, enabled: bool) {
        let mut snap = self.snapshot();
        snap.enabled = enabled;
        let _ = self.snapshot_tx.send(snap);
    }

    /// Copy frequency and mode from `source`'s current snapshot through the
    /// normal set operations. Frequency and mode are issued independently;
    /// a band rejection on one doesn't prevent the other.
    pub async fn sync_from(&self, source: &Client) -> Result<(), RigError> {
        let snap = source.snapshot();
        let freq_result = self.set_frequency(snap.frequency_hz).await;
        let mode_result = match snap.mode {
            Some(mode) => self.set_mode(mode, snap.passband_hz.unwrap_or(0)).await,
            None => Ok(()),
        };
        freq_result.and(mode_result)
    }

    /// Force a re-read of `dump_caps`, replacing any cached capabilities
    /// and mode list.
    pub async fn refresh_caps(&self) -> Result<(), RigError> {
        {
            let mut state = self.inner.lock().await;
            state.caps = None;
            state.modes.clear();
        }
        self.ensure_caps().await?;
        let mut snap = self.snapshot();
        let state = self.inner.lock().await;
        snap.caps = state.caps.clone();
        snap.modes = state.modes.clone();
        drop(state);
        let _ = self.snapshot_tx.send(snap);
        Ok(())
    }

    /// Set frequency, subject to the band policy: rejected client-side with
    /// no traffic sent if out of every enabled preset and
    /// `allow_out_of_band` is false.
    pub async fn set_frequency(&self, hz: u64) -> Result<(), RigError> {
        self.check_band(hz).await?;
        let resp = self.call(RigctlCommand::SetFreq(hz)).await?;
        if !resp.is_ok() {
            return Err(RigError::rig("set_freq", resp.rprt));
        }
        let mut snap = self.snapshot();
        snap.frequency_hz = hz;
        let _ = self.snapshot_tx.send(snap);
        Ok(())
    }

    pub async fn set_mode(&self, mode: String, passband_hz: u32) -> Result<(), RigError> {
        let resp = self
            .call(RigctlCommand::SetMode(mode.clone(), passband_hz))
            .await?;
        if !resp.is_ok() {
            return Err(RigError::rig("set_mode", resp.rprt));
        }
        let mut snap = self.snapshot();
        snap.mode = Some(mode);
        snap.passband_hz = Some(passband_hz);
        let _ = self.snapshot_tx.send(snap);
        Ok(())
    }

    pub async fn set_vfo(&self, vfo: String) -> Result<(), RigError> {
        let resp = self.call(RigctlCommand::SetVfo(vfo.clone())).await?;
        if !resp.is_ok() {
            return Err(RigError::rig("set_vfo", resp.rprt));
        }
        let mut snap = self.snapshot();
        snap.vfo = Some(vfo);
        let _ = self.snapshot_tx.send(snap);
        Ok(())
    }

    pub async fn set_ptt(&self, on: bool) -> Result<(), RigError> {
        let resp = self.call(RigctlCommand::SetPtt(on)).await?;
        if !resp.is_ok() {
            return Err(RigError::rig("set_ptt", resp.rprt));
        }
        let mut snap = self.snapshot();
        snap.ptt = on;
        let _ = self.snapshot_tx.send(snap);
        Ok(())
    }

    /// Send a wire command this façade has no typed wrapper for
    /// (`get_level`, `set_conf`, `get_conf`) and hand back the raw
    /// response. These are opaque per-driver tokens; the Client neither
    /// interprets nor caches them.
    pub async fn raw_command(&self, cmd: RigctlCommand) -> Result<RawResponse, RigError> {
        self.call(cmd).await
    }

    async fn check_band(&self, hz: u64) -> Result<(), RigError> {
        let state = self.inner.lock().await;
        if state.config.allow_out_of_band {
            return Ok(());
        }
        let enabled_presets: Vec<&BandPreset> =
            state.config.band_presets.iter().filter(|p| p.enabled).collect();
        if enabled_presets.is_empty() {
            return Ok(());
        }
        if enabled_presets.iter().any(|p| p.contains(hz)) {
            Ok(())
        } else {
            Err(RigError::band(format!(
                "{hz} Hz is outside every enabled band preset for '{}'",
                state.config.name
            )))
        }
    }

    /// One poll tick: powerstat, then freq/mode/vfo/ptt, then a one-shot
    /// dual-VFO probe when capabilities allow it. Publishes a fresh
    /// snapshot at the end regardless of partial failures.
    pub async fn poll_once(&self) {
        if self.ensure_caps().await.is_err() {
            return;
        }

        let powerstat_ok = match self.call(RigctlCommand::GetPowerstat).await {
            Ok(resp) => codec::parse_powerstat(&resp).unwrap_or(true),
            Err(_) => true,
        };
        if !powerstat_ok {
            return;
        }

        let caps = self.inner.lock().await.caps.clone();
        let mut snap = self.snapshot();

        if caps.as_ref().map(|c| c.freq_get).unwrap_or(true) {
            match self.call(RigctlCommand::GetFreq).await {
                Ok(resp) => {
                    if let Ok(hz) = codec::parse_freq(&resp) {
                        snap.frequency_hz = hz;
                    }
                }
                Err(e) => self.note_io_result(&e).await,
            }
        }

        if caps.as_ref().map(|c| c.mode_get).unwrap_or(true) {
            if let Ok(resp) = self.call(RigctlCommand::GetMode).await {
                if let Ok((mode, passband)) = codec::parse_mode(&resp) {
                    snap.mode = Some(mode);
                    snap.passband_hz = Some(passband);
                }
            }
        }

        if caps.as_ref().map(|c| c.vfo_get).unwrap_or(true) {
            if let Ok(resp) = self.call(RigctlCommand::GetVfo).await {
                if let Ok(vfo) = codec::parse_vfo(&resp) {
                    snap.vfo = Some(vfo);
                }
            }
        }

        if caps.as_ref().map(|c| c.ptt_get).unwrap_or(true) {
            if let Ok(resp) = self.call(RigctlCommand::GetPtt).await {
                if let Ok(ptt) = codec::parse_ptt(&resp) {
                    snap.ptt = ptt;
                }
            }
        }

        if caps.as_ref().map(|c| c.dual_vfo).unwrap_or(false) {
            self.probe_other_vfo(&mut snap).await;
        }

        snap.connected = self.conn.health() == ConnState::Connected;
        {
            let state = self.inner.lock().await;
            snap.connection_error = state.connection_error.clone();
            snap.last_op_error = state.last_op_error.clone();
            snap.caps = state.caps.clone();
            snap.modes = state.modes.clone();
        }
        snap.debug_events = self.conn.debug_events();
        let _ = self.snapshot_tx.send(snap);
    }

    /// Probe the inactive VFO's frequency by switching to it, reading
    /// `get_freq`, then switching back. Best-effort: any failed step leaves
    /// `frequency_a_hz`/`frequency_b_hz` untouched and does not stop the
    /// poll tick. Requires `snap.vfo` to already hold the currently active
    /// VFO (set by the `get_vfo` step earlier in this tick).
    async fn probe_other_vfo(&self, snap: &mut RigSnapshot) {
        let Some(current_vfo) = snap.vfo.clone() else {
            return;
        };
        let other_vfo = if current_vfo == "VFOA" { "VFOB" } else { "VFOA" }.to_string();

        let switched = match self.call(RigctlCommand::SetVfo(other_vfo.clone())).await {
            Ok(resp) if resp.is_ok() => true,
            _ => false,
        };
        if !switched {
            return;
        }

        if let Ok(probed_hz) = self
            .call(RigctlCommand::GetFreq)
            .await
            .and_then(|resp| codec::parse_freq(&resp))
        {
            if current_vfo == "VFOA" {
                snap.frequency_a_hz = Some(snap.frequency_hz);
                snap.frequency_b_hz = Some(probed_hz);
            } else {
                snap.frequency_b_hz = Some(snap.frequency_hz);
                snap.frequency_a_hz = Some(probed_hz);
            }
        }

        let _ = self.call(RigctlCommand::SetVfo(current_vfo)).await;
    }

    /// Fetch and cache capabilities via `dump_caps` if not already known.
    async fn ensure_caps(&self) -> Result<(), RigError> {
        {
            let state = self.inner.lock().await;
            if state.caps.is_some() {
                return Ok(());
            }
        }
        let resp = self.call(RigctlCommand::DumpCaps).await?;
        let raw = codec::parse_caps(&resp)?;
        let caps = RigCapabilities {
            freq_get: raw.freq_get,
            freq_set: raw.freq_set,
            mode_get: raw.mode_get,
            mode_set: raw.mode_set,
            vfo_get: raw.vfo_get,
            vfo_set: raw.vfo_set,
            ptt_get: raw.ptt_get,
            ptt_set: raw.ptt_set,
            dual_vfo: raw.vfo_get && raw.vfo_set,
        };
        let mut state = self.inner.lock().await;
        state.caps = Some(caps);
        state.modes = raw.modes;
        Ok(())
    }

    async fn call(&self, cmd: RigctlCommand) -> Result<RawResponse, RigError> {
        let result = self.conn.submit(cmd, true).await;
        if let Err(e) = &result {
            self.note_io_result(e).await;
        } else {
            let mut state = self.inner.lock().await;
            state.consecutive_io_failures = 0;
            state.connection_error = None;
        }
        result
    }

    /// Track consecutive I/O failures; once they cross the threshold the
    /// rig is reported disconnected in its snapshot, even if the
    /// underlying Connection is still mid-reconnect.
    async fn note_io_result(&self, error: &RigError) {
        use crate::error::RigErrorKind;
        let mut state = self.inner.lock().await;
        if error.kind == RigErrorKind::Io || error.kind == RigErrorKind::Timeout {
            state.consecutive_io_failures += 1;
            if state.consecutive_io_failures >= CONSECUTIVE_IO_FAILURE_LIMIT {
                state.connection_error = Some(error.to_string());
                state.caps = None;
            }
        } else {
            state.last_op_error = Some(error.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::RigAccess;

    fn sample_config() -> RigConfig {
        RigConfig {
            name: "rig0".into(),
            access: RigAccess::Tcp {
                host: "127.0.0.1".into(),
                port: 1,
            },
            enabled: true,
            follow_main: false,
            allow_out_of_band: false,
            poll_interval_ms: 500,
            band_presets: vec![BandPreset {
                label: "20m".into(),
                center_hz: 14_175_000,
                lower_hz: 14_000_000,
                upper_hz: 14_350_000,
                enabled: true,
            }],
        }
    }

    #[tokio::test]
    async fn initial_snapshot_reflects_config() {
        let (_tx, rx) = watch::channel(false);
        let (client, task) = Client::spawn(0, sample_config(), rx);
        let snap = client.snapshot();
        assert_eq!(snap.name, "rig0");
        assert!(snap.enabled);
        assert!(!snap.connected);
        task.abort();
    }

    #[tokio::test]
    async fn out_of_band_frequency_is_rejected_without_traffic() {
        let (_tx, rx) = watch::channel(false);
        let (client, task) = Client::spawn(0, sample_config(), rx);
        let err = client.set_frequency(7_100_000).await.unwrap_err();
        assert_eq!(err.kind, crate::error::RigErrorKind::Band);
        task.abort();
    }

    #[tokio::test]
    async fn enable_toggle_publishes_snapshot() {
        let (_tx, rx) = watch::channel(false);
        let (client, task) = Client::spawn(0, sample_config(), rx);
        client.enable(false).await;
        assert!(!client.snapshot().enabled);
        task.abort();
    }
}
