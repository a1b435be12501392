// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Component G: owns the set of Clients and transitions it atomically
//! when a new configuration arrives. The single source of truth for
//! which rig is "main"; the Sync Engine and Listener are rebuilt from it
//! rather than holding their own references across a reconfigure.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::broadcast::Broadcaster;
use crate::rig::client::Client;
use crate::rig::RigConfig;
use crate::sync;

/// Grace period the Registry waits after starting new Clients before it
/// tears down the previous generation's tasks, so in-flight operations on
/// the old Clients get a chance to fail visibly instead of vanishing.
const QUIESCENCE_WINDOW: Duration = Duration::from_millis(500);

/// Top-level configuration a collaborator hands the Registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub rigs: Vec<RigConfig>,
    pub sync_source_index: usize,
    #[serde(default = "default_true")]
    pub sync_enabled: bool,
    #[serde(default = "default_true")]
    pub rigctl_to_main_enabled: bool,
    #[serde(default = "default_listen_host")]
    pub rigctl_listen_host: String,
    #[serde(default = "default_listen_port")]
    pub rigctl_listen_port: u16,
    #[serde(default = "default_true")]
    pub all_rigs_enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    4534
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.rigs.is_empty() {
            return Err("AppConfig must list at least one rig".to_string());
        }
        if self.sync_source_index >= self.rigs.len() {
            return Err(format!(
                "sync_source_index {} out of range (have {} rigs)",
                self.sync_source_index,
                self.rigs.len()
            ));
        }
        for rig in &self.rigs {
            rig.validate()?;
        }
        Ok(())
    }
}

struct Generation {
    clients: Vec<Client>,
    tasks: Vec<JoinHandle<()>>,
    client_shutdown: watch::Sender<bool>,
    sync_task: Option<JoinHandle<()>>,
    sync_shutdown: watch::Sender<bool>,
    sync_enabled_tx: watch::Sender<bool>,
}

/// Owns every live rig, their poll loops and the current sync engine
/// instance. `apply` is the only mutating entry point; everything else is
/// read access for collaborators (the Listener, the HTTP façade).
pub struct Registry {
    config: AppConfig,
    generation: Generation,
    generation_count: u64,
    broadcaster: Broadcaster,
    listener_addr: Option<(String, u16)>,
    listener_task: Option<JoinHandle<()>>,
    listener_shutdown: watch::Sender<bool>,
    all_rigs_enabled_tx: watch::Sender<bool>,
}

impl Registry {
    /// Builds the first generation of Clients and binds the rigctl
    /// Listener, so a freshly constructed Registry is immediately reachable
    /// on the wire rather than waiting for a collaborator to call `apply`.
    pub async fn new(config: AppConfig) -> Result<Self, String> {
        config.validate()?;
        let broadcaster = Broadcaster::new();
        sync_broadcaster_flags(&broadcaster, &config);
        let (listener_shutdown, _) = watch::channel(false);
        let (all_rigs_enabled_tx, all_rigs_enabled_rx) = watch::channel(config.all_rigs_enabled);
        let generation = spawn_generation(&config, &broadcaster, all_rigs_enabled_rx).await;
        let mut registry = Self {
            config,
            generation,
            generation_count: 0,
            broadcaster,
            listener_addr: None,
            listener_task: None,
            listener_shutdown,
            all_rigs_enabled_tx,
        };
        registry.restart_listener();
        Ok(registry)
    }

    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation_count
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn client(&self, index: usize) -> Option<&Client> {
        self.generation.clients.get(index)
    }

    pub fn main_client(&self) -> Option<&Client> {
        self.generation.clients.get(self.config.sync_source_index)
    }

    pub fn clients(&self) -> &[Client] {
        &self.generation.clients
    }

    pub fn set_sync_enabled(&self, enabled: bool) {
        let _ = self.generation.sync_enabled_tx.send(enabled);
        self.broadcaster.set_sync_enabled(enabled);
    }

    /// Master gate: short-circuits every rig's poll loop and the Listener's
    /// fan-out, not just the status feed's `all_rigs_enabled` field.
    pub fn set_all_rigs_enabled(&self, enabled: bool) {
        let _ = self.all_rigs_enabled_tx.send(enabled);
        self.broadcaster.set_all_rigs_enabled(enabled);
    }

    /// Atomically replace the live configuration: build new Clients and
    /// start their poll loops, then after a quiescence window shut the
    /// previous generation down. Restart the Listener iff the bind address
    /// changed. The generation counter the Sync Engine uses to detect stale
    /// rig references always increases.
    pub async fn apply(&mut self, new_config: AppConfig) -> Result<(), String> {
        new_config.validate()?;

        let new_generation = spawn_generation(
            &new_config,
            &self.broadcaster,
            self.all_rigs_enabled_tx.subscribe(),
        )
        .await;
        let old_generation = std::mem::replace(&mut self.generation, new_generation);
        self.generation_count += 1;
        info!(generation = self.generation_count, "applied new configuration");

        tokio::time::sleep(QUIESCENCE_WINDOW).await;
        shut_down_generation(old_generation).await;

        let needs_listener_restart = self.listener_task.is_none()
            || self.listener_addr.as_ref()
                != Some(&(new_config.rigctl_listen_host.clone(), new_config.rigctl_listen_port));
        self.config = new_config;
        sync_broadcaster_flags(&self.broadcaster, &self.config);
        let _ = self.all_rigs_enabled_tx.send(self.config.all_rigs_enabled);

        if needs_listener_restart {
            self.restart_listener();
        }

        Ok(())
    }

    fn restart_listener(&mut self) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        if let Some(old) = self.listener_task.take() {
            let _ = self.listener_shutdown.send(true);
            old.abort();
        }
        self.listener_shutdown = shutdown_tx;
        let host = self.config.rigctl_listen_host.clone();
        let port = self.config.rigctl_listen_port;
        self.listener_addr = Some((host.clone(), port));

        let clients = self.generation.clients.clone();
        let sync_source_index = self.config.sync_source_index;
        let rigctl_to_main_enabled = self.config.rigctl_to_main_enabled;
        let all_rigs_enabled = self.all_rigs_enabled_tx.subscribe();
        self.listener_task = Some(tokio::spawn(async move {
            let addr = format!("{host}:{port}");
            if let Err(e) = crate::listener::run(
                addr,
                clients,
                sync_source_index,
                rigctl_to_main_enabled,
                all_rigs_enabled,
                shutdown_rx,
            )
            .await
            {
                warn!(%e, "rigctl listener exited");
            }
        }));
    }

    pub async fn shutdown(mut self) {
        let _ = self.listener_shutdown.send(true);
        if let Some(task) = self.listener_task.take() {
            let _ = task.await;
        }
        shut_down_generation(self.generation).await;
    }
}

/// Push the flags the Broadcaster surfaces to subscribers (spec 4.F's
/// `sync_enabled`/`sync_source_index`/`rigctl_to_main_enabled`/
/// `all_rigs_enabled`) so they track the live `AppConfig`.
fn sync_broadcaster_flags(broadcaster: &Broadcaster, config: &AppConfig) {
    broadcaster.set_all_rigs_enabled(config.all_rigs_enabled);
    broadcaster.set_sync_enabled(config.sync_enabled);
    broadcaster.set_sync_source_index(config.sync_source_index);
    broadcaster.set_rigctl_to_main_enabled(config.rigctl_to_main_enabled);
}

async fn spawn_generation(
    config: &AppConfig,
    broadcaster: &Broadcaster,
    all_rigs_enabled: watch::Receiver<bool>,
) -> Generation {
    let (client_shutdown, client_shutdown_rx) = watch::channel(false);
    let mut clients = Vec::with_capacity(config.rigs.len());
    let mut tasks = Vec::with_capacity(config.rigs.len() * 2);

    for (index, rig_config) in config.rigs.iter().enumerate() {
        let (client, conn_task) =
            Client::spawn(index, rig_config.clone(), client_shutdown_rx.clone());
        tasks.push(conn_task);
        tasks.push(spawn_poll_loop(
            client.clone(),
            Duration::from_millis(rig_config.poll_interval_ms),
            all_rigs_enabled.clone(),
            client_shutdown_rx.clone(),
        ));
        tasks.push(spawn_snapshot_forwarder(
            client.clone(),
            broadcaster.clone(),
            client_shutdown_rx.clone(),
        ));
        clients.push(client);
    }

    let (sync_shutdown, sync_shutdown_rx) = watch::channel(false);
    let (sync_enabled_tx, sync_enabled_rx) = watch::channel(config.sync_enabled);
    let followers: Vec<Client> = clients
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != config.sync_source_index)
        .map(|(_, c)| c.clone())
        .collect();
    let sync_task = clients.get(config.sync_source_index).map(|main| {
        tokio::spawn(sync::run(
            main.watch(),
            followers,
            sync_enabled_rx,
            sync_shutdown_rx,
        ))
    });

    Generation {
        clients,
        tasks,
        client_shutdown,
        sync_task,
        sync_shutdown,
        sync_enabled_tx,
    }
}

fn spawn_poll_loop(
    client: Client,
    interval: Duration,
    all_rigs_enabled: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if *all_rigs_enabled.borrow() && client.snapshot().enabled {
                        client.poll_once().await;
                    }
                }
            }
        }
    })
}

fn spawn_snapshot_forwarder(
    client: Client,
    broadcaster: Broadcaster,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = client.watch();
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    broadcaster.publish(rx.borrow_and_update().clone());
                }
            }
        }
    })
}

async fn shut_down_generation(generation: Generation) {
    let _ = generation.client_shutdown.send(true);
    let _ = generation.sync_shutdown.send(true);
    if let Some(task) = generation.sync_task {
        let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
    }
    for task in generation.tasks {
        if tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .is_err()
        {
            warn!("client task did not exit within shutdown grace period");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::RigAccess;

    fn sample_rig(name: &str) -> RigConfig {
        RigConfig {
            name: name.to_string(),
            access: RigAccess::Tcp {
                host: "127.0.0.1".into(),
                port: 1,
            },
            enabled: true,
            follow_main: false,
            allow_out_of_band: true,
            poll_interval_ms: 500,
            band_presets: vec![],
        }
    }

    fn sample_config() -> AppConfig {
        AppConfig {
            rigs: vec![sample_rig("main"), sample_rig("follower")],
            sync_source_index: 0,
            sync_enabled: true,
            rigctl_to_main_enabled: true,
            rigctl_listen_host: "127.0.0.1".into(),
            rigctl_listen_port: 0,
            all_rigs_enabled: true,
        }
    }

    #[test]
    fn rejects_out_of_range_sync_source() {
        let mut cfg = sample_config();
        cfg.sync_source_index = 5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_rig_list() {
        let mut cfg = sample_config();
        cfg.rigs.clear();
        assert!(cfg.validate().is_err());
    }

    #[tokio::test]
    async fn construction_spawns_one_client_per_rig() {
        let registry = Registry::new(sample_config()).await.unwrap();
        assert_eq!(registry.clients().len(), 2);
        assert_eq!(registry.generation(), 0);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn apply_increments_generation() {
        let mut registry = Registry::new(sample_config()).await.unwrap();
        registry.apply(sample_config()).await.unwrap();
        assert_eq!(registry.generation(), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn set_all_rigs_enabled_updates_broadcaster() {
        let registry = Registry::new(sample_config()).await.unwrap();
        let mut updates = registry.broadcaster().subscribe();
        registry.set_all_rigs_enabled(false);
        updates.changed().await.unwrap();
        assert!(!updates.borrow().all_rigs_enabled);
        registry.shutdown().await;
    }
}
