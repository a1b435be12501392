// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Component B: owns one outbound connection and serializes command
//! execution against it. Exactly one command is in flight at a time;
//! additional submissions queue behind a bounded channel.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot, watch};

use crate::codec::{Decoder, RawResponse, RigctlCommand};
use crate::error::RigError;
use crate::rig::machine::{ConnEvent, ConnState, ConnStateMachine};
use crate::rig::policies::{ExponentialBackoff, RetryPolicy};
use crate::rig::transport::Transport;
use crate::rig::{DebugEvent, DebugEventKind, DebugRing, RigAccess};

/// Command queues are bounded; enqueue beyond this returns `busy` without
/// blocking the caller.
pub const QUEUE_CAPACITY: usize = 64;

struct Submission {
    cmd: RigctlCommand,
    erp: bool,
    deadline: Duration,
    respond_to: oneshot::Sender<Result<RawResponse, RigError>>,
}

/// Handle used by a Client to talk to its Connection's dispatch task.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Submission>,
    state_rx: watch::Receiver<ConnState>,
    debug_ring: Arc<Mutex<DebugRing>>,
}

impl ConnectionHandle {
    /// Submit a command and await its response, honoring `deadline`.
    /// Returns `busy` immediately if the queue is full.
    pub async fn submit(
        &self,
        cmd: RigctlCommand,
        erp: bool,
    ) -> Result<RawResponse, RigError> {
        let deadline = cmd.default_deadline();
        let (tx, rx) = oneshot::channel();
        let submission = Submission {
            cmd,
            erp,
            deadline,
            respond_to: tx,
        };
        self.tx
            .try_send(submission)
            .map_err(|_| RigError::busy())?;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(RigError::io("submit", "connection task gone")),
        }
    }

    /// Current lifecycle state, observed without blocking.
    pub fn health(&self) -> ConnState {
        *self.state_rx.borrow()
    }

    pub fn debug_events(&self) -> Vec<DebugEvent> {
        self.debug_ring.lock().expect("debug ring lock poisoned").snapshot()
    }
}

/// Spawn the Connection's dispatch task and return a handle to it plus the
/// task's join handle (for the Registry's shutdown accounting).
pub fn spawn_connection(
    access: RigAccess,
    mut shutdown: watch::Receiver<bool>,
) -> (ConnectionHandle, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Submission>(QUEUE_CAPACITY);
    let (state_tx, state_rx) = watch::channel(ConnState::Initial);
    let debug_ring = Arc::new(Mutex::new(DebugRing::default()));
    let ring_for_task = debug_ring.clone();

    let handle = tokio::spawn(async move {
        let mut transport = crate::rig::transport::transport_for(&access);
        let mut machine = ConnStateMachine::new();
        let mut decoder = Decoder::new();
        let backoff = ExponentialBackoff::default_reconnect();
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        machine.process_event(ConnEvent::Shutdown);
                        let _ = state_tx.send(machine.state());
                        transport.close();
                        break;
                    }
                }
                maybe_submission = rx.recv() => {
                    let Some(submission) = maybe_submission else { break; };
                    if machine.state() != ConnState::Connected {
                        match ensure_connected(
                            &mut *transport,
                            &mut machine,
                            &backoff,
                            &mut attempt,
                        )
                        .await
                        {
                            Ok(()) => {
                                let _ = state_tx.send(machine.state());
                                decoder = Decoder::new();
                            }
                            Err(e) => {
                                let _ = state_tx.send(machine.state());
                                let _ = submission.respond_to.send(Err(e));
                                continue;
                            }
                        }
                    }

                    record(&ring_for_task, DebugEventKind::Tx, submission.cmd.long_name(), &submission.cmd.encode(submission.erp));
                    let result = execute(
                        &mut *transport,
                        &mut decoder,
                        &submission.cmd,
                        submission.erp,
                        submission.deadline,
                    )
                    .await;
                    match &result {
                        Ok(resp) => record(
                            &ring_for_task,
                            DebugEventKind::Rx,
                            submission.cmd.long_name(),
                            &format!("{:?} RPRT {}", resp.lines, resp.rprt),
                        ),
                        Err(e) if e.kind == crate::error::RigErrorKind::Io => {
                            record(&ring_for_task, DebugEventKind::Rx, submission.cmd.long_name(), &e.to_string());
                            machine.process_event(ConnEvent::IoFailure);
                            let _ = state_tx.send(machine.state());
                            attempt = 0;
                        }
                        Err(e) => record(&ring_for_task, DebugEventKind::Rx, submission.cmd.long_name(), &e.to_string()),
                    }
                    let _ = submission.respond_to.send(result);
                }
            }
        }
    });

    (
        ConnectionHandle {
            tx,
            state_rx,
            debug_ring,
        },
        handle,
    )
}

async fn ensure_connected(
    transport: &mut dyn Transport,
    machine: &mut ConnStateMachine,
    backoff: &ExponentialBackoff,
    attempt: &mut u32,
) -> Result<(), RigError> {
    if machine.state() == ConnState::Initial || machine.state() == ConnState::Disconnected {
        machine.process_event(ConnEvent::Connect);
    }
    if *attempt > 0 {
        tokio::time::sleep(backoff.delay(*attempt - 1)).await;
    }
    match transport.reconnect().await {
        Ok(()) => {
            machine.process_event(ConnEvent::ConnectOk);
            *attempt = 0;
            Ok(())
        }
        Err(e) => {
            machine.process_event(ConnEvent::ConnectFailed);
            *attempt += 1;
            Err(e)
        }
    }
}

async fn execute(
    transport: &mut dyn Transport,
    decoder: &mut Decoder,
    cmd: &RigctlCommand,
    erp: bool,
    deadline: Duration,
) -> Result<RawResponse, RigError> {
    let frame = cmd.encode(erp);
    let attempt = async {
        transport.write_frame(frame.as_bytes()).await?;
        read_one(transport, decoder).await
    };
    match tokio::time::timeout(deadline, attempt).await {
        Ok(Ok(resp)) => erp_fallback_if_needed(transport, decoder, cmd, erp, resp).await,
        Ok(Err(e)) => Err(e),
        Err(_) => Err(RigError::timeout(cmd.long_name())),
    }
}

async fn read_one(
    transport: &mut dyn Transport,
    decoder: &mut Decoder,
) -> Result<RawResponse, RigError> {
    loop {
        if let Some(resp) = decoder.try_decode() {
            return Ok(resp);
        }
        let mut buf = [0u8; 4096];
        let n = transport.read_bytes(&mut buf).await?;
        decoder.feed(&buf[..n]);
    }
}

/// If an ERP request got an immediate, bodiless `RPRT -11`, the peer likely
/// doesn't support ERP; retry once in default-protocol form and read the
/// N value lines the command is known to produce.
async fn erp_fallback_if_needed(
    transport: &mut dyn Transport,
    decoder: &mut Decoder,
    cmd: &RigctlCommand,
    erp: bool,
    resp: RawResponse,
) -> Result<RawResponse, RigError> {
    let n = cmd.fallback_value_lines();
    if !erp || resp.rprt != -11 || !resp.lines.is_empty() || n == 0 {
        return Ok(resp);
    }
    transport.write_frame(cmd.encode(false).as_bytes()).await?;
    loop {
        if let Some(lines) = decoder.try_decode_plain_lines(n) {
            return Ok(RawResponse { lines, rprt: 0 });
        }
        let mut buf = [0u8; 4096];
        let n_read = transport.read_bytes(&mut buf).await?;
        decoder.feed(&buf[..n_read]);
    }
}

fn record(ring: &Arc<Mutex<DebugRing>>, kind: DebugEventKind, semantic: &str, payload: &str) {
    let ts_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    ring.lock().expect("debug ring lock poisoned").push(DebugEvent {
        ts_millis,
        kind,
        semantic: semantic.to_string(),
        payload: payload.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_connection_reports_initial_health() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let access = RigAccess::Tcp {
            host: "127.0.0.1".into(),
            port: 1, // nothing listens; connection attempts will fail, which is fine here
        };
        let (handle, task) = spawn_connection(access, shutdown_rx);
        // health starts Initial before any submission forces a connect attempt
        assert_eq!(handle.health(), ConnState::Initial);
        task.abort();
    }

    #[tokio::test]
    async fn queue_capacity_is_bounded() {
        assert_eq!(QUEUE_CAPACITY, 64);
    }
}
