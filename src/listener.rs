// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Component E: a TCP server speaking the rigctl wire protocol to external
//! clients (digital-mode software, `rigctl` itself). Set commands fan out
//! to every enabled rig; get commands read only the main rig's snapshot.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::rig::client::Client;
use crate::rig::RigSnapshot;

pub async fn run(
    addr: String,
    clients: Vec<Client>,
    main_index: usize,
    rigctl_to_main_enabled: bool,
    all_rigs_enabled: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "rigctl listener bound");

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("rigctl listener shutting down");
                    return Ok(());
                }
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let clients = clients.clone();
                let all_rigs_enabled = all_rigs_enabled.clone();
                let mut conn_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        result = handle_client(stream, clients, main_index, rigctl_to_main_enabled, all_rigs_enabled) => {
                            if let Err(e) = result {
                                warn!(%peer, %e, "rigctl client error");
                            }
                        }
                        _ = wait_for_true(&mut conn_shutdown) => {}
                    }
                });
            }
        }
    }
}

async fn wait_for_true(shutdown: &mut watch::Receiver<bool>) {
    while shutdown.changed().await.is_ok() {
        if *shutdown.borrow() {
            return;
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    clients: Vec<Client>,
    main_index: usize,
    rigctl_to_main_enabled: bool,
    all_rigs_enabled: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            debug!("rigctl client disconnected");
            return Ok(());
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            continue;
        }

        let all_rigs_enabled_val = *all_rigs_enabled.borrow();
        let reply = dispatch(
            trimmed,
            &clients,
            main_index,
            rigctl_to_main_enabled,
            all_rigs_enabled_val,
        )
        .await;
        writer.write_all(reply.as_bytes()).await?;
        writer.flush().await?;
    }
}

async fn dispatch(
    line: &str,
    clients: &[Client],
    main_index: usize,
    rigctl_to_main_enabled: bool,
    all_rigs_enabled: bool,
) -> String {
    let mut parts = line.split_whitespace();
    let Some(raw_op) = parts.next() else {
        return "RPRT -1\n".to_string();
    };
    let erp = raw_op.starts_with('+');
    let op = raw_op.trim_start_matches('+');
    let args: Vec<&str> = parts.collect();
    let main = clients.get(main_index);

    match op {
        "F" | "\\set_freq" => {
            let Some(hz) = args.first().and_then(|s| s.parse::<u64>().ok()) else {
                return ok_only(-1, erp, "set_freq");
            };
            if !rigctl_to_main_enabled {
                return ok_only(0, erp, "set_freq");
            }
            let rprt = fan_out_set(clients, all_rigs_enabled, move |c| {
                Box::pin(async move { c.set_frequency(hz).await })
            })
            .await;
            ok_only(rprt, erp, "set_freq")
        }
        "f" | "\\get_freq" => match main {
            Some(c) => ok_response(
                erp,
                "get_freq",
                &[("Frequency", c.snapshot().frequency_hz.to_string())],
            ),
            None => "RPRT -6\n".to_string(),
        },
        "M" | "\\set_mode" => {
            let Some(mode) = args.first() else {
                return ok_only(-1, erp, "set_mode");
            };
            let passband: u32 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
            if !rigctl_to_main_enabled {
                return ok_only(0, erp, "set_mode");
            }
            let mode = mode.to_string();
            let rprt = fan_out_set(clients, all_rigs_enabled, move |c| {
                let mode = mode.clone();
                Box::pin(async move { c.set_mode(mode, passband).await })
            })
            .await;
            ok_only(rprt, erp, "set_mode")
        }
        "m" | "\\get_mode" => match main {
            Some(c) => {
                let snap = c.snapshot();
                let mode = snap.mode.unwrap_or_else(|| "?".to_string());
                let passband = snap.passband_hz.unwrap_or(0);
                ok_response(
                    erp,
                    "get_mode",
                    &[("Mode", mode), ("Passband", passband.to_string())],
                )
            }
            None => "RPRT -6\n".to_string(),
        },
        "V" | "\\set_vfo" => {
            let Some(vfo) = args.first() else {
                return ok_only(-1, erp, "set_vfo");
            };
            if !rigctl_to_main_enabled {
                return ok_only(0, erp, "set_vfo");
            }
            let vfo = vfo.to_string();
            let rprt = fan_out_set(clients, all_rigs_enabled, move |c| {
                let vfo = vfo.clone();
                Box::pin(async move { c.set_vfo(vfo).await })
            })
            .await;
            ok_only(rprt, erp, "set_vfo")
        }
        "v" | "\\get_vfo" => match main {
            Some(c) => ok_response(
                erp,
                "get_vfo",
                &[("VFO", c.snapshot().vfo.unwrap_or_else(|| "VFOA".to_string()))],
            ),
            None => "RPRT -6\n".to_string(),
        },
        "T" | "\\set_ptt" => {
            let Some(token) = args.first() else {
                return ok_only(-1, erp, "set_ptt");
            };
            let Some(on) = parse_bool_token(token) else {
                return ok_only(-1, erp, "set_ptt");
            };
            if !rigctl_to_main_enabled {
                return ok_only(0, erp, "set_ptt");
            }
            let rprt = fan_out_set(clients, all_rigs_enabled, move |c| {
                Box::pin(async move { c.set_ptt(on).await })
            })
            .await;
            ok_only(rprt, erp, "set_ptt")
        }
        "t" | "\\get_ptt" => match main {
            Some(c) => ok_response(
                erp,
                "get_ptt",
                &[("PTT", if c.snapshot().ptt { "1" } else { "0" }.to_string())],
            ),
            None => "RPRT -6\n".to_string(),
        },
        "\\chk_vfo" => match main {
            Some(c) => {
                let dual = c
                    .snapshot()
                    .caps
                    .map(|caps| caps.dual_vfo)
                    .unwrap_or(false);
                ok_raw_lines(erp, "chk_vfo", &[if dual { "1" } else { "0" }.to_string()])
            }
            None => "RPRT -6\n".to_string(),
        },
        "\\dump_caps" => match main {
            Some(c) => ok_raw_lines(erp, "dump_caps", &dump_caps_lines(&c.snapshot())),
            None => "RPRT -6\n".to_string(),
        },
        "\\dump_state" => match main {
            Some(c) => ok_raw_lines(erp, "dump_state", &dump_state_lines(&c.snapshot())),
            None => "RPRT -6\n".to_string(),
        },
        _ => {
            warn!(command = %line, "rigctl listener: unsupported command");
            "RPRT -11\n".to_string()
        }
    }
}

/// Dispatch `op` against every enabled rig concurrently, serialized per rig
/// (each Client is already FIFO internally). `all_rigs_enabled` is the
/// master gate: when false, no rig is addressed regardless of its own
/// `enabled` flag. Returns `0` only if every invocation succeeded (or there
/// was nothing to fan out to); otherwise the first negative RPRT code
/// observed.
async fn fan_out_set<F>(clients: &[Client], all_rigs_enabled: bool, op: F) -> i32
where
    F: Fn(Client) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), crate::error::RigError>> + Send>>,
{
    if !all_rigs_enabled {
        return 0;
    }
    let enabled: Vec<Client> = clients.iter().filter(|c| c.snapshot().enabled).cloned().collect();
    let futures: Vec<_> = enabled.into_iter().map(op).collect();
    let results = futures_util::future::join_all(futures).await;
    for result in results {
        if let Err(e) = result {
            return e.rprt.unwrap_or(-1);
        }
    }
    0
}

fn ok_only(rprt: i32, erp: bool, op: &str) -> String {
    if erp {
        format!("{op}:\nRPRT {rprt}\n")
    } else {
        format!("RPRT {rprt}\n")
    }
}

/// Build a get-command reply: in ERP form, echo the long command name
/// followed by `Key: Value` data lines and a terminal `RPRT 0`; in default
/// form, just the bare values with no key prefix or RPRT line (matching
/// real `rigctld`'s default-protocol get replies).
fn ok_response(erp: bool, long_name: &str, items: &[(&str, String)]) -> String {
    if erp {
        let mut resp = format!("{long_name}:\n");
        for (key, value) in items {
            resp.push_str(key);
            resp.push_str(": ");
            resp.push_str(value);
            resp.push('\n');
        }
        resp.push_str("RPRT 0\n");
        resp
    } else {
        let mut resp = String::new();
        for (_, value) in items {
            resp.push_str(value);
            resp.push('\n');
        }
        resp
    }
}

/// Like `ok_response`, but for commands (`chk_vfo`, `dump_caps`,
/// `dump_state`) whose lines are already fully formatted and carry no
/// separate key to prefix.
fn ok_raw_lines(erp: bool, long_name: &str, lines: &[String]) -> String {
    if erp {
        let mut resp = format!("{long_name}:\n");
        for line in lines {
            resp.push_str(line);
            resp.push('\n');
        }
        resp.push_str("RPRT 0\n");
        resp
    } else {
        let mut resp = String::new();
        for line in lines {
            resp.push_str(line);
            resp.push('\n');
        }
        resp
    }
}

fn parse_bool_token(s: &str) -> Option<bool> {
    match s {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn dump_caps_lines(snap: &RigSnapshot) -> Vec<String> {
    let caps = snap.caps.clone().unwrap_or_default();
    vec![
        format!("Can set Frequency: {}", yn(caps.freq_set)),
        format!("Can get Frequency: {}", yn(caps.freq_get)),
        format!("Can set Mode: {}", yn(caps.mode_set)),
        format!("Can get Mode: {}", yn(caps.mode_get)),
        format!("Can set VFO: {}", yn(caps.vfo_set)),
        format!("Can get VFO: {}", yn(caps.vfo_get)),
        format!("Can set PTT: {}", yn(caps.ptt_set)),
        format!("Can get PTT: {}", yn(caps.ptt_get)),
        format!("Mode list: {}", snap.modes.join(" ")),
    ]
}

fn yn(b: bool) -> &'static str {
    if b {
        "Y"
    } else {
        "N"
    }
}

/// A synthesized `dump_state` block. Real rigctld emits a long fixed
/// sequence describing frequency ranges and mode filter widths; we mirror
/// just enough of it (current frequency, mode, PTT capability) for clients
/// that parse only the leading fields.
fn dump_state_lines(snap: &RigSnapshot) -> Vec<String> {
    let ptt_mask = if snap.caps.as_ref().map(|c| c.ptt_set).unwrap_or(false) {
        "0xffffffffffffffff"
    } else {
        "0x0"
    };
    vec![
        "1".to_string(),
        "1".to_string(),
        "0".to_string(),
        format!("{} {}", snap.frequency_hz, ptt_mask),
        "done".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_only_erp_form_echoes_op() {
        assert_eq!(ok_only(0, true, "\\set_freq"), "\\set_freq:\nRPRT 0\n");
    }

    #[test]
    fn ok_only_default_form_is_bare_rprt() {
        assert_eq!(ok_only(0, false, "F"), "RPRT 0\n");
    }

    #[test]
    fn ok_response_erp_form_matches_spec_example() {
        let resp = ok_response(true, "get_freq", &[("Frequency", "14074000".to_string())]);
        assert_eq!(resp, "get_freq:\nFrequency: 14074000\nRPRT 0\n");
    }

    #[test]
    fn ok_response_default_form_omits_key_and_echo() {
        let resp = ok_response(false, "get_freq", &[("Frequency", "14074000".to_string())]);
        assert_eq!(resp, "14074000\n");
    }

    #[test]
    fn parse_bool_token_rejects_other_tokens() {
        assert_eq!(parse_bool_token("1"), Some(true));
        assert_eq!(parse_bool_token("0"), Some(false));
        assert_eq!(parse_bool_token("on"), None);
    }

    #[test]
    fn dump_caps_lines_report_unknown_caps_as_n() {
        let snap = RigSnapshot::default();
        let lines = dump_caps_lines(&snap);
        assert!(lines.iter().all(|l| l.ends_with(": N") || l.starts_with("Mode list")));
    }
}
