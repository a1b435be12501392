// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wire codec for the Hamlib `rigctld` text protocol: encodes commands in
//! canonical long form, decodes accumulated response bytes into complete
//! `RawResponse` values, and parses the key/value records each command
//! produces.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::RigError;

/// One command from the minimum wire catalogue a Client must speak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RigctlCommand {
    GetFreq,
    SetFreq(u64),
    GetMode,
    SetMode(String, u32),
    GetVfo,
    SetVfo(String),
    GetPtt,
    SetPtt(bool),
    GetPowerstat,
    GetSplitVfo,
    GetInfo,
    GetLevel(String),
    SetConf(String, String),
    GetConf(String),
    ChkVfo,
    DumpCaps,
    DumpState,
}

impl RigctlCommand {
    /// Canonical long command name, as it appears on the wire and as the
    /// first echoed line of an ERP reply.
    pub fn long_name(&self) -> &'static str {
        match self {
            Self::GetFreq => "get_freq",
            Self::SetFreq(_) => "set_freq",
            Self::GetMode => "get_mode",
            Self::SetMode(_, _) => "set_mode",
            Self::GetVfo => "get_vfo",
            Self::SetVfo(_) => "set_vfo",
            Self::GetPtt => "get_ptt",
            Self::SetPtt(_) => "set_ptt",
            Self::GetPowerstat => "get_powerstat",
            Self::GetSplitVfo => "get_split_vfo",
            Self::GetInfo => "get_info",
            Self::GetLevel(_) => "get_level",
            Self::SetConf(_, _) => "set_conf",
            Self::GetConf(_) => "get_conf",
            Self::ChkVfo => "chk_vfo",
            Self::DumpCaps => "dump_caps",
            Self::DumpState => "dump_state",
        }
    }

    /// Encode this command as a wire line, with a leading `+` when `erp`.
    pub fn encode(&self, erp: bool) -> String {
        let prefix = if erp { "+" } else { "" };
        let body = match self {
            Self::GetFreq => r"\get_freq".to_string(),
            Self::SetFreq(hz) => format!(r"\set_freq {hz}"),
            Self::GetMode => r"\get_mode".to_string(),
            Self::SetMode(mode, passband) => format!(r"\set_mode {mode} {passband}"),
            Self::GetVfo => r"\get_vfo".to_string(),
            Self::SetVfo(vfo) => format!(r"\set_vfo {vfo}"),
            Self::GetPtt => r"\get_ptt".to_string(),
            Self::SetPtt(on) => format!(r"\set_ptt {}", if *on { 1 } else { 0 }),
            Self::GetPowerstat => r"\get_powerstat".to_string(),
            Self::GetSplitVfo => r"\get_split_vfo".to_string(),
            Self::GetInfo => r"\get_info".to_string(),
            Self::GetLevel(name) => format!(r"\get_level {name}"),
            Self::SetConf(token, value) => format!(r"\set_conf {token} {value}"),
            Self::GetConf(token) => format!(r"\get_conf {token}"),
            Self::ChkVfo => r"\chk_vfo".to_string(),
            Self::DumpCaps => r"\dump_caps".to_string(),
            Self::DumpState => r"\dump_state".to_string(),
        };
        format!("{prefix}{body}\n")
    }

    /// Deadline for this command: 5s for the bulky caps/state dumps, 2s otherwise.
    pub fn default_deadline(&self) -> std::time::Duration {
        match self {
            Self::DumpCaps | Self::DumpState => std::time::Duration::from_secs(5),
            _ => std::time::Duration::from_secs(2),
        }
    }

    /// Number of plain-protocol value lines expected when falling back from
    /// ERP after an unsolicited `RPRT -11`.
    pub fn fallback_value_lines(&self) -> usize {
        match self {
            Self::GetFreq => 1,
            Self::GetMode => 2,
            Self::GetVfo => 1,
            Self::GetPtt => 1,
            _ => 0,
        }
    }
}

/// A complete decoded response: the lines preceding `RPRT`, plus the parsed
/// return code. `rprt == 0` is success; negative values are rig errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub lines: Vec<String>,
    pub rprt: i32,
}

impl RawResponse {
    pub fn is_ok(&self) -> bool {
        self.rprt == 0
    }
}

lazy_static! {
    static ref RPRT_LINE: Regex = Regex::new(r"^RPRT (-?\d+)$").unwrap();
    static ref FREQ_LINE: Regex = Regex::new(r"^Frequency:\s*(\d+)$").unwrap();
    static ref MODE_LINE: Regex = Regex::new(r"^Mode:\s*(\S+)$").unwrap();
    static ref PASSBAND_LINE: Regex = Regex::new(r"^Passband:\s*(\d+)$").unwrap();
    static ref VFO_LINE: Regex = Regex::new(r"^VFO:\s*(\S+)$").unwrap();
    static ref PTT_LINE: Regex = Regex::new(r"^PTT:\s*([01])$").unwrap();
    static ref POWERSTAT_LINE: Regex = Regex::new(r"^Power Status:\s*([012])$").unwrap();
    static ref CAN_LINE: Regex = Regex::new(r"^Can (set|get) (Frequency|Mode|VFO|PTT):\s*([YN])$").unwrap();
    static ref MODE_LIST_LINE: Regex = Regex::new(r"^Mode list:\s*(.+)$").unwrap();
}

/// Accumulates bytes off the wire and yields complete responses as they
/// become available. A response is complete once a line matching `RPRT <n>`
/// has been seen; everything before it is the response body.
#[derive(Debug, Default)]
pub struct Decoder {
    buf: Vec<u8>,
    pending: Vec<String>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-read bytes into the decoder.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Try to pull `n` plain lines out of the buffered bytes without
    /// requiring a trailing `RPRT` line. Used for the ERP-fallback path,
    /// where the peer replied in default-protocol form instead.
    pub fn try_decode_plain_lines(&mut self, n: usize) -> Option<Vec<String>> {
        let mut lines = Vec::with_capacity(n);
        let mut pos = 0;
        while lines.len() < n {
            let rel = self.buf[pos..].iter().position(|b| *b == b'\n')?;
            let abs = pos + rel;
            let line = String::from_utf8_lossy(&self.buf[pos..abs])
                .trim_end_matches('\r')
                .to_string();
            lines.push(line);
            pos = abs + 1;
        }
        self.buf.drain(..pos);
        Some(lines)
    }

    /// Try to pull one complete response out of the buffered bytes. May be
    /// called repeatedly after a single `feed` if more than one response
    /// arrived in the same read.
    pub fn try_decode(&mut self) -> Option<RawResponse> {
        loop {
            let newline_at = self.buf.iter().position(|b| *b == b'\n')?;
            let line_bytes: Vec<u8> = self.buf.drain(..=newline_at).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\r', '\n']).to_string();

            if let Some(caps) = RPRT_LINE.captures(&line) {
                let rprt: i32 = caps[1].parse().unwrap_or(-1);
                let lines = std::mem::take(&mut self.pending);
                return Some(RawResponse { lines, rprt });
            }
            self.pending.push(line);
        }
    }
}

/// Parse a `get_freq` response into its frequency in Hz.
pub fn parse_freq(resp: &RawResponse) -> Result<u64, RigError> {
    if !resp.is_ok() {
        return Err(RigError::rig("get_freq", resp.rprt));
    }
    for line in &resp.lines {
        if let Some(c) = FREQ_LINE.captures(line) {
            return c[1]
                .parse()
                .map_err(|_| RigError::protocol("get_freq", "unparseable frequency"));
        }
    }
    Err(RigError::protocol("get_freq", "missing Frequency line"))
}

/// Parse a `get_mode` response into `(mode, passband_hz)`.
pub fn parse_mode(resp: &RawResponse) -> Result<(String, u32), RigError> {
    if !resp.is_ok() {
        return Err(RigError::rig("get_mode", resp.rprt));
    }
    let mode = resp
        .lines
        .iter()
        .find_map(|l| MODE_LINE.captures(l).map(|c| c[1].to_string()))
        .ok_or_else(|| RigError::protocol("get_mode", "missing Mode line"))?;
    let passband = resp
        .lines
        .iter()
        .find_map(|l| PASSBAND_LINE.captures(l).and_then(|c| c[1].parse().ok()))
        .unwrap_or(0);
    Ok((mode, passband))
}

/// Parse a `get_vfo` response into the active VFO name.
pub fn parse_vfo(resp: &RawResponse) -> Result<String, RigError> {
    if !resp.is_ok() {
        return Err(RigError::rig("get_vfo", resp.rprt));
    }
    resp.lines
        .iter()
        .find_map(|l| VFO_LINE.captures(l).map(|c| c[1].to_string()))
        .ok_or_else(|| RigError::protocol("get_vfo", "missing VFO line"))
}

/// Parse a `get_ptt` response into the PTT state.
pub fn parse_ptt(resp: &RawResponse) -> Result<bool, RigError> {
    if !resp.is_ok() {
        return Err(RigError::rig("get_ptt", resp.rprt));
    }
    resp.lines
        .iter()
        .find_map(|l| PTT_LINE.captures(l).map(|c| &c[1] == "1"))
        .ok_or_else(|| RigError::protocol("get_ptt", "missing PTT line"))
}

/// Parse a `get_powerstat` response. `1` = on, `0`/`2` = off/standby.
pub fn parse_powerstat(resp: &RawResponse) -> Result<bool, RigError> {
    if !resp.is_ok() {
        return Err(RigError::rig("get_powerstat", resp.rprt));
    }
    resp.lines
        .iter()
        .find_map(|l| POWERSTAT_LINE.captures(l).map(|c| &c[1] == "1"))
        .ok_or_else(|| RigError::protocol("get_powerstat", "missing Power Status line"))
}

/// Capability flags and supported modes parsed out of a `dump_caps` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCaps {
    pub freq_get: bool,
    pub freq_set: bool,
    pub mode_get: bool,
    pub mode_set: bool,
    pub vfo_get: bool,
    pub vfo_set: bool,
    pub ptt_get: bool,
    pub ptt_set: bool,
    pub modes: Vec<String>,
}

/// Parse `"Can set Frequency" "Y"`-style key/value lines and the mode list
/// out of a `dump_caps` response.
pub fn parse_caps(resp: &RawResponse) -> Result<RawCaps, RigError> {
    if !resp.is_ok() {
        return Err(RigError::rig("dump_caps", resp.rprt));
    }
    let mut caps = RawCaps::default();
    for line in &resp.lines {
        if let Some(c) = CAN_LINE.captures(line) {
            let can = &c[3] == "Y";
            match (&c[1], &c[2]) {
                ("get", "Frequency") => caps.freq_get = can,
                ("set", "Frequency") => caps.freq_set = can,
                ("get", "Mode") => caps.mode_get = can,
                ("set", "Mode") => caps.mode_set = can,
                ("get", "VFO") => caps.vfo_get = can,
                ("set", "VFO") => caps.vfo_set = can,
                ("get", "PTT") => caps.ptt_get = can,
                ("set", "PTT") => caps.ptt_set = can,
                _ => {}
            }
        } else if let Some(c) = MODE_LIST_LINE.captures(line) {
            caps.modes = c[1]
                .split_whitespace()
                .map(|s| s.to_string())
                .collect();
        }
    }
    Ok(caps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_default_form() {
        assert_eq!(RigctlCommand::GetFreq.encode(false), "\\get_freq\n");
        assert_eq!(RigctlCommand::SetFreq(14074000).encode(false), "\\set_freq 14074000\n");
    }

    #[test]
    fn encode_erp_form_adds_prefix() {
        assert_eq!(RigctlCommand::GetFreq.encode(true), "+\\get_freq\n");
        assert_eq!(
            RigctlCommand::SetMode("USB".into(), 2400).encode(true),
            "+\\set_mode USB 2400\n"
        );
    }

    #[test]
    fn decoder_yields_one_response_per_rprt() {
        let mut dec = Decoder::new();
        dec.feed(b"get_freq:\nFrequency: 14074000\nRPRT 0\n");
        let resp = dec.try_decode().expect("response ready");
        assert_eq!(resp.rprt, 0);
        assert_eq!(resp.lines, vec!["get_freq:", "Frequency: 14074000"]);
        assert!(dec.try_decode().is_none());
    }

    #[test]
    fn decoder_handles_partial_reads() {
        let mut dec = Decoder::new();
        dec.feed(b"Frequency: 14");
        assert!(dec.try_decode().is_none());
        dec.feed(b"074000\nRPRT 0\n");
        let resp = dec.try_decode().unwrap();
        assert_eq!(resp.lines, vec!["Frequency: 14074000"]);
    }

    #[test]
    fn decoder_handles_negative_rprt() {
        let mut dec = Decoder::new();
        dec.feed(b"RPRT -11\n");
        let resp = dec.try_decode().unwrap();
        assert_eq!(resp.rprt, -11);
        assert!(resp.lines.is_empty());
        assert!(!resp.is_ok());
    }

    #[test]
    fn decoder_yields_multiple_responses_from_one_feed() {
        let mut dec = Decoder::new();
        dec.feed(b"Frequency: 1\nRPRT 0\nFrequency: 2\nRPRT 0\n");
        let a = dec.try_decode().unwrap();
        let b = dec.try_decode().unwrap();
        assert_eq!(a.lines, vec!["Frequency: 1"]);
        assert_eq!(b.lines, vec!["Frequency: 2"]);
    }

    #[test]
    fn parse_freq_reads_key_value_line() {
        let resp = RawResponse {
            lines: vec!["Frequency: 7100000".to_string()],
            rprt: 0,
        };
        assert_eq!(parse_freq(&resp).unwrap(), 7_100_000);
    }

    #[test]
    fn parse_freq_propagates_rig_error() {
        let resp = RawResponse { lines: vec![], rprt: -11 };
        let err = parse_freq(&resp).unwrap_err();
        assert_eq!(err.rprt, Some(-11));
    }

    #[test]
    fn parse_mode_reads_mode_and_passband() {
        let resp = RawResponse {
            lines: vec!["Mode: USB".to_string(), "Passband: 2400".to_string()],
            rprt: 0,
        };
        assert_eq!(parse_mode(&resp).unwrap(), ("USB".to_string(), 2400));
    }

    #[test]
    fn parse_caps_reads_flags_and_mode_list() {
        let resp = RawResponse {
            lines: vec![
                "Can set Frequency: Y".to_string(),
                "Can get Frequency: Y".to_string(),
                "Can set PTT: N".to_string(),
                "Mode list: USB LSB CW FM".to_string(),
            ],
            rprt: 0,
        };
        let caps = parse_caps(&resp).unwrap();
        assert!(caps.freq_set);
        assert!(caps.freq_get);
        assert!(!caps.ptt_set);
        assert_eq!(caps.modes, vec!["USB", "LSB", "CW", "FM"]);
    }

    #[test]
    fn try_decode_plain_lines_waits_for_enough_lines() {
        let mut dec = Decoder::new();
        dec.feed(b"14074000\n");
        assert!(dec.try_decode_plain_lines(2).is_none());
        dec.feed(b"USB\n");
        let lines = dec.try_decode_plain_lines(2).unwrap();
        assert_eq!(lines, vec!["14074000", "USB"]);
    }

    #[test]
    fn fallback_value_lines_matches_spec_table() {
        assert_eq!(RigctlCommand::GetFreq.fallback_value_lines(), 1);
        assert_eq!(RigctlCommand::GetMode.fallback_value_lines(), 2);
        assert_eq!(RigctlCommand::GetVfo.fallback_value_lines(), 1);
        assert_eq!(RigctlCommand::GetPtt.fallback_value_lines(), 1);
        assert_eq!(RigctlCommand::DumpCaps.fallback_value_lines(), 0);
    }
}
