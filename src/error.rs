// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The rig error taxonomy: one enum, one `kind`, shared by every layer from
//! the wire codec up to the listener.

use std::fmt;

/// Broad category of a rig-facing failure. Drives retry/reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigErrorKind {
    /// Socket read/write failure, connect refused, EOF mid-response.
    Io,
    /// Malformed or missing `RPRT`, unparseable value line.
    Protocol,
    /// `RPRT` negative code returned by the rig.
    Rig,
    /// Client-side band policy rejection. No network traffic emitted.
    Band,
    /// Deadline exceeded for an in-flight command.
    Timeout,
    /// Command queue full; operation returned without being queued.
    Busy,
}

/// A single rig-facing error: a kind plus the command it occurred on and a
/// human-readable message.
#[derive(Debug, Clone)]
pub struct RigError {
    pub kind: RigErrorKind,
    pub command: Option<String>,
    pub message: String,
    /// Hamlib RPRT code, when the kind is `Rig`.
    pub rprt: Option<i32>,
}

impl RigError {
    pub fn io(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: RigErrorKind::Io,
            command: Some(command.into()),
            message: message.into(),
            rprt: None,
        }
    }

    pub fn protocol(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: RigErrorKind::Protocol,
            command: Some(command.into()),
            message: message.into(),
            rprt: None,
        }
    }

    pub fn rig(command: impl Into<String>, rprt: i32) -> Self {
        Self {
            kind: RigErrorKind::Rig,
            command: Some(command.into()),
            message: hamlib_rprt_message(rprt),
            rprt: Some(rprt),
        }
    }

    pub fn band(message: impl Into<String>) -> Self {
        Self {
            kind: RigErrorKind::Band,
            command: None,
            message: message.into(),
            rprt: None,
        }
    }

    pub fn timeout(command: impl Into<String>) -> Self {
        Self {
            kind: RigErrorKind::Timeout,
            command: Some(command.into()),
            message: "deadline exceeded".to_string(),
            rprt: None,
        }
    }

    pub fn busy() -> Self {
        Self {
            kind: RigErrorKind::Busy,
            command: None,
            message: "command queue full".to_string(),
            rprt: None,
        }
    }

    /// Errors a retry policy is allowed to retry: transient I/O, timeouts and
    /// a full queue. Protocol/rig/band failures are outcomes, not glitches.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            RigErrorKind::Io | RigErrorKind::Timeout | RigErrorKind::Busy
        )
    }
}

impl fmt::Display for RigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.command {
            Some(cmd) => write!(f, "{}: {} ({:?})", cmd, self.message, self.kind),
            None => write!(f, "{} ({:?})", self.message, self.kind),
        }
    }
}

impl std::error::Error for RigError {}

/// Map a Hamlib `RPRT` code to a stable short string. Unknown codes still get
/// a generic "rig error -N" rather than failing to format.
pub fn hamlib_rprt_message(rprt: i32) -> String {
    match rprt {
        0 => "success".to_string(),
        -1 => "-1 Invalid parameter".to_string(),
        -2 => "-2 Invalid configuration".to_string(),
        -3 => "-3 Memory shortage".to_string(),
        -4 => "-4 Feature not implemented".to_string(),
        -5 => "-5 Communication timed out".to_string(),
        -6 => "-6 IO error".to_string(),
        -7 => "-7 Internal Hamlib error".to_string(),
        -8 => "-8 Protocol error".to_string(),
        -9 => "-9 Command rejected by the rig".to_string(),
        -10 => "-10 Command performed, but arg truncated".to_string(),
        -11 => "-11 Feature Not Available".to_string(),
        -12 => "-12 Target not VFO".to_string(),
        -13 => "-13 Error talking to the rig".to_string(),
        -14 => "-14 Function deprecated".to_string(),
        -15 => "-15 Security error".to_string(),
        -16 => "-16 Rig is not powered on".to_string(),
        -17 => "-17 Limit exceeded".to_string(),
        other => format!("{other} rig error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        assert!(RigError::io("get_freq", "eof").is_transient());
        assert!(RigError::timeout("get_freq").is_transient());
        assert!(RigError::busy().is_transient());
    }

    #[test]
    fn non_transient_kinds() {
        assert!(!RigError::rig("get_freq", -11).is_transient());
        assert!(!RigError::band("out of range").is_transient());
        assert!(!RigError::protocol("get_freq", "bad line").is_transient());
    }

    #[test]
    fn rig_error_carries_stable_message() {
        let e = RigError::rig("get_freq", -11);
        assert_eq!(e.message, "-11 Feature Not Available");
        assert_eq!(e.rprt, Some(-11));
    }

    #[test]
    fn unknown_rprt_code_still_formats() {
        assert_eq!(hamlib_rprt_message(-999), "-999 rig error");
    }
}
