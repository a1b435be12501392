// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Connection-lifecycle state machine: `Initial -> Connecting -> Connected
//! -> Disconnected -> Connecting ...`, terminal `Closed` on explicit
//! shutdown.

use std::fmt;

/// Events that drive the Connection's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnEvent {
    Connect,
    ConnectOk,
    ConnectFailed,
    IoFailure,
    Shutdown,
}

/// Current lifecycle state of a Connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnState {
    #[default]
    Initial,
    Connecting,
    Connected,
    Disconnected,
    Closed,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initial => "Initial",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Closed => "Closed",
        };
        write!(f, "{s}")
    }
}

/// Explicit lifecycle state machine for one Connection.
#[derive(Debug, Clone, Default)]
pub struct ConnStateMachine {
    state: ConnState,
    transition_count: u64,
}

impl ConnStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Returns `true` if the event caused a transition.
    pub fn process_event(&mut self, event: ConnEvent) -> bool {
        let next = self.next_state(event);
        match next {
            Some(state) => {
                self.state = state;
                self.transition_count += 1;
                true
            }
            None => false,
        }
    }

    fn next_state(&self, event: ConnEvent) -> Option<ConnState> {
        use ConnEvent::*;
        use ConnState::*;
        match (self.state, event) {
            (Closed, _) => None,
            (_, Shutdown) => Some(Closed),
            (Initial, Connect) => Some(Connecting),
            (Connecting, ConnectOk) => Some(Connected),
            (Connecting, ConnectFailed) => Some(Disconnected),
            (Connected, IoFailure) => Some(Disconnected),
            (Disconnected, Connect) => Some(Connecting),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_initial() {
        assert_eq!(ConnStateMachine::new().state(), ConnState::Initial);
    }

    #[test]
    fn full_reconnect_cycle() {
        let mut sm = ConnStateMachine::new();
        assert!(sm.process_event(ConnEvent::Connect));
        assert_eq!(sm.state(), ConnState::Connecting);
        assert!(sm.process_event(ConnEvent::ConnectOk));
        assert_eq!(sm.state(), ConnState::Connected);
        assert!(sm.process_event(ConnEvent::IoFailure));
        assert_eq!(sm.state(), ConnState::Disconnected);
        assert!(sm.process_event(ConnEvent::Connect));
        assert_eq!(sm.state(), ConnState::Connecting);
    }

    #[test]
    fn shutdown_is_terminal() {
        let mut sm = ConnStateMachine::new();
        sm.process_event(ConnEvent::Shutdown);
        assert_eq!(sm.state(), ConnState::Closed);
        assert!(!sm.process_event(ConnEvent::Connect));
        assert_eq!(sm.state(), ConnState::Closed);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut sm = ConnStateMachine::new();
        assert!(!sm.process_event(ConnEvent::ConnectOk));
        assert_eq!(sm.state(), ConnState::Initial);
    }
}
