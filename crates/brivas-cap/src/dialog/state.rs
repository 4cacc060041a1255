//! Dialog lifecycle

use crate::cap::OperationKind;
use crate::errors::{CapError, Result};
use crate::types::DialogId;
use tracing::debug;

/// Dialog state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogState {
    Idle,
    Establishing,
    Active,
    Terminating,
    Terminated,
}

impl DialogState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Lifecycle of one dialog. Every transition not listed here is rejected or
/// ignored; Terminated is absorbing.
#[derive(Debug)]
pub struct DialogStateMachine {
    dialog: DialogId,
    state: DialogState,
}

impl DialogStateMachine {
    pub fn new(dialog: DialogId) -> Self {
        Self {
            dialog,
            state: DialogState::Idle,
        }
    }

    pub fn state(&self) -> DialogState {
        self.state
    }

    fn transition(&mut self, to: DialogState) {
        if self.state != to {
            debug!(dialog = %self.dialog, from = ?self.state, ?to, "Dialog state change");
            self.state = to;
        }
    }

    /// Idle -> Establishing on a local open
    pub fn open(&mut self) -> bool {
        if self.state == DialogState::Idle {
            self.transition(DialogState::Establishing);
            true
        } else {
            false
        }
    }

    /// Idle -> Active for a dialog opened by the peer
    pub fn accept(&mut self) -> bool {
        if self.state == DialogState::Idle {
            self.transition(DialogState::Active);
            true
        } else {
            false
        }
    }

    /// Establishing -> Active on the first successful send or the peer's continue
    pub fn confirm(&mut self) {
        if self.state == DialogState::Establishing {
            self.transition(DialogState::Active);
        }
    }

    /// Whether an operation of `kind` may be added in the current state
    pub fn check_add(&self, kind: OperationKind) -> Result<()> {
        let detail = match self.state {
            DialogState::Active => return Ok(()),
            DialogState::Establishing if kind.may_establish() => return Ok(()),
            DialogState::Establishing => "dialog is not yet established",
            DialogState::Idle => "dialog is not open",
            DialogState::Terminating => "dialog is closing",
            DialogState::Terminated => "dialog is terminated",
        };
        Err(CapError::StateViolation {
            operation: kind,
            state: self.state,
            detail,
        })
    }

    /// Local close request. Returns false when already closing or closed.
    pub fn begin_close(&mut self) -> bool {
        match self.state {
            DialogState::Terminating | DialogState::Terminated => false,
            DialogState::Idle => {
                self.transition(DialogState::Terminated);
                true
            }
            DialogState::Establishing | DialogState::Active => {
                self.transition(DialogState::Terminating);
                true
            }
        }
    }

    /// Peer ended the dialog; waits for outstanding invokes to drain
    pub fn peer_end(&mut self, in_flight: usize) {
        if self.state.is_terminal() {
            return;
        }
        if in_flight == 0 {
            self.transition(DialogState::Terminated);
        } else {
            self.transition(DialogState::Terminating);
        }
    }

    pub fn peer_abort(&mut self) {
        self.transition(DialogState::Terminated);
    }

    pub fn transport_failure(&mut self) {
        self.transition(DialogState::Terminated);
    }

    /// Terminating -> Terminated once nothing is in flight.
    /// Returns true when this call completed the termination.
    pub fn on_drained(&mut self, in_flight: usize) -> bool {
        if self.state == DialogState::Terminating && in_flight == 0 {
            self.transition(DialogState::Terminated);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> DialogStateMachine {
        DialogStateMachine::new(DialogId(1))
    }

    #[test]
    fn test_local_open_and_confirm() {
        let mut sm = machine();
        assert!(sm.check_add(OperationKind::InitialDp).is_err());
        assert!(sm.open());
        assert!(!sm.open());
        assert_eq!(sm.state(), DialogState::Establishing);

        assert!(sm.check_add(OperationKind::InitialDp).is_ok());
        assert!(matches!(
            sm.check_add(OperationKind::ApplyChargingReport),
            Err(CapError::StateViolation {
                state: DialogState::Establishing,
                ..
            })
        ));

        sm.confirm();
        assert_eq!(sm.state(), DialogState::Active);
        assert!(sm.check_add(OperationKind::ApplyChargingReport).is_ok());
    }

    #[test]
    fn test_close_drains_before_terminating() {
        let mut sm = machine();
        sm.accept();
        assert!(sm.begin_close());
        assert_eq!(sm.state(), DialogState::Terminating);
        assert!(!sm.on_drained(1));
        assert!(sm.on_drained(0));
        assert_eq!(sm.state(), DialogState::Terminated);
        assert!(!sm.begin_close());
    }

    #[test]
    fn test_peer_end_with_outstanding_invokes() {
        let mut sm = machine();
        sm.accept();
        sm.peer_end(2);
        assert_eq!(sm.state(), DialogState::Terminating);
        sm.peer_end(0);
        assert_eq!(sm.state(), DialogState::Terminated);
    }

    #[test]
    fn test_terminated_is_absorbing() {
        let mut sm = machine();
        sm.open();
        sm.transport_failure();
        sm.confirm();
        sm.peer_end(0);
        assert!(!sm.accept());
        assert_eq!(sm.state(), DialogState::Terminated);
        for kind in OperationKind::ALL {
            assert!(matches!(
                sm.check_add(kind),
                Err(CapError::StateViolation { .. })
            ));
        }
    }
}
