//! CAP dialogs: lifecycle plus the invokes in flight on each one

mod invoke;
mod state;

pub use invoke::{InvokeOutcome, InvokeTracker, ResolvedInvoke};
pub use state::{DialogState, DialogStateMachine};

use crate::cap::{CapApplicationContext, OperationKind, Repeatability};
use crate::errors::{CapError, Result};
use crate::sccp::{Destination, SccpAddress};
use crate::types::DialogId;
use std::time::Duration;
use tokio::time::Instant;

/// Per-dialog settings taken from configuration
#[derive(Debug, Clone, Copy)]
pub struct DialogSettings {
    pub default_timeout: Duration,
    pub invoke_id_min: i8,
    pub invoke_id_max: i8,
}

/// One CAP dialog
#[derive(Debug)]
pub struct Dialog {
    id: DialogId,
    context: CapApplicationContext,
    /// Where a locally opened dialog goes; None for peer-initiated dialogs
    destination: Option<Destination>,
    remote: Option<SccpAddress>,
    state: DialogStateMachine,
    invokes: InvokeTracker,
    default_timeout: Duration,
    sent_once: Vec<OperationKind>,
    terminated_at: Option<Instant>,
}

impl Dialog {
    fn new(id: DialogId, context: CapApplicationContext, settings: &DialogSettings) -> Self {
        Self {
            id,
            context,
            destination: None,
            remote: None,
            state: DialogStateMachine::new(id),
            invokes: InvokeTracker::with_range(id, settings.invoke_id_min, settings.invoke_id_max),
            default_timeout: settings.default_timeout,
            sent_once: Vec::new(),
            terminated_at: None,
        }
    }

    /// Locally opened dialog, in Establishing
    pub fn outgoing(
        id: DialogId,
        context: CapApplicationContext,
        destination: Destination,
        remote: SccpAddress,
        settings: &DialogSettings,
    ) -> Self {
        let mut dialog = Self::new(id, context, settings);
        dialog.destination = Some(destination);
        dialog.remote = Some(remote);
        dialog.state.open();
        dialog
    }

    /// Peer-initiated dialog, accepted straight into Active
    pub fn incoming(
        id: DialogId,
        context: CapApplicationContext,
        remote: Option<SccpAddress>,
        settings: &DialogSettings,
    ) -> Self {
        let mut dialog = Self::new(id, context, settings);
        dialog.remote = remote;
        dialog.state.accept();
        dialog
    }

    pub fn id(&self) -> DialogId {
        self.id
    }

    pub fn context(&self) -> CapApplicationContext {
        self.context
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn remote(&self) -> Option<&SccpAddress> {
        self.remote.as_ref()
    }

    pub fn state(&self) -> DialogState {
        self.state.state()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn in_flight(&self) -> usize {
        self.invokes.in_flight()
    }

    pub fn terminated_at(&self) -> Option<Instant> {
        self.terminated_at
    }

    pub(crate) fn state_machine(&mut self) -> &mut DialogStateMachine {
        &mut self.state
    }

    pub(crate) fn invokes(&mut self) -> &mut InvokeTracker {
        &mut self.invokes
    }

    /// State and once-per-dialog admission for a new invoke of `kind`
    pub fn check_add(&self, kind: OperationKind) -> Result<()> {
        self.state.check_add(kind)?;
        if kind.repeatability() == Repeatability::OncePerDialog && self.sent_once.contains(&kind) {
            return Err(CapError::StateViolation {
                operation: kind,
                state: self.state(),
                detail: "operation already sent on this dialog",
            });
        }
        Ok(())
    }

    /// Record a successful hand-off to the sublayer
    pub(crate) fn record_sent(&mut self, kind: OperationKind) {
        if kind.repeatability() == Repeatability::OncePerDialog && !self.sent_once.contains(&kind) {
            self.sent_once.push(kind);
        }
        self.state.confirm();
    }

    /// Stamp the termination time once the dialog reaches Terminated
    pub(crate) fn mark_if_terminated(&mut self, now: Instant) -> bool {
        if self.state().is_terminal() && self.terminated_at.is_none() {
            self.terminated_at = Some(now);
            true
        } else {
            false
        }
    }
}
