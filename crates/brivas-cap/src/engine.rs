//! CAP dialog engine
//!
//! Admits operations onto dialogs (validate, check state, resolve registry
//! references, allocate an invoke id, hand the descriptor to the transaction
//! sublayer) and turns sublayer callbacks and timer expiry into
//! [`DialogEvent`]s.

use crate::cap::{
    ApplyChargingReportRequest, ApplyChargingRequest, CallInformationReportRequest,
    CallInformationRequestRequest, CapApplicationContext, ConnectRequest, InitialDpRequest,
    Operation, OperationDescriptor, OperationKind, Validate,
};
use crate::config::CapConfig;
use crate::dialog::{Dialog, DialogSettings, DialogState, InvokeOutcome, ResolvedInvoke};
use crate::errors::{CapError, Result, TransportError};
use crate::sccp::{Destination, ResourceLookup, SccpAddress};
use crate::tcap::{AbortCause, TransactionSublayer, TransactionUser};
use crate::types::{CloseMode, DialogId, InvokeId, ServiceRole};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Why a dialog reached Terminated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseReason {
    LocalClose(CloseMode),
    PeerEnd,
    PeerAbort(AbortCause),
    TransportFailure(TransportError),
}

/// Asynchronous notifications from the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogEvent {
    /// One of our invokes reached its final outcome
    InvokeResolved {
        dialog: DialogId,
        invoke: InvokeId,
        kind: OperationKind,
        outcome: InvokeOutcome,
    },
    /// Peer opened a dialog and it was accepted
    IncomingDialog {
        dialog: DialogId,
        origin: SccpAddress,
        context: CapApplicationContext,
    },
    /// Peer invoked an operation
    IncomingInvoke {
        dialog: DialogId,
        invoke: InvokeId,
        operation_code: i32,
        parameter: Option<Bytes>,
    },
    DialogReleased {
        dialog: DialogId,
        reason: ReleaseReason,
    },
}

impl DialogEvent {
    pub fn dialog(&self) -> DialogId {
        match self {
            Self::InvokeResolved { dialog, .. }
            | Self::IncomingDialog { dialog, .. }
            | Self::IncomingInvoke { dialog, .. }
            | Self::DialogReleased { dialog, .. } => *dialog,
        }
    }

    /// Error view of timeout and abort notifications
    pub fn error(&self) -> Option<CapError> {
        match self {
            Self::InvokeResolved {
                dialog,
                invoke,
                outcome: InvokeOutcome::TimedOut,
                ..
            } => Some(CapError::InvokeTimeout {
                dialog: *dialog,
                invoke: *invoke,
            }),
            Self::DialogReleased {
                reason: ReleaseReason::PeerAbort(cause),
                ..
            } => Some(CapError::PeerAbort(cause.clone())),
            Self::DialogReleased {
                reason: ReleaseReason::TransportFailure(e),
                ..
            } => Some(CapError::TransportFailure(e.clone())),
            _ => None,
        }
    }
}

type DialogHandle = Arc<Mutex<Dialog>>;

/// CAP dialog engine
pub struct DialogEngine {
    role: ServiceRole,
    context: CapApplicationContext,
    settings: DialogSettings,
    retain_terminated: Duration,
    sublayer: Arc<dyn TransactionSublayer>,
    resources: Arc<dyn ResourceLookup>,
    dialogs: DashMap<DialogId, DialogHandle>,
    events: mpsc::UnboundedSender<DialogEvent>,
}

impl DialogEngine {
    /// Create the engine, bind it to `sublayer` and return the event stream
    pub fn new(
        config: &CapConfig,
        sublayer: Arc<dyn TransactionSublayer>,
        resources: Arc<dyn ResourceLookup>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<DialogEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            role: config.role,
            context: config.application_context,
            settings: config.dialog_settings(),
            retain_terminated: config.retain_terminated(),
            sublayer,
            resources,
            dialogs: DashMap::new(),
            events: tx,
        });

        let weak = Arc::downgrade(&engine);
        let user: Weak<dyn TransactionUser> = weak;
        engine.sublayer.bind(user);
        info!(role = ?engine.role, context = ?engine.context, "CAP dialog engine created");
        (engine, rx)
    }

    pub fn role(&self) -> ServiceRole {
        self.role
    }

    fn handle(&self, dialog: DialogId) -> Result<DialogHandle> {
        self.dialogs
            .get(&dialog)
            .map(|d| Arc::clone(d.value()))
            .ok_or(CapError::UnknownDialog(dialog))
    }

    fn emit(&self, event: DialogEvent) {
        if self.events.send(event).is_err() {
            debug!("Dialog event receiver dropped");
        }
    }

    fn emit_resolved(&self, dialog: DialogId, resolved: ResolvedInvoke) {
        metrics::counter!("brivas_cap_invokes_resolved_total", "outcome" => resolved.outcome.label())
            .increment(1);
        self.emit(DialogEvent::InvokeResolved {
            dialog,
            invoke: resolved.invoke_id,
            kind: resolved.kind,
            outcome: resolved.outcome,
        });
    }

    fn emit_released(&self, dialog: &mut Dialog, reason: ReleaseReason) {
        if dialog.mark_if_terminated(Instant::now()) {
            metrics::counter!("brivas_cap_dialogs_terminated_total").increment(1);
            metrics::gauge!("brivas_cap_dialogs_active").decrement(1.0);
            info!(dialog = %dialog.id(), ?reason, "Dialog terminated");
            self.emit(DialogEvent::DialogReleased {
                dialog: dialog.id(),
                reason,
            });
        }
    }

    /// Open a dialog with the configured application context
    pub async fn open_dialog(&self, destination: impl Into<Destination>) -> Result<DialogId> {
        self.open_dialog_with_context(destination.into(), self.context).await
    }

    /// Open a dialog towards `destination`; the dialog starts in Establishing
    #[instrument(skip(self))]
    pub async fn open_dialog_with_context(
        &self,
        destination: Destination,
        context: CapApplicationContext,
    ) -> Result<DialogId> {
        let remote = destination.resolve(self.resources.as_ref())?;
        let id = self.sublayer.open_dialog(&remote, context).await?;

        let dialog = Dialog::outgoing(id, context, destination, remote, &self.settings);
        self.dialogs.insert(id, Arc::new(Mutex::new(dialog)));

        metrics::counter!("brivas_cap_dialogs_opened_total", "direction" => "outgoing").increment(1);
        metrics::gauge!("brivas_cap_dialogs_active").increment(1.0);
        info!(dialog = %id, "Dialog opened");
        Ok(id)
    }

    /// Register a dialog opened by the peer; it starts in Active
    #[instrument(skip(self))]
    pub fn accept_dialog(
        &self,
        dialog: DialogId,
        origin: Option<SccpAddress>,
        context: CapApplicationContext,
    ) -> Result<()> {
        if self.dialogs.contains_key(&dialog) {
            return Err(CapError::validation(format!("dialog {} already exists", dialog)));
        }
        let entry = Dialog::incoming(dialog, context, origin, &self.settings);
        self.dialogs.insert(dialog, Arc::new(Mutex::new(entry)));

        metrics::counter!("brivas_cap_dialogs_opened_total", "direction" => "incoming").increment(1);
        metrics::gauge!("brivas_cap_dialogs_active").increment(1.0);
        info!(%dialog, "Dialog accepted");
        Ok(())
    }

    pub async fn add_initial_dp_request(
        &self,
        dialog: DialogId,
        request: InitialDpRequest,
        timeout: Option<Duration>,
    ) -> Result<InvokeId> {
        self.add(dialog, Operation::InitialDp(request), timeout).await
    }

    pub async fn add_apply_charging_report_request(
        &self,
        dialog: DialogId,
        request: ApplyChargingReportRequest,
        timeout: Option<Duration>,
    ) -> Result<InvokeId> {
        self.add(dialog, Operation::ApplyChargingReport(request), timeout)
            .await
    }

    pub async fn add_apply_charging_request(
        &self,
        dialog: DialogId,
        request: ApplyChargingRequest,
        timeout: Option<Duration>,
    ) -> Result<InvokeId> {
        self.add(dialog, Operation::ApplyCharging(request), timeout).await
    }

    pub async fn add_call_information_report_request(
        &self,
        dialog: DialogId,
        request: CallInformationReportRequest,
        timeout: Option<Duration>,
    ) -> Result<InvokeId> {
        self.add(dialog, Operation::CallInformationReport(request), timeout)
            .await
    }

    pub async fn add_call_information_request_request(
        &self,
        dialog: DialogId,
        request: CallInformationRequestRequest,
        timeout: Option<Duration>,
    ) -> Result<InvokeId> {
        self.add(dialog, Operation::CallInformationRequest(request), timeout)
            .await
    }

    pub async fn add_connect_request(
        &self,
        dialog: DialogId,
        request: ConnectRequest,
        timeout: Option<Duration>,
    ) -> Result<InvokeId> {
        self.add(dialog, Operation::Connect(request), timeout).await
    }

    /// Admit one operation onto a dialog.
    ///
    /// Everything up to the id allocation leaves the dialog untouched on
    /// failure; a failed send releases the id again.
    #[instrument(skip(self, operation), fields(op = %operation.kind()))]
    pub async fn add(
        &self,
        dialog_id: DialogId,
        operation: Operation,
        timeout: Option<Duration>,
    ) -> Result<InvokeId> {
        let kind = operation.kind();
        operation.validate()?;
        if kind.direction().sender() != self.role {
            return Err(CapError::validation(format!(
                "{} cannot be sent by {:?}",
                kind, self.role
            )));
        }
        if timeout.map_or(false, |t| t.is_zero()) {
            return Err(CapError::validation("invoke timeout must be positive"));
        }

        let handle = self.handle(dialog_id)?;
        let mut dialog = handle.lock().await;

        if dialog.context() < kind.min_phase() {
            return Err(CapError::validation(format!(
                "{} requires {:?} or later, dialog uses {:?}",
                kind,
                kind.min_phase(),
                dialog.context()
            )));
        }
        dialog.check_add(kind)?;

        if dialog.state() == DialogState::Establishing {
            if let Some(destination) = dialog.destination() {
                destination.resolve(self.resources.as_ref())?;
            }
        }

        let timeout = timeout.unwrap_or_else(|| dialog.default_timeout());
        let invoke = dialog.invokes().allocate(kind, Instant::now() + timeout)?;
        let descriptor = OperationDescriptor::new(dialog_id, invoke, timeout, Arc::new(operation));

        match self.sublayer.send(dialog_id, descriptor).await {
            Ok(()) => {
                dialog.record_sent(kind);
                metrics::counter!("brivas_cap_invokes_sent_total", "operation" => kind.name())
                    .increment(1);
                debug!(dialog = %dialog_id, %invoke, ?timeout, "Invoke sent");
                Ok(invoke)
            }
            Err(e) => {
                dialog.invokes().release(invoke);
                warn!(dialog = %dialog_id, %invoke, error = %e, "Send failed");
                if e.is_fatal() {
                    self.fail_dialog(&mut dialog, e.clone());
                }
                Err(e.into())
            }
        }
    }

    /// Close a dialog. Outstanding invokes are resolved as Aborted.
    #[instrument(skip(self))]
    pub async fn close(&self, dialog_id: DialogId, mode: CloseMode) -> Result<()> {
        let handle = self.handle(dialog_id)?;
        let mut dialog = handle.lock().await;

        match dialog.state() {
            DialogState::Terminated => {
                debug!(dialog = %dialog_id, "Close on terminated dialog ignored");
                return Ok(());
            }
            // Peer already ended the transaction; only local invokes remain
            DialogState::Terminating => {
                for resolved in dialog.invokes().abort_all() {
                    self.emit_resolved(dialog_id, resolved);
                }
                if dialog.state_machine().on_drained(0) {
                    self.emit_released(&mut dialog, ReleaseReason::LocalClose(mode));
                }
                return Ok(());
            }
            _ => {}
        }
        dialog.state_machine().begin_close();

        for resolved in dialog.invokes().abort_all() {
            self.emit_resolved(dialog_id, resolved);
        }

        let sent = self.sublayer.close(dialog_id, mode).await;
        let in_flight = dialog.in_flight();
        dialog.state_machine().on_drained(in_flight);

        match sent {
            Ok(()) => {
                self.emit_released(&mut dialog, ReleaseReason::LocalClose(mode));
                Ok(())
            }
            Err(e) => {
                warn!(dialog = %dialog_id, error = %e, "Close not delivered");
                dialog.state_machine().transport_failure();
                self.emit_released(&mut dialog, ReleaseReason::TransportFailure(e.clone()));
                Err(e.into())
            }
        }
    }

    /// Current state of a dialog
    pub async fn dialog_state(&self, dialog: DialogId) -> Result<DialogState> {
        let handle = self.handle(dialog)?;
        let state = handle.lock().await.state();
        Ok(state)
    }

    /// Number of invokes in flight on a dialog
    pub async fn in_flight(&self, dialog: DialogId) -> Result<usize> {
        let handle = self.handle(dialog)?;
        let count = handle.lock().await.in_flight();
        Ok(count)
    }

    pub fn dialog_count(&self) -> usize {
        self.dialogs.len()
    }

    /// Expire overdue invokes and drop dialogs terminated longer than the
    /// retention period. Returns the number of expired invokes.
    pub async fn sweep_expired(&self, now: Instant) -> usize {
        let handles: Vec<(DialogId, DialogHandle)> = self
            .dialogs
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();

        let mut expired = 0;
        let mut purge = Vec::new();

        for (id, handle) in handles {
            let mut dialog = handle.lock().await;

            let timed_out: Vec<ResolvedInvoke> = dialog.invokes().expire(now).collect();
            if !timed_out.is_empty() {
                metrics::counter!("brivas_cap_invokes_timed_out_total")
                    .increment(timed_out.len() as u64);
            }
            for resolved in timed_out {
                warn!(dialog = %id, invoke = %resolved.invoke_id, kind = %resolved.kind, "Invoke timed out");
                expired += 1;
                self.emit_resolved(id, resolved);
            }
            self.settle(&mut dialog, ReleaseReason::PeerEnd);

            if let Some(at) = dialog.terminated_at() {
                if now.saturating_duration_since(at) >= self.retain_terminated {
                    purge.push(id);
                }
            }
        }

        for id in purge {
            self.dialogs.remove(&id);
            debug!(dialog = %id, "Dropped terminated dialog");
        }
        expired
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `period` until the engine is dropped
    pub fn spawn_timer_sweep(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.sweep_expired(Instant::now()).await;
            }
            debug!("Timer sweep stopped");
        })
    }

    /// Terminating dialog with nothing left in flight becomes Terminated
    fn settle(&self, dialog: &mut Dialog, reason: ReleaseReason) {
        let in_flight = dialog.in_flight();
        if dialog.state_machine().on_drained(in_flight) {
            self.emit_released(dialog, reason);
        }
    }

    fn fail_dialog(&self, dialog: &mut Dialog, error: TransportError) {
        let id = dialog.id();
        for resolved in dialog.invokes().abort_all() {
            self.emit_resolved(id, resolved);
        }
        dialog.state_machine().transport_failure();
        self.emit_released(dialog, ReleaseReason::TransportFailure(error));
    }

    fn known_dialog(&self, dialog: DialogId, event: &str) -> Option<DialogHandle> {
        match self.handle(dialog) {
            Ok(handle) => Some(handle),
            Err(_) => {
                warn!(%dialog, event, "Event for unknown dialog");
                None
            }
        }
    }
}

#[async_trait]
impl TransactionUser for DialogEngine {
    async fn on_incoming_dialog(
        &self,
        dialog: DialogId,
        origin: SccpAddress,
        context: CapApplicationContext,
    ) {
        match self.accept_dialog(dialog, Some(origin.clone()), context) {
            Ok(()) => self.emit(DialogEvent::IncomingDialog {
                dialog,
                origin,
                context,
            }),
            Err(e) => warn!(%dialog, error = %e, "Incoming dialog not accepted"),
        }
    }

    async fn on_invoke(
        &self,
        dialog: DialogId,
        invoke: InvokeId,
        operation_code: i32,
        parameter: Option<Bytes>,
    ) {
        if self.known_dialog(dialog, "invoke").is_some() {
            self.emit(DialogEvent::IncomingInvoke {
                dialog,
                invoke,
                operation_code,
                parameter,
            });
        }
    }

    async fn on_dialog_continue(&self, dialog: DialogId) {
        if let Some(handle) = self.known_dialog(dialog, "continue") {
            handle.lock().await.state_machine().confirm();
        }
    }

    async fn on_result(&self, dialog_id: DialogId, invoke: InvokeId, outcome: InvokeOutcome) {
        let Some(handle) = self.known_dialog(dialog_id, "result") else {
            return;
        };
        let mut dialog = handle.lock().await;
        if let Some(resolved) = dialog.invokes().resolve(invoke, outcome) {
            debug!(dialog = %dialog_id, %invoke, outcome = resolved.outcome.label(), "Invoke resolved");
            self.emit_resolved(dialog_id, resolved);
        }
        self.settle(&mut dialog, ReleaseReason::PeerEnd);
    }

    async fn on_peer_end(&self, dialog_id: DialogId) {
        let Some(handle) = self.known_dialog(dialog_id, "end") else {
            return;
        };
        let mut dialog = handle.lock().await;
        let in_flight = dialog.in_flight();
        dialog.state_machine().peer_end(in_flight);
        if dialog.state().is_terminal() {
            self.emit_released(&mut dialog, ReleaseReason::PeerEnd);
        } else {
            info!(dialog = %dialog_id, in_flight, "Peer ended dialog, waiting for outstanding invokes");
        }
    }

    async fn on_peer_abort(&self, dialog_id: DialogId, cause: AbortCause) {
        let Some(handle) = self.known_dialog(dialog_id, "abort") else {
            return;
        };
        let mut dialog = handle.lock().await;
        for resolved in dialog.invokes().abort_all() {
            self.emit_resolved(dialog_id, resolved);
        }
        dialog.state_machine().peer_abort();
        self.emit_released(&mut dialog, ReleaseReason::PeerAbort(cause));
    }

    async fn on_transport_failure(&self, dialog_id: DialogId, error: TransportError) {
        let Some(handle) = self.known_dialog(dialog_id, "transport failure") else {
            return;
        };
        if !error.is_fatal() {
            warn!(dialog = %dialog_id, %error, "Transient transport failure");
            return;
        }
        let mut dialog = handle.lock().await;
        self.fail_dialog(&mut dialog, error);
    }
}
