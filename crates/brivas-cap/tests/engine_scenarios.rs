//! Dialog engine behaviour against a scripted transaction sublayer

use async_trait::async_trait;
use brivas_cap::cap::{
    ApplyChargingReportRequest, CallInformationReportRequest, CallInformationRequestRequest,
    ConnectRequest, DestinationRoutingAddress, InitialDpRequest, IsupNumber, LegType,
    ReceivingSideId, RequestedInformation, RequestedInformationType, ServiceKey,
    TimeDurationChargingResult, TimeInformation,
};
use brivas_cap::sccp::{RemoteSignalingPointCode, RemoteSubSystem};
use brivas_cap::tcap::AbortCause;
use brivas_cap::{
    CapApplicationContext, CapConfig, CapError, CloseMode, Destination, DialogEngine,
    DialogEvent, DialogId, DialogState, InvokeId, InvokeOutcome, OperationDescriptor,
    OperationKind, ReleaseReason, SccpAddress, SccpResource, ServiceRole, TransactionSublayer,
    TransactionUser, TransportError,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

#[derive(Default)]
struct MockSublayer {
    next_dialog: AtomicU32,
    sent: Mutex<Vec<OperationDescriptor>>,
    closed: Mutex<Vec<(DialogId, CloseMode)>>,
    fail_next: Mutex<Option<TransportError>>,
    user: Mutex<Option<Weak<dyn TransactionUser>>>,
}

impl MockSublayer {
    fn fail_next_send(&self, error: TransportError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    fn sent(&self) -> Vec<OperationDescriptor> {
        self.sent.lock().unwrap().clone()
    }

    fn is_bound(&self) -> bool {
        self.user
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some()
    }
}

#[async_trait]
impl TransactionSublayer for MockSublayer {
    fn bind(&self, user: Weak<dyn TransactionUser>) {
        *self.user.lock().unwrap() = Some(user);
    }

    async fn open_dialog(
        &self,
        _destination: &SccpAddress,
        _context: CapApplicationContext,
    ) -> Result<DialogId, TransportError> {
        Ok(DialogId(self.next_dialog.fetch_add(1, Ordering::SeqCst) + 100))
    }

    async fn send(&self, _dialog: DialogId, descriptor: OperationDescriptor) -> Result<(), TransportError> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(descriptor);
        Ok(())
    }

    async fn close(&self, dialog: DialogId, mode: CloseMode) -> Result<(), TransportError> {
        self.closed.lock().unwrap().push((dialog, mode));
        Ok(())
    }
}

struct Harness {
    engine: Arc<DialogEngine>,
    events: UnboundedReceiver<DialogEvent>,
    sublayer: Arc<MockSublayer>,
    registry: Arc<SccpResource>,
}

fn harness_with(config: CapConfig) -> Harness {
    let sublayer = Arc::new(MockSublayer::default());
    let registry = Arc::new(SccpResource::in_memory("engine-tests"));
    registry.start().unwrap();
    registry
        .add_remote_spc(1, RemoteSignalingPointCode::new(6034, 0, 0))
        .unwrap();
    registry
        .add_remote_ssn(1, RemoteSubSystem::new(6034, 146, 0, false))
        .unwrap();

    let (engine, events) = DialogEngine::new(&config, sublayer.clone(), registry.clone());
    Harness {
        engine,
        events,
        sublayer,
        registry,
    }
}

fn harness() -> Harness {
    harness_with(CapConfig::default())
}

fn scf_address() -> SccpAddress {
    SccpAddress::from_ssn_pc(146, 6034)
}

fn initial_dp() -> InitialDpRequest {
    let mut req = InitialDpRequest::new(ServiceKey(10));
    req.called_party_number = Some(IsupNumber::national("5551234"));
    req
}

fn charging_report() -> ApplyChargingReportRequest {
    ApplyChargingReportRequest {
        time_duration_charging_result: TimeDurationChargingResult::new(
            ReceivingSideId(LegType::Leg1),
            TimeInformation::TimeIfNoTariffSwitch(300),
        ),
    }
}

fn call_information_report() -> CallInformationReportRequest {
    CallInformationReportRequest {
        requested_information_list: vec![RequestedInformation::CallConnectedElapsedTime(300)],
        extensions: None,
        leg_id: None,
    }
}

fn drain(events: &mut UnboundedReceiver<DialogEvent>) -> Vec<DialogEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Open a dialog and send the InitialDP so the dialog is Active
async fn active_dialog(h: &Harness) -> DialogId {
    let dialog = h.engine.open_dialog(scf_address()).await.unwrap();
    h.engine
        .add_initial_dp_request(dialog, initial_dp(), None)
        .await
        .unwrap();
    dialog
}

#[tokio::test]
async fn test_engine_binds_to_sublayer() {
    let h = harness();
    assert!(h.sublayer.is_bound());
    assert_eq!(h.engine.role(), ServiceRole::GsmSsf);
}

#[tokio::test]
async fn test_initial_dp_then_report_then_close() {
    let mut h = harness();

    let dialog = h.engine.open_dialog(scf_address()).await.unwrap();
    assert_eq!(
        h.engine.dialog_state(dialog).await.unwrap(),
        DialogState::Establishing
    );

    let idp = h
        .engine
        .add_initial_dp_request(dialog, initial_dp(), None)
        .await
        .unwrap();
    assert_eq!(idp, InvokeId(0));
    assert_eq!(h.engine.dialog_state(dialog).await.unwrap(), DialogState::Active);

    let acr = h
        .engine
        .add_apply_charging_report_request(dialog, charging_report(), None)
        .await
        .unwrap();
    assert_eq!(acr, InvokeId(1));
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 2);

    let sent = h.sublayer.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].kind(), OperationKind::InitialDp);
    assert_eq!(sent[0].operation_code(), 0);
    assert_eq!(sent[1].kind(), OperationKind::ApplyChargingReport);
    assert_eq!(sent[1].dialog_id(), dialog);

    assert_ok!(h.engine.close(dialog, CloseMode::Normal).await);
    assert_eq!(
        h.engine.dialog_state(dialog).await.unwrap(),
        DialogState::Terminated
    );
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 0);
    assert_eq!(
        h.sublayer.closed.lock().unwrap().as_slice(),
        &[(dialog, CloseMode::Normal)]
    );

    let events = drain(&mut h.events);
    assert_eq!(
        events,
        vec![
            DialogEvent::InvokeResolved {
                dialog,
                invoke: InvokeId(0),
                kind: OperationKind::InitialDp,
                outcome: InvokeOutcome::Aborted,
            },
            DialogEvent::InvokeResolved {
                dialog,
                invoke: InvokeId(1),
                kind: OperationKind::ApplyChargingReport,
                outcome: InvokeOutcome::Aborted,
            },
            DialogEvent::DialogReleased {
                dialog,
                reason: ReleaseReason::LocalClose(CloseMode::Normal),
            },
        ]
    );
}

#[tokio::test]
async fn test_add_on_terminated_dialog_is_state_violation() {
    let h = harness();
    let dialog = active_dialog(&h).await;
    h.engine.close(dialog, CloseMode::Abort).await.unwrap();

    let before = h.engine.in_flight(dialog).await.unwrap();
    let err = h
        .engine
        .add_call_information_report_request(dialog, call_information_report(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CapError::StateViolation {
            state: DialogState::Terminated,
            ..
        }
    ));
    assert!(err.is_admission_failure());
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), before);

    // closing again is harmless
    assert_ok!(h.engine.close(dialog, CloseMode::Normal).await);
}

#[tokio::test]
async fn test_report_before_initial_dp_rejected() {
    let h = harness();
    let dialog = h.engine.open_dialog(scf_address()).await.unwrap();

    let err = assert_err!(
        h.engine
            .add_apply_charging_report_request(dialog, charging_report(), None)
            .await
    );
    assert!(matches!(
        err,
        CapError::StateViolation {
            operation: OperationKind::ApplyChargingReport,
            state: DialogState::Establishing,
            ..
        }
    ));
    assert!(h.sublayer.sent().is_empty());
}

#[tokio::test]
async fn test_second_initial_dp_rejected() {
    let h = harness();
    let dialog = active_dialog(&h).await;

    let err = assert_err!(
        h.engine
            .add_initial_dp_request(dialog, initial_dp(), None)
            .await
    );
    assert!(matches!(err, CapError::StateViolation { .. }));
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 1);
}

#[tokio::test]
async fn test_direction_and_phase_checks() {
    let h = harness();
    let dialog = active_dialog(&h).await;

    let connect = ConnectRequest::new(DestinationRoutingAddress::single(IsupNumber::national(
        "5559876",
    )));
    let err = assert_err!(h.engine.add_connect_request(dialog, connect, None).await);
    assert!(matches!(err, CapError::Validation(_)));

    let phase1 = h
        .engine
        .open_dialog_with_context(Destination::Address(scf_address()), CapApplicationContext::Phase1)
        .await
        .unwrap();
    h.engine
        .add_initial_dp_request(phase1, initial_dp(), None)
        .await
        .unwrap();
    let err = assert_err!(
        h.engine
            .add_apply_charging_report_request(phase1, charging_report(), None)
            .await
    );
    assert!(matches!(err, CapError::Validation(_)));
}

#[tokio::test]
async fn test_invalid_parameters_have_no_side_effect() {
    let h = harness();
    let dialog = h.engine.open_dialog(scf_address()).await.unwrap();

    let mut bad = initial_dp();
    bad.called_party_number = Some(IsupNumber::national(""));
    let err = assert_err!(h.engine.add_initial_dp_request(dialog, bad, None).await);
    assert!(matches!(err, CapError::Validation(_)));

    assert_eq!(
        h.engine.dialog_state(dialog).await.unwrap(),
        DialogState::Establishing
    );
    let id = h
        .engine
        .add_initial_dp_request(dialog, initial_dp(), None)
        .await
        .unwrap();
    assert_eq!(id, InvokeId(0));
}

#[tokio::test]
async fn test_scf_role_sends_controls() {
    let config = CapConfig {
        role: ServiceRole::GsmScf,
        ..CapConfig::default()
    };
    let h = harness_with(config);
    let dialog = DialogId(9000);
    h.engine
        .accept_dialog(dialog, None, CapApplicationContext::Phase2)
        .unwrap();

    let connect = ConnectRequest::new(DestinationRoutingAddress::single(IsupNumber::national(
        "5559876",
    )));
    assert_eq!(
        h.engine.add_connect_request(dialog, connect, None).await.unwrap(),
        InvokeId(0)
    );
    let cirq = CallInformationRequestRequest {
        requested_information_type_list: vec![RequestedInformationType::CallStopTime],
        extensions: None,
        leg_id: None,
    };
    assert_eq!(
        h.engine
            .add_call_information_request_request(dialog, cirq, None)
            .await
            .unwrap(),
        InvokeId(1)
    );

    assert!(h
        .engine
        .accept_dialog(dialog, None, CapApplicationContext::Phase2)
        .is_err());
}

#[tokio::test]
async fn test_duplicate_resolution_is_noop() {
    let mut h = harness();
    let dialog = active_dialog(&h).await;
    let acr = h
        .engine
        .add_apply_charging_report_request(dialog, charging_report(), None)
        .await
        .unwrap();

    h.engine
        .on_result(dialog, acr, InvokeOutcome::Result { parameter: None })
        .await;
    h.engine
        .on_result(dialog, acr, InvokeOutcome::Error { code: 7, parameter: None })
        .await;
    h.engine
        .on_result(dialog, InvokeId(42), InvokeOutcome::Result { parameter: None })
        .await;
    h.engine
        .on_result(DialogId(4242), acr, InvokeOutcome::Result { parameter: None })
        .await;

    let events = drain(&mut h.events);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        DialogEvent::InvokeResolved {
            invoke,
            outcome: InvokeOutcome::Result { .. },
            ..
        } if *invoke == acr
    ));
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 1);
}

#[tokio::test]
async fn test_custom_timeout_affects_one_invoke() {
    let mut h = harness();
    let dialog = active_dialog(&h).await;
    let short = h
        .engine
        .add_apply_charging_report_request(dialog, charging_report(), Some(Duration::from_millis(100)))
        .await
        .unwrap();
    h.engine
        .add_call_information_report_request(dialog, call_information_report(), None)
        .await
        .unwrap();

    let timeouts: Vec<Duration> = h.sublayer.sent().iter().map(|d| d.timeout()).collect();
    assert_eq!(
        timeouts,
        vec![
            Duration::from_secs(10),
            Duration::from_millis(100),
            Duration::from_secs(10)
        ]
    );

    let expired = h
        .engine
        .sweep_expired(Instant::now() + Duration::from_secs(1))
        .await;
    assert_eq!(expired, 1);
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 2);

    let events = drain(&mut h.events);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0].error(),
        Some(CapError::InvokeTimeout { invoke, .. }) if invoke == short
    ));
}

#[tokio::test]
async fn test_zero_timeout_rejected() {
    let h = harness();
    let dialog = h.engine.open_dialog(scf_address()).await.unwrap();
    let err = assert_err!(
        h.engine
            .add_initial_dp_request(dialog, initial_dp(), Some(Duration::ZERO))
            .await
    );
    assert!(matches!(err, CapError::Validation(_)));
}

#[tokio::test]
async fn test_in_flight_ids_are_unique() {
    let h = harness();
    let dialog = active_dialog(&h).await;

    let mut ids = vec![InvokeId(0)];
    for _ in 0..20 {
        ids.push(
            h.engine
                .add_call_information_report_request(dialog, call_information_report(), None)
                .await
                .unwrap(),
        );
    }
    for id in ids.iter().step_by(3) {
        h.engine
            .on_result(dialog, *id, InvokeOutcome::Result { parameter: None })
            .await;
    }
    let mut in_flight: HashSet<InvokeId> = ids.iter().skip(1).copied().collect();
    for id in ids.iter().step_by(3) {
        in_flight.remove(id);
    }
    for _ in 0..5 {
        let id = h
            .engine
            .add_call_information_report_request(dialog, call_information_report(), None)
            .await
            .unwrap();
        assert!(in_flight.insert(id), "invoke id {} handed out twice", id);
    }
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), in_flight.len());
}

#[tokio::test]
async fn test_invoke_id_exhaustion() {
    let mut config = CapConfig::default();
    config.dialog.invoke_id_max = 2;
    let h = harness_with(config);
    let dialog = active_dialog(&h).await;

    for _ in 0..2 {
        h.engine
            .add_call_information_report_request(dialog, call_information_report(), None)
            .await
            .unwrap();
    }
    let err = assert_err!(
        h.engine
            .add_call_information_report_request(dialog, call_information_report(), None)
            .await
    );
    assert!(matches!(err, CapError::NoInvokeIdAvailable(d) if d == dialog));
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 3);
}

#[tokio::test]
async fn test_failed_send_rolls_back_allocation() {
    let h = harness();
    let dialog = h.engine.open_dialog(scf_address()).await.unwrap();

    h.sublayer
        .fail_next_send(TransportError::Congestion("queue full".to_string()));
    let err = assert_err!(
        h.engine
            .add_initial_dp_request(dialog, initial_dp(), None)
            .await
    );
    assert!(matches!(
        err,
        CapError::TransportFailure(TransportError::Congestion(_))
    ));
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 0);
    assert_eq!(
        h.engine.dialog_state(dialog).await.unwrap(),
        DialogState::Establishing
    );

    let id = h
        .engine
        .add_initial_dp_request(dialog, initial_dp(), None)
        .await
        .unwrap();
    assert_eq!(id, InvokeId(0));
}

#[tokio::test]
async fn test_fatal_send_failure_terminates_dialog() {
    let mut h = harness();
    let dialog = active_dialog(&h).await;

    h.sublayer
        .fail_next_send(TransportError::LinkFailure("association down".to_string()));
    assert_err!(
        h.engine
            .add_apply_charging_report_request(dialog, charging_report(), None)
            .await
    );
    assert_eq!(
        h.engine.dialog_state(dialog).await.unwrap(),
        DialogState::Terminated
    );

    let events = drain(&mut h.events);
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        DialogEvent::InvokeResolved {
            invoke: InvokeId(0),
            outcome: InvokeOutcome::Aborted,
            ..
        }
    ));
    assert!(matches!(
        events[1].error(),
        Some(CapError::TransportFailure(TransportError::LinkFailure(_)))
    ));
}

#[tokio::test]
async fn test_peer_abort_discards_pending() {
    let mut h = harness();
    let dialog = active_dialog(&h).await;
    h.engine
        .add_apply_charging_report_request(dialog, charging_report(), None)
        .await
        .unwrap();

    h.engine
        .on_peer_abort(dialog, AbortCause::ResourceLimitation)
        .await;
    assert_eq!(
        h.engine.dialog_state(dialog).await.unwrap(),
        DialogState::Terminated
    );
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 0);

    let events = drain(&mut h.events);
    assert_eq!(events.len(), 3);
    assert!(matches!(
        events[2].error(),
        Some(CapError::PeerAbort(AbortCause::ResourceLimitation))
    ));

    // a late result after the abort is ignored
    h.engine
        .on_result(dialog, InvokeId(1), InvokeOutcome::Result { parameter: None })
        .await;
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test]
async fn test_peer_end_waits_for_outstanding_invokes() {
    let mut h = harness();
    let dialog = active_dialog(&h).await;
    let acr = h
        .engine
        .add_apply_charging_report_request(dialog, charging_report(), None)
        .await
        .unwrap();

    h.engine
        .on_result(dialog, InvokeId(0), InvokeOutcome::Result { parameter: None })
        .await;
    h.engine.on_peer_end(dialog).await;
    assert_eq!(
        h.engine.dialog_state(dialog).await.unwrap(),
        DialogState::Terminating
    );

    h.engine
        .on_result(dialog, acr, InvokeOutcome::Error { code: 3, parameter: None })
        .await;
    assert_eq!(
        h.engine.dialog_state(dialog).await.unwrap(),
        DialogState::Terminated
    );

    let events = drain(&mut h.events);
    assert_eq!(
        events.last(),
        Some(&DialogEvent::DialogReleased {
            dialog,
            reason: ReleaseReason::PeerEnd,
        })
    );
}

#[tokio::test]
async fn test_close_after_peer_end_aborts_outstanding_invokes() {
    let mut h = harness();
    let dialog = active_dialog(&h).await;
    let acr = h
        .engine
        .add_apply_charging_report_request(dialog, charging_report(), None)
        .await
        .unwrap();

    h.engine.on_peer_end(dialog).await;
    assert_eq!(
        h.engine.dialog_state(dialog).await.unwrap(),
        DialogState::Terminating
    );
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 2);

    assert_ok!(h.engine.close(dialog, CloseMode::Normal).await);
    assert_eq!(
        h.engine.dialog_state(dialog).await.unwrap(),
        DialogState::Terminated
    );
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 0);
    // transaction is already gone, nothing to send
    assert!(h.sublayer.closed.lock().unwrap().is_empty());

    let events = drain(&mut h.events);
    assert_eq!(events.len(), 3);
    let aborted: HashSet<InvokeId> = events[..2]
        .iter()
        .map(|e| match e {
            DialogEvent::InvokeResolved {
                invoke,
                outcome: InvokeOutcome::Aborted,
                ..
            } => *invoke,
            other => panic!("expected aborted invoke, got {:?}", other),
        })
        .collect();
    assert_eq!(aborted, HashSet::from([InvokeId(0), acr]));
    assert_eq!(
        events[2],
        DialogEvent::DialogReleased {
            dialog,
            reason: ReleaseReason::LocalClose(CloseMode::Normal),
        }
    );

    // later timers find nothing left
    assert_eq!(
        h.engine
            .sweep_expired(Instant::now() + Duration::from_secs(60))
            .await,
        0
    );
}

#[tokio::test]
async fn test_registry_destination_checked_until_established() {
    let h = harness();
    let dialog = h
        .engine
        .open_dialog(Destination::Resource {
            remote_spc_id: 1,
            remote_ssn_id: 1,
        })
        .await
        .unwrap();

    h.registry.remove_remote_ssn(1).unwrap();
    let err = assert_err!(
        h.engine
            .add_initial_dp_request(dialog, initial_dp(), None)
            .await
    );
    assert!(matches!(err, CapError::ResourceNotFound(_)));
    assert!(h.sublayer.sent().is_empty());
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 0);

    let unknown = assert_err!(
        h.engine
            .open_dialog(Destination::Resource {
                remote_spc_id: 5,
                remote_ssn_id: 1,
            })
            .await
    );
    assert!(matches!(unknown, CapError::ResourceNotFound(_)));
}

#[tokio::test]
async fn test_incoming_dialog_accepted() {
    let mut h = harness();
    let dialog = DialogId(555);
    let origin = SccpAddress::from_ssn_pc(146, 6034);

    h.engine
        .on_incoming_dialog(dialog, origin.clone(), CapApplicationContext::Phase2)
        .await;
    h.engine
        .on_invoke(dialog, InvokeId(1), 20, None)
        .await;
    assert_eq!(h.engine.dialog_state(dialog).await.unwrap(), DialogState::Active);

    let events = drain(&mut h.events);
    assert_eq!(
        events,
        vec![
            DialogEvent::IncomingDialog {
                dialog,
                origin,
                context: CapApplicationContext::Phase2,
            },
            DialogEvent::IncomingInvoke {
                dialog,
                invoke: InvokeId(1),
                operation_code: 20,
                parameter: None,
            },
        ]
    );
}

#[tokio::test]
async fn test_unknown_dialog() {
    let h = harness();
    let err = assert_err!(h.engine.close(DialogId(1), CloseMode::Normal).await);
    assert!(matches!(err, CapError::UnknownDialog(DialogId(1))));
    assert!(h.engine.dialog_state(DialogId(1)).await.is_err());
}

#[tokio::test]
async fn test_timer_sweep_task() {
    let mut config = CapConfig::default();
    config.dialog.sweep_interval_ms = 5;
    let mut h = harness_with(config.clone());
    let dialog = h.engine.open_dialog(scf_address()).await.unwrap();
    h.engine
        .add_initial_dp_request(dialog, initial_dp(), Some(Duration::from_millis(20)))
        .await
        .unwrap();

    let sweeper = h.engine.spawn_timer_sweep(config.sweep_interval());
    let event = tokio::time::timeout(Duration::from_secs(5), h.events.recv())
        .await
        .expect("timer sweep did not fire")
        .expect("event channel closed");
    assert_eq!(
        event,
        DialogEvent::InvokeResolved {
            dialog,
            invoke: InvokeId(0),
            kind: OperationKind::InitialDp,
            outcome: InvokeOutcome::TimedOut,
        }
    );
    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout_on_paused_clock() {
    let mut h = harness();
    let dialog = h.engine.open_dialog(scf_address()).await.unwrap();
    let invoke = h
        .engine
        .add_initial_dp_request(dialog, initial_dp(), None)
        .await
        .unwrap();
    let sweeper = h.engine.spawn_timer_sweep(Duration::from_millis(500));

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 1);
    assert!(h.events.try_recv().is_err());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.engine.in_flight(dialog).await.unwrap(), 0);
    assert_eq!(
        h.events.try_recv().unwrap(),
        DialogEvent::InvokeResolved {
            dialog,
            invoke,
            kind: OperationKind::InitialDp,
            outcome: InvokeOutcome::TimedOut,
        }
    );
    sweeper.abort();
}

#[tokio::test]
async fn test_terminated_dialogs_are_purged_after_retention() {
    let mut config = CapConfig::default();
    config.dialog.retain_terminated_ms = 1_000;
    let h = harness_with(config);
    let dialog = active_dialog(&h).await;
    h.engine.close(dialog, CloseMode::Normal).await.unwrap();

    h.engine.sweep_expired(Instant::now()).await;
    assert_eq!(h.engine.dialog_count(), 1);

    h.engine
        .sweep_expired(Instant::now() + Duration::from_secs(2))
        .await;
    assert_eq!(h.engine.dialog_count(), 0);
    assert!(matches!(
        h.engine.in_flight(dialog).await,
        Err(CapError::UnknownDialog(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_get_distinct_ids() {
    let h = harness();
    let dialogs = [
        active_dialog(&h).await,
        active_dialog(&h).await,
        active_dialog(&h).await,
    ];

    let mut tasks = Vec::new();
    for (n, dialog) in dialogs.iter().copied().enumerate() {
        // first dialog takes the bulk of the load
        let count = if n == 0 { 60 } else { 20 };
        for i in 0..count {
            let engine = Arc::clone(&h.engine);
            tasks.push(tokio::spawn(async move {
                let invoke = if i % 2 == 0 {
                    engine
                        .add_apply_charging_report_request(dialog, charging_report(), None)
                        .await
                } else {
                    engine
                        .add_call_information_report_request(
                            dialog,
                            call_information_report(),
                            None,
                        )
                        .await
                };
                (dialog, invoke)
            }));
        }
    }

    let mut ids: std::collections::HashMap<DialogId, HashSet<InvokeId>> = dialogs
        .iter()
        .map(|d| (*d, HashSet::from([InvokeId(0)])))
        .collect();
    for task in tasks {
        let (dialog, invoke) = task.await.unwrap();
        let invoke = assert_ok!(invoke);
        assert!(
            ids.get_mut(&dialog).unwrap().insert(invoke),
            "invoke {} handed out twice on dialog {}",
            invoke,
            dialog
        );
    }

    assert_eq!(ids[&dialogs[0]].len(), 61);
    assert_eq!(ids[&dialogs[1]].len(), 21);
    assert_eq!(ids[&dialogs[2]].len(), 21);
    for dialog in dialogs {
        assert_eq!(
            h.engine.in_flight(dialog).await.unwrap(),
            ids[&dialog].len()
        );
    }
    assert_eq!(h.sublayer.sent().len(), 3 + 100);
}
