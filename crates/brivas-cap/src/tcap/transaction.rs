//! TCAP Transaction Management

use super::sublayer::{TransactionSublayer, TransactionUser};
use super::{AbortCause, Component, DialogueApdu, DialoguePortion, TcapMessage};
use crate::cap::{encode_parameter, CapApplicationContext, OperationDescriptor};
use crate::config::TcapConfig;
use crate::dialog::InvokeOutcome;
use crate::errors::{TcapError, TransportError};
use crate::sccp::SccpAddress;
use crate::types::{CloseMode, DialogId};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, instrument, warn};

/// Transaction State
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Opened locally, nothing sent yet
    Idle,
    InitiationSent,
    InitiationReceived,
    Active,
}

/// Encoded TCAP message ready for SCCP unitdata
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub called_party: SccpAddress,
    pub calling_party: SccpAddress,
    pub payload: Bytes,
}

/// TCAP Transaction
#[derive(Debug)]
struct TcapTransaction {
    remote_tid: Option<u32>,
    remote: SccpAddress,
    context: CapApplicationContext,
    state: TransactionState,
    /// Components queued until the peer answers our BEGIN
    pending_components: Vec<Component>,
}

/// TCAP transaction sublayer writing encoded messages to an outbound queue
pub struct TcapSublayer {
    local_address: SccpAddress,
    /// Active transactions keyed by local transaction id
    transactions: DashMap<u32, TcapTransaction>,
    /// Next transaction ID
    next_tid: AtomicU32,
    outbound: mpsc::Sender<OutboundMessage>,
    user: RwLock<Option<Weak<dyn TransactionUser>>>,
}

impl TcapSublayer {
    /// Create the sublayer and the receiving end of its outbound queue
    pub fn new(config: &TcapConfig) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(config.outbound_queue.max(1));
        let sublayer = Self {
            local_address: SccpAddress::from_ssn_pc(config.local_ssn, config.local_point_code),
            transactions: DashMap::new(),
            next_tid: AtomicU32::new(1),
            outbound: tx,
            user: RwLock::new(None),
        };
        (sublayer, rx)
    }

    pub fn local_address(&self) -> &SccpAddress {
        &self.local_address
    }

    /// Generate new transaction ID
    fn generate_tid(&self) -> u32 {
        loop {
            let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
            if tid != 0 && !self.transactions.contains_key(&tid) {
                return tid;
            }
        }
    }

    fn user(&self) -> Option<Arc<dyn TransactionUser>> {
        self.user.read().as_ref().and_then(Weak::upgrade)
    }

    pub fn transaction_state(&self, dialog: DialogId) -> Option<TransactionState> {
        self.transactions.get(&dialog.0).map(|t| t.state)
    }

    pub fn pending_components(&self, dialog: DialogId) -> usize {
        self.transactions
            .get(&dialog.0)
            .map(|t| t.pending_components.len())
            .unwrap_or(0)
    }

    pub fn active_transactions(&self) -> usize {
        self.transactions.len()
    }

    fn transmit(&self, called_party: &SccpAddress, msg: &TcapMessage) -> Result<(), TransportError> {
        let kind = message_name(msg);
        let out = OutboundMessage {
            called_party: called_party.clone(),
            calling_party: self.local_address.clone(),
            payload: msg.encode(),
        };
        match self.outbound.try_send(out) {
            Ok(()) => {
                metrics::counter!("brivas_cap_tcap_messages_sent_total", "type" => kind).increment(1);
                debug!(message = kind, to = %called_party, "Queued TCAP message");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(TransportError::Congestion(
                "outbound queue full".to_string(),
            )),
            Err(TrySendError::Closed(_)) => Err(TransportError::LinkFailure(
                "outbound queue closed".to_string(),
            )),
        }
    }

    /// Process one TCAP message received from `origin`
    #[instrument(skip(self, data), fields(origin = %origin, len = data.len()))]
    pub async fn handle_incoming(&self, origin: SccpAddress, data: &[u8]) -> Result<(), TcapError> {
        let msg = TcapMessage::decode(data)?;
        metrics::counter!("brivas_cap_tcap_messages_received_total", "type" => message_name(&msg))
            .increment(1);
        let user = self.user();

        match msg {
            TcapMessage::Begin {
                originating_transaction_id,
                dialogue_portion,
                component_portion,
            } => {
                let context = dialogue_portion
                    .as_ref()
                    .and_then(|dp| CapApplicationContext::from_oid(&dp.application_context_name))
                    .ok_or_else(|| {
                        TcapError::InvalidState("BEGIN without a CAP application context".to_string())
                    })?;

                let tid = self.generate_tid();
                self.transactions.insert(
                    tid,
                    TcapTransaction {
                        remote_tid: Some(originating_transaction_id),
                        remote: origin.clone(),
                        context,
                        state: TransactionState::InitiationReceived,
                        pending_components: Vec::new(),
                    },
                );
                let dialog = DialogId(tid);
                info!(%dialog, remote_tid = originating_transaction_id, ?context, "Received BEGIN");

                if let Some(user) = user {
                    user.on_incoming_dialog(dialog, origin, context).await;
                    dispatch(user.as_ref(), dialog, component_portion).await;
                }
            }
            TcapMessage::Continue {
                originating_transaction_id,
                destination_transaction_id,
                component_portion,
                ..
            } => {
                let dialog = DialogId(destination_transaction_id);
                let (first, flush) = {
                    let mut txn = self
                        .transactions
                        .get_mut(&destination_transaction_id)
                        .ok_or(TcapError::TransactionNotFound(destination_transaction_id))?;
                    let first = txn.state == TransactionState::InitiationSent;
                    let mut flush = None;
                    if first {
                        txn.remote_tid = Some(originating_transaction_id);
                        txn.state = TransactionState::Active;
                        if !txn.pending_components.is_empty() {
                            flush = Some((
                                txn.remote.clone(),
                                TcapMessage::Continue {
                                    originating_transaction_id: destination_transaction_id,
                                    destination_transaction_id: originating_transaction_id,
                                    dialogue_portion: None,
                                    component_portion: std::mem::take(&mut txn.pending_components),
                                },
                            ));
                        }
                    }
                    (first, flush)
                };
                debug!(%dialog, first, "Received CONTINUE");

                let flushed = flush.map(|(remote, msg)| self.transmit(&remote, &msg));
                if let Some(user) = user {
                    if first {
                        user.on_dialog_continue(dialog).await;
                    }
                    if let Some(Err(e)) = flushed {
                        user.on_transport_failure(dialog, e).await;
                    }
                    dispatch(user.as_ref(), dialog, component_portion).await;
                }
            }
            TcapMessage::End {
                destination_transaction_id,
                component_portion,
                ..
            } => {
                self.transactions
                    .remove(&destination_transaction_id)
                    .ok_or(TcapError::TransactionNotFound(destination_transaction_id))?;
                let dialog = DialogId(destination_transaction_id);
                info!(%dialog, "Received END");

                if let Some(user) = user {
                    dispatch(user.as_ref(), dialog, component_portion).await;
                    user.on_peer_end(dialog).await;
                }
            }
            TcapMessage::Abort {
                destination_transaction_id,
                cause,
            } => {
                self.transactions
                    .remove(&destination_transaction_id)
                    .ok_or(TcapError::TransactionNotFound(destination_transaction_id))?;
                let dialog = DialogId(destination_transaction_id);
                warn!(%dialog, ?cause, "Received ABORT");

                if let Some(user) = user {
                    user.on_peer_abort(dialog, cause).await;
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl TransactionSublayer for TcapSublayer {
    fn bind(&self, user: Weak<dyn TransactionUser>) {
        *self.user.write() = Some(user);
    }

    #[instrument(skip(self), fields(to = %destination))]
    async fn open_dialog(
        &self,
        destination: &SccpAddress,
        context: CapApplicationContext,
    ) -> Result<DialogId, TransportError> {
        let tid = self.generate_tid();
        self.transactions.insert(
            tid,
            TcapTransaction {
                remote_tid: None,
                remote: destination.clone(),
                context,
                state: TransactionState::Idle,
                pending_components: Vec::new(),
            },
        );
        info!(tid, ?context, "Opened transaction");
        Ok(DialogId(tid))
    }

    #[instrument(skip(self, descriptor), fields(invoke = %descriptor.invoke_id(), op = %descriptor.kind()))]
    async fn send(&self, dialog: DialogId, descriptor: OperationDescriptor) -> Result<(), TransportError> {
        let component = Component::Invoke {
            invoke_id: descriptor.invoke_id(),
            linked_id: None,
            operation_code: descriptor.operation_code(),
            parameter: Some(encode_parameter(descriptor.operation())),
        };

        let mut txn = self
            .transactions
            .get_mut(&dialog.0)
            .ok_or(TransportError::UnknownDialog(dialog))?;

        let (msg, next_state) = match txn.state {
            TransactionState::Idle => (
                TcapMessage::Begin {
                    originating_transaction_id: dialog.0,
                    dialogue_portion: Some(DialoguePortion {
                        apdu: DialogueApdu::Request,
                        application_context_name: txn.context.oid().to_vec(),
                    }),
                    component_portion: vec![component],
                },
                TransactionState::InitiationSent,
            ),
            TransactionState::InitiationSent => {
                debug!(%dialog, "Holding component until the peer continues");
                txn.pending_components.push(component);
                return Ok(());
            }
            TransactionState::InitiationReceived | TransactionState::Active => {
                let remote_tid = txn.remote_tid.ok_or_else(|| {
                    TransportError::InvalidState("No destination TID".to_string())
                })?;
                let dialogue_portion = (txn.state == TransactionState::InitiationReceived).then(|| {
                    DialoguePortion {
                        apdu: DialogueApdu::Response,
                        application_context_name: txn.context.oid().to_vec(),
                    }
                });
                (
                    TcapMessage::Continue {
                        originating_transaction_id: dialog.0,
                        destination_transaction_id: remote_tid,
                        dialogue_portion,
                        component_portion: vec![component],
                    },
                    TransactionState::Active,
                )
            }
        };

        self.transmit(&txn.remote, &msg)?;
        txn.state = next_state;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn close(&self, dialog: DialogId, mode: CloseMode) -> Result<(), TransportError> {
        let (_, txn) = self
            .transactions
            .remove(&dialog.0)
            .ok_or(TransportError::UnknownDialog(dialog))?;

        // Before the peer has answered there is no destination TID: end locally
        let msg = match (mode, txn.state, txn.remote_tid) {
            (_, TransactionState::Idle | TransactionState::InitiationSent, _) | (_, _, None) => None,
            (CloseMode::Normal, state, Some(remote_tid)) => Some(TcapMessage::End {
                destination_transaction_id: remote_tid,
                dialogue_portion: (state == TransactionState::InitiationReceived).then(|| {
                    DialoguePortion {
                        apdu: DialogueApdu::Response,
                        application_context_name: txn.context.oid().to_vec(),
                    }
                }),
                component_portion: Vec::new(),
            }),
            (CloseMode::Abort, _, Some(remote_tid)) => Some(TcapMessage::Abort {
                destination_transaction_id: remote_tid,
                cause: AbortCause::User(Bytes::new()),
            }),
        };

        info!(?mode, state = ?txn.state, "Closed transaction");
        match msg {
            Some(msg) => self.transmit(&txn.remote, &msg),
            None => Ok(()),
        }
    }
}

async fn dispatch(user: &dyn TransactionUser, dialog: DialogId, components: Vec<Component>) {
    for component in components {
        match component {
            Component::Invoke {
                invoke_id,
                operation_code,
                parameter,
                ..
            } => user.on_invoke(dialog, invoke_id, operation_code, parameter).await,
            Component::ReturnResultLast {
                invoke_id,
                parameter,
                ..
            } => {
                user.on_result(dialog, invoke_id, InvokeOutcome::Result { parameter })
                    .await
            }
            Component::ReturnResultNotLast { invoke_id, .. } => {
                debug!(%dialog, invoke = %invoke_id, "Ignoring segmented result");
            }
            Component::ReturnError {
                invoke_id,
                error_code,
                parameter,
            } => {
                user.on_result(
                    dialog,
                    invoke_id,
                    InvokeOutcome::Error {
                        code: error_code,
                        parameter,
                    },
                )
                .await
            }
            Component::Reject {
                invoke_id: Some(invoke_id),
                problem,
            } => {
                user.on_result(dialog, invoke_id, InvokeOutcome::Rejected(problem))
                    .await
            }
            Component::Reject {
                invoke_id: None,
                problem,
            } => warn!(%dialog, ?problem, "Reject without invoke id"),
        }
    }
}

fn message_name(msg: &TcapMessage) -> &'static str {
    match msg {
        TcapMessage::Begin { .. } => "begin",
        TcapMessage::Continue { .. } => "continue",
        TcapMessage::End { .. } => "end",
        TcapMessage::Abort { .. } => "abort",
    }
}
