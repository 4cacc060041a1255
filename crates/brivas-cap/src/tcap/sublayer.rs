//! Contract between the dialog engine and the TCAP transaction sublayer

use super::AbortCause;
use crate::cap::{CapApplicationContext, OperationDescriptor};
use crate::dialog::InvokeOutcome;
use crate::errors::TransportError;
use crate::sccp::SccpAddress;
use crate::types::{CloseMode, DialogId, InvokeId};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Weak;

/// Transaction sublayer consumed by the dialog engine
#[async_trait]
pub trait TransactionSublayer: Send + Sync {
    /// Register the receiver of inbound events. Only a weak reference is kept.
    fn bind(&self, user: Weak<dyn TransactionUser>);

    /// Allocate a transaction towards `destination`; nothing is sent yet
    async fn open_dialog(
        &self,
        destination: &SccpAddress,
        context: CapApplicationContext,
    ) -> Result<DialogId, TransportError>;

    /// Hand one invoke to the peer
    async fn send(&self, dialog: DialogId, descriptor: OperationDescriptor) -> Result<(), TransportError>;

    /// End or abort the transaction
    async fn close(&self, dialog: DialogId, mode: CloseMode) -> Result<(), TransportError>;
}

/// Inbound events raised by the transaction sublayer
#[async_trait]
pub trait TransactionUser: Send + Sync {
    /// Peer opened a dialog (TC-BEGIN)
    async fn on_incoming_dialog(
        &self,
        dialog: DialogId,
        origin: SccpAddress,
        context: CapApplicationContext,
    );

    /// Peer invoked an operation on a dialog
    async fn on_invoke(
        &self,
        dialog: DialogId,
        invoke: InvokeId,
        operation_code: i32,
        parameter: Option<Bytes>,
    );

    /// Peer's first TC-CONTINUE confirmed the dialog
    async fn on_dialog_continue(&self, dialog: DialogId);

    /// Result, error or reject for one of our invokes
    async fn on_result(&self, dialog: DialogId, invoke: InvokeId, outcome: InvokeOutcome);

    /// TC-END from the peer
    async fn on_peer_end(&self, dialog: DialogId);

    /// TC-U-ABORT or TC-P-ABORT
    async fn on_peer_abort(&self, dialog: DialogId, cause: AbortCause);

    /// Failure detected below the sublayer after a send was accepted
    async fn on_transport_failure(&self, dialog: DialogId, error: TransportError);
}
