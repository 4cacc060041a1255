//! Error types for the CAP dialog engine

use crate::cap::OperationKind;
use crate::dialog::DialogState;
use crate::tcap::AbortCause;
use crate::types::{DialogId, InvokeId};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, CapError>;

/// Top-level engine error
#[derive(Debug, Error)]
pub enum CapError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{operation} not allowed in dialog state {state:?}: {detail}")]
    StateViolation {
        operation: OperationKind,
        state: DialogState,
        detail: &'static str,
    },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("No invoke id available on dialog {0}")]
    NoInvokeIdAvailable(DialogId),

    #[error("Transport failure: {0}")]
    TransportFailure(#[from] TransportError),

    #[error("Dialog aborted by peer: {0:?}")]
    PeerAbort(AbortCause),

    #[error("Invoke {invoke} timed out on dialog {dialog}")]
    InvokeTimeout { dialog: DialogId, invoke: InvokeId },

    #[error("Unknown dialog: {0}")]
    UnknownDialog(DialogId),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CapError {
    /// Shorthand used by the parameter validators
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for the failures that are reported synchronously by an add call
    /// and leave the dialog untouched.
    pub fn is_admission_failure(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::StateViolation { .. }
                | Self::ResourceNotFound(_)
                | Self::NoInvokeIdAvailable(_)
        )
    }
}

impl From<RegistryError> for CapError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Persistence(msg) => Self::Config(msg),
            RegistryError::Io(e) => Self::Config(e.to_string()),
            other => Self::ResourceNotFound(other.to_string()),
        }
    }
}

/// Network resource registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Resource registry {0} is not started")]
    NotStarted(String),

    #[error("No {collection} entry with id {id}")]
    NotFound { collection: &'static str, id: u32 },

    #[error("{collection} entry with id {id} already exists")]
    AlreadyExists { collection: &'static str, id: u32 },

    #[error("Remote subsystem {id} is marked prohibited")]
    Prohibited { id: u32 },

    #[error("Remote subsystem {ssn_id} is on point code {ssn_pc}, remote SPC entry {spc_id} is {spc_pc}")]
    PointCodeMismatch {
        spc_id: u32,
        spc_pc: u32,
        ssn_id: u32,
        ssn_pc: u32,
    },

    #[error("Remote subsystem {id} has SSN {ssn}, outside 0..=255")]
    SubsystemOutOfRange { id: u32, ssn: u32 },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by the transaction sublayer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Message could not be accepted right now; the dialog remains usable
    #[error("Congestion: {0}")]
    Congestion(String),

    /// Signaling link or association lost; the dialog cannot continue
    #[error("Link failure: {0}")]
    LinkFailure(String),

    #[error("Transaction for dialog {0} not found")]
    UnknownDialog(DialogId),

    #[error("Invalid transaction state: {0}")]
    InvalidState(String),
}

impl TransportError {
    /// Whether the failure leaves the dialog unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LinkFailure(_) | Self::UnknownDialog(_))
    }
}

/// TCAP layer errors
#[derive(Debug, Error)]
pub enum TcapError {
    #[error("Transaction not found: {0}")]
    TransactionNotFound(u32),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("ASN.1 encoding error: {0}")]
    Asn1Error(String),

    #[error("Component error: {0}")]
    ComponentError(String),
}

impl From<TcapError> for TransportError {
    fn from(err: TcapError) -> Self {
        match err {
            TcapError::TransactionNotFound(tid) => Self::UnknownDialog(DialogId(tid)),
            TcapError::InvalidState(msg) => Self::InvalidState(msg),
            other => Self::InvalidState(other.to_string()),
        }
    }
}
