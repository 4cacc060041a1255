//! # Brivas CAP Dialog Engine
//!
//! CAMEL Application Part (3GPP TS 29.078) circuit-switched call control
//! over TCAP:
//!
//! - **CAP** - operation catalog and typed parameter records
//! - **Dialog** - per-dialog state machine and invoke tracking
//! - **Engine** - admission of operations, timers and resolution events
//! - **TCAP** - transaction sublayer binding (Begin/Continue/End/Abort)
//! - **SCCP** - addressing and the network resource registry
//!
//! ## Example
//! ```rust,ignore
//! use brivas_cap::{CapConfig, DialogEngine, SccpResource, TcapSublayer};
//!
//! let config = CapConfig::default();
//! let (tcap, outbound) = TcapSublayer::new(&config.tcap);
//! let registry = Arc::new(SccpResource::in_memory("cap"));
//! registry.start()?;
//! let (engine, events) = DialogEngine::new(&config, Arc::new(tcap), registry);
//!
//! let dialog = engine.open_dialog(SccpAddress::from_ssn_pc(146, 6034)).await?;
//! let mut idp = InitialDpRequest::new(ServiceKey(10));
//! idp.called_party_number = Some(IsupNumber::national("5551234"));
//! let invoke = engine.add_initial_dp_request(dialog, idp, None).await?;
//! ```

pub mod cap;
pub mod config;
pub mod dialog;
pub mod engine;
pub mod errors;
pub mod sccp;
pub mod tcap;
pub mod telemetry;
pub mod types;

// Re-exports
pub use config::CapConfig;
pub use errors::{CapError, RegistryError, Result, TransportError};
pub use types::*;

pub use cap::{CapApplicationContext, Operation, OperationDescriptor, OperationKind};
pub use dialog::{DialogState, InvokeOutcome};
pub use engine::{DialogEngine, DialogEvent, ReleaseReason};
pub use sccp::{Destination, ResourceLookup, SccpAddress, SccpResource};
pub use tcap::{TcapSublayer, TransactionSublayer, TransactionUser};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
