//! SCCP (Signaling Connection Control Part)
//!
//! Addressing and the network resource registry consulted when a dialog is
//! opened towards a registry-configured destination.

mod address;
mod lookup;
mod resource;

pub use address::{GlobalTitle, RoutingIndicator, SccpAddress};
pub use lookup::{Destination, ResourceLookup};
pub use resource::{
    ConcernedSignalingPointCode, RemoteSignalingPointCode, RemoteSubSystem, SccpResource,
};

/// Subsystem Numbers
pub mod ssn {
    pub const HLR: u8 = 6;
    pub const VLR: u8 = 7;
    pub const MSC: u8 = 8;
    pub const GSMSCF: u8 = 146;
    pub const GSMSSF: u8 = 147;
}
