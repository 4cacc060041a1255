//! Resource lookup adapter
//!
//! Read-only view of the network resource registry used by the dialog engine
//! to turn registry references into routable SCCP addresses.

use super::address::SccpAddress;
use super::resource::{
    ConcernedSignalingPointCode, RemoteSignalingPointCode, RemoteSubSystem, SccpResource,
};
use crate::errors::RegistryError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lookups over the three registry collections
pub trait ResourceLookup: Send + Sync {
    fn resolve_remote_spc(&self, id: u32) -> Result<RemoteSignalingPointCode, RegistryError>;
    fn resolve_remote_ssn(&self, id: u32) -> Result<RemoteSubSystem, RegistryError>;
    fn resolve_concerned_spc(&self, id: u32) -> Result<ConcernedSignalingPointCode, RegistryError>;
}

impl ResourceLookup for SccpResource {
    fn resolve_remote_spc(&self, id: u32) -> Result<RemoteSignalingPointCode, RegistryError> {
        self.get_remote_spc(id)
    }

    fn resolve_remote_ssn(&self, id: u32) -> Result<RemoteSubSystem, RegistryError> {
        self.get_remote_ssn(id)
    }

    fn resolve_concerned_spc(&self, id: u32) -> Result<ConcernedSignalingPointCode, RegistryError> {
        self.get_concerned_spc(id)
    }
}

/// Where a dialog is opened to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Fully specified called party address
    Address(SccpAddress),
    /// Registry references, resolved when the first invoke is admitted
    Resource { remote_spc_id: u32, remote_ssn_id: u32 },
}

impl Destination {
    /// Resolve to a called party address
    pub fn resolve(&self, lookup: &dyn ResourceLookup) -> Result<SccpAddress, RegistryError> {
        match self {
            Self::Address(addr) => Ok(addr.clone()),
            Self::Resource {
                remote_spc_id,
                remote_ssn_id,
            } => {
                let spc = lookup.resolve_remote_spc(*remote_spc_id)?;
                let ssn = lookup.resolve_remote_ssn(*remote_ssn_id)?;

                if ssn.marked_prohibited {
                    return Err(RegistryError::Prohibited { id: *remote_ssn_id });
                }
                if ssn.remote_spc != spc.remote_spc {
                    return Err(RegistryError::PointCodeMismatch {
                        spc_id: *remote_spc_id,
                        spc_pc: spc.remote_spc,
                        ssn_id: *remote_ssn_id,
                        ssn_pc: ssn.remote_spc,
                    });
                }
                let ssn_number = u8::try_from(ssn.remote_ssn).map_err(|_| {
                    RegistryError::SubsystemOutOfRange {
                        id: *remote_ssn_id,
                        ssn: ssn.remote_ssn,
                    }
                })?;

                debug!(
                    remote_spc = spc.remote_spc,
                    remote_ssn = ssn.remote_ssn,
                    "Resolved destination from resources"
                );
                Ok(SccpAddress::from_ssn_pc(ssn_number, spc.remote_spc))
            }
        }
    }
}

impl From<SccpAddress> for Destination {
    fn from(addr: SccpAddress) -> Self {
        Self::Address(addr)
    }
}
