//! CAP (CAMEL Application Part) operation catalog
//!
//! 3GPP TS 29.078 circuit-switched call control operations exchanged
//! between the gsmSSF and the gsmSCF.

mod encoding;
mod operations;
mod primitives;

pub use encoding::encode_parameter;
pub use operations::*;
pub use primitives::*;

use crate::types::ServiceRole;
use serde::{Deserialize, Serialize};
use std::fmt;

/// CAP Operation Codes
pub mod operation {
    pub const INITIAL_DP: i32 = 0;
    pub const CONNECT: i32 = 20;
    pub const APPLY_CHARGING: i32 = 35;
    pub const APPLY_CHARGING_REPORT: i32 = 36;
    pub const CALL_INFORMATION_REPORT: i32 = 44;
    pub const CALL_INFORMATION_REQUEST: i32 = 45;
}

/// CAP Application Contexts (gsmSSF to gsmSCF)
pub mod application_context {
    pub const CAP_V1_GSM_SSF_TO_GSM_SCF: &[u32] = &[0, 4, 0, 0, 1, 0, 50, 0];
    pub const CAP_V2_GSM_SSF_TO_GSM_SCF: &[u32] = &[0, 4, 0, 0, 1, 0, 50, 1];
    pub const CAP_V3_GSM_SSF_SCF_GENERIC: &[u32] = &[0, 4, 0, 0, 1, 21, 3, 4];
    pub const CAP_V4_GSM_SSF_SCF_GENERIC: &[u32] = &[0, 4, 0, 0, 1, 22, 3, 4];
}

/// CAP phase negotiated by the dialog's application context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapApplicationContext {
    Phase1,
    Phase2,
    Phase3,
    Phase4,
}

impl CapApplicationContext {
    pub fn oid(&self) -> &'static [u32] {
        match self {
            Self::Phase1 => application_context::CAP_V1_GSM_SSF_TO_GSM_SCF,
            Self::Phase2 => application_context::CAP_V2_GSM_SSF_TO_GSM_SCF,
            Self::Phase3 => application_context::CAP_V3_GSM_SSF_SCF_GENERIC,
            Self::Phase4 => application_context::CAP_V4_GSM_SSF_SCF_GENERIC,
        }
    }

    pub fn from_oid(oid: &[u32]) -> Option<Self> {
        [Self::Phase1, Self::Phase2, Self::Phase3, Self::Phase4]
            .into_iter()
            .find(|ac| ac.oid() == oid)
    }
}

/// Which side may originate an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SsfToScf,
    ScfToSsf,
}

impl Direction {
    /// Role allowed to send operations of this direction
    pub fn sender(&self) -> ServiceRole {
        match self {
            Self::SsfToScf => ServiceRole::GsmSsf,
            Self::ScfToSsf => ServiceRole::GsmScf,
        }
    }
}

/// How often an operation may appear in one dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeatability {
    OncePerDialog,
    Repeatable,
}

/// Closed set of operations handled by the dialog engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    InitialDp,
    Connect,
    ApplyCharging,
    ApplyChargingReport,
    CallInformationReport,
    CallInformationRequest,
}

impl OperationKind {
    pub const ALL: [Self; 6] = [
        Self::InitialDp,
        Self::Connect,
        Self::ApplyCharging,
        Self::ApplyChargingReport,
        Self::CallInformationReport,
        Self::CallInformationRequest,
    ];

    pub fn operation_code(&self) -> i32 {
        match self {
            Self::InitialDp => operation::INITIAL_DP,
            Self::Connect => operation::CONNECT,
            Self::ApplyCharging => operation::APPLY_CHARGING,
            Self::ApplyChargingReport => operation::APPLY_CHARGING_REPORT,
            Self::CallInformationReport => operation::CALL_INFORMATION_REPORT,
            Self::CallInformationRequest => operation::CALL_INFORMATION_REQUEST,
        }
    }

    pub fn from_operation_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.operation_code() == code)
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::InitialDp | Self::ApplyChargingReport | Self::CallInformationReport => {
                Direction::SsfToScf
            }
            Self::Connect | Self::ApplyCharging | Self::CallInformationRequest => {
                Direction::ScfToSsf
            }
        }
    }

    pub fn repeatability(&self) -> Repeatability {
        match self {
            Self::InitialDp => Repeatability::OncePerDialog,
            _ => Repeatability::Repeatable,
        }
    }

    /// Earliest CAP phase defining the operation
    pub fn min_phase(&self) -> CapApplicationContext {
        match self {
            Self::InitialDp | Self::Connect => CapApplicationContext::Phase1,
            _ => CapApplicationContext::Phase2,
        }
    }

    /// Operations that may be issued while the dialog is still being
    /// established; they travel in the TC-BEGIN.
    pub fn may_establish(&self) -> bool {
        matches!(self, Self::InitialDp)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::InitialDp => "InitialDP",
            Self::Connect => "Connect",
            Self::ApplyCharging => "ApplyCharging",
            Self::ApplyChargingReport => "ApplyChargingReport",
            Self::CallInformationReport => "CallInformationReport",
            Self::CallInformationRequest => "CallInformationRequest",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
