//! Common types used across the CAP stack

use serde::{Deserialize, Serialize};
use std::fmt;

/// Point Code (14-bit ITU, 24-bit ANSI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointCode(pub u32);

impl PointCode {
    /// Create ITU format point code (14-bit)
    pub fn itu(zone: u8, network: u8, sp: u8) -> Self {
        let pc = ((zone as u32 & 0x07) << 11)
            | ((network as u32 & 0xFF) << 3)
            | (sp as u32 & 0x07);
        Self(pc)
    }

    /// Get raw value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for PointCode {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl fmt::Display for PointCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dialog identifier, assigned by the transaction sublayer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DialogId(pub u32);

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// TCAP invoke identifier (INTEGER -128..127 on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvokeId(pub i8);

impl InvokeId {
    pub fn value(&self) -> i8 {
        self.0
    }
}

impl fmt::Display for InvokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the IN call model the local node plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    /// Switching function (MSC/GMSC); sends InitialDP and reports
    GsmSsf,
    /// Service control function; sends Connect, ApplyCharging, ...
    GsmScf,
}

/// How a dialog is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// TC-END basic
    Normal,
    /// TC-U-ABORT
    Abort,
}
