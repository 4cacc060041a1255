//! SCCP Addressing

use crate::types::PointCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Routing indicator of a called/calling party address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingIndicator {
    RouteOnGt,
    RouteOnSsn,
}

/// SCCP Address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SccpAddress {
    pub routing_indicator: RoutingIndicator,
    /// Global Title (optional)
    pub global_title: Option<GlobalTitle>,
    /// Point Code (optional)
    pub point_code: Option<PointCode>,
    /// Subsystem Number (optional)
    pub subsystem_number: Option<u8>,
}

/// Global Title, GTI = 0100 (translation type, numbering plan, encoding, nature of address)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalTitle {
    pub translation_type: u8,
    pub numbering_plan: u8,
    pub nature_of_address: u8,
    pub digits: String,
}

impl GlobalTitle {
    /// Create E.164 Global Title
    pub fn e164(digits: &str) -> Self {
        Self {
            translation_type: 0,
            numbering_plan: 1,
            nature_of_address: 4,
            digits: digits.to_string(),
        }
    }

    /// BCD encoding scheme: 1 for an odd number of digits, 2 for even
    pub fn encoding_scheme(&self) -> u8 {
        if self.digits.len() % 2 == 0 {
            2
        } else {
            1
        }
    }
}

impl SccpAddress {
    /// Create address with SSN and PC
    pub fn from_ssn_pc(ssn: u8, pc: impl Into<PointCode>) -> Self {
        Self {
            routing_indicator: RoutingIndicator::RouteOnSsn,
            global_title: None,
            point_code: Some(pc.into()),
            subsystem_number: Some(ssn),
        }
    }

    /// Create address with Global Title
    pub fn from_gt(gt: GlobalTitle, ssn: Option<u8>) -> Self {
        Self {
            routing_indicator: RoutingIndicator::RouteOnGt,
            global_title: Some(gt),
            point_code: None,
            subsystem_number: ssn,
        }
    }

    /// True when the address carries enough to be routed
    pub fn is_routable(&self) -> bool {
        match self.routing_indicator {
            RoutingIndicator::RouteOnSsn => {
                self.point_code.is_some() && self.subsystem_number.is_some()
            }
            RoutingIndicator::RouteOnGt => self
                .global_title
                .as_ref()
                .map(|gt| !gt.digits.is_empty())
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for SccpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.global_title, self.point_code, self.subsystem_number) {
            (Some(gt), _, Some(ssn)) => write!(f, "gt={} ssn={}", gt.digits, ssn),
            (Some(gt), _, None) => write!(f, "gt={}", gt.digits),
            (None, Some(pc), Some(ssn)) => write!(f, "pc={} ssn={}", pc, ssn),
            (None, Some(pc), None) => write!(f, "pc={}", pc),
            (None, None, Some(ssn)) => write!(f, "ssn={}", ssn),
            (None, None, None) => f.write_str("<empty>"),
        }
    }
}
