//! CAP parameter primitives and their value-domain checks

use crate::errors::{CapError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Domain check applied to every parameter before an invoke is admitted
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> Result<()> {
        match self {
            Some(v) => v.validate(),
            None => Ok(()),
        }
    }
}

fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if value < min || value > max {
        return Err(CapError::validation(format!(
            "{} {} outside {}..={}",
            field, value, min, max
        )));
    }
    Ok(())
}

fn check_len(field: &str, len: usize, min: usize, max: usize) -> Result<()> {
    if len < min || len > max {
        return Err(CapError::validation(format!(
            "{} length {} outside {}..={}",
            field, len, min, max
        )));
    }
    Ok(())
}

/// Service key identifying the IN service logic (0..=2147483647)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceKey(pub u32);

impl ServiceKey {
    pub const MAX: u32 = 2_147_483_647;
}

impl Validate for ServiceKey {
    fn validate(&self) -> Result<()> {
        check_range("serviceKey", self.0, 0, Self::MAX)
    }
}

/// ISUP-format party number (called, calling, location, redirecting, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsupNumber {
    /// Nature of address indicator (7 bits)
    pub nature_of_address: u8,
    /// Numbering plan indicator (3 bits)
    pub numbering_plan: u8,
    /// Digits, `0-9`, `*` and `#`
    pub digits: String,
}

impl IsupNumber {
    pub const NAI_SUBSCRIBER: u8 = 1;
    pub const NAI_UNKNOWN: u8 = 2;
    pub const NAI_NATIONAL: u8 = 3;
    pub const NAI_INTERNATIONAL: u8 = 4;
    pub const NP_ISDN: u8 = 1;

    /// National significant number, ISDN numbering plan
    pub fn national(digits: &str) -> Self {
        Self {
            nature_of_address: Self::NAI_NATIONAL,
            numbering_plan: Self::NP_ISDN,
            digits: digits.to_string(),
        }
    }

    /// International number, ISDN numbering plan
    pub fn international(digits: &str) -> Self {
        Self {
            nature_of_address: Self::NAI_INTERNATIONAL,
            numbering_plan: Self::NP_ISDN,
            digits: digits.to_string(),
        }
    }
}

impl Validate for IsupNumber {
    fn validate(&self) -> Result<()> {
        check_range("natureOfAddress", self.nature_of_address as u32, 0, 0x7F)?;
        check_range("numberingPlan", self.numbering_plan as u32, 0, 0x07)?;
        check_len("digits", self.digits.len(), 1, 32)?;
        if let Some(c) = self.digits.chars().find(|c| !is_dial_digit(*c)) {
            return Err(CapError::validation(format!(
                "invalid digit {:?} in {}",
                c, self.digits
            )));
        }
        Ok(())
    }
}

/// MAP AddressString (TON/NPI + TBCD digits)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressString {
    pub type_of_number: u8,
    pub numbering_plan: u8,
    pub digits: String,
}

impl AddressString {
    /// International E.164 address
    pub fn e164(digits: &str) -> Self {
        Self {
            type_of_number: 1,
            numbering_plan: 1,
            digits: digits.to_string(),
        }
    }
}

impl Validate for AddressString {
    fn validate(&self) -> Result<()> {
        check_range("typeOfNumber", self.type_of_number as u32, 0, 0x07)?;
        check_range("numberingPlan", self.numbering_plan as u32, 0, 0x0F)?;
        // ISDN-AddressString carries at most 9 octets including TON/NPI
        check_len("address digits", self.digits.len(), 1, 16)?;
        if !self.digits.chars().all(is_dial_digit) {
            return Err(CapError::validation(format!(
                "invalid address digits {}",
                self.digits
            )));
        }
        Ok(())
    }
}

/// International mobile subscriber identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Imsi(pub String);

impl Validate for Imsi {
    fn validate(&self) -> Result<()> {
        check_len("IMSI", self.0.len(), 5, 15)?;
        if !self.0.chars().all(|c| c.is_ascii_digit()) {
            return Err(CapError::validation(format!("IMSI {} is not numeric", self.0)));
        }
        Ok(())
    }
}

fn is_dial_digit(c: char) -> bool {
    c.is_ascii_digit() || c == '*' || c == '#'
}

/// Calling party's category (ISUP, one octet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallingPartysCategory(pub u8);

impl CallingPartysCategory {
    pub const ORDINARY_SUBSCRIBER: Self = Self(0x0A);
}

impl Validate for CallingPartysCategory {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Call gapping encountered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CgEncountered {
    NoCgEncountered = 0,
    ManualCgEncountered = 1,
    ScpOverload = 2,
}

/// Basic call state model detection points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventTypeBcsm {
    CollectedInfo = 2,
    AnalyzedInformation = 3,
    RouteSelectFailure = 4,
    OCalledPartyBusy = 5,
    ONoAnswer = 6,
    OAnswer = 7,
    OMidCall = 8,
    ODisconnect = 9,
    OAbandon = 10,
    TermAttemptAuthorized = 12,
    TBusy = 13,
    TNoAnswer = 14,
    TAnswer = 15,
    TMidCall = 16,
    TDisconnect = 17,
    TAbandon = 18,
}

/// Call leg designator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LegType {
    Leg1 = 0x01,
    Leg2 = 0x02,
}

/// Leg the sending side refers to (gsmSCF → gsmSSF)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendingSideId(pub LegType);

/// Leg the receiving side refers to (gsmSSF → gsmSCF)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingSideId(pub LegType);

/// Generates an opaque octet-string parameter with fixed length bounds.
/// Contents are ISUP/MAP encodings produced by the caller.
macro_rules! octet_parameter {
    ($(#[$meta:meta])* $name:ident, $field:literal, $min:expr, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name(pub Bytes);

        impl $name {
            pub fn new(octets: impl Into<Bytes>) -> Self {
                Self(octets.into())
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl Validate for $name {
            fn validate(&self) -> Result<()> {
                check_len($field, self.0.len(), $min, $max)
            }
        }
    };
}

octet_parameter!(
    /// IP/SSP capabilities
    IpSspCapabilities, "iPSSPCapabilities", 4, 4
);
octet_parameter!(
    /// ISUP high layer compatibility
    HighLayerCompatibility, "highLayerCompatibility", 2, 2
);
octet_parameter!(
    /// Bearer capability (Q.931 / ISUP user service information)
    BearerCapability, "bearerCap", 2, 11
);
octet_parameter!(
    /// ISUP redirection information
    RedirectionInformation, "redirectionInformation", 2, 2
);
octet_parameter!(
    /// ISUP cause
    Cause, "cause", 2, 32
);
octet_parameter!(
    /// Service interaction indicators two
    ServiceInteractionIndicatorsTwo, "serviceInteractionIndicatorsTwo", 1, 32
);
octet_parameter!(
    /// Carrier identification
    Carrier, "carrier", 4, 4
);
octet_parameter!(
    /// Closed user group interlock code
    CugInterlock, "cug-Interlock", 4, 4
);
octet_parameter!(
    /// MAP subscriber state
    SubscriberState, "subscriberState", 1, 64
);
octet_parameter!(
    /// MAP location information
    LocationInformation, "locationInformation", 1, 255
);
octet_parameter!(
    /// Extended basic service code
    ExtBasicServiceCode, "ext-basicServiceCode", 1, 5
);
octet_parameter!(
    /// MAP call reference number
    CallReferenceNumber, "callReferenceNumber", 1, 8
);
octet_parameter!(
    /// Time and timezone (TBCD)
    TimeAndTimezone, "timeAndTimezone", 8, 8
);
octet_parameter!(
    /// InitialDP argument extension
    InitialDpArgExtension, "initialDPArgExtension", 1, 255
);
octet_parameter!(
    /// Alerting pattern
    AlertingPattern, "alertingPattern", 3, 3
);

/// Closed user group index (0..=32767)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CugIndex(pub u16);

impl Validate for CugIndex {
    fn validate(&self) -> Result<()> {
        check_range("cug-Index", self.0 as u32, 0, 32767)
    }
}

/// NA originating line information (one octet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NaOliInfo(pub u8);

/// Extension criticality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Criticality {
    Ignore = 0,
    Abort = 1,
}

/// Private extension field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionField {
    /// Local extension type code
    pub type_code: i32,
    pub criticality: Criticality,
    pub value: Bytes,
}

/// Extension container (1..=10 fields)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapExtensions(pub Vec<ExtensionField>);

impl Validate for CapExtensions {
    fn validate(&self) -> Result<()> {
        check_len("extensions", self.0.len(), 1, 10)
    }
}

/// Generic number with its number qualifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericNumber {
    pub number_qualifier: u8,
    pub number: IsupNumber,
}

impl Validate for GenericNumber {
    fn validate(&self) -> Result<()> {
        self.number.validate()
    }
}

/// Destination routing address; CAP carries exactly one called party number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRoutingAddress(pub Vec<IsupNumber>);

impl DestinationRoutingAddress {
    pub fn single(number: IsupNumber) -> Self {
        Self(vec![number])
    }
}

impl Validate for DestinationRoutingAddress {
    fn validate(&self) -> Result<()> {
        check_len("destinationRoutingAddress", self.0.len(), 1, 1)?;
        self.0.iter().try_for_each(Validate::validate)
    }
}

/// Leg addressed by a charging operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AchChargingAddress {
    LegId(SendingSideId),
    /// SRF connection id (1..=127)
    SrfConnection(u8),
}

impl Validate for AchChargingAddress {
    fn validate(&self) -> Result<()> {
        match self {
            Self::LegId(_) => Ok(()),
            Self::SrfConnection(id) => check_range("srfConnection", *id as u32, 1, 127),
        }
    }
}

/// Upper bound for call period values, in 100ms units (24h)
pub const MAX_CALL_PERIOD: u32 = 864_000;

/// Time information reported at the end of a charging period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInformation {
    /// Elapsed time, 100ms units
    TimeIfNoTariffSwitch(u32),
    TimeIfTariffSwitch {
        time_since_tariff_switch: u32,
        tariff_switch_interval: Option<u32>,
    },
}

impl Validate for TimeInformation {
    fn validate(&self) -> Result<()> {
        match *self {
            Self::TimeIfNoTariffSwitch(t) => {
                check_range("timeIfNoTariffSwitch", t, 0, MAX_CALL_PERIOD)
            }
            Self::TimeIfTariffSwitch {
                time_since_tariff_switch,
                tariff_switch_interval,
            } => {
                check_range(
                    "timeSinceTariffSwitch",
                    time_since_tariff_switch,
                    0,
                    MAX_CALL_PERIOD,
                )?;
                if let Some(interval) = tariff_switch_interval {
                    check_range("tariffSwitchInterval", interval, 1, MAX_CALL_PERIOD)?;
                }
                Ok(())
            }
        }
    }
}

/// Result carried by ApplyChargingReport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeDurationChargingResult {
    pub party_to_charge: ReceivingSideId,
    pub time_information: TimeInformation,
    pub leg_active: bool,
    pub call_leg_released_at_tcp_expiry: bool,
    pub extensions: Option<CapExtensions>,
}

impl TimeDurationChargingResult {
    pub fn new(party_to_charge: ReceivingSideId, time_information: TimeInformation) -> Self {
        Self {
            party_to_charge,
            time_information,
            leg_active: true,
            call_leg_released_at_tcp_expiry: false,
            extensions: None,
        }
    }
}

impl Validate for TimeDurationChargingResult {
    fn validate(&self) -> Result<()> {
        self.time_information.validate()?;
        self.extensions.validate()
    }
}

/// Billing characteristics carried by ApplyCharging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CamelAchBillingChargingCharacteristics {
    /// Maximum call period, 100ms units (1..=864000)
    pub max_call_period_duration: u32,
    pub release_if_duration_exceeded: bool,
    /// Seconds (1..=86400)
    pub tariff_switch_interval: Option<u32>,
    /// Play a warning tone before the period elapses
    pub audible_indicator_tone: bool,
    pub extensions: Option<CapExtensions>,
}

impl CamelAchBillingChargingCharacteristics {
    pub fn new(max_call_period_duration: u32) -> Self {
        Self {
            max_call_period_duration,
            release_if_duration_exceeded: false,
            tariff_switch_interval: None,
            audible_indicator_tone: false,
            extensions: None,
        }
    }
}

impl Validate for CamelAchBillingChargingCharacteristics {
    fn validate(&self) -> Result<()> {
        check_range(
            "maxCallPeriodDuration",
            self.max_call_period_duration,
            1,
            MAX_CALL_PERIOD,
        )?;
        if let Some(interval) = self.tariff_switch_interval {
            check_range("tariffSwitchInterval", interval, 1, 86_400)?;
        }
        self.extensions.validate()
    }
}

/// Kinds of call information the gsmSCF may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RequestedInformationType {
    CallAttemptElapsedTime = 0,
    CallStopTime = 1,
    CallConnectedElapsedTime = 2,
    CalledAddress = 3,
    ReleaseCause = 30,
}

/// Reported call information value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedInformation {
    /// Seconds (0..=255)
    CallAttemptElapsedTime(u8),
    /// Date and time as `YYYYMMDDhhmmss`
    CallStopTime(String),
    /// 100ms units
    CallConnectedElapsedTime(u32),
    CalledAddress(IsupNumber),
    ReleaseCause(Cause),
}

impl RequestedInformation {
    pub fn information_type(&self) -> RequestedInformationType {
        match self {
            Self::CallAttemptElapsedTime(_) => RequestedInformationType::CallAttemptElapsedTime,
            Self::CallStopTime(_) => RequestedInformationType::CallStopTime,
            Self::CallConnectedElapsedTime(_) => {
                RequestedInformationType::CallConnectedElapsedTime
            }
            Self::CalledAddress(_) => RequestedInformationType::CalledAddress,
            Self::ReleaseCause(_) => RequestedInformationType::ReleaseCause,
        }
    }
}

impl Validate for RequestedInformation {
    fn validate(&self) -> Result<()> {
        match self {
            Self::CallAttemptElapsedTime(_) => Ok(()),
            Self::CallStopTime(t) => {
                if t.len() != 14 || !t.chars().all(|c| c.is_ascii_digit()) {
                    return Err(CapError::validation(format!(
                        "callStopTime {} is not YYYYMMDDhhmmss",
                        t
                    )));
                }
                Ok(())
            }
            Self::CallConnectedElapsedTime(_) => Ok(()),
            Self::CalledAddress(n) => n.validate(),
            Self::ReleaseCause(c) => c.validate(),
        }
    }
}

/// Maximum entries in requested information lists
pub const MAX_REQUESTED_INFORMATION: usize = 5;
