//! CAP circuit-switched call operations and their parameter records

use super::primitives::*;
use super::OperationKind;
use crate::errors::{CapError, Result};
use crate::types::{DialogId, InvokeId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// InitialDP argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialDpRequest {
    pub service_key: ServiceKey,
    pub called_party_number: Option<IsupNumber>,
    pub calling_party_number: Option<IsupNumber>,
    pub calling_partys_category: Option<CallingPartysCategory>,
    pub cg_encountered: Option<CgEncountered>,
    pub ip_ssp_capabilities: Option<IpSspCapabilities>,
    pub location_number: Option<IsupNumber>,
    pub original_called_party_id: Option<IsupNumber>,
    pub extensions: Option<CapExtensions>,
    pub high_layer_compatibility: Option<HighLayerCompatibility>,
    pub additional_calling_party_number: Option<IsupNumber>,
    pub bearer_capability: Option<BearerCapability>,
    pub event_type_bcsm: Option<EventTypeBcsm>,
    pub redirecting_party_id: Option<IsupNumber>,
    pub redirection_information: Option<RedirectionInformation>,
    pub cause: Option<Cause>,
    pub service_interaction_indicators_two: Option<ServiceInteractionIndicatorsTwo>,
    pub carrier: Option<Carrier>,
    pub cug_index: Option<CugIndex>,
    pub cug_interlock: Option<CugInterlock>,
    pub cug_outgoing_access: bool,
    pub imsi: Option<Imsi>,
    pub subscriber_state: Option<SubscriberState>,
    pub location_information: Option<LocationInformation>,
    pub ext_basic_service_code: Option<ExtBasicServiceCode>,
    pub call_reference_number: Option<CallReferenceNumber>,
    pub msc_address: Option<AddressString>,
    pub called_party_bcd_number: Option<AddressString>,
    pub time_and_timezone: Option<TimeAndTimezone>,
    pub call_forwarding_ss_pending: bool,
    pub initial_dp_arg_extension: Option<InitialDpArgExtension>,
}

impl InitialDpRequest {
    /// Request with only the mandatory service key set
    pub fn new(service_key: ServiceKey) -> Self {
        Self {
            service_key,
            called_party_number: None,
            calling_party_number: None,
            calling_partys_category: None,
            cg_encountered: None,
            ip_ssp_capabilities: None,
            location_number: None,
            original_called_party_id: None,
            extensions: None,
            high_layer_compatibility: None,
            additional_calling_party_number: None,
            bearer_capability: None,
            event_type_bcsm: None,
            redirecting_party_id: None,
            redirection_information: None,
            cause: None,
            service_interaction_indicators_two: None,
            carrier: None,
            cug_index: None,
            cug_interlock: None,
            cug_outgoing_access: false,
            imsi: None,
            subscriber_state: None,
            location_information: None,
            ext_basic_service_code: None,
            call_reference_number: None,
            msc_address: None,
            called_party_bcd_number: None,
            time_and_timezone: None,
            call_forwarding_ss_pending: false,
            initial_dp_arg_extension: None,
        }
    }
}

impl Validate for InitialDpRequest {
    fn validate(&self) -> Result<()> {
        self.service_key.validate()?;
        self.called_party_number.validate()?;
        self.calling_party_number.validate()?;
        self.ip_ssp_capabilities.validate()?;
        self.location_number.validate()?;
        self.original_called_party_id.validate()?;
        self.extensions.validate()?;
        self.high_layer_compatibility.validate()?;
        self.additional_calling_party_number.validate()?;
        self.bearer_capability.validate()?;
        self.redirecting_party_id.validate()?;
        self.redirection_information.validate()?;
        self.cause.validate()?;
        self.service_interaction_indicators_two.validate()?;
        self.carrier.validate()?;
        self.cug_index.validate()?;
        self.cug_interlock.validate()?;
        self.imsi.validate()?;
        self.subscriber_state.validate()?;
        self.location_information.validate()?;
        self.ext_basic_service_code.validate()?;
        self.call_reference_number.validate()?;
        self.msc_address.validate()?;
        self.called_party_bcd_number.validate()?;
        self.time_and_timezone.validate()?;
        self.initial_dp_arg_extension.validate()?;
        check_cug(self.cug_interlock.as_ref(), self.cug_outgoing_access)
    }
}

/// ApplyChargingReport argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyChargingReportRequest {
    pub time_duration_charging_result: TimeDurationChargingResult,
}

impl Validate for ApplyChargingReportRequest {
    fn validate(&self) -> Result<()> {
        self.time_duration_charging_result.validate()
    }
}

/// ApplyCharging argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyChargingRequest {
    pub ach_billing_charging_characteristics: CamelAchBillingChargingCharacteristics,
    pub party_to_charge: Option<SendingSideId>,
    pub extensions: Option<CapExtensions>,
    pub ach_charging_address: Option<AchChargingAddress>,
}

impl ApplyChargingRequest {
    pub fn new(characteristics: CamelAchBillingChargingCharacteristics) -> Self {
        Self {
            ach_billing_charging_characteristics: characteristics,
            party_to_charge: None,
            extensions: None,
            ach_charging_address: None,
        }
    }
}

impl Validate for ApplyChargingRequest {
    fn validate(&self) -> Result<()> {
        self.ach_billing_charging_characteristics.validate()?;
        self.extensions.validate()?;
        self.ach_charging_address.validate()
    }
}

/// CallInformationReport argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInformationReportRequest {
    pub requested_information_list: Vec<RequestedInformation>,
    pub extensions: Option<CapExtensions>,
    pub leg_id: Option<ReceivingSideId>,
}

impl Validate for CallInformationReportRequest {
    fn validate(&self) -> Result<()> {
        if self.requested_information_list.is_empty()
            || self.requested_information_list.len() > MAX_REQUESTED_INFORMATION
        {
            return Err(CapError::validation(format!(
                "requestedInformationList must hold 1..={} entries, got {}",
                MAX_REQUESTED_INFORMATION,
                self.requested_information_list.len()
            )));
        }
        self.requested_information_list
            .iter()
            .try_for_each(Validate::validate)?;
        self.extensions.validate()
    }
}

/// CallInformationRequest argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInformationRequestRequest {
    pub requested_information_type_list: Vec<RequestedInformationType>,
    pub extensions: Option<CapExtensions>,
    pub leg_id: Option<SendingSideId>,
}

impl Validate for CallInformationRequestRequest {
    fn validate(&self) -> Result<()> {
        let list = &self.requested_information_type_list;
        if list.is_empty() || list.len() > MAX_REQUESTED_INFORMATION {
            return Err(CapError::validation(format!(
                "requestedInformationTypeList must hold 1..={} entries, got {}",
                MAX_REQUESTED_INFORMATION,
                list.len()
            )));
        }
        let unique: HashSet<_> = list.iter().collect();
        if unique.len() != list.len() {
            return Err(CapError::validation(
                "requestedInformationTypeList contains duplicates",
            ));
        }
        self.extensions.validate()
    }
}

/// Connect argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub destination_routing_address: DestinationRoutingAddress,
    pub alerting_pattern: Option<AlertingPattern>,
    pub original_called_party_id: Option<IsupNumber>,
    pub extensions: Option<CapExtensions>,
    pub carrier: Option<Carrier>,
    pub calling_partys_category: Option<CallingPartysCategory>,
    pub redirecting_party_id: Option<IsupNumber>,
    pub redirection_information: Option<RedirectionInformation>,
    pub generic_numbers: Vec<GenericNumber>,
    pub service_interaction_indicators_two: Option<ServiceInteractionIndicatorsTwo>,
    pub charge_number: Option<IsupNumber>,
    pub leg_to_be_connected: Option<SendingSideId>,
    pub cug_interlock: Option<CugInterlock>,
    pub cug_outgoing_access: bool,
    pub suppression_of_announcement: bool,
    pub ocsi_applicable: bool,
    pub na_oli_info: Option<NaOliInfo>,
    pub bor_interrogation_requested: bool,
}

impl ConnectRequest {
    pub fn new(destination_routing_address: DestinationRoutingAddress) -> Self {
        Self {
            destination_routing_address,
            alerting_pattern: None,
            original_called_party_id: None,
            extensions: None,
            carrier: None,
            calling_partys_category: None,
            redirecting_party_id: None,
            redirection_information: None,
            generic_numbers: Vec::new(),
            service_interaction_indicators_two: None,
            charge_number: None,
            leg_to_be_connected: None,
            cug_interlock: None,
            cug_outgoing_access: false,
            suppression_of_announcement: false,
            ocsi_applicable: false,
            na_oli_info: None,
            bor_interrogation_requested: false,
        }
    }
}

impl Validate for ConnectRequest {
    fn validate(&self) -> Result<()> {
        self.destination_routing_address.validate()?;
        self.alerting_pattern.validate()?;
        self.original_called_party_id.validate()?;
        self.extensions.validate()?;
        self.carrier.validate()?;
        self.redirecting_party_id.validate()?;
        self.redirection_information.validate()?;
        if self.generic_numbers.len() > 5 {
            return Err(CapError::validation(format!(
                "genericNumbers must hold at most 5 entries, got {}",
                self.generic_numbers.len()
            )));
        }
        self.generic_numbers
            .iter()
            .try_for_each(Validate::validate)?;
        self.service_interaction_indicators_two.validate()?;
        self.charge_number.validate()?;
        self.cug_interlock.validate()?;
        check_cug(self.cug_interlock.as_ref(), self.cug_outgoing_access)
    }
}

/// Outgoing access is only meaningful inside a closed user group
fn check_cug(interlock: Option<&CugInterlock>, outgoing_access: bool) -> Result<()> {
    if outgoing_access && interlock.is_none() {
        return Err(CapError::validation(
            "cug-OutgoingAccess requires cug-Interlock",
        ));
    }
    Ok(())
}

/// A CAP operation with its parameter record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    InitialDp(InitialDpRequest),
    ApplyChargingReport(ApplyChargingReportRequest),
    ApplyCharging(ApplyChargingRequest),
    CallInformationReport(CallInformationReportRequest),
    CallInformationRequest(CallInformationRequestRequest),
    Connect(ConnectRequest),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::InitialDp(_) => OperationKind::InitialDp,
            Self::ApplyChargingReport(_) => OperationKind::ApplyChargingReport,
            Self::ApplyCharging(_) => OperationKind::ApplyCharging,
            Self::CallInformationReport(_) => OperationKind::CallInformationReport,
            Self::CallInformationRequest(_) => OperationKind::CallInformationRequest,
            Self::Connect(_) => OperationKind::Connect,
        }
    }
}

impl Validate for Operation {
    fn validate(&self) -> Result<()> {
        match self {
            Self::InitialDp(r) => r.validate(),
            Self::ApplyChargingReport(r) => r.validate(),
            Self::ApplyCharging(r) => r.validate(),
            Self::CallInformationReport(r) => r.validate(),
            Self::CallInformationRequest(r) => r.validate(),
            Self::Connect(r) => r.validate(),
        }
    }
}

/// Fully validated operation bound to an invoke, as handed to the
/// transaction sublayer. Cheap to clone; never mutated after construction.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    dialog_id: DialogId,
    invoke_id: InvokeId,
    timeout: Duration,
    operation: Arc<Operation>,
}

impl OperationDescriptor {
    pub(crate) fn new(
        dialog_id: DialogId,
        invoke_id: InvokeId,
        timeout: Duration,
        operation: Arc<Operation>,
    ) -> Self {
        Self {
            dialog_id,
            invoke_id,
            timeout,
            operation,
        }
    }

    pub fn dialog_id(&self) -> DialogId {
        self.dialog_id
    }

    pub fn invoke_id(&self) -> InvokeId {
        self.invoke_id
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    pub fn operation_code(&self) -> i32 {
        self.operation.kind().operation_code()
    }

    /// Invoke timeout in effect for this operation
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }
}
