//! CAP parameter encoding (ASN.1 BER, 3GPP TS 29.078 tagging)

use super::operations::*;
use super::primitives::*;
use crate::tcap::asn1;
use bytes::{BufMut, Bytes, BytesMut};

const SEQUENCE: u8 = 0x30;
const OCTET_STRING: u8 = 0x04;
const INTEGER: u8 = 0x02;
const ENUMERATED: u8 = 0x0A;

/// Encode the parameter of an operation as the Invoke component argument
pub fn encode_parameter(operation: &Operation) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);
    match operation {
        Operation::InitialDp(req) => {
            asn1::encode_tagged(&mut buf, SEQUENCE, &initial_dp(req));
        }
        Operation::ApplyChargingReport(req) => {
            // CallResult is an OCTET STRING wrapping CAMEL-CallResult
            let result = time_duration_charging_result(&req.time_duration_charging_result);
            asn1::encode_tagged(&mut buf, OCTET_STRING, &result);
        }
        Operation::ApplyCharging(req) => {
            asn1::encode_tagged(&mut buf, SEQUENCE, &apply_charging(req));
        }
        Operation::CallInformationReport(req) => {
            asn1::encode_tagged(&mut buf, SEQUENCE, &call_information_report(req));
        }
        Operation::CallInformationRequest(req) => {
            asn1::encode_tagged(&mut buf, SEQUENCE, &call_information_request(req));
        }
        Operation::Connect(req) => {
            asn1::encode_tagged(&mut buf, SEQUENCE, &connect(req));
        }
    }
    buf.freeze()
}

/// Write a context-specific TLV, using the high-tag-number form above 30
fn put_context(buf: &mut BytesMut, number: u8, constructed: bool, value: &[u8]) {
    let class = if constructed { 0xA0 } else { 0x80 };
    if number < 31 {
        buf.put_u8(class | number);
    } else {
        buf.put_u8(class | 0x1F);
        buf.put_u8(number);
    }
    asn1::encode_length(buf, value.len());
    buf.put_slice(value);
}

fn put_context_integer(buf: &mut BytesMut, number: u8, value: i64) {
    put_context(buf, number, false, &asn1::integer_content(value));
}

fn put_context_null(buf: &mut BytesMut, number: u8) {
    put_context(buf, number, false, &[]);
}

fn put_opt<T>(buf: &mut BytesMut, number: u8, value: &Option<T>, f: impl Fn(&T) -> Vec<u8>) {
    if let Some(v) = value {
        put_context(buf, number, false, &f(v));
    }
}

fn put_opt_constructed<T>(
    buf: &mut BytesMut,
    number: u8,
    value: &Option<T>,
    f: impl Fn(&T) -> Vec<u8>,
) {
    if let Some(v) = value {
        put_context(buf, number, true, &f(v));
    }
}

fn bcd_nibble(c: char, star: u8, hash: u8) -> u8 {
    match c {
        '*' => star,
        '#' => hash,
        d => d.to_digit(10).unwrap_or(0) as u8,
    }
}

/// Pack digits two per octet, low nibble first, filling odd counts with `filler`
fn pack_digits(digits: &str, star: u8, hash: u8, filler: u8) -> Vec<u8> {
    let nibbles: Vec<u8> = digits.chars().map(|c| bcd_nibble(c, star, hash)).collect();
    nibbles
        .chunks(2)
        .map(|chunk| {
            if chunk.len() == 2 {
                chunk[0] | (chunk[1] << 4)
            } else {
                chunk[0] | (filler << 4)
            }
        })
        .collect()
}

/// ISUP number format (Q.763): odd/even + NAI, NPI, BCD digits
pub(crate) fn isup_number(number: &IsupNumber) -> Vec<u8> {
    let odd = number.digits.len() % 2 == 1;
    let mut out = Vec::with_capacity(2 + (number.digits.len() + 1) / 2);
    out.push(((odd as u8) << 7) | (number.nature_of_address & 0x7F));
    out.push((number.numbering_plan & 0x07) << 4);
    out.extend(pack_digits(&number.digits, 0x0B, 0x0C, 0x0));
    out
}

/// MAP AddressString: extension bit + TON/NPI, then TBCD digits
pub(crate) fn address_string(address: &AddressString) -> Vec<u8> {
    let mut out = vec![0x80 | ((address.type_of_number & 0x07) << 4) | (address.numbering_plan & 0x0F)];
    out.extend(pack_digits(&address.digits, 0x0A, 0x0B, 0x0F));
    out
}

fn imsi(imsi: &Imsi) -> Vec<u8> {
    pack_digits(&imsi.0, 0x0A, 0x0B, 0x0F)
}

fn extensions(ext: &CapExtensions) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for field in &ext.0 {
        let mut content = BytesMut::new();
        asn1::encode_tagged(&mut content, INTEGER, &asn1::integer_content(field.type_code as i64));
        if field.criticality == Criticality::Abort {
            asn1::encode_tagged(&mut content, ENUMERATED, &[Criticality::Abort as u8]);
        }
        put_context(&mut content, 1, true, &field.value);
        asn1::encode_tagged(&mut buf, SEQUENCE, &content);
    }
    buf.to_vec()
}

fn sending_side_id(id: &SendingSideId) -> Vec<u8> {
    vec![0x80, 0x01, id.0 as u8]
}

fn receiving_side_id(id: &ReceivingSideId) -> Vec<u8> {
    vec![0x81, 0x01, id.0 as u8]
}

fn initial_dp(req: &InitialDpRequest) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(128);
    put_context_integer(&mut buf, 0, req.service_key.0 as i64);
    put_opt(&mut buf, 2, &req.called_party_number, isup_number);
    put_opt(&mut buf, 3, &req.calling_party_number, isup_number);
    put_opt(&mut buf, 5, &req.calling_partys_category, |c| vec![c.0]);
    put_opt(&mut buf, 7, &req.cg_encountered, |c| vec![*c as u8]);
    put_opt(&mut buf, 8, &req.ip_ssp_capabilities, |c| c.as_bytes().to_vec());
    put_opt(&mut buf, 10, &req.location_number, isup_number);
    put_opt(&mut buf, 12, &req.original_called_party_id, isup_number);
    put_opt_constructed(&mut buf, 15, &req.extensions, extensions);
    put_opt(&mut buf, 23, &req.high_layer_compatibility, |h| h.as_bytes().to_vec());
    put_opt(&mut buf, 25, &req.additional_calling_party_number, isup_number);
    if let Some(bearer) = &req.bearer_capability {
        // BearerCapability ::= CHOICE { bearerCap [0] }
        let mut inner = BytesMut::new();
        put_context(&mut inner, 0, false, bearer.as_bytes());
        put_context(&mut buf, 27, true, &inner);
    }
    put_opt(&mut buf, 28, &req.event_type_bcsm, |e| vec![*e as u8]);
    put_opt(&mut buf, 29, &req.redirecting_party_id, isup_number);
    put_opt(&mut buf, 30, &req.redirection_information, |r| r.as_bytes().to_vec());
    put_opt(&mut buf, 17, &req.cause, |c| c.as_bytes().to_vec());
    put_opt_constructed(&mut buf, 32, &req.service_interaction_indicators_two, |s| {
        s.as_bytes().to_vec()
    });
    put_opt(&mut buf, 37, &req.carrier, |c| c.as_bytes().to_vec());
    if let Some(index) = &req.cug_index {
        put_context_integer(&mut buf, 45, index.0 as i64);
    }
    put_opt(&mut buf, 46, &req.cug_interlock, |c| c.as_bytes().to_vec());
    if req.cug_outgoing_access {
        put_context_null(&mut buf, 47);
    }
    put_opt(&mut buf, 50, &req.imsi, imsi);
    put_opt_constructed(&mut buf, 51, &req.subscriber_state, |s| s.as_bytes().to_vec());
    put_opt_constructed(&mut buf, 52, &req.location_information, |l| l.as_bytes().to_vec());
    put_opt_constructed(&mut buf, 53, &req.ext_basic_service_code, |e| e.as_bytes().to_vec());
    put_opt(&mut buf, 54, &req.call_reference_number, |c| c.as_bytes().to_vec());
    put_opt(&mut buf, 55, &req.msc_address, address_string);
    put_opt(&mut buf, 56, &req.called_party_bcd_number, address_string);
    put_opt(&mut buf, 57, &req.time_and_timezone, |t| t.as_bytes().to_vec());
    if req.call_forwarding_ss_pending {
        put_context_null(&mut buf, 58);
    }
    put_opt_constructed(&mut buf, 59, &req.initial_dp_arg_extension, |e| e.as_bytes().to_vec());
    buf.to_vec()
}

fn time_duration_charging_result(result: &TimeDurationChargingResult) -> Vec<u8> {
    let mut content = BytesMut::new();
    put_context(&mut content, 0, true, &receiving_side_id(&result.party_to_charge));

    let mut time = BytesMut::new();
    match result.time_information {
        TimeInformation::TimeIfNoTariffSwitch(t) => put_context_integer(&mut time, 0, t as i64),
        TimeInformation::TimeIfTariffSwitch {
            time_since_tariff_switch,
            tariff_switch_interval,
        } => {
            let mut switch = BytesMut::new();
            put_context_integer(&mut switch, 0, time_since_tariff_switch as i64);
            if let Some(interval) = tariff_switch_interval {
                put_context_integer(&mut switch, 1, interval as i64);
            }
            put_context(&mut time, 1, true, &switch);
        }
    }
    put_context(&mut content, 1, true, &time);

    // legActive defaults to TRUE
    if !result.leg_active {
        put_context(&mut content, 2, false, &[0x00]);
    }
    if result.call_leg_released_at_tcp_expiry {
        put_context_null(&mut content, 3);
    }
    put_opt_constructed(&mut content, 4, &result.extensions, extensions);

    // CAMEL-CallResult ::= CHOICE { timeDurationChargingResult [0] }
    let mut out = BytesMut::new();
    put_context(&mut out, 0, true, &content);
    out.to_vec()
}

fn billing_characteristics(chars: &CamelAchBillingChargingCharacteristics) -> Vec<u8> {
    let mut content = BytesMut::new();
    put_context_integer(&mut content, 0, chars.max_call_period_duration as i64);
    if chars.release_if_duration_exceeded {
        put_context(&mut content, 1, false, &[0xFF]);
    }
    if let Some(interval) = chars.tariff_switch_interval {
        put_context_integer(&mut content, 2, interval as i64);
    }
    if chars.audible_indicator_tone {
        // audibleIndicator ::= CHOICE { tone BOOLEAN }
        put_context(&mut content, 3, false, &[0xFF]);
    }
    put_opt_constructed(&mut content, 4, &chars.extensions, extensions);

    // CAMEL-AChBillingChargingCharacteristics ::= CHOICE { timeDurationCharging [0] }
    let mut out = BytesMut::new();
    put_context(&mut out, 0, true, &content);
    out.to_vec()
}

fn apply_charging(req: &ApplyChargingRequest) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_context(
        &mut buf,
        0,
        false,
        &billing_characteristics(&req.ach_billing_charging_characteristics),
    );
    put_opt_constructed(&mut buf, 2, &req.party_to_charge, sending_side_id);
    put_opt_constructed(&mut buf, 3, &req.extensions, extensions);
    if let Some(address) = &req.ach_charging_address {
        let inner = match address {
            AchChargingAddress::LegId(leg) => {
                let mut b = BytesMut::new();
                put_context(&mut b, 2, true, &sending_side_id(leg));
                b.to_vec()
            }
            AchChargingAddress::SrfConnection(id) => {
                let mut b = BytesMut::new();
                put_context_integer(&mut b, 50, *id as i64);
                b.to_vec()
            }
        };
        put_context(&mut buf, 50, true, &inner);
    }
    buf.to_vec()
}

fn requested_information(info: &RequestedInformation) -> Vec<u8> {
    let mut value = BytesMut::new();
    match info {
        RequestedInformation::CallAttemptElapsedTime(t) => put_context_integer(&mut value, 0, *t as i64),
        RequestedInformation::CallStopTime(t) => {
            put_context(&mut value, 1, false, &pack_digits(t, 0x0A, 0x0B, 0x0F))
        }
        RequestedInformation::CallConnectedElapsedTime(t) => {
            put_context_integer(&mut value, 2, *t as i64)
        }
        RequestedInformation::CalledAddress(n) => put_context(&mut value, 3, false, &isup_number(n)),
        RequestedInformation::ReleaseCause(c) => put_context(&mut value, 30, false, c.as_bytes()),
    }

    let mut content = BytesMut::new();
    put_context(&mut content, 0, false, &[info.information_type() as u8]);
    put_context(&mut content, 1, true, &value);
    let mut out = BytesMut::new();
    asn1::encode_tagged(&mut out, SEQUENCE, &content);
    out.to_vec()
}

fn call_information_report(req: &CallInformationReportRequest) -> Vec<u8> {
    let mut buf = BytesMut::new();
    let list: Vec<u8> = req
        .requested_information_list
        .iter()
        .flat_map(requested_information)
        .collect();
    put_context(&mut buf, 0, true, &list);
    put_opt_constructed(&mut buf, 2, &req.extensions, extensions);
    put_opt_constructed(&mut buf, 3, &req.leg_id, receiving_side_id);
    buf.to_vec()
}

fn call_information_request(req: &CallInformationRequestRequest) -> Vec<u8> {
    let mut buf = BytesMut::new();
    let mut list = BytesMut::new();
    for t in &req.requested_information_type_list {
        asn1::encode_tagged(&mut list, ENUMERATED, &[*t as u8]);
    }
    put_context(&mut buf, 0, true, &list);
    put_opt_constructed(&mut buf, 2, &req.extensions, extensions);
    put_opt_constructed(&mut buf, 3, &req.leg_id, sending_side_id);
    buf.to_vec()
}

fn connect(req: &ConnectRequest) -> Vec<u8> {
    let mut buf = BytesMut::new();
    let mut dra = BytesMut::new();
    for number in &req.destination_routing_address.0 {
        asn1::encode_tagged(&mut dra, OCTET_STRING, &isup_number(number));
    }
    put_context(&mut buf, 0, true, &dra);
    put_opt(&mut buf, 1, &req.alerting_pattern, |a| a.as_bytes().to_vec());
    put_opt(&mut buf, 6, &req.original_called_party_id, isup_number);
    put_opt_constructed(&mut buf, 10, &req.extensions, extensions);
    put_opt(&mut buf, 11, &req.carrier, |c| c.as_bytes().to_vec());
    if !req.generic_numbers.is_empty() {
        let mut set = BytesMut::new();
        for generic in &req.generic_numbers {
            let mut octets = vec![generic.number_qualifier];
            octets.extend(isup_number(&generic.number));
            asn1::encode_tagged(&mut set, OCTET_STRING, &octets);
        }
        put_context(&mut buf, 14, true, &set);
    }
    put_opt_constructed(&mut buf, 15, &req.service_interaction_indicators_two, |s| {
        s.as_bytes().to_vec()
    });
    put_opt(&mut buf, 19, &req.charge_number, isup_number);
    put_opt_constructed(&mut buf, 21, &req.leg_to_be_connected, sending_side_id);
    put_opt(&mut buf, 28, &req.calling_partys_category, |c| vec![c.0]);
    put_opt(&mut buf, 29, &req.redirecting_party_id, isup_number);
    put_opt(&mut buf, 30, &req.redirection_information, |r| r.as_bytes().to_vec());
    put_opt(&mut buf, 31, &req.cug_interlock, |c| c.as_bytes().to_vec());
    if req.cug_outgoing_access {
        put_context_null(&mut buf, 32);
    }
    if req.suppression_of_announcement {
        put_context_null(&mut buf, 55);
    }
    if req.ocsi_applicable {
        put_context_null(&mut buf, 56);
    }
    put_opt(&mut buf, 57, &req.na_oli_info, |n| vec![n.0]);
    if req.bor_interrogation_requested {
        put_context_null(&mut buf, 58);
    }
    buf.to_vec()
}
