//! TCAP (Transaction Capabilities Application Part)
//!
//! ITU-T Q.771-Q.775 structured dialogue carrying CAP components, plus the
//! transaction sublayer contract the dialog engine is written against.

pub(crate) mod asn1;
mod components;
mod sublayer;
mod transaction;

pub use components::{Component, RejectProblem};
pub use sublayer::{TransactionSublayer, TransactionUser};
pub use transaction::{OutboundMessage, TcapSublayer, TransactionState};

use crate::errors::TcapError;
use bytes::{BufMut, Bytes, BytesMut};

/// TCAP Message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcapMessage {
    Begin {
        originating_transaction_id: u32,
        dialogue_portion: Option<DialoguePortion>,
        component_portion: Vec<Component>,
    },
    Continue {
        originating_transaction_id: u32,
        destination_transaction_id: u32,
        dialogue_portion: Option<DialoguePortion>,
        component_portion: Vec<Component>,
    },
    End {
        destination_transaction_id: u32,
        dialogue_portion: Option<DialoguePortion>,
        component_portion: Vec<Component>,
    },
    Abort {
        destination_transaction_id: u32,
        cause: AbortCause,
    },
}

/// Dialogue APDU carried in the dialogue portion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueApdu {
    /// AARQ
    Request,
    /// AARE (accepted)
    Response,
}

/// Dialogue Portion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialoguePortion {
    pub apdu: DialogueApdu,
    /// Application Context Name (OID)
    pub application_context_name: Vec<u32>,
}

/// Reason a dialog was aborted by the peer or the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortCause {
    UnrecognizedMessageType,
    UnrecognizedTransactionId,
    BadlyFormattedTransactionPortion,
    IncorrectTransactionPortion,
    ResourceLimitation,
    /// TC-U-ABORT with opaque user information
    User(Bytes),
}

impl AbortCause {
    fn p_abort_code(&self) -> Option<u8> {
        match self {
            Self::UnrecognizedMessageType => Some(0),
            Self::UnrecognizedTransactionId => Some(1),
            Self::BadlyFormattedTransactionPortion => Some(2),
            Self::IncorrectTransactionPortion => Some(3),
            Self::ResourceLimitation => Some(4),
            Self::User(_) => None,
        }
    }

    fn from_p_abort_code(code: u8) -> Self {
        match code {
            0 => Self::UnrecognizedMessageType,
            1 => Self::UnrecognizedTransactionId,
            2 => Self::BadlyFormattedTransactionPortion,
            3 => Self::IncorrectTransactionPortion,
            _ => Self::ResourceLimitation,
        }
    }
}

/// ASN.1 Tags for TCAP
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum TcapTag {
    Begin = 0x62,
    End = 0x64,
    Continue = 0x65,
    Abort = 0x67,
    OriginatingTransactionId = 0x48,
    DestinationTransactionId = 0x49,
    PAbortCause = 0x4A,
    DialoguePortion = 0x6B,
    ComponentPortion = 0x6C,
}

/// dialogue-as-id {itu-t recommendation q 773 as(1) dialogue-as(1) version1(1)}
const DIALOGUE_AS_ID: &[u32] = &[0, 0, 17, 773, 1, 1, 1];
const EXTERNAL: u8 = 0x28;
const AARQ: u8 = 0x60;
const AARE: u8 = 0x61;

impl TcapMessage {
    /// Get message tag
    pub fn tag(&self) -> u8 {
        match self {
            Self::Begin { .. } => TcapTag::Begin as u8,
            Self::Continue { .. } => TcapTag::Continue as u8,
            Self::End { .. } => TcapTag::End as u8,
            Self::Abort { .. } => TcapTag::Abort as u8,
        }
    }

    /// Encode to ASN.1 BER
    pub fn encode(&self) -> Bytes {
        let mut content = BytesMut::new();

        match self {
            Self::Begin {
                originating_transaction_id,
                dialogue_portion,
                component_portion,
            } => {
                put_tid(&mut content, TcapTag::OriginatingTransactionId, *originating_transaction_id);
                put_dialogue(&mut content, dialogue_portion);
                put_components(&mut content, component_portion);
            }
            Self::Continue {
                originating_transaction_id,
                destination_transaction_id,
                dialogue_portion,
                component_portion,
            } => {
                put_tid(&mut content, TcapTag::OriginatingTransactionId, *originating_transaction_id);
                put_tid(&mut content, TcapTag::DestinationTransactionId, *destination_transaction_id);
                put_dialogue(&mut content, dialogue_portion);
                put_components(&mut content, component_portion);
            }
            Self::End {
                destination_transaction_id,
                dialogue_portion,
                component_portion,
            } => {
                put_tid(&mut content, TcapTag::DestinationTransactionId, *destination_transaction_id);
                put_dialogue(&mut content, dialogue_portion);
                put_components(&mut content, component_portion);
            }
            Self::Abort {
                destination_transaction_id,
                cause,
            } => {
                put_tid(&mut content, TcapTag::DestinationTransactionId, *destination_transaction_id);
                match cause {
                    AbortCause::User(info) => {
                        asn1::encode_tagged(&mut content, TcapTag::DialoguePortion as u8, info)
                    }
                    other => {
                        let code = other.p_abort_code().unwrap_or(4);
                        asn1::encode_tagged(&mut content, TcapTag::PAbortCause as u8, &[code]);
                    }
                }
            }
        }

        let mut buf = BytesMut::with_capacity(content.len() + 4);
        asn1::encode_tagged(&mut buf, self.tag(), &content);
        buf.freeze()
    }

    /// Decode from ASN.1 BER
    pub fn decode(data: &[u8]) -> Result<Self, TcapError> {
        let (tag, content, _) = asn1::decode_tlv(data)
            .ok_or_else(|| TcapError::Asn1Error("Invalid TLV".to_string()))?;

        let mut otid = None;
        let mut dtid = None;
        let mut dialogue = None;
        let mut user_info = None;
        let mut p_abort = None;
        let mut components = Vec::new();

        for (field, value) in asn1::iter_tlv(content) {
            match field {
                0x48 => otid = Some(decode_tid(value)?),
                0x49 => dtid = Some(decode_tid(value)?),
                0x4A => p_abort = value.first().copied(),
                0x6B => {
                    dialogue = decode_dialogue_portion(value);
                    user_info = Some(Bytes::copy_from_slice(value));
                }
                0x6C => components = decode_components(value)?,
                other => {
                    return Err(TcapError::Asn1Error(format!(
                        "Unexpected field 0x{:02X} in message 0x{:02X}",
                        other, tag
                    )))
                }
            }
        }

        let missing = |name: &str| TcapError::Asn1Error(format!("Missing {}", name));

        match tag {
            0x62 => Ok(Self::Begin {
                originating_transaction_id: otid.ok_or_else(|| missing("OTID"))?,
                dialogue_portion: dialogue,
                component_portion: components,
            }),
            0x65 => Ok(Self::Continue {
                originating_transaction_id: otid.ok_or_else(|| missing("OTID"))?,
                destination_transaction_id: dtid.ok_or_else(|| missing("DTID"))?,
                dialogue_portion: dialogue,
                component_portion: components,
            }),
            0x64 => Ok(Self::End {
                destination_transaction_id: dtid.ok_or_else(|| missing("DTID"))?,
                dialogue_portion: dialogue,
                component_portion: components,
            }),
            0x67 => {
                let cause = match (p_abort, user_info) {
                    (Some(code), _) => AbortCause::from_p_abort_code(code),
                    (None, Some(info)) => AbortCause::User(info),
                    (None, None) => AbortCause::User(Bytes::new()),
                };
                Ok(Self::Abort {
                    destination_transaction_id: dtid.ok_or_else(|| missing("DTID"))?,
                    cause,
                })
            }
            _ => Err(TcapError::Asn1Error(format!("Unknown tag: 0x{:02X}", tag))),
        }
    }
}

fn put_tid(buf: &mut BytesMut, tag: TcapTag, tid: u32) {
    asn1::encode_tagged(buf, tag as u8, &tid.to_be_bytes());
}

fn decode_tid(value: &[u8]) -> Result<u32, TcapError> {
    if value.is_empty() || value.len() > 4 {
        return Err(TcapError::Asn1Error(format!(
            "Transaction id of {} octets",
            value.len()
        )));
    }
    Ok(value.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

fn put_components(buf: &mut BytesMut, components: &[Component]) {
    if components.is_empty() {
        return;
    }
    let mut comp_buf = BytesMut::new();
    for comp in components {
        comp.encode(&mut comp_buf);
    }
    asn1::encode_tagged(buf, TcapTag::ComponentPortion as u8, &comp_buf);
}

fn decode_components(data: &[u8]) -> Result<Vec<Component>, TcapError> {
    asn1::iter_tlv(data)
        .map(|(tag, value)| Component::decode(tag, value))
        .collect()
}

fn put_dialogue(buf: &mut BytesMut, dialogue: &Option<DialoguePortion>) {
    if let Some(dp) = dialogue {
        let encoded = encode_dialogue_portion(dp);
        asn1::encode_tagged(buf, TcapTag::DialoguePortion as u8, &encoded);
    }
}

/// EXTERNAL { dialogue-as-id, [0] { AARQ/AARE { version, [1] AC name, ... } } }
fn encode_dialogue_portion(dp: &DialoguePortion) -> BytesMut {
    let mut apdu = BytesMut::new();
    // protocol-version [0] BIT STRING { version1 }
    apdu.put_slice(&[0x80, 0x02, 0x07, 0x80]);
    asn1::encode_tagged(&mut apdu, 0xA1, &asn1::encode_oid(&dp.application_context_name));

    let apdu_tag = match dp.apdu {
        DialogueApdu::Request => AARQ,
        DialogueApdu::Response => {
            // result [2] accepted, result-source-diagnostic [3] dialogue-service-user null
            apdu.put_slice(&[0xA2, 0x03, 0x02, 0x01, 0x00]);
            apdu.put_slice(&[0xA3, 0x05, 0xA1, 0x03, 0x02, 0x01, 0x00]);
            AARE
        }
    };

    let mut single = BytesMut::new();
    asn1::encode_tagged(&mut single, apdu_tag, &apdu);

    let mut external = BytesMut::new();
    external.put_slice(&asn1::encode_oid(DIALOGUE_AS_ID));
    asn1::encode_tagged(&mut external, 0xA0, &single);

    let mut buf = BytesMut::new();
    asn1::encode_tagged(&mut buf, EXTERNAL, &external);
    buf
}

fn decode_dialogue_portion(data: &[u8]) -> Option<DialoguePortion> {
    let (tag, external, _) = asn1::decode_tlv(data)?;
    if tag != EXTERNAL {
        return None;
    }
    let (_, single) = asn1::iter_tlv(external).find(|(t, _)| *t == 0xA0)?;
    let (apdu_tag, apdu, _) = asn1::decode_tlv(single)?;
    let apdu_kind = match apdu_tag {
        AARQ => DialogueApdu::Request,
        AARE => DialogueApdu::Response,
        _ => return None,
    };
    let (_, ac) = asn1::iter_tlv(apdu).find(|(t, _)| *t == 0xA1)?;
    let (oid_tag, oid, _) = asn1::decode_tlv(ac)?;
    if oid_tag != 0x06 {
        return None;
    }
    Some(DialoguePortion {
        apdu: apdu_kind,
        application_context_name: asn1::decode_oid(oid)?,
    })
}
