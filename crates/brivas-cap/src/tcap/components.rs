//! TCAP Components

use super::asn1;
use crate::errors::TcapError;
use crate::types::InvokeId;
use bytes::{BufMut, Bytes, BytesMut};

/// TCAP Component Tags
#[repr(u8)]
pub enum ComponentTag {
    Invoke = 0xA1,
    ReturnResultLast = 0xA2,
    ReturnError = 0xA3,
    Reject = 0xA4,
    ReturnResultNotLast = 0xA7,
}

const INTEGER: u8 = 0x02;
const NULL: u8 = 0x05;
const SEQUENCE: u8 = 0x30;
const LINKED_ID: u8 = 0x80;

/// Reject problem code, tagged by the component type it refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectProblem {
    General(u8),
    Invoke(u8),
    ReturnResult(u8),
    ReturnError(u8),
}

impl RejectProblem {
    fn tag(&self) -> u8 {
        match self {
            Self::General(_) => 0x80,
            Self::Invoke(_) => 0x81,
            Self::ReturnResult(_) => 0x82,
            Self::ReturnError(_) => 0x83,
        }
    }

    fn code(&self) -> u8 {
        match *self {
            Self::General(c) | Self::Invoke(c) | Self::ReturnResult(c) | Self::ReturnError(c) => c,
        }
    }

    fn from_tag(tag: u8, code: u8) -> Option<Self> {
        match tag {
            0x80 => Some(Self::General(code)),
            0x81 => Some(Self::Invoke(code)),
            0x82 => Some(Self::ReturnResult(code)),
            0x83 => Some(Self::ReturnError(code)),
            _ => None,
        }
    }
}

/// TCAP Component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Invoke {
        invoke_id: InvokeId,
        linked_id: Option<InvokeId>,
        operation_code: i32,
        parameter: Option<Bytes>,
    },
    ReturnResultLast {
        invoke_id: InvokeId,
        operation_code: Option<i32>,
        parameter: Option<Bytes>,
    },
    ReturnResultNotLast {
        invoke_id: InvokeId,
        operation_code: Option<i32>,
        parameter: Option<Bytes>,
    },
    ReturnError {
        invoke_id: InvokeId,
        error_code: i32,
        parameter: Option<Bytes>,
    },
    Reject {
        invoke_id: Option<InvokeId>,
        problem: RejectProblem,
    },
}

impl Component {
    /// Encode component to ASN.1 BER
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut content = BytesMut::new();

        match self {
            Self::Invoke {
                invoke_id,
                linked_id,
                operation_code,
                parameter,
            } => {
                asn1::encode_integer(&mut content, INTEGER, invoke_id.0 as i64);
                if let Some(lid) = linked_id {
                    asn1::encode_integer(&mut content, LINKED_ID, lid.0 as i64);
                }
                asn1::encode_integer(&mut content, INTEGER, *operation_code as i64);
                if let Some(param) = parameter {
                    content.put_slice(param);
                }
                asn1::encode_tagged(buf, ComponentTag::Invoke as u8, &content);
            }
            Self::ReturnResultLast {
                invoke_id,
                operation_code,
                parameter,
            }
            | Self::ReturnResultNotLast {
                invoke_id,
                operation_code,
                parameter,
            } => {
                asn1::encode_integer(&mut content, INTEGER, invoke_id.0 as i64);
                if let Some(op) = operation_code {
                    let mut result = BytesMut::new();
                    asn1::encode_integer(&mut result, INTEGER, *op as i64);
                    if let Some(param) = parameter {
                        result.put_slice(param);
                    }
                    asn1::encode_tagged(&mut content, SEQUENCE, &result);
                }
                let tag = if matches!(self, Self::ReturnResultLast { .. }) {
                    ComponentTag::ReturnResultLast
                } else {
                    ComponentTag::ReturnResultNotLast
                };
                asn1::encode_tagged(buf, tag as u8, &content);
            }
            Self::ReturnError {
                invoke_id,
                error_code,
                parameter,
            } => {
                asn1::encode_integer(&mut content, INTEGER, invoke_id.0 as i64);
                asn1::encode_integer(&mut content, INTEGER, *error_code as i64);
                if let Some(param) = parameter {
                    content.put_slice(param);
                }
                asn1::encode_tagged(buf, ComponentTag::ReturnError as u8, &content);
            }
            Self::Reject { invoke_id, problem } => {
                match invoke_id {
                    Some(iid) => asn1::encode_integer(&mut content, INTEGER, iid.0 as i64),
                    None => asn1::encode_tagged(&mut content, NULL, &[]),
                }
                asn1::encode_integer(&mut content, problem.tag(), problem.code() as i64);
                asn1::encode_tagged(buf, ComponentTag::Reject as u8, &content);
            }
        }
    }

    /// Decode a component from its tag and content octets
    pub fn decode(tag: u8, data: &[u8]) -> Result<Self, TcapError> {
        let mut items = asn1::iter_tlv(data);

        match tag {
            0xA1 => {
                let invoke_id = invoke_id_from(items.next())?;
                let (linked_id, next) = match items.next() {
                    Some((LINKED_ID, value)) => (Some(invoke_id_value(value)?), items.next()),
                    other => (None, other),
                };
                let operation_code = match next {
                    Some((INTEGER, value)) => integer(value)? as i32,
                    _ => return Err(component_error("Invoke without operation code")),
                };
                let parameter = remaining(&mut items);
                Ok(Self::Invoke {
                    invoke_id,
                    linked_id,
                    operation_code,
                    parameter,
                })
            }
            0xA2 | 0xA7 => {
                let invoke_id = invoke_id_from(items.next())?;
                let (operation_code, parameter) = match items.next() {
                    Some((SEQUENCE, result)) => {
                        let mut inner = asn1::iter_tlv(result);
                        let op = match inner.next() {
                            Some((INTEGER, value)) => integer(value)? as i32,
                            _ => return Err(component_error("Result without operation code")),
                        };
                        (Some(op), remaining(&mut inner))
                    }
                    _ => (None, None),
                };
                if tag == 0xA2 {
                    Ok(Self::ReturnResultLast {
                        invoke_id,
                        operation_code,
                        parameter,
                    })
                } else {
                    Ok(Self::ReturnResultNotLast {
                        invoke_id,
                        operation_code,
                        parameter,
                    })
                }
            }
            0xA3 => {
                let invoke_id = invoke_id_from(items.next())?;
                let error_code = match items.next() {
                    Some((INTEGER, value)) => integer(value)? as i32,
                    _ => return Err(component_error("ReturnError without error code")),
                };
                let parameter = remaining(&mut items);
                Ok(Self::ReturnError {
                    invoke_id,
                    error_code,
                    parameter,
                })
            }
            0xA4 => {
                let invoke_id = match items.next() {
                    Some((INTEGER, value)) => Some(invoke_id_value(value)?),
                    Some((NULL, _)) => None,
                    _ => return Err(component_error("Reject without invoke id")),
                };
                let problem = items
                    .next()
                    .and_then(|(tag, value)| {
                        let code = asn1::decode_integer(value)? as u8;
                        RejectProblem::from_tag(tag, code)
                    })
                    .ok_or_else(|| component_error("Reject without problem code"))?;
                Ok(Self::Reject { invoke_id, problem })
            }
            other => Err(component_error(&format!(
                "Unknown component tag 0x{:02X}",
                other
            ))),
        }
    }

    /// Get invoke ID
    pub fn invoke_id(&self) -> Option<InvokeId> {
        match self {
            Self::Invoke { invoke_id, .. }
            | Self::ReturnResultLast { invoke_id, .. }
            | Self::ReturnResultNotLast { invoke_id, .. }
            | Self::ReturnError { invoke_id, .. } => Some(*invoke_id),
            Self::Reject { invoke_id, .. } => *invoke_id,
        }
    }
}

fn component_error(msg: &str) -> TcapError {
    TcapError::ComponentError(msg.to_string())
}

fn integer(value: &[u8]) -> Result<i64, TcapError> {
    asn1::decode_integer(value).ok_or_else(|| component_error("Malformed INTEGER"))
}

fn invoke_id_value(value: &[u8]) -> Result<InvokeId, TcapError> {
    let id = integer(value)?;
    i8::try_from(id)
        .map(InvokeId)
        .map_err(|_| component_error("Invoke id outside -128..127"))
}

fn invoke_id_from(item: Option<(u8, &[u8])>) -> Result<InvokeId, TcapError> {
    match item {
        Some((INTEGER, value)) => invoke_id_value(value),
        _ => Err(component_error("Missing invoke id")),
    }
}

/// Re-encode whatever TLVs are left as the opaque parameter
fn remaining<'a, I>(items: I) -> Option<Bytes>
where
    I: Iterator<Item = (u8, &'a [u8])>,
{
    let mut buf = BytesMut::new();
    for (tag, value) in items {
        asn1::encode_tagged(&mut buf, tag, value);
    }
    if buf.is_empty() {
        None
    } else {
        Some(buf.freeze())
    }
}
