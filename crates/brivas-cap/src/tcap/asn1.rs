//! ASN.1 BER Encoding/Decoding utilities

use bytes::{BufMut, BytesMut};

/// Encode a tagged value (TLV)
pub fn encode_tagged(buf: &mut BytesMut, tag: u8, value: &[u8]) {
    buf.put_u8(tag);
    encode_length(buf, value.len());
    buf.put_slice(value);
}

/// Encode length in BER definite form
pub fn encode_length(buf: &mut BytesMut, len: usize) {
    if len < 0x80 {
        buf.put_u8(len as u8);
        return;
    }
    let octets = (len as u32).to_be_bytes();
    let skip = octets.iter().take_while(|&&b| b == 0).count();
    buf.put_u8(0x80 | (octets.len() - skip) as u8);
    buf.put_slice(&octets[skip..]);
}

/// Encode an integer TLV
pub fn encode_integer(buf: &mut BytesMut, tag: u8, value: i64) {
    encode_tagged(buf, tag, &integer_content(value));
}

/// Minimal two's complement content octets of an integer
pub fn integer_content(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    // Drop redundant leading octets while the sign bit of the next one agrees
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Decode integer content octets (sign-extended)
pub fn decode_integer(data: &[u8]) -> Option<i64> {
    if data.is_empty() || data.len() > 8 {
        return None;
    }
    let init: i64 = if data[0] & 0x80 != 0 { -1 } else { 0 };
    Some(data.iter().fold(init, |acc, &b| (acc << 8) | b as i64))
}

/// Decode one TLV, returning the tag, the value slice and the total encoded length
pub fn decode_tlv(data: &[u8]) -> Option<(u8, &[u8], usize)> {
    let tag = *data.first()?;
    let (length, header_len) = decode_length(&data[1..])?;
    let start = 1 + header_len;
    let end = start.checked_add(length)?;
    if data.len() < end {
        return None;
    }
    Some((tag, &data[start..end], end))
}

/// Iterate over consecutive TLVs in a constructed value
pub fn iter_tlv(mut data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    std::iter::from_fn(move || {
        let (tag, value, consumed) = decode_tlv(data)?;
        data = &data[consumed..];
        Some((tag, value))
    })
}

/// Decode BER length, returning (length, octets consumed)
pub fn decode_length(data: &[u8]) -> Option<(usize, usize)> {
    let first = *data.first()?;

    if first < 128 {
        return Some((first as usize, 1));
    }

    let num_bytes = (first & 0x7F) as usize;
    if num_bytes == 0 || num_bytes > 4 || data.len() < 1 + num_bytes {
        // indefinite form is not used by TCAP over SCCP here
        return None;
    }

    let length = data[1..=num_bytes]
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Some((length, 1 + num_bytes))
}

/// Encode an OBJECT IDENTIFIER TLV
pub fn encode_oid(oid: &[u32]) -> Vec<u8> {
    let mut content = Vec::new();

    if oid.len() >= 2 {
        encode_oid_component(&mut content, oid[0] * 40 + oid[1]);
        for &component in &oid[2..] {
            encode_oid_component(&mut content, component);
        }
    }

    let mut buf = BytesMut::with_capacity(content.len() + 2);
    encode_tagged(&mut buf, 0x06, &content);
    buf.to_vec()
}

fn encode_oid_component(buf: &mut Vec<u8>, value: u32) {
    let mut bytes = vec![(value & 0x7F) as u8];
    let mut v = value >> 7;
    while v > 0 {
        bytes.push(((v & 0x7F) | 0x80) as u8);
        v >>= 7;
    }
    bytes.reverse();
    buf.extend(bytes);
}

/// Decode OBJECT IDENTIFIER content octets
pub fn decode_oid(data: &[u8]) -> Option<Vec<u32>> {
    let first = *data.first()?;
    let mut oid = vec![(first / 40) as u32, (first % 40) as u32];

    let mut value = 0u32;
    let mut pending = false;
    for &byte in &data[1..] {
        value = (value << 7) | (byte & 0x7F) as u32;
        pending = byte & 0x80 != 0;
        if !pending {
            oid.push(value);
            value = 0;
        }
    }

    if pending {
        None
    } else {
        Some(oid)
    }
}
