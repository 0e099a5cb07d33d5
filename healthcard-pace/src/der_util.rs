//! Utility functions for Distinguished Encoding Rules.


use std::fmt;

use rasn::types::Oid;


/// Tag class and form bits of an application-class constructed value (e.g. `0x7C`).
const APPLICATION_CONSTRUCTED: u8 = 0b0110_0000;
const TAG_CLASS_FORM_MASK: u8 = 0b1110_0000;
const TAG_NUMBER_MASK: u8 = 0b0001_1111;


#[derive(Debug)]
pub enum Asn1Error {
    Der(rasn::error::DecodeError),
    Truncated,
    InvalidLength,
    MultiByteTag { first_byte: u8 },
    UnexpectedTag { expected: u8, obtained: u8 },
    TrailingData { count: usize },
    MissingElement { index: usize },
}
impl fmt::Display for Asn1Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Der(e)
                => write!(f, "DER decoding failed: {}", e),
            Self::Truncated
                => write!(f, "value is longer than the remaining data"),
            Self::InvalidLength
                => write!(f, "invalid length encoding"),
            Self::MultiByteTag { first_byte }
                => write!(f, "multi-byte tag starting with 0x{:02X} is not supported here", first_byte),
            Self::UnexpectedTag { expected, obtained }
                => write!(f, "expected tag 0x{:02X}, obtained 0x{:02X}", expected, obtained),
            Self::TrailingData { count }
                => write!(f, "{} bytes of trailing data", count),
            Self::MissingElement { index }
                => write!(f, "sequence has no element at index {}", index),
        }
    }
}
// rasn's DecodeError is not a std::error::Error, so Der has no source
impl std::error::Error for Asn1Error {}
impl From<rasn::error::DecodeError> for Asn1Error {
    fn from(value: rasn::error::DecodeError) -> Self { Self::Der(value) }
}


/// Encode an ASN.1 DER primitive value length.
pub fn encode_primitive_length(output: &mut Vec<u8>, length: usize) {
    if length < 128 {
        // single-byte encoding
        output.push(length as u8);
    } else {
        // 0b1nnn_nnnn and then n additional bytes that actually specify the length
        // (big-endian)
        let length_bytes = length.to_be_bytes();
        let leading_zeroes = length_bytes.iter()
            .take_while(|b| **b == 0x00)
            .count();
        let trimmed_length_slice = &length_bytes[leading_zeroes..];
        output.push(0b1000_0000 | trimmed_length_slice.len() as u8);
        output.extend(trimmed_length_slice);
    }
}


/// Appends a complete TLV with the given (possibly multi-byte) tag to the output.
pub fn encode_tlv(output: &mut Vec<u8>, tag: &[u8], value: &[u8]) {
    output.extend(tag);
    encode_primitive_length(output, value.len());
    output.extend(value);
}


/// Decode an ASN.1 DER primitive value length.
///
/// The length must be at the beginning of the input slice.
///
/// Returns a tuple `(length, rest)` where `rest` is the rest of the input slice once the length has
/// been removed.
pub fn try_decode_primitive_length(input: &[u8]) -> Option<(usize, &[u8])> {
    let (&start_byte, after_start) = input.split_first()?;
    let start_lower_bits = start_byte & 0b0111_1111;
    if start_byte & 0b1000_0000 == 0 {
        return Some((start_lower_bits.into(), after_start));
    }

    // multiple bytes
    let length_byte_count: usize = start_lower_bits.into();
    if length_byte_count == 0 || length_byte_count > after_start.len() {
        // indefinite length (not DER) or it will never fit
        return None;
    }
    let mut length: usize = 0;
    for length_byte in &after_start[..length_byte_count] {
        length = length.checked_mul(256)?
            .checked_add(usize::from(*length_byte))?;
    }
    Some((length, &after_start[length_byte_count..]))
}


/// Splits a single TLV with a single-byte tag off the beginning of the input.
///
/// Returns `(tag, value, rest)`.
pub fn split_tlv(input: &[u8]) -> Result<(u8, &[u8], &[u8]), Asn1Error> {
    let (&tag, after_tag) = input.split_first()
        .ok_or(Asn1Error::Truncated)?;
    if tag & TAG_NUMBER_MASK == TAG_NUMBER_MASK {
        return Err(Asn1Error::MultiByteTag { first_byte: tag });
    }
    let (length, after_length) = try_decode_primitive_length(after_tag)
        .ok_or(Asn1Error::InvalidLength)?;
    if length > after_length.len() {
        return Err(Asn1Error::Truncated);
    }
    let (value, rest) = after_length.split_at(length);
    Ok((tag, value, rest))
}


/// Removes the application-class wrapper (generally `0x7C`, dynamic authentication data) and the
/// tag and length of the first data object within it.
///
/// Returns the tag of the inner data object along with its value. Further data objects within the
/// wrapper are ignored.
pub fn unwrap_key_object(data: &[u8]) -> Result<(u8, &[u8]), Asn1Error> {
    let (outer_tag, outer_value, rest) = split_tlv(data)?;
    if outer_tag & TAG_CLASS_FORM_MASK != APPLICATION_CONSTRUCTED {
        return Err(Asn1Error::UnexpectedTag { expected: 0x7C, obtained: outer_tag });
    }
    if !rest.is_empty() {
        return Err(Asn1Error::TrailingData { count: rest.len() });
    }

    let (inner_tag, inner_value, _further_objects) = split_tlv(outer_value)?;
    Ok((inner_tag, inner_value))
}


/// Encode an object identifier value into bytes using DER encoding rules.
///
/// No tag or length is encoded, only the actual value.
pub fn oid_to_der_bytes(oid: &Oid) -> Vec<u8> {
    const SEVEN_BIT_MASK: u32 = 0b0111_1111;
    const TOP_BIT: u8 = 0b1000_0000;

    assert!(oid.len() >= 2);
    assert!(oid[0] <= 2);
    if oid[0] < 2 {
        assert!(oid[1] <= 39);
    }

    fn encode_arc(ret: &mut Vec<u8>, arc: u32) {
        // base-128, most significant group first, all but the last group with the top bit set
        let mut groups = 1;
        while groups < 5 && (arc >> (7 * groups)) != 0 {
            groups += 1;
        }
        for group in (0..groups).rev() {
            let seven_bits = ((arc >> (7 * group)) & SEVEN_BIT_MASK) as u8;
            if group == 0 {
                ret.push(seven_bits);
            } else {
                ret.push(seven_bits | TOP_BIT);
            }
        }
    }

    let mut ret = Vec::new();
    let first_arc_pair = 40*oid[0] + oid[1];
    encode_arc(&mut ret, first_arc_pair);

    for arc in oid.iter().skip(2) {
        encode_arc(&mut ret, *arc);
    }

    ret
}


/// Renders an object identifier in dotted-decimal notation.
pub fn oid_to_string(oid: &Oid) -> String {
    let arcs: Vec<String> = oid.iter()
        .map(|arc| arc.to_string())
        .collect();
    arcs.join(".")
}


#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_unwrap_public_key() {
        let wrapped = hex!("
            7C 43 83 41 04 1B 05 27 8F 27 6B D9 2E 6B 0E E3 47 8B D3 A9 3B 03 FE 8E 4C 35
            55 6F 0D 6C 13 C8 9C 50 4F 91 C0 65 E8 5C 1D 28 9B 30 6F 61 BE 2C EC CE D4 E7
            53 2B F0 92 5A 49 07 F2 46 DF 7A 69 C8 D6 9E D2 4F
        ");
        let (tag, value) = unwrap_key_object(&wrapped).unwrap();
        assert_eq!(tag, 0x83);
        assert_eq!(value, &wrapped[4..]);
        assert_eq!(value.len(), 65);
        assert_eq!(value[0], 0x04);
    }

    #[test]
    fn test_unwrap_nonce() {
        let wrapped = hex!("7C 12 80 10 95 A3 A0 16 52 2E E9 8D 01 E7 6C B6 B9 8B 42 C3");
        let (tag, value) = unwrap_key_object(&wrapped).unwrap();
        assert_eq!(tag, 0x80);
        assert_eq!(value, &hex!("95 A3 A0 16 52 2E E9 8D 01 E7 6C B6 B9 8B 42 C3"));
    }

    #[test]
    fn test_unwrap_rejects_malformed() {
        // truncated inner value
        assert!(matches!(
            unwrap_key_object(&hex!("7C 04 80 08 01 02")),
            Err(Asn1Error::Truncated),
        ));
        // truncated outer value
        assert!(matches!(
            unwrap_key_object(&hex!("7C 10 80 01 01")),
            Err(Asn1Error::Truncated),
        ));
        // not application class
        assert!(matches!(
            unwrap_key_object(&hex!("30 03 80 01 01")),
            Err(Asn1Error::UnexpectedTag { obtained: 0x30, .. }),
        ));
        // trailing garbage after the wrapper
        assert!(matches!(
            unwrap_key_object(&hex!("7C 03 80 01 01 FF")),
            Err(Asn1Error::TrailingData { count: 1 }),
        ));
        assert!(matches!(unwrap_key_object(&[]), Err(Asn1Error::Truncated)));
    }

    #[test]
    fn test_der_error_reporting() {
        let der_error = rasn::der::decode::<bool>(&hex!("01 01")).unwrap_err();
        let error = Asn1Error::from(der_error);
        assert!(matches!(error, Asn1Error::Der(_)));
        assert!(error.to_string().starts_with("DER decoding failed: "));
        assert!(std::error::Error::source(&error).is_none());
    }

    #[test]
    fn test_length_encoding() {
        let mut short = Vec::new();
        encode_primitive_length(&mut short, 0x41);
        assert_eq!(short, [0x41]);

        let mut long = Vec::new();
        encode_primitive_length(&mut long, 0x85);
        assert_eq!(long, [0x81, 0x85]);

        let mut longer = Vec::new();
        encode_primitive_length(&mut longer, 0x0102);
        assert_eq!(longer, [0x82, 0x01, 0x02]);

        assert_eq!(try_decode_primitive_length(&[0x82, 0x01, 0x02, 0xFF]), Some((0x0102, &[0xFF][..])));
        assert_eq!(try_decode_primitive_length(&[0x80]), None);
        assert_eq!(try_decode_primitive_length(&[0x83, 0x01]), None);
    }

    #[test]
    fn test_oid_encoding() {
        let oid = Oid::const_new(&[0, 4, 0, 127, 0, 7, 2, 2, 4, 2, 2]);
        assert_eq!(oid_to_der_bytes(oid), hex!("04 00 7F 00 07 02 02 04 02 02"));
        assert_eq!(oid_to_string(oid), "0.4.0.127.0.7.2.2.4.2.2");

        let multi_byte_arc = Oid::const_new(&[1, 2, 840, 113549]);
        assert_eq!(oid_to_der_bytes(multi_byte_arc), hex!("2A 86 48 86 F7 0D"));
    }
}
