//! Decoding of the PACE security information published in `EF.CardAccess`.
//!
//! `EF.CardAccess` contains a DER-encoded `SET OF SecurityInfo`, each of which is a `SEQUENCE`
//! starting with the protocol's object identifier. For PACE, the third element is the identifier
//! of the standardized domain parameters.


use rasn::types::{Any, ObjectIdentifier, Oid};
use tracing::debug;

use crate::crypt::elliptic::curves::NamedCurve;
use crate::der_util::{encode_tlv, oid_to_der_bytes, oid_to_string, split_tlv, Asn1Error};
use crate::pace::{Error, Step};
use crate::pace::oids::{is_pace_protocol, is_supported_protocol};


const SET_TAG: u8 = 0x31;
const SEQUENCE_TAG: u8 = 0x30;
const OID_TAG: u8 = 0x06;
const INTEGER_TAG: u8 = 0x02;
const PACE_VERSION: u8 = 2;
const PROTOCOL_INDEX: usize = 0;
const PARAMETER_ID_INDEX: usize = 2;


/// A `PACEInfo` entry announced by the card.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecurityInfo {
    protocol: ObjectIdentifier,
    parameter_id: Option<i64>,
}
impl SecurityInfo {
    pub fn new(protocol: ObjectIdentifier, parameter_id: Option<i64>) -> Self {
        Self { protocol, parameter_id }
    }

    /// Extracts the PACE information from the contents of `EF.CardAccess`.
    ///
    /// Entries for other protocols are skipped. If the card announces multiple PACE variants, the
    /// one supported by this crate is preferred; otherwise, the first one is returned.
    pub fn parse(card_access: &[u8]) -> Result<Self, Error> {
        if card_access.is_empty() {
            return Err(Error::SecurityInfoMissing);
        }
        let asn1_error = |error: Asn1Error| Error::Asn1Decoding { step: Step::ParseSecurityInfo, error };

        let (tag, mut entries, _padding) = split_tlv(card_access)
            .map_err(asn1_error)?;
        if tag != SET_TAG {
            return Err(asn1_error(Asn1Error::UnexpectedTag { expected: SET_TAG, obtained: tag }));
        }

        let mut first_pace_info = None;
        while !entries.is_empty() {
            let (_tag, _value, rest) = split_tlv(entries)
                .map_err(asn1_error)?;
            let entry = &entries[..entries.len() - rest.len()];
            entries = rest;

            let Some(info) = Self::decode_entry(entry).map_err(asn1_error)? else {
                continue;
            };
            debug!(
                protocol = %oid_to_string(&info.protocol),
                parameter_id = ?info.parameter_id,
                "card announces PACE"
            );
            if is_supported_protocol(&info.protocol) {
                return Ok(info);
            }
            if first_pace_info.is_none() {
                first_pace_info = Some(info);
            }
        }

        first_pace_info.ok_or(Error::SecurityInfoMissing)
    }

    /// Decodes a single `SecurityInfo`, returning `None` if it does not describe PACE.
    fn decode_entry(entry: &[u8]) -> Result<Option<Self>, Asn1Error> {
        let elements: Vec<Any> = rasn::der::decode(entry)?;
        let protocol_element = elements.get(PROTOCOL_INDEX)
            .ok_or(Asn1Error::MissingElement { index: PROTOCOL_INDEX })?;
        let protocol: ObjectIdentifier = rasn::der::decode(protocol_element.as_bytes())?;
        if !is_pace_protocol(&protocol) {
            return Ok(None);
        }

        let parameter_id = match elements.get(PARAMETER_ID_INDEX) {
            Some(element) => Some(rasn::der::decode::<i64>(element.as_bytes())?),
            None => None,
        };
        Ok(Some(Self { protocol, parameter_id }))
    }

    /// Encodes the contents of an `EF.CardAccess` announcing only this entry.
    pub fn to_card_access(&self) -> Vec<u8> {
        let mut sequence = Vec::new();
        encode_tlv(&mut sequence, &[OID_TAG], &self.protocol_bytes());
        encode_tlv(&mut sequence, &[INTEGER_TAG], &[PACE_VERSION]);
        if let Some(parameter_id) = self.parameter_id {
            encode_tlv(&mut sequence, &[INTEGER_TAG], &minimal_integer_bytes(parameter_id));
        }

        let mut entry = Vec::new();
        encode_tlv(&mut entry, &[SEQUENCE_TAG], &sequence);
        let mut set = Vec::new();
        encode_tlv(&mut set, &[SET_TAG], &entry);
        set
    }

    pub fn protocol(&self) -> &Oid { &self.protocol }
    pub fn parameter_id(&self) -> Option<i64> { self.parameter_id }

    /// The protocol's object identifier in dotted-decimal notation.
    pub fn protocol_id(&self) -> String {
        oid_to_string(&self.protocol)
    }

    /// The DER value bytes (without tag and length) of the protocol's object identifier.
    pub fn protocol_bytes(&self) -> Vec<u8> {
        oid_to_der_bytes(&self.protocol)
    }

    /// The curve selected by the domain parameter identifier, if it is one of the known ones.
    pub fn named_curve(&self) -> Option<NamedCurve> {
        self.parameter_id.and_then(NamedCurve::from_parameter_id)
    }

    /// Ensures the protocol and domain parameters can be negotiated and returns the curve.
    pub fn ensure_supported(&self) -> Result<NamedCurve, Error> {
        if !is_supported_protocol(&self.protocol) {
            return Err(Error::UnsupportedProtocol { protocol: self.protocol.clone() });
        }
        self.named_curve()
            .ok_or(Error::UnsupportedDomainParameters { parameter_id: self.parameter_id })
    }
}


/// Two's complement big-endian encoding without redundant leading bytes.
fn minimal_integer_bytes(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let next_negative = bytes[start + 1] & 0x80 != 0;
        let redundant = (bytes[start] == 0x00 && !next_negative)
            || (bytes[start] == 0xFF && next_negative);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}


#[cfg(test)]
mod tests {
    use super::{minimal_integer_bytes, SecurityInfo};
    use crate::pace::oids::PACE_ECDH_GM_AES_CBC_CMAC_128;
    use crate::crypt::elliptic::curves::NamedCurve;
    use crate::der_util::Asn1Error;
    use crate::pace::Error;
    use hex_literal::hex;

    #[test]
    fn test_parse_health_card_access() {
        let card_access = hex!("31143012060A04007F0007020204020202010202010D");
        let info = SecurityInfo::parse(&card_access).unwrap();
        assert_eq!(info.protocol_id(), "0.4.0.127.0.7.2.2.4.2.2");
        assert_eq!(info.protocol_bytes(), hex!("04007F00070202040202"));
        assert_eq!(info.parameter_id(), Some(13));
        assert_eq!(info.named_curve(), Some(NamedCurve::BrainpoolP256r1));
        assert_eq!(info.named_curve().unwrap().name(), "BrainpoolP256r1");
        assert_eq!(info.ensure_supported().unwrap(), NamedCurve::BrainpoolP256r1);
    }

    #[test]
    fn test_encode_card_access() {
        let info = SecurityInfo::new(PACE_ECDH_GM_AES_CBC_CMAC_128.to_owned(), Some(13));
        assert_eq!(info.to_card_access(), hex!("31143012060A04007F0007020204020202010202010D"));
        assert_eq!(SecurityInfo::parse(&info.to_card_access()).unwrap(), info);

        assert_eq!(minimal_integer_bytes(0), [0x00]);
        assert_eq!(minimal_integer_bytes(128), [0x00, 0x80]);
        assert_eq!(minimal_integer_bytes(-1), [0xFF]);
        assert_eq!(minimal_integer_bytes(-129), [0xFF, 0x7F]);
    }

    #[test]
    fn test_skips_other_protocols() {
        let card_access = hex!("
            31 25
                30 0F 06 0A 04 00 7F 00 07 02 02 03 02 02 02 01 01
                30 12 06 0A 04 00 7F 00 07 02 02 04 02 02 02 01 02 02 01 10
        ");
        let info = SecurityInfo::parse(&card_access).unwrap();
        assert_eq!(info.protocol_id(), "0.4.0.127.0.7.2.2.4.2.2");
        assert_eq!(info.named_curve(), Some(NamedCurve::BrainpoolP384r1));
    }

    #[test]
    fn test_prefers_supported_variant() {
        let card_access = hex!("
            31 28
                30 12 06 0A 04 00 7F 00 07 02 02 04 01 02 02 01 02 02 01 00
                30 12 06 0A 04 00 7F 00 07 02 02 04 02 02 02 01 02 02 01 11
        ");
        let info = SecurityInfo::parse(&card_access).unwrap();
        assert_eq!(info.protocol_id(), "0.4.0.127.0.7.2.2.4.2.2");
        assert_eq!(info.named_curve(), Some(NamedCurve::BrainpoolP512r1));
    }

    #[test]
    fn test_unsupported_variants() {
        // DH with generic mapping
        let dh = SecurityInfo::parse(&hex!("3114 3012 060A04007F00070202040102 020102 020100")).unwrap();
        assert!(matches!(dh.ensure_supported(), Err(Error::UnsupportedProtocol { .. })));

        // NIST P-256 is not used by health cards
        let nist = SecurityInfo::parse(&hex!("3114 3012 060A04007F00070202040202 020102 02010C")).unwrap();
        assert_eq!(nist.named_curve(), None);
        assert!(matches!(
            nist.ensure_supported(),
            Err(Error::UnsupportedDomainParameters { parameter_id: Some(12) }),
        ));

        // proprietary domain parameters
        let proprietary = SecurityInfo::parse(&hex!("3111 300F 060A04007F00070202040202 020102")).unwrap();
        assert!(matches!(
            proprietary.ensure_supported(),
            Err(Error::UnsupportedDomainParameters { parameter_id: None }),
        ));
    }

    #[test]
    fn test_missing_pace() {
        assert!(matches!(SecurityInfo::parse(&[]), Err(Error::SecurityInfoMissing)));
        assert!(matches!(
            SecurityInfo::parse(&hex!("3111 300F 060A04007F00070202030202 020101")),
            Err(Error::SecurityInfoMissing),
        ));
        assert!(matches!(SecurityInfo::parse(&hex!("3100")), Err(Error::SecurityInfoMissing)));
    }

    #[test]
    fn test_malformed_card_access() {
        assert!(matches!(
            SecurityInfo::parse(&hex!("3114 3012 060A 0400")),
            Err(Error::Asn1Decoding { error: Asn1Error::Truncated, .. }),
        ));
        assert!(matches!(
            SecurityInfo::parse(&hex!("3014 3012 060A04007F00070202040202 020102 02010D")),
            Err(Error::Asn1Decoding { error: Asn1Error::UnexpectedTag { expected: 0x31, obtained: 0x30 }, .. }),
        ));
        // the first element of a SecurityInfo must be an OID
        assert!(matches!(
            SecurityInfo::parse(&hex!("3105 3003 020101")),
            Err(Error::Asn1Decoding { error: Asn1Error::Der(_), .. }),
        ));
    }
}
