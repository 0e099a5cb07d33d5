//! Implementation of Password Authenticated Connection Establishment with a Card Access Number.
//!
//! Only the elliptic-curve variant with generic mapping and AES-128 is supported, which is what
//! health cards of generation 2 and later announce in `EF.CardAccess`.


pub mod commands;
pub mod exchange;
pub mod kdf;
pub mod oids;
pub mod security_info;
pub mod trusted_channel;


use std::fmt;
use std::str::FromStr;

use digest::Digest;
use rasn::types::ObjectIdentifier;
use sha1::Sha1;
use subtle::ConstantTimeEq;
use zeroize_derive::ZeroizeOnDrop;

use crate::crypt::elliptic::PointError;
use crate::der_util::{oid_to_string, Asn1Error};
use crate::iso7816::apdu::ResponseStatus;
use crate::iso7816::card::CommunicationError;


/// The steps of a PACE negotiation, in the order in which they are performed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Step {
    SelectApplication,
    ParseSecurityInfo,
    SelectKeyReference,
    ObtainMappingNonce,
    FirstEphemeralRound,
    MapGenerator,
    SecondEphemeralRound,
    DeriveSharedSecret,
    ComputeAuthenticationTokens,
    MutualAuthenticate,
    EmitKey,
}
impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SelectApplication => "select application",
            Self::ParseSecurityInfo => "parse security info",
            Self::SelectKeyReference => "select key reference",
            Self::ObtainMappingNonce => "obtain mapping nonce",
            Self::FirstEphemeralRound => "first ephemeral round",
            Self::MapGenerator => "map generator",
            Self::SecondEphemeralRound => "second ephemeral round",
            Self::DeriveSharedSecret => "derive shared secret",
            Self::ComputeAuthenticationTokens => "compute authentication tokens",
            Self::MutualAuthenticate => "mutual authentication",
            Self::EmitKey => "emit key",
        };
        f.write_str(name)
    }
}


#[derive(Debug)]
pub enum Error {
    CardCommandFailed { step: Step, status: ResponseStatus },
    Transport { step: Step, error: CommunicationError },
    Asn1Decoding { step: Step, error: Asn1Error },
    SecurityInfoMissing,
    UnsupportedDomainParameters { parameter_id: Option<i64> },
    UnsupportedProtocol { protocol: ObjectIdentifier },
    InvalidPointEncoding { step: Step, error: PointError },
    InvalidPublicKey { step: Step },
    DiffieHellmanResult { step: Step },
    EphemeralKeysEqual,
    AuthenticationTokenMismatch,
    CredentialTimeout,
    CredentialUnavailable,
    Cancelled,
}
impl Error {
    /// The step at which the negotiation was aborted, if it had already started talking to the
    /// card.
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::CardCommandFailed { step, .. }
                | Self::Transport { step, .. }
                | Self::Asn1Decoding { step, .. }
                | Self::InvalidPointEncoding { step, .. }
                | Self::InvalidPublicKey { step }
                | Self::DiffieHellmanResult { step }
                => Some(*step),
            Self::SecurityInfoMissing
                | Self::UnsupportedDomainParameters { .. }
                | Self::UnsupportedProtocol { .. }
                => Some(Step::ParseSecurityInfo),
            Self::EphemeralKeysEqual => Some(Step::SecondEphemeralRound),
            Self::AuthenticationTokenMismatch => Some(Step::MutualAuthenticate),
            Self::CredentialTimeout
                | Self::CredentialUnavailable
                | Self::Cancelled
                => None,
        }
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::CardCommandFailed { step, status }
                => write!(f, "card answered {} during {}", status, step),
            Self::Transport { step, error }
                => write!(f, "communication with the card failed during {}: {}", step, error),
            Self::Asn1Decoding { step, error }
                => write!(f, "failed to decode card data during {}: {}", step, error),
            Self::SecurityInfoMissing
                => write!(f, "EF.CardAccess does not announce PACE"),
            Self::UnsupportedDomainParameters { parameter_id: Some(parameter_id) }
                => write!(f, "domain parameter identifier {} is not supported", parameter_id),
            Self::UnsupportedDomainParameters { parameter_id: None }
                => write!(f, "proprietary domain parameters are not supported"),
            Self::UnsupportedProtocol { protocol }
                => write!(f, "PACE protocol {} is not supported", oid_to_string(protocol)),
            Self::InvalidPointEncoding { step, error }
                => write!(f, "invalid point encoding during {}: {}", step, error),
            Self::InvalidPublicKey { step }
                => write!(f, "card public key received during {} is not on the curve", step),
            Self::DiffieHellmanResult { step }
                => write!(f, "invalid Diffie-Hellman result during {}", step),
            Self::EphemeralKeysEqual
                => write!(f, "terminal and card ephemeral public keys are equal"),
            Self::AuthenticationTokenMismatch
                => write!(f, "card authentication token does not match (wrong CAN?)"),
            Self::CredentialTimeout
                => write!(f, "no card access number was supplied in time"),
            Self::CredentialUnavailable
                => write!(f, "the card access number request was abandoned"),
            Self::Cancelled
                => write!(f, "the negotiation was cancelled"),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport { error, .. } => Some(error),
            Self::Asn1Decoding { error, .. } => Some(error),
            Self::InvalidPointEncoding { error, .. } => Some(error),
            _ => None,
        }
    }
}


/// The session keys established by PACE.
///
/// Both keys are wiped from memory when this value is dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct PaceKey {
    k_enc: [u8; 16],
    k_mac: [u8; 16],
}
impl PaceKey {
    pub(crate) fn new(k_enc: &[u8; 16], k_mac: &[u8; 16]) -> Self {
        Self {
            k_enc: *k_enc,
            k_mac: *k_mac,
        }
    }

    /// The key for encrypting secure messaging payloads.
    pub fn enc_key(&self) -> &[u8; 16] { &self.k_enc }

    /// The key for authenticating secure messaging payloads.
    pub fn mac_key(&self) -> &[u8; 16] { &self.k_mac }

    /// A short value that identifies the key pair without revealing it.
    ///
    /// Calculated as the first four bytes of `SHA-1(k_enc || k_mac)`.
    pub fn check_value(&self) -> [u8; 4] {
        let mut hasher = Sha1::new();
        hasher.update(self.k_enc);
        hasher.update(self.k_mac);
        let digest = hasher.finalize();

        let mut check_value = [0u8; 4];
        check_value.copy_from_slice(&digest[..4]);
        check_value
    }
}
impl fmt::Debug for PaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaceKey")
            .field("k_enc", &"<redacted>")
            .field("k_mac", &"<redacted>")
            .finish()
    }
}
impl PartialEq for PaceKey {
    fn eq(&self, other: &Self) -> bool {
        let enc_equal = self.k_enc.ct_eq(&other.k_enc);
        let mac_equal = self.k_mac.ct_eq(&other.k_mac);
        (enc_equal & mac_equal).into()
    }
}
impl Eq for PaceKey {}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum InvalidCardAccessNumber {
    Empty,
    NotNumeric,
}
impl fmt::Display for InvalidCardAccessNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "card access number is empty"),
            Self::NotNumeric => write!(f, "card access number must only contain the digits 0 to 9"),
        }
    }
}
impl std::error::Error for InvalidCardAccessNumber {
}


/// The Card Access Number printed on the card.
///
/// The number is wiped from memory when this value is dropped.
#[derive(Clone, Eq, PartialEq, ZeroizeOnDrop)]
pub struct CardAccessNumber {
    digits: String,
}
impl CardAccessNumber {
    pub fn new(digits: impl Into<String>) -> Result<Self, InvalidCardAccessNumber> {
        let can = Self { digits: digits.into() };
        if can.digits.is_empty() {
            return Err(InvalidCardAccessNumber::Empty);
        }
        if !can.digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidCardAccessNumber::NotNumeric);
        }
        Ok(can)
    }

    /// The ASCII digits, which are the password PACE derives its nonce key from.
    pub fn as_bytes(&self) -> &[u8] {
        self.digits.as_bytes()
    }
}
impl FromStr for CardAccessNumber {
    type Err = InvalidCardAccessNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
impl fmt::Debug for CardAccessNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardAccessNumber(<redacted>)")
    }
}
