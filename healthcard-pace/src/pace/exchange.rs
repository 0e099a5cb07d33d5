//! The terminal side of the PACE handshake.
//!
//! The negotiation runs as a chain of stages; each stage owns the secrets it needs and is consumed
//! by the step that produces the next one. Secrets are zeroized whenever a stage is dropped, which
//! includes every early return.


use crypto_bigint::BoxedUint;
use rand::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;
use tracing::{debug, instrument, trace};
use zeroize::Zeroizing;

use crate::crypt::boxed_uint_from_be_slice;
use crate::crypt::cipher_mac::{decrypt_block, truncated_cmac, BLOCK_SIZE};
use crate::crypt::elliptic::{fixed_width_be_bytes, AffinePoint, PrimeWeierstrassCurve};
use crate::der_util::{encode_tlv, unwrap_key_object, Asn1Error};
use crate::iso7816::apdu::{Apdu, Response};
use crate::iso7816::card::SmartCard;
use crate::pace::{CardAccessNumber, Error, PaceKey, Step};
use crate::pace::commands;
use crate::pace::kdf::{derive_key, KdfMode};
use crate::pace::security_info::SecurityInfo;


/// Tags of the data objects within the dynamic authentication data.
pub(crate) mod tags {
    pub const ENCRYPTED_NONCE: u8 = 0x80;
    pub const TERMINAL_MAPPING_KEY: u8 = 0x81;
    pub const CARD_MAPPING_KEY: u8 = 0x82;
    pub const TERMINAL_EPHEMERAL_KEY: u8 = 0x83;
    pub const CARD_EPHEMERAL_KEY: u8 = 0x84;
    pub const TERMINAL_TOKEN: u8 = 0x85;
    pub const CARD_TOKEN: u8 = 0x86;
}

/// Tag of the public point within an authentication token.
const TOKEN_POINT_TAG: u8 = 0x86;


/// Assembles the public key data object over which an authentication token is calculated.
///
/// ```plain
/// 7F49 LL
///   06 LL protocol_oid
///   86 LL 04 || X || Y
/// ```
pub(crate) fn authentication_token(protocol_bytes: &[u8], point_bytes: &[u8]) -> Vec<u8> {
    let mut inner_data = Vec::new();
    encode_tlv(&mut inner_data, &[0x06], protocol_bytes);
    encode_tlv(&mut inner_data, &[TOKEN_POINT_TAG], point_bytes);

    let mut token = Vec::new();
    encode_tlv(&mut token, &[0x7F, 0x49], &inner_data);
    token
}


/// Sends a command and returns the response if the card reports success.
fn transmit<C: SmartCard + ?Sized>(card: &mut C, step: Step, request: &Apdu) -> Result<Response, Error> {
    let response = card.communicate(request)
        .map_err(|error| Error::Transport { step, error })?;
    let status = response.status();
    trace!(%step, %status, "card responded");
    if !status.is_success() {
        return Err(Error::CardCommandFailed { step, status });
    }
    Ok(response)
}


/// Sends one GENERAL AUTHENTICATE command and extracts the value of the data object the card is
/// expected to answer with.
fn general_authenticate<C: SmartCard + ?Sized>(
    card: &mut C,
    step: Step,
    outgoing_tag: u8,
    outgoing_data: &[u8],
    last: bool,
    expected_tag: u8,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let request = commands::general_authenticate(outgoing_tag, outgoing_data, last);
    let response = transmit(card, step, &request)?;
    let (tag, value) = unwrap_key_object(&response.data)
        .map_err(|error| Error::Asn1Decoding { step, error })?;
    if tag != expected_tag {
        return Err(Error::Asn1Decoding {
            step,
            error: Asn1Error::UnexpectedTag { expected: expected_tag, obtained: tag },
        });
    }
    Ok(Zeroizing::new(value.to_vec()))
}


/// Decodes a public point sent by the card and makes sure it lies on the curve.
fn decode_card_point(curve: &PrimeWeierstrassCurve, step: Step, bytes: &[u8]) -> Result<AffinePoint, Error> {
    let point = curve.decode_point(bytes)
        .map_err(|error| Error::InvalidPointEncoding { step, error })?;
    if !bool::from(curve.is_on_curve_affine(&point)) {
        return Err(Error::InvalidPublicKey { step });
    }
    Ok(point)
}


/// Reads `EF.CardAccess` from the root application.
fn read_card_access<C: SmartCard + ?Sized>(card: &mut C) -> Result<Vec<u8>, Error> {
    let step = Step::SelectApplication;
    transmit(card, step, &commands::select_master_file())?;
    transmit(card, step, &commands::select_card_access())?;
    let response = transmit(card, step, &commands::read_binary())?;
    debug!(length = response.data.len(), "read EF.CardAccess");
    Ok(response.data)
}


/// The protocol has been chosen and announced to the card.
struct ProtocolSelected {
    protocol_bytes: Vec<u8>,
    curve: PrimeWeierstrassCurve,
}
impl ProtocolSelected {
    fn select<C: SmartCard + ?Sized>(card: &mut C, card_access: &[u8]) -> Result<Self, Error> {
        let info = SecurityInfo::parse(card_access)?;
        let named_curve = info.ensure_supported()?;
        debug!(protocol = %info.protocol_id(), curve = %named_curve, "selected PACE parameters");

        let protocol_bytes = info.protocol_bytes();
        let request = commands::set_authentication_template(&protocol_bytes, commands::CAN_PASSWORD_REFERENCE);
        transmit(card, Step::SelectKeyReference, &request)?;

        Ok(Self {
            protocol_bytes,
            curve: named_curve.curve(),
        })
    }

    fn obtain_nonce<C: SmartCard + ?Sized>(self, card: &mut C, password: &[u8]) -> Result<NonceObtained, Error> {
        let step = Step::ObtainMappingNonce;
        let encrypted_nonce = general_authenticate(card, step, tags::ENCRYPTED_NONCE, &[], false, tags::ENCRYPTED_NONCE)?;
        if encrypted_nonce.len() != BLOCK_SIZE {
            return Err(Error::Asn1Decoding { step, error: Asn1Error::InvalidLength });
        }

        // a wrong password does not fail here; it merely yields a different nonce
        let password_key = derive_key(password, KdfMode::Password);
        let mut nonce_bytes = Zeroizing::new([0u8; BLOCK_SIZE]);
        nonce_bytes.copy_from_slice(encrypted_nonce.as_slice());
        decrypt_block(&password_key, &mut nonce_bytes);
        debug!("decrypted mapping nonce");

        Ok(NonceObtained {
            selected: self,
            nonce: Zeroizing::new(boxed_uint_from_be_slice(&*nonce_bytes)),
        })
    }
}


/// The card's nonce has been decrypted.
struct NonceObtained {
    selected: ProtocolSelected,
    nonce: Zeroizing<BoxedUint>,
}
impl NonceObtained {
    fn map_generator<C: SmartCard + ?Sized>(self, card: &mut C, mapping_private_key: &BoxedUint) -> Result<GeneratorMapped, Error> {
        let curve = &self.selected.curve;

        let step = Step::FirstEphemeralRound;
        let public_key: Option<AffinePoint> = curve.calculate_public_key(mapping_private_key).into();
        let public_key = public_key.ok_or(Error::DiffieHellmanResult { step })?;
        let public_key_bytes = curve.encode_point(&public_key);
        let card_public_key_bytes = general_authenticate(
            card, step,
            tags::TERMINAL_MAPPING_KEY, &public_key_bytes, false,
            tags::CARD_MAPPING_KEY,
        )?;
        let card_public_key = decode_card_point(curve, step, &card_public_key_bytes)?;
        debug!("exchanged mapping public keys");

        let step = Step::MapGenerator;
        let shared_point: Option<AffinePoint> = curve.diffie_hellman(mapping_private_key, &card_public_key).into();
        let shared_point = shared_point.ok_or(Error::DiffieHellmanResult { step })?;
        let session_curve = curve.derive_generic_mapping_session_curve(&self.nonce, &shared_point)
            .ok_or(Error::DiffieHellmanResult { step })?;
        debug!("mapped generator");

        Ok(GeneratorMapped {
            protocol_bytes: self.selected.protocol_bytes,
            session_curve,
        })
    }
}


/// The session generator has been derived from the nonce and the mapping exchange.
struct GeneratorMapped {
    protocol_bytes: Vec<u8>,
    session_curve: PrimeWeierstrassCurve,
}
impl GeneratorMapped {
    fn agree<C: SmartCard + ?Sized>(self, card: &mut C, ephemeral_private_key: &BoxedUint) -> Result<SecretAgreed, Error> {
        let curve = &self.session_curve;

        let step = Step::SecondEphemeralRound;
        let public_key: Option<AffinePoint> = curve.calculate_public_key(ephemeral_private_key).into();
        let public_key = public_key.ok_or(Error::DiffieHellmanResult { step })?;
        let public_key_bytes = curve.encode_point(&public_key);
        let card_public_key_bytes = general_authenticate(
            card, step,
            tags::TERMINAL_EPHEMERAL_KEY, &public_key_bytes, false,
            tags::CARD_EPHEMERAL_KEY,
        )?;
        let card_public_key = curve.decode_point(&card_public_key_bytes)
            .map_err(|error| Error::InvalidPointEncoding { step, error })?;
        let card_public_key_bytes = curve.encode_point(&card_public_key);
        if bool::from(public_key_bytes.as_slice().ct_eq(card_public_key_bytes.as_slice())) {
            return Err(Error::EphemeralKeysEqual);
        }
        if !bool::from(curve.is_on_curve_affine(&card_public_key)) {
            return Err(Error::InvalidPublicKey { step });
        }
        debug!("exchanged ephemeral public keys");

        let step = Step::DeriveSharedSecret;
        let shared_point: Option<AffinePoint> = curve.diffie_hellman(ephemeral_private_key, &card_public_key).into();
        let shared_point = shared_point.ok_or(Error::DiffieHellmanResult { step })?;
        let shared_secret = fixed_width_be_bytes(shared_point.x(), curve.field_size_bytes());
        let k_enc = derive_key(&shared_secret, KdfMode::Encryption);
        let k_mac = derive_key(&shared_secret, KdfMode::Mac);
        debug!("derived session keys");

        Ok(SecretAgreed {
            protocol_bytes: self.protocol_bytes,
            public_key_bytes,
            card_public_key_bytes,
            k_enc,
            k_mac,
        })
    }
}


/// Both parties hold the session keys but have not yet proven it.
struct SecretAgreed {
    protocol_bytes: Vec<u8>,
    public_key_bytes: Zeroizing<Vec<u8>>,
    card_public_key_bytes: Zeroizing<Vec<u8>>,
    k_enc: Zeroizing<[u8; 16]>,
    k_mac: Zeroizing<[u8; 16]>,
}
impl SecretAgreed {
    fn authenticate<C: SmartCard + ?Sized>(self, card: &mut C) -> Result<PaceKey, Error> {
        // we authenticate the card's key, the card authenticates ours
        let outgoing_token = truncated_cmac(
            &self.k_mac,
            &authentication_token(&self.protocol_bytes, &self.card_public_key_bytes),
        );
        let expected_token = truncated_cmac(
            &self.k_mac,
            &authentication_token(&self.protocol_bytes, &self.public_key_bytes),
        );
        debug!(step = %Step::ComputeAuthenticationTokens, "calculated authentication tokens");

        let incoming_token = general_authenticate(
            card, Step::MutualAuthenticate,
            tags::TERMINAL_TOKEN, &*outgoing_token, true,
            tags::CARD_TOKEN,
        )?;
        if !bool::from(incoming_token.as_slice().ct_eq(expected_token.as_slice())) {
            return Err(Error::AuthenticationTokenMismatch);
        }
        debug!("card authenticated");

        Ok(PaceKey::new(&self.k_enc, &self.k_mac))
    }
}


/// Runs the handshake, obtaining each private key from `private_key` once the curve it is needed
/// on is known.
fn negotiate<C, F>(card: &mut C, password: &[u8], mut private_key: F) -> Result<PaceKey, Error>
where
    C: SmartCard + ?Sized,
    F: FnMut(&PrimeWeierstrassCurve) -> Zeroizing<BoxedUint>,
{
    let card_access = read_card_access(card)?;
    let selected = ProtocolSelected::select(card, &card_access)?;
    let nonce_obtained = selected.obtain_nonce(card, password)?;

    let mapping_private_key = private_key(&nonce_obtained.selected.curve);
    let mapped = nonce_obtained.map_generator(card, &mapping_private_key)?;

    let ephemeral_private_key = private_key(&mapped.session_curve);
    let agreed = mapped.agree(card, &ephemeral_private_key)?;

    let key = agreed.authenticate(card)?;
    debug!(step = %Step::EmitKey, "PACE established");
    Ok(key)
}


/// Negotiates PACE session keys with the card using its Card Access Number.
///
/// The private keys are drawn from `rng` and never leave this function.
#[instrument(skip_all)]
pub fn negotiate_pace_key<C, R>(card: &mut C, can: &CardAccessNumber, rng: &mut R) -> Result<PaceKey, Error>
where
    C: SmartCard + ?Sized,
    R: RngCore + CryptoRng,
{
    negotiate(card, can.as_bytes(), |curve| {
        let mut private_key_bytes = Zeroizing::new(vec![0u8; curve.field_size_bytes()]);
        rng.fill_bytes(private_key_bytes.as_mut_slice());
        Zeroizing::new(boxed_uint_from_be_slice(&private_key_bytes))
    })
}


/// Negotiates PACE session keys using specific private keys.
///
/// `password` is the secret the nonce key is derived from (the ASCII digits of a Card Access
/// Number); `mapping_private_key` and `ephemeral_private_key` are used in the first and second key
/// agreement, respectively. Only useful for known-answer tests.
#[instrument(skip_all)]
pub fn negotiate_pace_key_with_values<C: SmartCard + ?Sized>(
    card: &mut C,
    password: &[u8],
    mapping_private_key: &BoxedUint,
    ephemeral_private_key: &BoxedUint,
) -> Result<PaceKey, Error> {
    let mut private_keys = [mapping_private_key, ephemeral_private_key].into_iter();
    negotiate(card, password, |_curve| {
        let private_key = private_keys.next()
            .expect("handshake requests exactly two private keys");
        Zeroizing::new(private_key.clone())
    })
}


#[cfg(test)]
mod tests {
    use super::authentication_token;
    use hex_literal::hex;

    #[test]
    fn test_authentication_token_layout() {
        let point = [0xAB; 65];
        let token = authentication_token(&hex!("04007F00070202040202"), &point);
        assert_eq!(&token[..5], &hex!("7F49 4F 06 0A"));
        assert_eq!(&token[5..15], &hex!("04007F00070202040202"));
        assert_eq!(&token[15..17], &hex!("86 41"));
        assert_eq!(&token[17..], &point[..]);
    }
}
