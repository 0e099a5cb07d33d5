//! A health card simulator that answers PACE on the card's side.
//!
//! The simulator serves `EF.CardAccess`, encrypts a fresh nonce with the key derived from its Card
//! Access Number, takes part in both key agreements, and returns its authentication token. Any
//! step can be made to fail with a chosen status word.


use std::collections::BTreeMap;
use std::fmt;

use crypto_bigint::BoxedUint;
use rand::{RngCore, SeedableRng};
use rand::rngs::StdRng;
use subtle::ConstantTimeEq;
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::crypt::boxed_uint_from_be_slice;
use crate::crypt::cipher_mac::{encrypt_block, truncated_cmac, BLOCK_SIZE};
use crate::crypt::elliptic::{fixed_width_be_bytes, AffinePoint, PrimeWeierstrassCurve};
use crate::crypt::elliptic::curves::NamedCurve;
use crate::der_util::{encode_tlv, unwrap_key_object};
use crate::iso7816::apdu::{Apdu, Response, ResponseStatus};
use crate::iso7816::card::{CommunicationError, SmartCard};
use crate::pace::{CardAccessNumber, PaceKey, Step};
use crate::pace::commands::{CARD_ACCESS_FILE_ID, DYNAMIC_AUTHENTICATION_DATA};
use crate::pace::exchange::{authentication_token, tags};
use crate::pace::kdf::{derive_key, KdfMode};
use crate::pace::oids::PACE_ECDH_GM_AES_CBC_CMAC_128;
use crate::pace::security_info::SecurityInfo;


/// Status word for command data the card cannot process.
const WRONG_DATA: ResponseStatus = ResponseStatus::Unknown(0x6A80);

/// Status word for unsupported instructions.
const INSTRUCTION_NOT_SUPPORTED: ResponseStatus = ResponseStatus::Unknown(0x6D00);


/// The card's progress through the protocol.
enum Phase {
    Idle,
    TemplateSet,
    NonceSent {
        nonce: Zeroizing<BoxedUint>,
    },
    GeneratorMapped {
        session_curve: PrimeWeierstrassCurve,
    },
    SecretAgreed {
        public_key_bytes: Zeroizing<Vec<u8>>,
        terminal_public_key_bytes: Zeroizing<Vec<u8>>,
        k_enc: Zeroizing<[u8; 16]>,
        k_mac: Zeroizing<[u8; 16]>,
    },
}


/// A simulated health card speaking PACE with a fixed Card Access Number.
pub struct SimulatedHealthCard {
    can: CardAccessNumber,
    named_curve: NamedCurve,
    card_access: Vec<u8>,
    rng: StdRng,
    card_access_selected: bool,
    phase: Phase,
    failures: BTreeMap<Step, ResponseStatus>,
    received_steps: Vec<Step>,
    terminal_public_keys: Vec<Vec<u8>>,
    mapped_generators: Vec<Vec<u8>>,
    terminal_authenticated: bool,
    established_key: Option<PaceKey>,
}
impl SimulatedHealthCard {
    /// A card on BrainpoolP256r1, as issued today.
    pub fn new(can: CardAccessNumber) -> Self {
        Self::with_curve(can, NamedCurve::BrainpoolP256r1)
    }

    pub fn with_curve(can: CardAccessNumber, named_curve: NamedCurve) -> Self {
        let info = SecurityInfo::new(
            PACE_ECDH_GM_AES_CBC_CMAC_128.to_owned(),
            Some(named_curve.parameter_id()),
        );
        Self::with_card_access(can, named_curve, info.to_card_access())
    }

    /// A card that publishes the given `EF.CardAccess` contents but calculates on `named_curve`.
    pub fn with_card_access(can: CardAccessNumber, named_curve: NamedCurve, card_access: Vec<u8>) -> Self {
        Self {
            can,
            named_curve,
            card_access,
            rng: StdRng::from_entropy(),
            card_access_selected: false,
            phase: Phase::Idle,
            failures: BTreeMap::new(),
            received_steps: Vec::new(),
            terminal_public_keys: Vec::new(),
            mapped_generators: Vec::new(),
            terminal_authenticated: false,
            established_key: None,
        }
    }

    /// Answers every command belonging to `step` with `status` instead of processing it.
    pub fn fail_at(mut self, step: Step, status: ResponseStatus) -> Self {
        self.failures.insert(step, status);
        self
    }

    /// The step of every command received so far, in order.
    pub fn received_steps(&self) -> &[Step] { &self.received_steps }

    /// The encoded public keys the terminal sent in both key agreements, in order.
    pub fn terminal_public_keys(&self) -> &[Vec<u8>] { &self.terminal_public_keys }

    /// The encoded generators the card mapped, one per negotiation.
    pub fn mapped_generators(&self) -> &[Vec<u8>] { &self.mapped_generators }

    /// Whether the terminal's authentication token was correct in the last negotiation.
    pub fn terminal_authenticated(&self) -> bool { self.terminal_authenticated }

    /// The keys the card derived, once the terminal has authenticated itself.
    pub fn established_key(&self) -> Option<&PaceKey> { self.established_key.as_ref() }

    fn curve(&self) -> PrimeWeierstrassCurve {
        self.named_curve.curve()
    }

    fn random_scalar(&mut self, curve: &PrimeWeierstrassCurve) -> Zeroizing<BoxedUint> {
        let mut bytes = Zeroizing::new(vec![0u8; curve.field_size_bytes()]);
        self.rng.fill_bytes(bytes.as_mut_slice());
        Zeroizing::new(boxed_uint_from_be_slice(&bytes))
    }

    /// Determines which step of the terminal's handshake a command belongs to.
    fn classify(&self, request: &Apdu) -> Step {
        match request.header.ins {
            0x22 => Step::SelectKeyReference,
            0x86 => match self.phase {
                Phase::Idle|Phase::TemplateSet => Step::ObtainMappingNonce,
                Phase::NonceSent { .. } => Step::FirstEphemeralRound,
                Phase::GeneratorMapped { .. } => Step::SecondEphemeralRound,
                Phase::SecretAgreed { .. } => Step::MutualAuthenticate,
            },
            _ => Step::SelectApplication,
        }
    }

    fn respond(&mut self, request: &Apdu) -> Response {
        match request.header.ins {
            0xA4 => self.select(request),
            0xB0 => self.read_binary(),
            0x22 => self.set_authentication_template(request),
            0x86 => self.general_authenticate(request),
            _ => Response::new(Vec::new(), INSTRUCTION_NOT_SUPPORTED),
        }
    }

    fn select(&mut self, request: &Apdu) -> Response {
        self.card_access_selected = request.data.request_data() == Some(&CARD_ACCESS_FILE_ID[..]);
        Response::new(Vec::new(), ResponseStatus::Success)
    }

    fn read_binary(&self) -> Response {
        if !self.card_access_selected {
            return Response::new(Vec::new(), ResponseStatus::ConditionsNotSatisfied);
        }
        Response::new(self.card_access.clone(), ResponseStatus::Success)
    }

    fn set_authentication_template(&mut self, request: &Apdu) -> Response {
        let Some(data) = request.data.request_data() else {
            return Response::new(Vec::new(), WRONG_DATA);
        };
        let mut expected = Vec::new();
        let protocol = SecurityInfo::new(PACE_ECDH_GM_AES_CBC_CMAC_128.to_owned(), None);
        encode_tlv(&mut expected, &[0x80], &protocol.protocol_bytes());
        encode_tlv(&mut expected, &[0x83], &[0x02]);
        if data != expected.as_slice() {
            return Response::new(Vec::new(), ResponseStatus::KeyNotFound);
        }

        // a new negotiation starts
        self.phase = Phase::TemplateSet;
        self.terminal_authenticated = false;
        self.established_key = None;
        Response::new(Vec::new(), ResponseStatus::Success)
    }

    fn general_authenticate(&mut self, request: &Apdu) -> Response {
        let data = request.data.request_data().unwrap_or(&[]);
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        let outcome = match phase {
            Phase::Idle => Err(ResponseStatus::ConditionsNotSatisfied),
            Phase::TemplateSet => self.send_nonce(data),
            Phase::NonceSent { nonce } => self.map_generator(data, &nonce),
            Phase::GeneratorMapped { session_curve } => self.agree(data, &session_curve),
            Phase::SecretAgreed { public_key_bytes, terminal_public_key_bytes, k_enc, k_mac }
                => self.authenticate(data, &public_key_bytes, &terminal_public_key_bytes, &k_enc, &k_mac),
        };
        match outcome {
            Ok((phase, response_tag, response_value)) => {
                self.phase = phase;
                let mut data_object = Vec::new();
                encode_tlv(&mut data_object, &[response_tag], &response_value);
                let mut response_data = Vec::new();
                encode_tlv(&mut response_data, &[DYNAMIC_AUTHENTICATION_DATA], &data_object);
                Response::new(response_data, ResponseStatus::Success)
            },
            Err(status) => Response::new(Vec::new(), status),
        }
    }

    /// Extracts the value of the data object the terminal is expected to send.
    fn terminal_data<'d>(data: &'d [u8], expected_tag: u8) -> Result<&'d [u8], ResponseStatus> {
        match unwrap_key_object(data) {
            Ok((tag, value)) if tag == expected_tag => Ok(value),
            _ => Err(WRONG_DATA),
        }
    }

    fn send_nonce(&mut self, data: &[u8]) -> Result<(Phase, u8, Zeroizing<Vec<u8>>), ResponseStatus> {
        if data != [DYNAMIC_AUTHENTICATION_DATA, 0x00] {
            return Err(WRONG_DATA);
        }

        let mut nonce_bytes = Zeroizing::new([0u8; BLOCK_SIZE]);
        self.rng.fill_bytes(nonce_bytes.as_mut_slice());
        let nonce = Zeroizing::new(boxed_uint_from_be_slice(&*nonce_bytes));

        let password_key = derive_key(self.can.as_bytes(), KdfMode::Password);
        let mut encrypted_nonce = Zeroizing::new(*nonce_bytes);
        encrypt_block(&password_key, &mut encrypted_nonce);
        debug!("card sent encrypted nonce");

        Ok((Phase::NonceSent { nonce }, tags::ENCRYPTED_NONCE, Zeroizing::new(encrypted_nonce.to_vec())))
    }

    fn map_generator(&mut self, data: &[u8], nonce: &BoxedUint) -> Result<(Phase, u8, Zeroizing<Vec<u8>>), ResponseStatus> {
        let curve = self.curve();
        let terminal_bytes = Self::terminal_data(data, tags::TERMINAL_MAPPING_KEY)?;
        let terminal_public_key = curve.decode_point(terminal_bytes)
            .map_err(|_| WRONG_DATA)?;
        self.terminal_public_keys.push(terminal_bytes.to_vec());

        let private_key = self.random_scalar(&curve);
        let public_key: Option<AffinePoint> = curve.calculate_public_key(&private_key).into();
        let public_key = public_key.ok_or(WRONG_DATA)?;
        let shared_point: Option<AffinePoint> = curve.diffie_hellman(&private_key, &terminal_public_key).into();
        let shared_point = shared_point.ok_or(WRONG_DATA)?;
        let session_curve = curve.derive_generic_mapping_session_curve(nonce, &shared_point)
            .ok_or(WRONG_DATA)?;
        self.mapped_generators.push(session_curve.encode_point(session_curve.generator()).to_vec());
        debug!("card mapped generator");

        Ok((Phase::GeneratorMapped { session_curve }, tags::CARD_MAPPING_KEY, curve.encode_point(&public_key)))
    }

    fn agree(&mut self, data: &[u8], session_curve: &PrimeWeierstrassCurve) -> Result<(Phase, u8, Zeroizing<Vec<u8>>), ResponseStatus> {
        let terminal_bytes = Self::terminal_data(data, tags::TERMINAL_EPHEMERAL_KEY)?;
        let terminal_public_key = session_curve.decode_point(terminal_bytes)
            .map_err(|_| WRONG_DATA)?;
        self.terminal_public_keys.push(terminal_bytes.to_vec());

        let private_key = self.random_scalar(session_curve);
        let public_key: Option<AffinePoint> = session_curve.calculate_public_key(&private_key).into();
        let public_key = public_key.ok_or(WRONG_DATA)?;
        let shared_point: Option<AffinePoint> = session_curve.diffie_hellman(&private_key, &terminal_public_key).into();
        let shared_point = shared_point.ok_or(WRONG_DATA)?;

        let shared_secret = fixed_width_be_bytes(shared_point.x(), session_curve.field_size_bytes());
        let public_key_bytes = session_curve.encode_point(&public_key);
        debug!("card derived session keys");

        let phase = Phase::SecretAgreed {
            public_key_bytes: public_key_bytes.clone(),
            terminal_public_key_bytes: session_curve.encode_point(&terminal_public_key),
            k_enc: derive_key(&shared_secret, KdfMode::Encryption),
            k_mac: derive_key(&shared_secret, KdfMode::Mac),
        };
        Ok((phase, tags::CARD_EPHEMERAL_KEY, public_key_bytes))
    }

    fn authenticate(
        &mut self,
        data: &[u8],
        public_key_bytes: &[u8],
        terminal_public_key_bytes: &[u8],
        k_enc: &[u8; 16],
        k_mac: &[u8; 16],
    ) -> Result<(Phase, u8, Zeroizing<Vec<u8>>), ResponseStatus> {
        let protocol_bytes = SecurityInfo::new(PACE_ECDH_GM_AES_CBC_CMAC_128.to_owned(), None)
            .protocol_bytes();
        let terminal_token = Self::terminal_data(data, tags::TERMINAL_TOKEN)?;
        let expected_token = truncated_cmac(k_mac, &authentication_token(&protocol_bytes, public_key_bytes));
        self.terminal_authenticated = terminal_token.ct_eq(expected_token.as_slice()).into();
        if self.terminal_authenticated {
            self.established_key = Some(PaceKey::new(k_enc, k_mac));
        }
        debug!(terminal_authenticated = self.terminal_authenticated, "card checked terminal token");

        // the card answers with its token either way; the terminal detects the mismatch
        let token = truncated_cmac(k_mac, &authentication_token(&protocol_bytes, terminal_public_key_bytes));
        Ok((Phase::Idle, tags::CARD_TOKEN, Zeroizing::new(token.to_vec())))
    }
}
impl fmt::Debug for SimulatedHealthCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedHealthCard")
            .field("named_curve", &self.named_curve)
            .field("received_steps", &self.received_steps)
            .field("terminal_authenticated", &self.terminal_authenticated)
            .finish_non_exhaustive()
    }
}
impl SmartCard for SimulatedHealthCard {
    fn communicate(&mut self, request: &Apdu) -> Result<Response, CommunicationError> {
        let step = self.classify(request);
        self.received_steps.push(step);
        trace!(%step, ins = request.header.ins, "simulated card received command");

        if let Some(status) = self.failures.get(&step) {
            self.phase = Phase::Idle;
            return Ok(Response::new(Vec::new(), *status));
        }
        Ok(self.respond(request))
    }
}
