use digest::Digest;
use hex_literal::hex;
use healthcard_pace::crypt::boxed_uint_from_be_slice;
use healthcard_pace::iso7816::apdu::{Apdu, Response, ResponseStatus, ResponseTrailer};
use healthcard_pace::iso7816::card::{CommunicationError, SmartCard};
use healthcard_pace::pace::{Error, Step};
use healthcard_pace::pace::exchange::negotiate_pace_key_with_values;
use healthcard_pace::pace::kdf::{derive_key, KdfMode};
use sha1::Sha1;


/// A fake smart card that acts exactly like the card in ICAO Doc 9303 Part 11 Appendix G.1.
///
/// The card publishes the health card `EF.CardAccess` and expects the CAN as password reference.
/// If any of its expectations are not met, it responds with 0x69 0x88.
struct AppendixG1Card {
    state: u8,
    mutual_response: [u8; 12],
}
impl AppendixG1Card {
    const CARD_ACCESS: [u8; 22] = hex!("31143012060A04007F0007020204020202010202010D");
    const EXPECTED_MSE_SET_AT_PAYLOAD: [u8; 15] = hex!("80 0A 04 00 7F 00 07 02 02 04 02 02 83 01 02");
    const EXPECTED_GA_INITIAL_PAYLOAD: [u8; 2] = hex!("7C 00");
    const GA_INITIAL_RESPONSE: [u8; 20] = hex!("7C 12 80 10 95 A3 A0 16 52 2E E9 8D 01 E7 6C B6 B9 8B 42 C3");
    const EXPECTED_GA_MAPPING_PAYLOAD: [u8; 69] = hex!("
        7C 43 81 41 04 7A CF 3E FC 98 2E C4 55 65 A4 B1 55
        12 9E FB C7 46 50 DC BF A6 36 2D 89 6F C7 02 62 E0 C2 CC 5E 54 45
        52 DC B6 72 52 18 79 91 15 B5 5C 9B AA 6D 9F 6B C3 A9 61 8E 70 C2
        5A F7 17 77 A9 C4 92 2D
    ");
    const GA_MAPPING_RESPONSE: [u8; 69] = hex!("
        7C 43 82 41 04 82 4F BA 91 C9 CB E2 6B EF 53 A0 EB E7 34 2A 3B F1
        78 CE A9 F4 5D E0 B7 0A A6 01 65 1F BA 3F 57 30 D8 C8 79 AA A9 C9
        F7 39 91 E6 1B 58 F4 D5 2E B8 7A 0A 0C 70 9A 49 DC 63 71 93 63 CC
        D1 3C 54
    ");
    const EXPECTED_GA_AGREEMENT_PAYLOAD: [u8; 69] = hex!("
        7C 43 83 41 04 2D B7 A6 4C 03 55 04 4E C9 DF 19
        05 14 C6 25 CB A2 CE A4 87 54 88 71 22 F3 A5 EF 0D 5E DD 30 1C
        35 56 F3 B3 B1 86 DF 10 B8 57 B5 8F 6A 7E B8 0F 20 BA 5D C7 BE
        1D 43 D9 BF 85 01 49 FB B3 64 62
    ");
    const GA_AGREEMENT_RESPONSE: [u8; 69] = hex!("
        7C 43 84 41 04 9E 88 0F 84 29 05 B8 B3 18 1F 7A F7 CA A9 F0 EF
        B7 43 84 7F 44 A3 06 D2 D2 8C 1D 9E C6 5D F6 DB 77 64 B2 22 77
        A2 ED DC 3C 26 5A 9F 01 8F 9C B8 52 E1 11 B7 68 B3 26 90 4B 59
        A0 19 37 76 F0 94
    ");
    const EXPECTED_GA_MUTUAL_PAYLOAD: [u8; 12] = hex!("7C 0A 85 08 C2 B0 BD 78 D9 4B A8 66");
    const GA_MUTUAL_RESPONSE: [u8; 12] = hex!("7C 0A 86 08 3A BB 96 74 BC E9 3C 08");

    pub const fn new() -> Self {
        Self {
            state: 0,
            mutual_response: Self::GA_MUTUAL_RESPONSE,
        }
    }

    /// A card that answers the final step with a manipulated token.
    pub const fn with_mutual_response(mutual_response: [u8; 12]) -> Self {
        Self {
            state: 0,
            mutual_response,
        }
    }

    fn success(data: &[u8]) -> Response {
        Response { data: data.to_vec(), trailer: ResponseTrailer::new(0x90, 0x00) }
    }
}
impl SmartCard for AppendixG1Card {
    fn communicate(&mut self, request: &Apdu) -> Result<Response, CommunicationError> {
        let header = request.header.to_be_u32();
        let request_data = request.data.request_data();
        let chained_ga = header == 0x10_86_00_00 && request.data.response_data_length() == Some(0x100);

        if header == 0x00_A4_04_0C && request_data.is_none() {
            self.state = 1;
            Ok(Self::success(&[]))
        } else if self.state == 1 && header == 0x00_A4_02_0C && request_data == Some(&[0x01, 0x1C]) {
            self.state = 2;
            Ok(Self::success(&[]))
        } else if self.state == 2 && header == 0x00_B0_00_00 && request.data.response_data_length() == Some(0x100) {
            self.state = 3;
            Ok(Self::success(&Self::CARD_ACCESS))
        } else if self.state == 3
                && header == 0x00_22_C1_A4
                && request_data == Some(&Self::EXPECTED_MSE_SET_AT_PAYLOAD)
                && request.data.response_data_length().is_none() {
            self.state = 4;
            Ok(Self::success(&[]))
        } else if self.state == 4 && chained_ga && request_data == Some(&Self::EXPECTED_GA_INITIAL_PAYLOAD) {
            self.state = 5;
            Ok(Self::success(&Self::GA_INITIAL_RESPONSE))
        } else if self.state == 5 && chained_ga && request_data == Some(&Self::EXPECTED_GA_MAPPING_PAYLOAD) {
            self.state = 6;
            Ok(Self::success(&Self::GA_MAPPING_RESPONSE))
        } else if self.state == 6 && chained_ga && request_data == Some(&Self::EXPECTED_GA_AGREEMENT_PAYLOAD) {
            self.state = 7;
            Ok(Self::success(&Self::GA_AGREEMENT_RESPONSE))
        } else if self.state == 7
                && header == 0x00_86_00_00 // no more chaining
                && request_data == Some(&Self::EXPECTED_GA_MUTUAL_PAYLOAD)
                && request.data.response_data_length() == Some(0x100) {
            self.state = 8;
            Ok(Self::success(&self.mutual_response))
        } else {
            Ok(Response {
                data: Vec::with_capacity(0),
                trailer: ResponseTrailer::new(0x69, 0x88),
            })
        }
    }
}


const MRZ_DATA: [u8; 24] = *b"T22000129364081251010318";
const MAPPING_PRIVATE_KEY: [u8; 32] = hex!("
    7F4EF07B 9EA82FD7 8AD689B3 8D0BC78C
    F21F249D 953BC46F 4C6E1925 9C010F99
");
const EPHEMERAL_PRIVATE_KEY: [u8; 32] = hex!("
    A73FB703 AC1436A1 8E0CFA5A BB3F7BEC
    7A070E7A 6788486B EE230C4A 22762595
");
const SHARED_SECRET: [u8; 32] = hex!("
    28768D20 701247DA E81804C9 E780EDE5
    82A9996D B4A31502 0B273319 7DB84925
");


/// The example derives its nonce key from the hash of the MRZ information.
fn password() -> Vec<u8> {
    Sha1::digest(MRZ_DATA).to_vec()
}


#[test]
fn test_pace_setup_appg1() {
    let mut card = AppendixG1Card::new();

    let key = negotiate_pace_key_with_values(
        &mut card,
        &password(),
        &boxed_uint_from_be_slice(&MAPPING_PRIVATE_KEY),
        &boxed_uint_from_be_slice(&EPHEMERAL_PRIVATE_KEY),
    ).expect("failed to establish PACE");
    assert_eq!(card.state, 8);

    assert_eq!(key.enc_key(), &*derive_key(&SHARED_SECRET, KdfMode::Encryption));
    assert_eq!(key.mac_key(), &*derive_key(&SHARED_SECRET, KdfMode::Mac));
}

#[test]
fn test_manipulated_card_token_appg1() {
    let mut manipulated = AppendixG1Card::GA_MUTUAL_RESPONSE;
    manipulated[11] ^= 0x01;
    let mut card = AppendixG1Card::with_mutual_response(manipulated);

    let result = negotiate_pace_key_with_values(
        &mut card,
        &password(),
        &boxed_uint_from_be_slice(&MAPPING_PRIVATE_KEY),
        &boxed_uint_from_be_slice(&EPHEMERAL_PRIVATE_KEY),
    );
    assert!(matches!(result, Err(Error::AuthenticationTokenMismatch)));
    assert_eq!(card.state, 8);
}

#[test]
fn test_wrong_password_appg1() {
    let mut card = AppendixG1Card::new();

    // the nonce decrypts to a different value, so the mapped generator and thereby the second
    // public key differ from what the card expects
    let result = negotiate_pace_key_with_values(
        &mut card,
        b"123456",
        &boxed_uint_from_be_slice(&MAPPING_PRIVATE_KEY),
        &boxed_uint_from_be_slice(&EPHEMERAL_PRIVATE_KEY),
    );
    match result {
        Err(Error::CardCommandFailed { step, status }) => {
            assert_eq!(step, Step::SecondEphemeralRound);
            assert_eq!(status, ResponseStatus::Unknown(0x6988));
        },
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(card.state, 6);
}
