//! Command APDUs issued during PACE.


use crate::der_util::encode_tlv;
use crate::iso7816::apdu::{Apdu, CommandHeader, Data};


/// File identifier of `EF.CardAccess`.
pub const CARD_ACCESS_FILE_ID: [u8; 2] = [0x01, 0x1C];

/// Password reference of the Card Access Number in MSE: Set AT.
pub const CAN_PASSWORD_REFERENCE: u8 = 0x02;

/// Tag of the dynamic authentication data object wrapping GENERAL AUTHENTICATE payloads.
pub const DYNAMIC_AUTHENTICATION_DATA: u8 = 0x7C;

const INS_SELECT: u8 = 0xA4;
const INS_READ_BINARY: u8 = 0xB0;
const INS_MANAGE_SECURITY_ENVIRONMENT: u8 = 0x22;
const INS_GENERAL_AUTHENTICATE: u8 = 0x86;

const CLA_LAST_IN_CHAIN: u8 = 0b000_0_00_00;
const CLA_CHAINED: u8 = 0b000_1_00_00;


/// SELECT of the root application without requesting file control information.
pub fn select_master_file() -> Apdu {
    Apdu {
        header: CommandHeader {
            cla: CLA_LAST_IN_CHAIN,
            ins: INS_SELECT,
            p1: 0x04, // select by DF name
            p2: 0x0C, // no response data
        },
        data: Data::NoData,
    }
}


pub fn select_card_access() -> Apdu {
    Apdu {
        header: CommandHeader {
            cla: CLA_LAST_IN_CHAIN,
            ins: INS_SELECT,
            p1: 0x02, // EF under the current DF
            p2: 0x0C, // no response data
        },
        data: Data::RequestDataShort { request_data: CARD_ACCESS_FILE_ID.to_vec() },
    }
}


/// READ BINARY of the currently selected file from offset 0, requesting up to 256 bytes.
pub fn read_binary() -> Apdu {
    Apdu {
        header: CommandHeader {
            cla: CLA_LAST_IN_CHAIN,
            ins: INS_READ_BINARY,
            p1: 0x00,
            p2: 0x00,
        },
        data: Data::ResponseDataShort { response_data_length: 0 },
    }
}


/// MANAGE SECURITY ENVIRONMENT: Set AT, choosing the PACE protocol and the password.
///
/// `protocol_bytes` are the DER value bytes of the protocol's object identifier.
pub fn set_authentication_template(protocol_bytes: &[u8], password_reference: u8) -> Apdu {
    let mut request_data = Vec::new();
    encode_tlv(&mut request_data, &[0x80], protocol_bytes); // cryptographic mechanism
    encode_tlv(&mut request_data, &[0x83], &[password_reference]);

    Apdu {
        header: CommandHeader {
            cla: CLA_LAST_IN_CHAIN,
            ins: INS_MANAGE_SECURITY_ENVIRONMENT,
            p1: 0b1100_0001, // verify/encrypt/extauth, compute/decrypt/intauth, set
            p2: 0xA4, // control reference template for authentication
        },
        data: Data::RequestDataShort { request_data },
    }
}


/// GENERAL AUTHENTICATE carrying a single data object within the dynamic authentication data.
///
/// An empty `data` sends the empty wrapper `7C 00`. All but the final command of the protocol are
/// flagged as chained.
pub fn general_authenticate(tag: u8, data: &[u8], last: bool) -> Apdu {
    let mut request_data = Vec::new();
    if data.is_empty() {
        request_data.extend([DYNAMIC_AUTHENTICATION_DATA, 0x00]);
    } else {
        let mut data_object = Vec::new();
        encode_tlv(&mut data_object, &[tag], data);
        encode_tlv(&mut request_data, &[DYNAMIC_AUTHENTICATION_DATA], &data_object);
    }

    Apdu {
        header: CommandHeader {
            cla: if last { CLA_LAST_IN_CHAIN } else { CLA_CHAINED },
            ins: INS_GENERAL_AUTHENTICATE,
            p1: 0x00, // algorithm is known (from "set authentication template")
            p2: 0x00, // key is known (from "set authentication template")
        },
        data: Data::BothDataShort {
            request_data,
            response_data_length: 0,
        },
    }
}
