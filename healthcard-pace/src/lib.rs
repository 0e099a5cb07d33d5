//! PACE key negotiation with German health cards (eGK, HBA, SMC-B) using the Card Access Number.
//!
//! The entry points are [`pace::trusted_channel::TrustedChannelConstructor`], which obtains the
//! Card Access Number and runs the handshake asynchronously, and
//! [`pace::exchange::negotiate_pace_key`], which runs the handshake directly against a card.


pub mod crypt;
pub mod der_util;
pub mod iso7816;
pub mod pace;
pub mod simulator;


use std::fmt::Write;


/// Formats bytes as space-separated uppercase hexadecimal pairs, e.g. for logging APDUs.
pub fn hex_dump(buf: &[u8]) -> String {
    let mut ret = String::with_capacity(3 * buf.len());
    for (i, b) in buf.iter().enumerate() {
        if i > 0 {
            ret.push(' ');
        }
        write!(ret, "{:02X}", b)
            .expect("writing to a String never fails");
    }
    ret
}
