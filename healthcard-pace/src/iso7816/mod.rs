//! Smart card communication according to ISO/IEC 7816-4.


pub mod apdu;
pub mod card;
