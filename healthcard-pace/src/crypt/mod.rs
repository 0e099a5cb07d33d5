//! Cryptographic functionality.


pub mod cipher_mac;
pub mod elliptic;


use crypto_bigint::BoxedUint;


/// Interprets a byte slice as an unsigned big-endian integer whose precision matches the slice.
pub fn boxed_uint_from_be_slice(slice: &[u8]) -> BoxedUint {
    // from_be_slice only fails if the slice is longer than the precision
    let bits = u32::try_from(8 * slice.len().max(1))
        .expect("slice too long for an integer");
    BoxedUint::from_be_slice(slice, bits)
        .expect("precision matches slice length")
}


/// Interprets a byte slice as an unsigned big-endian integer with the given precision.
///
/// Returns `None` if the value does not fit.
pub fn boxed_uint_with_precision(slice: &[u8], bits_precision: u32) -> Option<BoxedUint> {
    let significant = match slice.iter().position(|b| *b != 0x00) {
        Some(first_nonzero) => &slice[first_nonzero..],
        None => &[],
    };
    if significant.len() * 8 > usize::try_from(bits_precision).ok()? {
        return None;
    }
    BoxedUint::from_be_slice(significant, bits_precision).ok()
}
