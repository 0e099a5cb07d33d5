//! Key derivation function for PACE with AES-128.
//!
//! The KDF is equivalent to:
//! ```plain
//! keydata = sha1(key_seed || counter)[0..16]
//! ```
//! where `counter` is a 32-bit big-endian integer selecting the purpose of the key.


use digest::Digest;
use sha1::Sha1;
use zeroize::Zeroizing;


/// The length of derived keys in bytes.
pub const KEY_SIZE: usize = 16;


/// The purpose of a derived key.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum KdfMode {
    /// Session key for encryption.
    Encryption,

    /// Session key for message authentication.
    Mac,

    /// Key derived from the password, used to decrypt the nonce.
    Password,
}
impl KdfMode {
    pub const fn counter(&self) -> u32 {
        match self {
            Self::Encryption => 1,
            Self::Mac => 2,
            Self::Password => 3,
        }
    }
}


/// Derives a 16-byte key from the given seed for the given purpose.
pub fn derive_key(key_seed: &[u8], mode: KdfMode) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut hasher = Sha1::new();
    hasher.update(key_seed);
    hasher.update(mode.counter().to_be_bytes());
    let result = hasher.finalize();

    let mut keydata = Zeroizing::new([0u8; KEY_SIZE]);
    keydata.copy_from_slice(&result[..KEY_SIZE]);
    keydata
}
