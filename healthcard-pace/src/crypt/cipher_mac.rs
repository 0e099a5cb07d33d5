//! AES-128 primitives used during PACE.
//!
//! The nonce is encrypted as a single block without chaining; the authentication tokens are
//! CMAC with AES-128 truncated to the initial 8 bytes.


use aes::Aes128;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use cipher::generic_array::GenericArray;
use cmac::{Cmac, Mac};
use zeroize::Zeroizing;


/// The AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// The length of a truncated CMAC in bytes.
pub const MAC_SIZE: usize = 8;


/// Decrypts a single AES-128 block in place.
pub fn decrypt_block(key: &[u8; 16], block: &mut [u8; BLOCK_SIZE]) {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    cipher.decrypt_block(GenericArray::from_mut_slice(block));
}


/// Encrypts a single AES-128 block in place.
pub fn encrypt_block(key: &[u8; 16], block: &mut [u8; BLOCK_SIZE]) {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    cipher.encrypt_block(GenericArray::from_mut_slice(block));
}


/// Calculates CMAC with AES-128 over the data and truncates it to the initial 8 bytes.
pub fn truncated_cmac(key: &[u8; 16], data: &[u8]) -> Zeroizing<[u8; MAC_SIZE]> {
    let mut mac = <Cmac<Aes128> as KeyInit>::new(GenericArray::from_slice(key));
    mac.update(data);
    let full_mac = mac.finalize().into_bytes();

    let mut truncated = Zeroizing::new([0u8; MAC_SIZE]);
    truncated.copy_from_slice(&full_mac[..MAC_SIZE]);
    truncated
}
