//! Envelope for datagrams on the encrypted channel
//!
//! Each datagram is `IV || AES-256-CBC(PKCS7(payload))`, keyed with the
//! SHA-256 digest of a secret shared by both ends.

use std::fmt;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{thread_rng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encrypted datagram is too short or not a whole number of blocks")]
    Truncated,
    #[error("bad padding in decrypted datagram")]
    Padding,
}

/// Stateless encryption of whole datagrams
pub trait DatagramCipher: Send + Sync {
    fn encrypt(&self, plain: &[u8]) -> Vec<u8>;
    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

pub struct AesCbcCipher {
    key: [u8; 32],
}

impl AesCbcCipher {
    pub fn new(secret: &[u8]) -> AesCbcCipher {
        AesCbcCipher {
            key: Sha256::digest(secret).into(),
        }
    }
}

impl fmt::Debug for AesCbcCipher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("AesCbcCipher { .. }")
    }
}

impl DatagramCipher for AesCbcCipher {
    fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_SIZE];
        thread_rng().fill_bytes(&mut iv);
        let sealed =
            Aes256CbcEnc::new(&self.key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plain);

        let mut out = Vec::with_capacity(IV_SIZE + sealed.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&sealed);
        out
    }

    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < IV_SIZE + BLOCK_SIZE || (sealed.len() - IV_SIZE) % BLOCK_SIZE != 0 {
            return Err(CryptoError::Truncated);
        }
        let (iv, body) = sealed.split_at(IV_SIZE);
        let mut iv_block = [0u8; IV_SIZE];
        iv_block.copy_from_slice(iv);
        Aes256CbcDec::new(&self.key.into(), &iv_block.into())
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| CryptoError::Padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_and_open() {
        let cipher = AesCbcCipher::new(b"shared secret");
        let plain = b"\x06%\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00";
        let sealed = cipher.encrypt(plain);
        assert_eq!(sealed.len(), IV_SIZE + BLOCK_SIZE);
        assert_ne!(&sealed[IV_SIZE..], &plain[..]);
        assert_eq!(cipher.decrypt(&sealed).unwrap(), plain.to_vec());
    }

    #[test]
    fn fresh_iv_per_datagram() {
        let cipher = AesCbcCipher::new(b"shared secret");
        assert_ne!(cipher.encrypt(b"same"), cipher.encrypt(b"same"));
    }

    #[test]
    fn whole_block_gets_a_padding_block() {
        let cipher = AesCbcCipher::new(b"k");
        let sealed = cipher.encrypt(&[7u8; 32]);
        assert_eq!(sealed.len(), IV_SIZE + 48);
        assert_eq!(cipher.decrypt(&sealed).unwrap(), vec![7u8; 32]);
    }

    #[test]
    fn rejects_garbage() {
        let cipher = AesCbcCipher::new(b"shared secret");
        assert_eq!(cipher.decrypt(&[0u8; 20]), Err(CryptoError::Truncated));
        assert_eq!(cipher.decrypt(&[0u8; 8]), Err(CryptoError::Truncated));

        let other = AesCbcCipher::new(b"another secret");
        // a wrong key almost never yields valid padding; try a few datagrams
        let failures = (0..8)
            .map(|i| other.decrypt(&cipher.encrypt(&[i; 40])))
            .filter(|result| result.is_err())
            .count();
        assert!(failures > 0);
    }
}
