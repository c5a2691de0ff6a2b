//! Authentication mechanisms for association setup.
//!
//! LLS sends a password in the AARQ. The HLS mechanisms exchange random
//! challenges in AARQ/AARE and prove possession of the secret afterwards
//! with an ACTION to method 1 of the Association-LN object. HLS-GMAC proves
//! it with a GMAC over the peer's challenge; the older "common" HLS
//! (mechanism 2) encrypts the challenge with AES-128-ECB.

use alloc::vec::Vec;

use aes::Aes128;
use aes::cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};

use crate::error::Error;

/// Generates a random client-to-meter challenge. The Green Book allows 8 to
/// 64 bytes.
pub fn make_client_to_server_challenge(length: usize) -> Result<Vec<u8>, Error> {
    if !(8..=64).contains(&length) {
        return Err(Error::Protection(alloc::format!(
            "client to server challenge must be between 8 and 64 bytes, got {length}"
        )));
    }
    let mut challenge = alloc::vec![0u8; length];
    getrandom::getrandom(&mut challenge)
        .map_err(|err| Error::Protection(alloc::format!("challenge generation failed: {err}")))?;
    Ok(challenge)
}

/// AES-128-ECB of `challenge` under the zero-padded shared secret, as used
/// by the common HLS mechanism (auth method 2) in older meters. The
/// challenge is zero padded up to a block boundary.
pub fn common_hls_digest(secret: &[u8], challenge: &[u8]) -> Result<Vec<u8>, Error> {
    if secret.len() > 16 {
        return Err(Error::Protection(alloc::format!(
            "common HLS secret must be at most 16 bytes, got {}",
            secret.len()
        )));
    }
    let mut key = [0u8; 16];
    key[..secret.len()].copy_from_slice(secret);
    let cipher = Aes128::new(GenericArray::from_slice(&key));

    let mut out = challenge.to_vec();
    out.resize(challenge.len().div_ceil(16) * 16, 0);
    for block in out.chunks_exact_mut(16) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_length_limits() {
        assert!(make_client_to_server_challenge(7).is_err());
        assert!(make_client_to_server_challenge(65).is_err());
        assert_eq!(make_client_to_server_challenge(8).unwrap().len(), 8);
        assert_eq!(make_client_to_server_challenge(64).unwrap().len(), 64);
    }

    #[test]
    fn test_challenges_differ() {
        let a = make_client_to_server_challenge(16).unwrap();
        let b = make_client_to_server_challenge(16).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_common_hls_digest_is_deterministic() {
        let secret = b"12345678";
        let challenge = [0xA5u8; 16];
        let first = common_hls_digest(secret, &challenge).unwrap();
        let second = common_hls_digest(secret, &challenge).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 16);
    }

    #[test]
    fn test_common_hls_digest_pads_to_block() {
        let out = common_hls_digest(b"secret", &[0x01u8; 20]).unwrap();
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn test_common_hls_digest_depends_on_secret() {
        let challenge = [0x5Au8; 16];
        let a = common_hls_digest(b"secret-a", &challenge).unwrap();
        let b = common_hls_digest(b"secret-b", &challenge).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_common_hls_rejects_long_secret() {
        assert!(common_hls_digest(&[0u8; 17], &[0u8; 16]).is_err());
    }
}
