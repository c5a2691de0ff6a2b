//! Security primitives of the Green Book security suites.
//!
//! The initialization vector is 96 bits: the 8-byte system title (fixed
//! field) followed by the 4-byte invocation counter (invocation field). The
//! system title identifies a DLMS/COSEM identity; its leftmost 3 octets hold
//! the FLAG manufacturer id.
//!
//! DLMS truncates the GCM authentication tag to 12 bytes. GMAC is plain GCM
//! with all input supplied as additional authenticated data, keeping only
//! the tag.

use alloc::format;
use alloc::vec::Vec;

use aes::{Aes128, Aes256};
use aes_gcm::AesGcm;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_kw::Kek;
use cipher::Key;
use cipher::consts::U12;

use crate::error::Error;
use crate::security_control::SecurityControl;

/// DLMS uses a GCM tag length of 12, truncated from the default of 16.
pub const TAG_LENGTH: usize = 12;

/// AES-GCM with a 96-bit nonce and a 96-bit tag.
type Aes128Gcm = AesGcm<Aes128, U12, U12>;
type Aes256Gcm = AesGcm<Aes256, U12, U12>;

/// Checks that a key has the correct length for the given security suite:
/// suites 0 and 1 use AES-128, suite 2 uses AES-256.
pub fn validate_key(suite_id: u8, key: &[u8]) -> Result<(), Error> {
    let expected = match suite_id {
        0 | 1 => 16,
        2 => 32,
        suite => {
            return Err(Error::Protection(format!(
                "only security suite 0-2 is valid, got {suite}"
            )));
        }
    };
    if key.len() != expected {
        return Err(Error::Protection(format!(
            "key with length {} is not the correct length for use with security suite {suite_id}",
            key.len()
        )));
    }
    Ok(())
}

fn initialization_vector(system_title: &[u8; 8], invocation_counter: u32) -> [u8; 12] {
    let mut iv = [0u8; 12];
    iv[..8].copy_from_slice(system_title);
    iv[8..].copy_from_slice(&invocation_counter.to_be_bytes());
    iv
}

enum SuiteCipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

impl SuiteCipher {
    fn new(key: &[u8]) -> Self {
        match key.len() {
            16 => Self::Aes128(Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key))),
            _ => Self::Aes256(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))),
        }
    }

    fn seal(&self, iv: [u8; 12], aad: &[u8], buffer: &mut [u8]) -> Result<[u8; 12], Error> {
        let tag = match self {
            Self::Aes128(cipher) => cipher.encrypt_in_place_detached(&iv.into(), aad, buffer),
            Self::Aes256(cipher) => cipher.encrypt_in_place_detached(&iv.into(), aad, buffer),
        }
        .map_err(|_| Error::Decryption)?;
        Ok(tag.into())
    }

    fn open(&self, iv: [u8; 12], aad: &[u8], buffer: &mut [u8], tag: &[u8]) -> Result<(), Error> {
        if tag.len() != TAG_LENGTH {
            return Err(Error::Decryption);
        }
        let mut tag_array = [0u8; TAG_LENGTH];
        tag_array.copy_from_slice(tag);
        match self {
            Self::Aes128(cipher) => {
                cipher.decrypt_in_place_detached(&iv.into(), aad, buffer, &tag_array.into())
            }
            Self::Aes256(cipher) => {
                cipher.decrypt_in_place_detached(&iv.into(), aad, buffer, &tag_array.into())
            }
        }
        .map_err(|_| Error::Decryption)
    }
}

/// Applies authenticated encryption to `plain_text` per the security
/// control. Returns ciphertext followed by the 12-byte tag.
///
/// When the control byte is encrypted (with or without authentication) the
/// additional authenticated data is the control byte and the authentication
/// key. When it is authenticated-only the payload itself moves into the
/// authenticated data and is returned unencrypted.
pub fn encrypt(
    security_control: SecurityControl,
    system_title: &[u8; 8],
    invocation_counter: u32,
    key: &[u8],
    auth_key: &[u8],
    plain_text: &[u8],
) -> Result<Vec<u8>, Error> {
    if !security_control.encryption() && !security_control.authentication() {
        return Err(Error::Protection(format!(
            "security control 0x{:02x} requests no protection",
            security_control.to_byte()
        )));
    }
    validate_key(security_control.suite_id(), key)?;
    validate_key(security_control.suite_id(), auth_key)?;

    let iv = initialization_vector(system_title, invocation_counter);
    let cipher = SuiteCipher::new(key);

    let mut aad = Vec::with_capacity(1 + auth_key.len() + plain_text.len());
    aad.push(security_control.to_byte());
    aad.extend_from_slice(auth_key);

    let mut out = plain_text.to_vec();
    let tag = if security_control.encryption() {
        cipher.seal(iv, &aad, &mut out)?
    } else {
        // Authenticated-only: the whole APDU is associated data.
        aad.extend_from_slice(plain_text);
        cipher.seal(iv, &aad, &mut [])?
    };
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Reverses [`encrypt`]. The last 12 bytes of `cipher_text` are the tag; a
/// mismatch is a fatal [`Error::Decryption`].
pub fn decrypt(
    security_control: SecurityControl,
    system_title: &[u8; 8],
    invocation_counter: u32,
    key: &[u8],
    auth_key: &[u8],
    cipher_text: &[u8],
) -> Result<Vec<u8>, Error> {
    if !security_control.encryption() && !security_control.authentication() {
        return Err(Error::Protection(format!(
            "security control 0x{:02x} requests no protection",
            security_control.to_byte()
        )));
    }
    validate_key(security_control.suite_id(), key)?;
    validate_key(security_control.suite_id(), auth_key)?;
    if cipher_text.len() < TAG_LENGTH {
        return Err(Error::Decryption);
    }

    let iv = initialization_vector(system_title, invocation_counter);
    let cipher = SuiteCipher::new(key);
    let (body, tag) = cipher_text.split_at(cipher_text.len() - TAG_LENGTH);

    let mut aad = Vec::with_capacity(1 + auth_key.len() + body.len());
    aad.push(security_control.to_byte());
    aad.extend_from_slice(auth_key);

    let mut out = body.to_vec();
    if security_control.encryption() {
        cipher.open(iv, &aad, &mut out, tag)?;
    } else {
        aad.extend_from_slice(body);
        cipher.open(iv, &aad, &mut [], tag)?;
    }
    Ok(out)
}

/// Computes the GMAC over a challenge: GCM with an empty plaintext and
/// AAD = security-control byte, authentication key and challenge. Returns
/// the bare 12-byte tag.
pub fn gmac(
    security_control: SecurityControl,
    system_title: &[u8; 8],
    invocation_counter: u32,
    key: &[u8],
    auth_key: &[u8],
    challenge: &[u8],
) -> Result<Vec<u8>, Error> {
    if security_control.encryption() {
        return Err(Error::Protection(format!(
            "security control 0x{:02x} requests encryption, but GMAC only authenticates",
            security_control.to_byte()
        )));
    }
    validate_key(security_control.suite_id(), key)?;
    validate_key(security_control.suite_id(), auth_key)?;

    let iv = initialization_vector(system_title, invocation_counter);
    let cipher = SuiteCipher::new(key);

    let mut aad = Vec::with_capacity(1 + auth_key.len() + challenge.len());
    aad.push(security_control.to_byte());
    aad.extend_from_slice(auth_key);
    aad.extend_from_slice(challenge);

    let tag = cipher.seal(iv, &aad, &mut [])?;
    Ok(tag.to_vec())
}

/// Wraps a key for transfer per RFC 3394.
pub fn wrap_key(suite_id: u8, wrapping_key: &[u8], key_to_wrap: &[u8]) -> Result<Vec<u8>, Error> {
    validate_key(suite_id, wrapping_key)?;
    validate_key(suite_id, key_to_wrap)?;

    let mut out = alloc::vec![0u8; key_to_wrap.len() + 8];
    match wrapping_key.len() {
        16 => Kek::<Aes128>::from(*Key::<Aes128>::from_slice(wrapping_key))
            .wrap(key_to_wrap, &mut out),
        _ => Kek::<Aes256>::from(*Key::<Aes256>::from_slice(wrapping_key))
            .wrap(key_to_wrap, &mut out),
    }
    .map_err(|err| Error::Protection(format!("key wrap failed: {err}")))?;
    Ok(out)
}

/// Unwraps a key received per RFC 3394.
pub fn unwrap_key(suite_id: u8, wrapping_key: &[u8], wrapped_key: &[u8]) -> Result<Vec<u8>, Error> {
    validate_key(suite_id, wrapping_key)?;
    if wrapped_key.len() < 16 {
        return Err(Error::Protection(format!(
            "wrapped key with length {} is too short",
            wrapped_key.len()
        )));
    }

    let mut out = alloc::vec![0u8; wrapped_key.len() - 8];
    match wrapping_key.len() {
        16 => Kek::<Aes128>::from(*Key::<Aes128>::from_slice(wrapping_key))
            .unwrap(wrapped_key, &mut out),
        _ => Kek::<Aes256>::from(*Key::<Aes256>::from_slice(wrapping_key))
            .unwrap(wrapped_key, &mut out),
    }
    .map_err(|_| Error::Decryption)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCRYPTION_KEY: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
        0x0F,
    ];
    const AUTHENTICATION_KEY: [u8; 16] = [
        0xD0, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE,
        0xDF,
    ];
    const SYSTEM_TITLE: [u8; 8] = [0x4D, 0x4D, 0x4D, 0x00, 0x00, 0xBC, 0x61, 0x4E];
    const INVOCATION_COUNTER: u32 = 0x01234567;

    // GET-Request for attribute 2 of the clock object.
    const PLAIN: [u8; 13] = [
        0xC0, 0x01, 0x00, 0x00, 0x08, 0x00, 0x00, 0x01, 0x00, 0x00, 0xFF, 0x02, 0x00,
    ];
    // Green Book example of the authenticated encryption above.
    const CIPHERED: [u8; 25] = [
        0x41, 0x13, 0x12, 0xFF, 0x93, 0x5A, 0x47, 0x56, 0x68, 0x27, 0xC4, 0x67, 0xBC, 0x7D, 0x82,
        0x5C, 0x3B, 0xE4, 0xA7, 0x7C, 0x3F, 0xCC, 0x05, 0x6B, 0x6B,
    ];

    #[test]
    fn test_encrypt_green_book_vector() {
        let sc = SecurityControl::with_protection(0, true, true);
        assert_eq!(sc.to_byte(), 0x30);
        let out = encrypt(
            sc,
            &SYSTEM_TITLE,
            INVOCATION_COUNTER,
            &ENCRYPTION_KEY,
            &AUTHENTICATION_KEY,
            &PLAIN,
        )
        .unwrap();
        assert_eq!(out, CIPHERED);
    }

    #[test]
    fn test_decrypt_green_book_vector() {
        let sc = SecurityControl::with_protection(0, true, true);
        let out = decrypt(
            sc,
            &SYSTEM_TITLE,
            INVOCATION_COUNTER,
            &ENCRYPTION_KEY,
            &AUTHENTICATION_KEY,
            &CIPHERED,
        )
        .unwrap();
        assert_eq!(out, PLAIN);
    }

    #[test]
    fn test_roundtrip() {
        let sc = SecurityControl::with_protection(0, true, true);
        let key = b"SUCHINSECUREKIND";
        let text = b"SUPER_SECRET_TEXT";

        let ciphered = encrypt(sc, b"12345678", 1, key, key, text).unwrap();
        let out = decrypt(sc, b"12345678", 1, key, key, &ciphered).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let sc = SecurityControl::with_protection(0, true, true);
        let mut ciphered = CIPHERED;
        ciphered[0] ^= 0x01;
        assert!(matches!(
            decrypt(
                sc,
                &SYSTEM_TITLE,
                INVOCATION_COUNTER,
                &ENCRYPTION_KEY,
                &AUTHENTICATION_KEY,
                &ciphered,
            ),
            Err(Error::Decryption)
        ));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let sc = SecurityControl::with_protection(0, true, true);
        let mut ciphered = CIPHERED;
        let last = ciphered.len() - 1;
        ciphered[last] ^= 0x80;
        assert!(matches!(
            decrypt(
                sc,
                &SYSTEM_TITLE,
                INVOCATION_COUNTER,
                &ENCRYPTION_KEY,
                &AUTHENTICATION_KEY,
                &ciphered,
            ),
            Err(Error::Decryption)
        ));
    }

    #[test]
    fn test_wrong_auth_key_fails() {
        let sc = SecurityControl::with_protection(0, true, true);
        let mut wrong_auth_key = AUTHENTICATION_KEY;
        wrong_auth_key[0] ^= 0x01;
        assert!(matches!(
            decrypt(
                sc,
                &SYSTEM_TITLE,
                INVOCATION_COUNTER,
                &ENCRYPTION_KEY,
                &wrong_auth_key,
                &CIPHERED,
            ),
            Err(Error::Decryption)
        ));
    }

    #[test]
    fn test_authenticated_only_keeps_plaintext() {
        let sc = SecurityControl::with_protection(0, true, false);
        let out = encrypt(
            sc,
            &SYSTEM_TITLE,
            INVOCATION_COUNTER,
            &ENCRYPTION_KEY,
            &AUTHENTICATION_KEY,
            &PLAIN,
        )
        .unwrap();
        assert_eq!(&out[..PLAIN.len()], &PLAIN);
        assert_eq!(out.len(), PLAIN.len() + TAG_LENGTH);

        let back = decrypt(
            sc,
            &SYSTEM_TITLE,
            INVOCATION_COUNTER,
            &ENCRYPTION_KEY,
            &AUTHENTICATION_KEY,
            &out,
        )
        .unwrap();
        assert_eq!(back, PLAIN);
    }

    #[test]
    fn test_gmac_is_tag_only() {
        let sc = SecurityControl::with_protection(0, true, false);
        let tag = gmac(
            sc,
            &SYSTEM_TITLE,
            INVOCATION_COUNTER,
            &ENCRYPTION_KEY,
            &AUTHENTICATION_KEY,
            b"P6wRJ21F",
        )
        .unwrap();
        assert_eq!(tag.len(), TAG_LENGTH);

        // A different challenge must change the tag.
        let other = gmac(
            sc,
            &SYSTEM_TITLE,
            INVOCATION_COUNTER,
            &ENCRYPTION_KEY,
            &AUTHENTICATION_KEY,
            b"P6wRJ21G",
        )
        .unwrap();
        assert_ne!(tag, other);
    }

    #[test]
    fn test_gmac_rejects_encryption_bit() {
        let sc = SecurityControl::with_protection(0, true, true);
        assert!(gmac(
            sc,
            &SYSTEM_TITLE,
            INVOCATION_COUNTER,
            &ENCRYPTION_KEY,
            &AUTHENTICATION_KEY,
            b"challenge"
        )
        .is_err());
    }

    #[test]
    fn test_key_wrap_rfc3394_vector() {
        // RFC 3394 section 4.1
        let kek: [u8; 16] = [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
            0x0E, 0x0F,
        ];
        let key: [u8; 16] = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ];
        let expected: [u8; 24] = [
            0x1F, 0xA6, 0x8B, 0x0A, 0x81, 0x12, 0xB4, 0x47, 0xAE, 0xF3, 0x4B, 0xD8, 0xFB, 0x5A,
            0x7B, 0x82, 0x9D, 0x3E, 0x86, 0x23, 0x71, 0xD2, 0xCF, 0xE5,
        ];

        let wrapped = wrap_key(0, &kek, &key).unwrap();
        assert_eq!(wrapped, expected);
        let unwrapped = unwrap_key(0, &kek, &wrapped).unwrap();
        assert_eq!(unwrapped, key);
    }

    #[test]
    fn test_key_length_validation() {
        assert!(validate_key(0, &[0u8; 16]).is_ok());
        assert!(validate_key(1, &[0u8; 16]).is_ok());
        assert!(validate_key(2, &[0u8; 32]).is_ok());
        assert!(validate_key(0, &[0u8; 32]).is_err());
        assert!(validate_key(2, &[0u8; 16]).is_err());
        assert!(validate_key(3, &[0u8; 16]).is_err());
    }

    #[test]
    fn test_suite_2_roundtrip() {
        let sc = SecurityControl::with_protection(2, true, true);
        let key = [0x42u8; 32];
        let ciphered = encrypt(sc, &SYSTEM_TITLE, 7, &key, &key, &PLAIN).unwrap();
        let out = decrypt(sc, &SYSTEM_TITLE, 7, &key, &key, &ciphered).unwrap();
        assert_eq!(out, PLAIN);
    }
}
