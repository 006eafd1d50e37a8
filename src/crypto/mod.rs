//! Key derivation for encrypted archives.
//!
//! RAR3 derives an AES-128 key and IV from the password and an 8-byte
//! salt with an iterated SHA-1 scheme ("s2k"); RAR5 uses
//! PBKDF2-HMAC-SHA256 with a per-archive iteration count. Derivation is
//! deliberately slow, so each archive keeps a single-slot memo of the
//! last derivation.

mod header_decrypt;

pub use header_decrypt::HeaderDecrypt;

use pbkdf2::pbkdf2_hmac;
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::{
    checksum,
    error::{Error, RarResult},
};

/// RAR3 string-to-key: AES-128 key and IV from password and salt.
///
/// The seed is the UTF-16LE password followed by the salt. A single
/// SHA-1 context absorbs `seed ++ counter` for 16 * 0x4000 counters
/// (three little-endian bytes each); at the start of each 0x4000 chunk
/// the last byte of the running digest becomes one IV byte. The first
/// 16 digest bytes, reordered from big- to little-endian words, form
/// the key.
pub fn rar3_s2k(password: &str, salt: &[u8; 8]) -> ([u8; 16], [u8; 16]) {
    const CHUNK: u32 = 0x4000;

    let mut seed = Vec::with_capacity(password.len() * 2 + salt.len());
    for unit in password.encode_utf16() {
        seed.extend_from_slice(&unit.to_le_bytes());
    }
    seed.extend_from_slice(salt);

    let mut hasher = Sha1::new();
    let mut iv = [0u8; 16];

    for i in 0..16u32 {
        for j in 0..CHUNK {
            let counter = (i * CHUNK + j).to_le_bytes();
            hasher.update(&seed);
            hasher.update(&counter[..3]);

            if j == 0 {
                let digest = hasher.clone().finalize();
                iv[i as usize] = digest[19];
            }
        }
    }

    let digest = hasher.finalize();
    let mut key = [0u8; 16];
    for word in 0..4 {
        let be = u32::from_be_bytes(digest[word * 4..word * 4 + 4].try_into().unwrap());
        key[word * 4..word * 4 + 4].copy_from_slice(&be.to_le_bytes());
    }

    (key, iv)
}

/// Iteration counts above 2^24 take minutes and only appear in
/// hostile archives.
const MAX_KDF_COUNT: u8 = 24;

/// Derive the RAR5 AES-256 key.
pub fn rar5_kdf(password: &str, salt: &[u8; 16], kdf_count: u8) -> RarResult<[u8; 32]> {
    if kdf_count > MAX_KDF_COUNT {
        return Err(Error::bad(format!("KDF count {kdf_count} too large")));
    }

    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, 1 << kdf_count, &mut key);
    Ok(key)
}

/// Compute the 8-byte password check of a RAR5 encryption record.
///
/// The PBKDF2 accumulator continued for 32 extra rounds past the key
/// yields a 32-byte value that is XOR-folded into 8 bytes.
pub fn rar5_password_check(password: &str, salt: &[u8; 16], kdf_count: u8) -> RarResult<[u8; 8]> {
    if kdf_count > MAX_KDF_COUNT {
        return Err(Error::bad(format!("KDF count {kdf_count} too large")));
    }

    let mut value = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, (1 << kdf_count) + 32, &mut value);

    let mut check = [0u8; 8];
    for (i, byte) in value.iter().enumerate() {
        check[i % 8] ^= byte;
    }
    Ok(check)
}

/// Validate a password against a stored 12-byte check value.
///
/// The trailing four bytes are the CRC-32 of the check proper; if they
/// do not match, the stored value is damaged and no verdict is given.
pub fn verify_password(
    password: &str,
    salt: &[u8; 16],
    kdf_count: u8,
    stored: &[u8; 12],
) -> RarResult<()> {
    let (check, crc) = stored.split_at(8);

    if crc != checksum::crc32(check).to_le_bytes().as_slice() {
        return Ok(());
    }

    if check != rar5_password_check(password, salt, kdf_count)?.as_slice() {
        return Err(Error::WrongPassword);
    }

    Ok(())
}

/// Single-slot memo of the most recent key derivation, scoped to one
/// archive. Volumes of the same archive reuse the salt, so this saves
/// the repeated multi-thousand-round derivations.
#[derive(Debug, Default, Clone)]
pub struct KeyMemo {
    rar3: Option<(String, [u8; 8], [u8; 16], [u8; 16])>,
    rar5: Option<(String, [u8; 16], u8, [u8; 32])>,
}

impl KeyMemo {
    pub fn rar3_key(&mut self, password: &str, salt: &[u8; 8]) -> ([u8; 16], [u8; 16]) {
        if let Some((p, s, key, iv)) = &self.rar3 {
            if p == password && s == salt {
                return (*key, *iv);
            }
        }

        let (key, iv) = rar3_s2k(password, salt);
        self.rar3 = Some((password.to_owned(), *salt, key, iv));
        (key, iv)
    }

    pub fn rar5_key(
        &mut self,
        password: &str,
        salt: &[u8; 16],
        kdf_count: u8,
    ) -> RarResult<[u8; 32]> {
        if let Some((p, s, c, key)) = &self.rar5 {
            if p == password && s == salt && *c == kdf_count {
                return Ok(*key);
            }
        }

        let key = rar5_kdf(password, salt, kdf_count)?;
        self.rar5 = Some((password.to_owned(), *salt, kdf_count, key));
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pbkdf2_sha256_known_vector() {
        // RFC-style test vector for PBKDF2-HMAC-SHA256, c = 1.
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(b"password", b"salt", 1, &mut key);
        assert_eq!(
            key,
            [
                0x12, 0x0f, 0xb6, 0xcf, 0xfc, 0xf8, 0xb3, 0x2c, 0x43, 0xe7, 0x22, 0x52, 0x56,
                0xc4, 0xf8, 0x37, 0xa8, 0x65, 0x48, 0xc9, 0x2c, 0xcc, 0x35, 0x48, 0x08, 0x05,
                0x98, 0x7c, 0xb7, 0x0b, 0xe1, 0x7b
            ]
        );
    }

    #[test]
    fn s2k_is_deterministic_and_salt_sensitive() {
        let (key_a, iv_a) = rar3_s2k("password", b"\x01\x02\x03\x04\x05\x06\x07\x08");
        let (key_b, iv_b) = rar3_s2k("password", b"\x01\x02\x03\x04\x05\x06\x07\x08");
        let (key_c, _) = rar3_s2k("password", b"\x09\x02\x03\x04\x05\x06\x07\x08");

        assert_eq!((key_a, iv_a), (key_b, iv_b));
        assert_ne!(key_a, key_c);
    }

    #[test]
    fn memo_avoids_rederivation() {
        let mut memo = KeyMemo::default();
        let first = memo.rar3_key("pw", b"saltsalt");
        let second = memo.rar3_key("pw", b"saltsalt");
        assert_eq!(first, second);
    }

    #[test]
    fn check_value_round_trip() {
        let salt = [7u8; 16];
        let check = rar5_password_check("password", &salt, 4).unwrap();

        let mut stored = [0u8; 12];
        stored[..8].copy_from_slice(&check);
        stored[8..].copy_from_slice(&checksum::crc32(&check).to_le_bytes());

        assert!(verify_password("password", &salt, 4, &stored).is_ok());
        assert!(matches!(
            verify_password("hunter2", &salt, 4, &stored),
            Err(Error::WrongPassword)
        ));
    }

    #[test]
    fn oversized_kdf_count_is_rejected() {
        assert!(rar5_kdf("pw", &[0; 16], 40).is_err());
    }
}
