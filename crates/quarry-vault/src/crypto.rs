//! Credential-file sealing.
//!
//! The file on disk is a JSON envelope over AES-256-CBC ciphertext; the
//! key is derived from the operator's secret with PBKDF2-HMAC-SHA256 at
//! no fewer than 100k iterations.

use crate::error::VaultError;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KDF_NAME: &str = "pbkdf2-sha256";
const MIN_ITERATIONS: u32 = 100_000;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    kdf: String,
    iterations: u32,
    salt: String,
    iv: String,
    ciphertext: String,
}

fn derive_key(secret: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, iterations, &mut key);
    key
}

/// Encrypt `plaintext` under `secret`, returning the JSON envelope.
///
/// Iteration counts below the 100k floor are raised to it.
pub(crate) fn seal_bytes(
    plaintext: &[u8],
    secret: &str,
    iterations: u32,
) -> Result<String, VaultError> {
    let iterations = iterations.max(MIN_ITERATIONS);
    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    rand::rng().fill_bytes(&mut iv);

    let key = derive_key(secret, &salt, iterations);
    let ciphertext =
        Aes256CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let envelope = Envelope {
        version: 1,
        kdf: KDF_NAME.to_string(),
        iterations,
        salt: BASE64.encode(salt),
        iv: BASE64.encode(iv),
        ciphertext: BASE64.encode(ciphertext),
    };
    serde_json::to_string_pretty(&envelope).map_err(VaultError::Parse)
}

/// Decrypt a JSON envelope produced by [`seal_bytes`].
pub(crate) fn open_bytes(envelope_json: &str, secret: &str) -> Result<Vec<u8>, VaultError> {
    let envelope: Envelope = serde_json::from_str(envelope_json)
        .map_err(|e| VaultError::Envelope(e.to_string()))?;
    if envelope.kdf != KDF_NAME {
        return Err(VaultError::UnsupportedKdf(envelope.kdf));
    }

    let salt = BASE64
        .decode(&envelope.salt)
        .map_err(|e| VaultError::Envelope(format!("salt: {e}")))?;
    let iv: [u8; 16] = BASE64
        .decode(&envelope.iv)
        .map_err(|e| VaultError::Envelope(format!("iv: {e}")))?
        .try_into()
        .map_err(|_| VaultError::Envelope("iv must be 16 bytes".to_string()))?;
    let ciphertext = BASE64
        .decode(&envelope.ciphertext)
        .map_err(|e| VaultError::Envelope(format!("ciphertext: {e}")))?;

    let key = derive_key(secret, &salt, envelope.iterations);
    Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| VaultError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let sealed = seal_bytes(b"[1,2,3]", "s3cret", 100_000).unwrap();
        let opened = open_bytes(&sealed, "s3cret").unwrap();
        assert_eq!(opened, b"[1,2,3]");
    }

    #[test]
    fn wrong_secret_fails_closed() {
        let sealed = seal_bytes(b"[1,2,3]", "s3cret", 100_000).unwrap();
        assert!(matches!(
            open_bytes(&sealed, "not-the-secret"),
            Err(VaultError::Decrypt)
        ));
    }

    #[test]
    fn iteration_floor_is_enforced() {
        let sealed = seal_bytes(b"x", "s3cret", 10).unwrap();
        let envelope: Envelope = serde_json::from_str(&sealed).unwrap();
        assert_eq!(envelope.iterations, 100_000);
    }

    #[test]
    fn foreign_kdf_is_rejected() {
        let sealed = seal_bytes(b"x", "s3cret", 100_000).unwrap();
        let tampered = sealed.replace("pbkdf2-sha256", "scrypt");
        assert!(matches!(
            open_bytes(&tampered, "s3cret"),
            Err(VaultError::UnsupportedKdf(_))
        ));
    }
}
