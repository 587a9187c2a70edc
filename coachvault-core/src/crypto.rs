//! Passphrase-based authenticated encryption for sealed archives.
//!
//! Key: Argon2id(passphrase, 16-byte random salt) -> 32 bytes.
//! Cipher: AES-256-GCM with a 12-byte random nonce. The associated data is a
//! format tag, the cipher parameters and a caller-supplied header, so none of
//! them can be altered without failing authentication. Salt, nonce and KDF
//! cost parameters travel in the archive metadata.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use zeroize::Zeroizing;

use crate::metadata::CipherParams;
use crate::{Result, VaultError};

pub const AES_KEY_LENGTH: usize = 32;
pub const AES_GCM_NONCE_LENGTH: usize = 12;
pub const AES_GCM_TAG_LENGTH: usize = 16;
pub const SALT_LENGTH: usize = 16;

pub const CIPHER_ALGORITHM: &str = "aes-256-gcm";
pub const KDF_ALGORITHM: &str = "argon2id";

const ARCHIVE_AAD: &[u8] = b"coachvault/archive/v1";

// Upper bounds accepted from archive metadata.
const MAX_MEMORY_KIB: u32 = 1 << 20;
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 16;

/// Caller-supplied passphrase, wiped from memory on drop.
#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    /// Wrap a passphrase. Empty or whitespace-only input is rejected.
    pub fn new<S: Into<String>>(value: S) -> Result<Self> {
        let value = Zeroizing::new(value.into());
        if value.trim().is_empty() {
            return Err(VaultError::validation("passphrase cannot be empty"));
        }
        Ok(Self(value))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }

    fn from_cipher(cipher: &CipherParams) -> Self {
        Self::new(cipher.memory_kib, cipher.iterations, cipher.parallelism)
    }

    /// Reject parameters argon2 cannot use or that would make opening an
    /// untrusted archive unreasonably expensive.
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 || self.parallelism > MAX_PARALLELISM {
            return Err(VaultError::validation(format!(
                "KDF parallelism must be within 1-{MAX_PARALLELISM}, got {}",
                self.parallelism
            )));
        }
        if self.iterations == 0 || self.iterations > MAX_ITERATIONS {
            return Err(VaultError::validation(format!(
                "KDF iterations must be within 1-{MAX_ITERATIONS}, got {}",
                self.iterations
            )));
        }
        if self.memory_kib < 8 * self.parallelism || self.memory_kib > MAX_MEMORY_KIB {
            return Err(VaultError::validation(format!(
                "KDF memory must be within {}-{MAX_MEMORY_KIB} KiB, got {}",
                8 * self.parallelism,
                self.memory_kib
            )));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::new(
            Params::DEFAULT_M_COST,
            Params::DEFAULT_T_COST,
            Params::DEFAULT_P_COST,
        )
    }
}

fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf)
        .map_err(|e| VaultError::encryption(format!("random source unavailable: {e}")))?;
    Ok(buf)
}

fn associated_data(cipher: &CipherParams, header: &[u8]) -> Result<Vec<u8>> {
    let mut aad = ARCHIVE_AAD.to_vec();
    aad.extend(serde_json::to_vec(cipher)?);
    aad.extend_from_slice(header);
    Ok(aad)
}

fn derive_key(
    passphrase: &Passphrase,
    salt: &[u8],
    params: &KdfParams,
) -> std::result::Result<Zeroizing<[u8; AES_KEY_LENGTH]>, String> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(AES_KEY_LENGTH),
    )
    .map_err(|e| format!("invalid KDF parameters: {e}"))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    argon
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| format!("key derivation failed: {e}"))?;
    Ok(key)
}

/// Encrypt `plaintext` under a key derived from `passphrase`.
///
/// `header` is authenticated but not encrypted; [`open`] must be given the
/// same bytes. Returns the ciphertext (with appended tag) and the parameters
/// needed to open it again.
pub fn seal(
    plaintext: &[u8],
    header: &[u8],
    passphrase: &Passphrase,
    params: &KdfParams,
) -> Result<(Vec<u8>, CipherParams)> {
    params.validate()?;
    let salt: [u8; SALT_LENGTH] = random_bytes()?;
    let nonce_bytes: [u8; AES_GCM_NONCE_LENGTH] = random_bytes()?;

    let key = derive_key(passphrase, &salt, params).map_err(VaultError::encryption)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| VaultError::encryption(e.to_string()))?;

    let cipher_params = CipherParams {
        algorithm: CIPHER_ALGORITHM.to_string(),
        kdf: KDF_ALGORITHM.to_string(),
        memory_kib: params.memory_kib,
        iterations: params.iterations,
        parallelism: params.parallelism,
        salt: STANDARD.encode(salt),
        nonce: STANDARD.encode(nonce_bytes),
    };
    let aad = associated_data(&cipher_params, header)?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| VaultError::encryption(e.to_string()))?;

    Ok((ciphertext, cipher_params))
}

/// Authenticate and decrypt `ciphertext`. Every failure is a
/// [`VaultError::Decryption`].
pub fn open(
    ciphertext: &[u8],
    header: &[u8],
    passphrase: &Passphrase,
    cipher: &CipherParams,
) -> Result<Vec<u8>> {
    if cipher.algorithm != CIPHER_ALGORITHM {
        return Err(VaultError::decryption(format!(
            "unsupported cipher '{}'",
            cipher.algorithm
        )));
    }
    if cipher.kdf != KDF_ALGORITHM {
        return Err(VaultError::decryption(format!(
            "unsupported key derivation '{}'",
            cipher.kdf
        )));
    }
    if ciphertext.len() < AES_GCM_TAG_LENGTH {
        return Err(VaultError::decryption("encrypted data too short"));
    }

    let params = KdfParams::from_cipher(cipher);
    params
        .validate()
        .map_err(|e| VaultError::decryption(e.to_string()))?;

    let salt = STANDARD
        .decode(&cipher.salt)
        .map_err(|e| VaultError::decryption(format!("invalid salt encoding: {e}")))?;
    let nonce_bytes = STANDARD
        .decode(&cipher.nonce)
        .map_err(|e| VaultError::decryption(format!("invalid nonce encoding: {e}")))?;
    if nonce_bytes.len() != AES_GCM_NONCE_LENGTH {
        return Err(VaultError::decryption(format!(
            "invalid nonce length: expected {AES_GCM_NONCE_LENGTH} bytes, got {}",
            nonce_bytes.len()
        )));
    }

    let aad =
        associated_data(cipher, header).map_err(|e| VaultError::decryption(e.to_string()))?;
    let key = derive_key(passphrase, &salt, &params).map_err(VaultError::decryption)?;
    let aead = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| VaultError::decryption(e.to_string()))?;

    aead.decrypt(
        Nonce::from_slice(&nonce_bytes),
        Payload {
            msg: ciphertext,
            aad: &aad,
        },
    )
    .map_err(|_| VaultError::decryption("wrong passphrase or corrupted archive"))
}

#[cfg(test)]
pub(crate) fn fast_kdf() -> KdfParams {
    KdfParams::new(64, 1, 1)
}
