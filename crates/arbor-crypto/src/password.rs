use pbkdf2::pbkdf2_hmac;
use rand_core::{OsRng, RngCore};
use sha2::Sha512;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Random salt length in bytes (32 hex characters once encoded).
pub const SALT_LEN: usize = 16;
/// PBKDF2 rounds. Existing accounts were hashed with this count, so it
/// cannot change without a rehash-on-login migration.
pub const ITERATIONS: u32 = 1000;
/// Derived key length in bytes (128 hex characters once encoded).
pub const KEY_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("stored salt is not {} hex characters", SALT_LEN * 2)]
    MalformedSalt,

    #[error("stored hash is not {} hex characters", KEY_LEN * 2)]
    MalformedHash,

    #[error("secure random source failed: {0}")]
    Rng(#[from] rand_core::Error),
}

/// Hex hash + hex salt pair, persisted together on the account row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordDigest {
    pub hash: String,
    pub salt: String,
}

/// Hash a password under a freshly generated salt.
pub fn hash_password(password: &str) -> Result<PasswordDigest, PasswordError> {
    let mut salt_bytes = [0u8; SALT_LEN];
    OsRng.try_fill_bytes(&mut salt_bytes)?;
    let salt = hex::encode(salt_bytes);

    let hash = hex::encode(derive_key(password, &salt));
    Ok(PasswordDigest { hash, salt })
}

/// Check `password` against a stored hash/salt pair.
///
/// Malformed stored values are an error rather than a mismatch: they mean the
/// row is corrupt, not that the caller typed the wrong password.
pub fn verify_password(
    password: &str,
    stored_hash: &str,
    stored_salt: &str,
) -> Result<bool, PasswordError> {
    if stored_salt.len() != SALT_LEN * 2 || !stored_salt.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PasswordError::MalformedSalt);
    }

    let expected = hex::decode(stored_hash)
        .ok()
        .filter(|bytes| bytes.len() == KEY_LEN)
        .ok_or(PasswordError::MalformedHash)?;

    let derived = derive_key(password, stored_salt);
    Ok(derived[..].ct_eq(&expected[..]).into())
}

/// Raw PBKDF2 derivation. The salt input is the hex text itself, which is
/// what every stored account was hashed with.
pub fn derive_key(password: &str, salt: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha512>(password.as_bytes(), salt.as_bytes(), ITERATIONS, &mut key);
    key
}
