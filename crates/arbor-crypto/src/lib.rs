/// Arbor Crypto Library
///
/// Salted PBKDF2-HMAC-SHA512 credential hashing. Accounts store the hex hash
/// and hex salt side by side; the plaintext password is never persisted.

pub mod password;

pub use password::{PasswordDigest, PasswordError, hash_password, verify_password};
