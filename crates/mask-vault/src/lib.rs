//! Credential Vault
//!
//! Authenticated symmetric encryption for secret fields (proxy passwords)
//! with a locally stored master key. The key is created lazily on first use
//! with owner-only file permissions and is loaded exactly once at startup;
//! it is never rotated automatically.
//!
//! Plaintext secrets exist only transiently inside the calling operation.
//! Nothing in this crate logs plaintext.

mod key;
mod vault;

pub use key::MasterKey;
pub use vault::Vault;

/// Vault errors
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Failed to read key file: {0}")]
    KeyRead(std::io::Error),

    #[error("Failed to write key file: {0}")]
    KeyWrite(std::io::Error),

    #[error("Key file is not a valid 32-byte key")]
    InvalidKey,

    #[error("Key file permissions are not owner-only")]
    KeyPermissions,

    #[error("Ciphertext is corrupted or was produced by a different key")]
    CorruptedSecret,
}
