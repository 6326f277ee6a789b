//! Master key management.
//!
//! The key is a 32-byte secret stored base64-encoded in a single file under
//! the data directory. Missing key files are generated on demand; existing
//! files with loose permissions are rejected at startup rather than used.

use crate::VaultError;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;

/// Process-wide encryption key (32 bytes).
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; 32],
}

impl MasterKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Load the key from `path`, or generate and persist a new one if the
    /// file does not exist.
    ///
    /// The key file is created with owner-only permissions (0600). A
    /// pre-existing key file that is group- or world-accessible is a fatal
    /// error: continuing with an exposed key would silently defeat the
    /// vault.
    pub fn load_or_create(path: &Path) -> Result<Self, VaultError> {
        if path.exists() {
            check_permissions(path)?;
            let encoded = fs::read_to_string(path).map_err(VaultError::KeyRead)?;
            let bytes = BASE64
                .decode(encoded.trim())
                .map_err(|_| VaultError::InvalidKey)?;
            if bytes.len() != 32 {
                return Err(VaultError::InvalidKey);
            }
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&bytes);
            return Ok(Self::from_bytes(arr));
        }

        let key = Self::generate();
        write_restricted(path, &BASE64.encode(key.bytes))?;
        info!("Generated new vault key at {}", path.display());
        Ok(key)
    }

    /// Raw key bytes for cipher construction.
    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([redacted])")
    }
}

#[cfg(unix)]
fn write_restricted(path: &Path, encoded: &str) -> Result<(), VaultError> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(VaultError::KeyWrite)?;
    }
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .map_err(VaultError::KeyWrite)?;
    file.write_all(encoded.as_bytes())
        .map_err(VaultError::KeyWrite)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_restricted(path: &Path, encoded: &str) -> Result<(), VaultError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(VaultError::KeyWrite)?;
    }
    fs::write(path, encoded).map_err(VaultError::KeyWrite)
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<(), VaultError> {
    use std::os::unix::fs::MetadataExt;

    let meta = fs::metadata(path).map_err(VaultError::KeyRead)?;
    if meta.mode() & 0o077 != 0 {
        return Err(VaultError::KeyPermissions);
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<(), VaultError> {
    Ok(())
}
