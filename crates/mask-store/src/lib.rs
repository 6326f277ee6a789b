//! Profile and Proxy Pool Stores
//!
//! Persistent collections for browser profiles, the proxy pool, and their
//! organization (tags, labels, folders) plus application settings. One JSON
//! document per collection under the data directory; every write goes
//! through a temp-file-plus-atomic-rename so a crash never leaves a
//! half-written collection on disk.
//!
//! Ownership: the store exclusively owns profile and proxy records. A
//! profile references a proxy only by id; removing a proxy nulls out those
//! references in the same persisted transaction.

mod organize;
mod persist;
mod profile;
mod proxy;
mod settings;
mod store;
pub mod sync;

pub use organize::{Folder, FolderId, Label, LabelId, Tag, TagId};
pub use profile::{
    NewProfile, ProfileFilter, ProfileId, ProfilePatch, ProfileRecord, ProfileStatus,
    TrashedProfile,
};
pub use proxy::{
    CheckOutcome, ParsedProxy, ProxyHealth, ProxyId, ProxyPatch, ProxyRecord, ProxyScheme,
    ProxyTarget,
};
pub use settings::Settings;
pub use store::Storage;

use mask_vault::VaultError;
use std::path::PathBuf;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid proxy spec: {0}")]
    InvalidProxySpec(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(ProfileId),

    #[error("Proxy not found: {0}")]
    ProxyNotFound(ProxyId),

    #[error("Folder not found: {0}")]
    FolderNotFound(FolderId),

    #[error("Profile not in trash: {0}")]
    NotInTrash(ProfileId),

    #[error("Profile {0} is busy: {1}")]
    ProfileBusy(ProfileId, ProfileStatus),

    #[error("Invalid profile spec: {0}")]
    InvalidProfile(String),

    #[error("Folder parent chain would form a cycle")]
    FolderCycle,

    #[error("Storage file {file} is corrupted: {reason}")]
    Corrupted { file: PathBuf, reason: String },

    #[error("I/O error on {file}: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Vault(#[from] VaultError),
}
