//! Profile records and the profile state machine's status type.

use crate::organize::{FolderId, LabelId, TagId, id_type};
use crate::proxy::ProxyId;
use chrono::{DateTime, Utc};
use mask_fingerprint::OsVariant;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

id_type!(ProfileId);

/// Runtime status of a profile's browser session.
///
/// Transitions: `Stopped → Starting → Running → Stopping → Stopped`, with
/// `Error` reachable from `Starting`/`Running` and recoverable to `Stopped`
/// only via an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl ProfileStatus {
    /// A start may only begin from a settled non-running state.
    pub fn can_start(&self) -> bool {
        matches!(self, ProfileStatus::Stopped | ProfileStatus::Error)
    }

    /// States with a live or in-flight engine session.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ProfileStatus::Starting | ProfileStatus::Running | ProfileStatus::Stopping
        )
    }

    /// Collapse transient states after a process restart: a persisted
    /// `Starting`/`Running`/`Stopping` has no live session behind it.
    pub fn normalized_at_rest(self) -> Self {
        if self.is_active() {
            ProfileStatus::Stopped
        } else {
            self
        }
    }
}

impl fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProfileStatus::Stopped => "stopped",
            ProfileStatus::Starting => "starting",
            ProfileStatus::Running => "running",
            ProfileStatus::Stopping => "stopping",
            ProfileStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// A persisted browser identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: ProfileId,
    pub name: String,
    pub os: OsVariant,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    /// Weak reference into the proxy pool; nulled out when the proxy is
    /// removed.
    #[serde(default)]
    pub proxy_id: Option<ProxyId>,
    #[serde(default)]
    pub folder_id: Option<FolderId>,
    #[serde(default)]
    pub tags: BTreeSet<TagId>,
    #[serde(default)]
    pub labels: BTreeSet<LabelId>,
    #[serde(default)]
    pub notes: String,
    pub status: ProfileStatus,
}

/// A soft-deleted profile held in the trash. The full record rides along
/// so a restore loses nothing; the browser data directory stays on disk
/// until the entry is purged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrashedProfile {
    pub profile: ProfileRecord,
    pub deleted_at: DateTime<Utc>,
}

/// Spec for creating a profile.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub name: String,
    pub os: OsVariant,
    pub proxy_id: Option<ProxyId>,
    pub folder_id: Option<FolderId>,
    pub tags: BTreeSet<TagId>,
    pub labels: BTreeSet<LabelId>,
    pub notes: String,
}

impl NewProfile {
    pub fn named(name: &str, os: OsVariant) -> Self {
        Self {
            name: name.to_string(),
            os,
            proxy_id: None,
            folder_id: None,
            tags: BTreeSet::new(),
            labels: BTreeSet::new(),
            notes: String::new(),
        }
    }

    pub fn with_proxy(mut self, proxy_id: ProxyId) -> Self {
        self.proxy_id = Some(proxy_id);
        self
    }
}

/// Partial update of a profile's mutable fields. `None` leaves a field
/// untouched; `proxy_id`/`folder_id` use a nested `Option` so assignment
/// and clearing are both expressible.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub proxy_id: Option<Option<ProxyId>>,
    pub folder_id: Option<Option<FolderId>>,
    pub tags: Option<BTreeSet<TagId>>,
    pub labels: Option<BTreeSet<LabelId>>,
    pub notes: Option<String>,
}

/// Filter for `list_profiles`.
#[derive(Debug, Clone, Default)]
pub struct ProfileFilter {
    pub folder_id: Option<FolderId>,
    pub tag: Option<TagId>,
    /// Case-insensitive substring match on the profile name.
    pub search: Option<String>,
}

impl ProfileFilter {
    pub fn matches(&self, profile: &ProfileRecord) -> bool {
        if let Some(folder) = self.folder_id {
            if profile.folder_id != Some(folder) {
                return false;
            }
        }
        if let Some(tag) = self.tag {
            if !profile.tags.contains(&tag) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            if !profile
                .name
                .to_lowercase()
                .contains(&search.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}
