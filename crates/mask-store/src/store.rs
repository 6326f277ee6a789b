//! The storage facade.
//!
//! One `Storage` instance owns every persisted collection behind a single
//! `RwLock`. Cross-collection invariants (proxy removal nulling profile
//! references, tag deletion sweeping profiles) are enforced inside one
//! write-lock critical section so readers never observe a dangling
//! reference.

use crate::organize::{Folder, FolderId, Label, LabelId, Tag, TagId};
use crate::persist::{load_json, save_json};
use crate::profile::{
    NewProfile, ProfileFilter, ProfileId, ProfilePatch, ProfileRecord, ProfileStatus,
    TrashedProfile,
};
use crate::proxy::{
    CheckOutcome, ParsedProxy, ProxyHealth, ProxyId, ProxyPatch, ProxyRecord, ProxyTarget,
};
use crate::settings::Settings;
use crate::StoreError;
use chrono::Utc;
use mask_fingerprint::{Fingerprint, FingerprintGenerator, GeoLocale};
use mask_vault::{MasterKey, Vault};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

const PROFILES_FILE: &str = "profiles.json";
const PROXIES_FILE: &str = "proxy_pool.json";
const FOLDERS_FILE: &str = "folders.json";
const TAGS_FILE: &str = "tags_pool.json";
const LABELS_FILE: &str = "labels_pool.json";
const SETTINGS_FILE: &str = "settings.json";
const TRASH_FILE: &str = "trash.json";
const KEY_FILE: &str = "vault.key";
const BROWSER_DATA_DIR: &str = "browser_data";
const FINGERPRINT_FILE: &str = "fingerprint.json";

#[derive(Default)]
struct Collections {
    profiles: BTreeMap<ProfileId, ProfileRecord>,
    proxies: BTreeMap<ProxyId, ProxyRecord>,
    folders: BTreeMap<FolderId, Folder>,
    tags: BTreeMap<TagId, Tag>,
    labels: BTreeMap<LabelId, Label>,
    trash: BTreeMap<ProfileId, TrashedProfile>,
    settings: Settings,
}

/// Persistent store for profiles, the proxy pool, organization structures,
/// and settings.
pub struct Storage {
    data_dir: PathBuf,
    vault: Arc<Vault>,
    inner: RwLock<Collections>,
}

impl Storage {
    /// Open (or initialize) the store at `data_dir`. Loads every collection
    /// eagerly; a corrupted document is a fatal error, not a silent reset.
    /// Profile statuses persisted mid-session collapse to `stopped`.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir.join(BROWSER_DATA_DIR)).map_err(|source| StoreError::Io {
            file: data_dir.to_path_buf(),
            source,
        })?;

        let key = MasterKey::load_or_create(&data_dir.join(KEY_FILE))?;
        let vault = Arc::new(Vault::new(key));

        let profiles: Vec<ProfileRecord> =
            load_json(&data_dir.join(PROFILES_FILE))?.unwrap_or_default();
        let proxies: Vec<ProxyRecord> =
            load_json(&data_dir.join(PROXIES_FILE))?.unwrap_or_default();
        let folders: Vec<Folder> = load_json(&data_dir.join(FOLDERS_FILE))?.unwrap_or_default();
        let tags: Vec<Tag> = load_json(&data_dir.join(TAGS_FILE))?.unwrap_or_default();
        let labels: Vec<Label> = load_json(&data_dir.join(LABELS_FILE))?.unwrap_or_default();
        let trash: Vec<TrashedProfile> =
            load_json(&data_dir.join(TRASH_FILE))?.unwrap_or_default();
        let settings: Settings = load_json(&data_dir.join(SETTINGS_FILE))?.unwrap_or_default();

        let mut normalized = 0usize;
        let profiles: BTreeMap<_, _> = profiles
            .into_iter()
            .map(|mut p| {
                let at_rest = p.status.normalized_at_rest();
                if at_rest != p.status {
                    normalized += 1;
                    p.status = at_rest;
                }
                (p.id, p)
            })
            .collect();
        if normalized > 0 {
            warn!("Normalized {normalized} profile(s) left in a transient status");
        }

        let collections = Collections {
            profiles,
            proxies: proxies.into_iter().map(|p| (p.id, p)).collect(),
            folders: folders.into_iter().map(|f| (f.id, f)).collect(),
            tags: tags.into_iter().map(|t| (t.id, t)).collect(),
            labels: labels.into_iter().map(|l| (l.id, l)).collect(),
            trash: trash.into_iter().map(|t| (t.profile.id, t)).collect(),
            settings,
        };

        let store = Self {
            data_dir: data_dir.to_path_buf(),
            vault,
            inner: RwLock::new(collections),
        };
        if normalized > 0 {
            let guard = store.inner.try_read().expect("fresh lock");
            store.save_profiles(&guard)?;
        }
        info!("Opened store at {}", data_dir.display());
        Ok(store)
    }

    pub fn vault(&self) -> Arc<Vault> {
        self.vault.clone()
    }

    /// Per-profile browser data directory (fingerprint plus engine state).
    pub fn profile_data_dir(&self, id: ProfileId) -> PathBuf {
        self.data_dir.join(BROWSER_DATA_DIR).join(id.to_string())
    }

    fn fingerprint_path(&self, id: ProfileId) -> PathBuf {
        self.profile_data_dir(id).join(FINGERPRINT_FILE)
    }

    fn save_profiles(&self, c: &Collections) -> Result<(), StoreError> {
        let records: Vec<&ProfileRecord> = c.profiles.values().collect();
        save_json(&self.data_dir.join(PROFILES_FILE), &records)
    }

    fn save_proxies(&self, c: &Collections) -> Result<(), StoreError> {
        let records: Vec<&ProxyRecord> = c.proxies.values().collect();
        save_json(&self.data_dir.join(PROXIES_FILE), &records)
    }

    fn save_folders(&self, c: &Collections) -> Result<(), StoreError> {
        let records: Vec<&Folder> = c.folders.values().collect();
        save_json(&self.data_dir.join(FOLDERS_FILE), &records)
    }

    fn save_tags(&self, c: &Collections) -> Result<(), StoreError> {
        let records: Vec<&Tag> = c.tags.values().collect();
        save_json(&self.data_dir.join(TAGS_FILE), &records)
    }

    fn save_labels(&self, c: &Collections) -> Result<(), StoreError> {
        let records: Vec<&Label> = c.labels.values().collect();
        save_json(&self.data_dir.join(LABELS_FILE), &records)
    }

    fn save_trash(&self, c: &Collections) -> Result<(), StoreError> {
        let records: Vec<&TrashedProfile> = c.trash.values().collect();
        save_json(&self.data_dir.join(TRASH_FILE), &records)
    }

    // ---- profiles ----

    /// Create a profile: generate its fingerprint for `locale`, persist the
    /// fingerprint file first, then the record. A crash between the two
    /// leaves an orphan data directory, never a record without a
    /// fingerprint.
    pub async fn create_profile(
        &self,
        spec: NewProfile,
        locale: &GeoLocale,
    ) -> Result<ProfileRecord, StoreError> {
        if spec.name.trim().is_empty() {
            return Err(StoreError::InvalidProfile("name must not be empty".to_string()));
        }

        let mut guard = self.inner.write().await;
        if let Some(proxy_id) = spec.proxy_id {
            if !guard.proxies.contains_key(&proxy_id) {
                return Err(StoreError::ProxyNotFound(proxy_id));
            }
        }
        if let Some(folder_id) = spec.folder_id {
            if !guard.folders.contains_key(&folder_id) {
                return Err(StoreError::FolderNotFound(folder_id));
            }
        }

        let id = ProfileId::new();
        let fingerprint = FingerprintGenerator::new().generate(spec.os, locale);
        self.write_fingerprint(id, &fingerprint)?;

        let record = ProfileRecord {
            id,
            name: spec.name,
            os: spec.os,
            created_at: Utc::now(),
            last_used: None,
            proxy_id: spec.proxy_id,
            folder_id: spec.folder_id,
            tags: spec.tags,
            labels: spec.labels,
            notes: spec.notes,
            status: ProfileStatus::Stopped,
        };
        guard.profiles.insert(id, record.clone());
        self.save_profiles(&guard)?;
        info!("Created profile {} ({})", record.name, id);
        Ok(record)
    }

    pub async fn get_profile(&self, id: ProfileId) -> Result<ProfileRecord, StoreError> {
        let guard = self.inner.read().await;
        guard
            .profiles
            .get(&id)
            .cloned()
            .ok_or(StoreError::ProfileNotFound(id))
    }

    pub async fn list_profiles(&self, filter: &ProfileFilter) -> Vec<ProfileRecord> {
        let guard = self.inner.read().await;
        guard
            .profiles
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }

    pub async fn update_profile(
        &self,
        id: ProfileId,
        patch: ProfilePatch,
    ) -> Result<ProfileRecord, StoreError> {
        let mut guard = self.inner.write().await;
        if let Some(Some(proxy_id)) = patch.proxy_id {
            if !guard.proxies.contains_key(&proxy_id) {
                return Err(StoreError::ProxyNotFound(proxy_id));
            }
        }
        if let Some(Some(folder_id)) = patch.folder_id {
            if !guard.folders.contains_key(&folder_id) {
                return Err(StoreError::FolderNotFound(folder_id));
            }
        }

        let profile = guard
            .profiles
            .get_mut(&id)
            .ok_or(StoreError::ProfileNotFound(id))?;
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(StoreError::InvalidProfile("name must not be empty".to_string()));
            }
            profile.name = name;
        }
        if let Some(proxy_id) = patch.proxy_id {
            profile.proxy_id = proxy_id;
        }
        if let Some(folder_id) = patch.folder_id {
            profile.folder_id = folder_id;
        }
        if let Some(tags) = patch.tags {
            profile.tags = tags;
        }
        if let Some(labels) = patch.labels {
            profile.labels = labels;
        }
        if let Some(notes) = patch.notes {
            profile.notes = notes;
        }
        let updated = profile.clone();
        self.save_profiles(&guard)?;
        Ok(updated)
    }

    /// Soft-delete a profile into the trash. The record and its browser
    /// data directory survive until the trash entry is purged. Rejected
    /// while the profile has a live or in-flight session.
    pub async fn delete_profile(&self, id: ProfileId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let profile = guard
            .profiles
            .get(&id)
            .ok_or(StoreError::ProfileNotFound(id))?;
        if profile.status.is_active() {
            return Err(StoreError::ProfileBusy(id, profile.status));
        }
        let profile = guard.profiles.remove(&id).expect("checked above");
        guard.trash.insert(
            id,
            TrashedProfile {
                profile,
                deleted_at: Utc::now(),
            },
        );
        self.save_trash(&guard)?;
        self.save_profiles(&guard)?;
        info!("Moved profile {id} to trash");
        Ok(())
    }

    pub async fn list_trash(&self) -> Vec<TrashedProfile> {
        self.inner.read().await.trash.values().cloned().collect()
    }

    /// Bring a trashed profile back into the live collection. References
    /// to proxies or folders deleted in the meantime are nulled out.
    pub async fn restore_from_trash(&self, id: ProfileId) -> Result<ProfileRecord, StoreError> {
        let mut guard = self.inner.write().await;
        let entry = guard.trash.remove(&id).ok_or(StoreError::NotInTrash(id))?;
        let mut profile = entry.profile;
        if let Some(proxy_id) = profile.proxy_id {
            if !guard.proxies.contains_key(&proxy_id) {
                profile.proxy_id = None;
            }
        }
        if let Some(folder_id) = profile.folder_id {
            if !guard.folders.contains_key(&folder_id) {
                profile.folder_id = None;
            }
        }
        guard.profiles.insert(id, profile.clone());
        self.save_profiles(&guard)?;
        self.save_trash(&guard)?;
        info!("Restored profile {id} from trash");
        Ok(profile)
    }

    /// Permanently delete a trashed profile together with its browser data
    /// directory.
    pub async fn purge_profile(&self, id: ProfileId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.trash.remove(&id).is_none() {
            return Err(StoreError::NotInTrash(id));
        }
        self.save_trash(&guard)?;
        drop(guard);

        self.remove_profile_data(id);
        info!("Purged profile {id}");
        Ok(())
    }

    /// Permanently delete every trashed profile.
    pub async fn empty_trash(&self) -> Result<usize, StoreError> {
        let mut guard = self.inner.write().await;
        let purged: Vec<ProfileId> = guard.trash.keys().copied().collect();
        guard.trash.clear();
        self.save_trash(&guard)?;
        drop(guard);

        for id in &purged {
            self.remove_profile_data(*id);
        }
        info!("Emptied trash ({} profile(s))", purged.len());
        Ok(purged.len())
    }

    fn remove_profile_data(&self, id: ProfileId) {
        let dir = self.profile_data_dir(id);
        if dir.exists() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                warn!("Failed to remove data dir for {id}: {e}");
            }
        }
    }

    pub async fn set_status(
        &self,
        id: ProfileId,
        status: ProfileStatus,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let profile = guard
            .profiles
            .get_mut(&id)
            .ok_or(StoreError::ProfileNotFound(id))?;
        profile.status = status;
        self.save_profiles(&guard)
    }

    pub async fn touch_last_used(&self, id: ProfileId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let profile = guard
            .profiles
            .get_mut(&id)
            .ok_or(StoreError::ProfileNotFound(id))?;
        profile.last_used = Some(Utc::now());
        self.save_profiles(&guard)
    }

    // ---- fingerprints ----

    pub fn load_fingerprint(&self, id: ProfileId) -> Result<Fingerprint, StoreError> {
        let path = self.fingerprint_path(id);
        load_json(&path)?.ok_or_else(|| StoreError::Corrupted {
            file: path,
            reason: "fingerprint file missing".to_string(),
        })
    }

    /// Replace a profile's fingerprint with a freshly generated one. Only
    /// allowed while the profile is fully stopped; a session in any other
    /// state may still be reading the old fingerprint.
    pub async fn regenerate_fingerprint(
        &self,
        id: ProfileId,
        locale: &GeoLocale,
    ) -> Result<Fingerprint, StoreError> {
        let guard = self.inner.read().await;
        let profile = guard
            .profiles
            .get(&id)
            .ok_or(StoreError::ProfileNotFound(id))?;
        if profile.status != ProfileStatus::Stopped {
            return Err(StoreError::ProfileBusy(id, profile.status));
        }
        let fingerprint = FingerprintGenerator::new().generate(profile.os, locale);
        self.write_fingerprint(id, &fingerprint)?;
        info!("Regenerated fingerprint for profile {id}");
        Ok(fingerprint)
    }

    fn write_fingerprint(
        &self,
        id: ProfileId,
        fingerprint: &Fingerprint,
    ) -> Result<(), StoreError> {
        let dir = self.profile_data_dir(id);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            file: dir.clone(),
            source,
        })?;
        save_json(&self.fingerprint_path(id), fingerprint)
    }

    // ---- proxies ----

    /// Add a proxy to the pool. The plaintext password is encrypted here
    /// and never stored or logged.
    pub async fn add_proxy(&self, parsed: ParsedProxy) -> Result<ProxyRecord, StoreError> {
        let record = ProxyRecord {
            id: ProxyId::new(),
            scheme: parsed.scheme,
            host: parsed.host,
            port: parsed.port,
            username: parsed.username,
            password: parsed.password.as_deref().map(|p| self.vault.encrypt(p)),
            created_at: Utc::now(),
            last_check: None,
            health: ProxyHealth::Unchecked,
        };
        let mut guard = self.inner.write().await;
        guard.proxies.insert(record.id, record.clone());
        self.save_proxies(&guard)?;
        info!("Added proxy {} ({})", record.server(), record.id);
        Ok(record)
    }

    pub async fn get_proxy(&self, id: ProxyId) -> Result<ProxyRecord, StoreError> {
        let guard = self.inner.read().await;
        guard
            .proxies
            .get(&id)
            .cloned()
            .ok_or(StoreError::ProxyNotFound(id))
    }

    pub async fn list_proxies(&self) -> Vec<ProxyRecord> {
        let guard = self.inner.read().await;
        guard.proxies.values().cloned().collect()
    }

    /// Update a proxy. Changing the endpoint or credentials resets its
    /// health to unchecked.
    pub async fn update_proxy(
        &self,
        id: ProxyId,
        patch: ProxyPatch,
    ) -> Result<ProxyRecord, StoreError> {
        let mut guard = self.inner.write().await;
        let proxy = guard
            .proxies
            .get_mut(&id)
            .ok_or(StoreError::ProxyNotFound(id))?;

        let mut endpoint_changed = false;
        if let Some(scheme) = patch.scheme {
            endpoint_changed |= proxy.scheme != scheme;
            proxy.scheme = scheme;
        }
        if let Some(host) = patch.host {
            endpoint_changed |= proxy.host != host;
            proxy.host = host;
        }
        if let Some(port) = patch.port {
            endpoint_changed |= proxy.port != port;
            proxy.port = port;
        }
        if let Some(username) = patch.username {
            endpoint_changed |= proxy.username != username;
            proxy.username = username;
        }
        if let Some(password) = patch.password {
            proxy.password = password.as_deref().map(|p| self.vault.encrypt(p));
            endpoint_changed = true;
        }
        if endpoint_changed {
            proxy.health = ProxyHealth::Unchecked;
            proxy.last_check = None;
        }
        let updated = proxy.clone();
        self.save_proxies(&guard)?;
        Ok(updated)
    }

    /// Remove a proxy and null out every profile reference to it, in one
    /// critical section so both files agree.
    pub async fn remove_proxy(&self, id: ProxyId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.proxies.remove(&id).is_none() {
            return Err(StoreError::ProxyNotFound(id));
        }
        let mut detached = 0usize;
        for profile in guard.profiles.values_mut() {
            if profile.proxy_id == Some(id) {
                profile.proxy_id = None;
                detached += 1;
            }
        }
        self.save_proxies(&guard)?;
        if detached > 0 {
            self.save_profiles(&guard)?;
            info!("Removed proxy {id}, detached {detached} profile(s)");
        } else {
            info!("Removed proxy {id}");
        }
        Ok(())
    }

    pub async fn record_check(
        &self,
        id: ProxyId,
        outcome: CheckOutcome,
        reachable: bool,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let proxy = guard
            .proxies
            .get_mut(&id)
            .ok_or(StoreError::ProxyNotFound(id))?;
        proxy.last_check = Some(outcome);
        proxy.health = if reachable {
            ProxyHealth::Reachable
        } else {
            ProxyHealth::Unreachable
        };
        self.save_proxies(&guard)
    }

    /// Build the transient decrypted view of a proxy. The caller must drop
    /// it as soon as the operation that needed it completes.
    pub async fn proxy_target(&self, id: ProxyId) -> Result<ProxyTarget, StoreError> {
        let guard = self.inner.read().await;
        let proxy = guard
            .proxies
            .get(&id)
            .ok_or(StoreError::ProxyNotFound(id))?;
        let password = proxy
            .password
            .as_deref()
            .map(|ct| self.vault.decrypt(ct))
            .transpose()?;
        Ok(ProxyTarget {
            id: proxy.id,
            scheme: proxy.scheme,
            host: proxy.host.clone(),
            port: proxy.port,
            username: proxy.username.clone(),
            password,
        })
    }

    // ---- tags and labels ----

    pub async fn create_tag(&self, name: &str, color: &str) -> Result<Tag, StoreError> {
        let tag = Tag::new(name, color);
        let mut guard = self.inner.write().await;
        guard.tags.insert(tag.id, tag.clone());
        self.save_tags(&guard)?;
        Ok(tag)
    }

    pub async fn list_tags(&self) -> Vec<Tag> {
        self.inner.read().await.tags.values().cloned().collect()
    }

    /// Delete a tag from the pool and sweep it off every profile.
    pub async fn delete_tag(&self, id: TagId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.tags.remove(&id);
        let mut swept = false;
        for profile in guard.profiles.values_mut() {
            swept |= profile.tags.remove(&id);
        }
        self.save_tags(&guard)?;
        if swept {
            self.save_profiles(&guard)?;
        }
        Ok(())
    }

    pub async fn create_label(&self, name: &str, color: &str) -> Result<Label, StoreError> {
        let label = Label::new(name, color);
        let mut guard = self.inner.write().await;
        guard.labels.insert(label.id, label.clone());
        self.save_labels(&guard)?;
        Ok(label)
    }

    pub async fn list_labels(&self) -> Vec<Label> {
        self.inner.read().await.labels.values().cloned().collect()
    }

    pub async fn delete_label(&self, id: LabelId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.labels.remove(&id);
        let mut swept = false;
        for profile in guard.profiles.values_mut() {
            swept |= profile.labels.remove(&id);
        }
        self.save_labels(&guard)?;
        if swept {
            self.save_profiles(&guard)?;
        }
        Ok(())
    }

    // ---- folders ----

    pub async fn create_folder(
        &self,
        name: &str,
        parent: Option<FolderId>,
    ) -> Result<Folder, StoreError> {
        let mut guard = self.inner.write().await;
        if let Some(parent) = parent {
            if !guard.folders.contains_key(&parent) {
                return Err(StoreError::FolderNotFound(parent));
            }
        }
        let folder = Folder::new(name, parent);
        guard.folders.insert(folder.id, folder.clone());
        self.save_folders(&guard)?;
        Ok(folder)
    }

    pub async fn list_folders(&self) -> Vec<Folder> {
        self.inner.read().await.folders.values().cloned().collect()
    }

    /// Move a folder under a new parent. Rejects reparenting that would
    /// make the folder its own ancestor.
    pub async fn move_folder(
        &self,
        id: FolderId,
        new_parent: Option<FolderId>,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.folders.contains_key(&id) {
            return Err(StoreError::FolderNotFound(id));
        }
        if let Some(parent) = new_parent {
            if !guard.folders.contains_key(&parent) {
                return Err(StoreError::FolderNotFound(parent));
            }
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == id {
                    return Err(StoreError::FolderCycle);
                }
                cursor = guard.folders.get(&current).and_then(|f| f.parent);
            }
        }
        guard
            .folders
            .get_mut(&id)
            .expect("checked above")
            .parent = new_parent;
        self.save_folders(&guard)
    }

    /// Delete a folder. Its profiles move to the root and its child
    /// folders are reparented to the deleted folder's parent.
    pub async fn delete_folder(&self, id: FolderId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let removed = guard
            .folders
            .remove(&id)
            .ok_or(StoreError::FolderNotFound(id))?;
        for folder in guard.folders.values_mut() {
            if folder.parent == Some(id) {
                folder.parent = removed.parent;
            }
        }
        let mut moved = false;
        for profile in guard.profiles.values_mut() {
            if profile.folder_id == Some(id) {
                profile.folder_id = None;
                moved = true;
            }
        }
        self.save_folders(&guard)?;
        if moved {
            self.save_profiles(&guard)?;
        }
        Ok(())
    }

    // ---- settings ----

    pub async fn settings(&self) -> Settings {
        self.inner.read().await.settings.clone()
    }

    pub async fn update_settings(&self, settings: Settings) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.settings = settings;
        save_json(&self.data_dir.join(SETTINGS_FILE), &guard.settings)
    }
}
