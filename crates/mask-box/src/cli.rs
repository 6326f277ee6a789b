//! Command line surface.

use clap::{Parser, Subcommand};
use mask_fingerprint::OsVariant;
use mask_store::{FolderId, LabelId, ProfileId, ProxyId, TagId};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "maskbox", version, about = "Browser identity profile manager")]
pub struct Cli {
    /// Data directory (defaults to the platform data dir).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage profiles
    Profile {
        #[command(subcommand)]
        cmd: ProfileCmd,
    },
    /// Manage the proxy pool
    Proxy {
        #[command(subcommand)]
        cmd: ProxyCmd,
    },
    /// Manage tags
    Tag {
        #[command(subcommand)]
        cmd: TagCmd,
    },
    /// Manage labels
    Label {
        #[command(subcommand)]
        cmd: LabelCmd,
    },
    /// Manage folders
    Folder {
        #[command(subcommand)]
        cmd: FolderCmd,
    },
    /// Manage trashed profiles
    Trash {
        #[command(subcommand)]
        cmd: TrashCmd,
    },
    /// Start or stop many profiles at once
    Batch {
        #[command(subcommand)]
        cmd: BatchCmd,
    },
}

#[derive(Subcommand)]
pub enum ProfileCmd {
    /// Create a profile and generate its fingerprint
    Create {
        #[arg(long)]
        name: String,
        /// Fingerprint OS: windows, macos, or linux
        #[arg(long, default_value = "windows")]
        os: OsVariant,
        #[arg(long)]
        proxy: Option<ProxyId>,
        #[arg(long)]
        folder: Option<FolderId>,
    },
    /// List profiles
    List {
        #[arg(long)]
        folder: Option<FolderId>,
        #[arg(long)]
        tag: Option<TagId>,
        /// Case-insensitive name substring
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one profile with its fingerprint
    Show { id: ProfileId },
    /// Update profile fields
    Update {
        id: ProfileId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, conflicts_with = "no_proxy")]
        proxy: Option<ProxyId>,
        /// Detach the profile from its proxy
        #[arg(long)]
        no_proxy: bool,
        #[arg(long, conflicts_with = "no_folder")]
        folder: Option<FolderId>,
        /// Move the profile to the root
        #[arg(long)]
        no_folder: bool,
    },
    /// Move a profile to the trash
    Delete { id: ProfileId },
    /// Regenerate the profile's fingerprint (profile must be stopped)
    Regen { id: ProfileId },
    /// Launch a browser session
    Start { id: ProfileId },
    /// Stop the browser session
    Stop { id: ProfileId },
    /// Check whether the session is still alive
    Ping { id: ProfileId },
    /// Clear an error status back to stopped
    Reset { id: ProfileId },
}

#[derive(Subcommand)]
pub enum ProxyCmd {
    /// Add a proxy. Accepts host:port, host:port:user:pass, or a full URL.
    Add { spec: String },
    /// List the proxy pool
    List,
    /// Remove a proxy; profiles using it are detached
    Remove { id: ProxyId },
    /// Probe connectivity and record the outcome
    Check { id: ProxyId },
}

#[derive(Subcommand)]
pub enum TagCmd {
    Add {
        name: String,
        #[arg(long, default_value = "#808080")]
        color: String,
    },
    List,
    Remove { id: TagId },
}

#[derive(Subcommand)]
pub enum LabelCmd {
    Add {
        name: String,
        #[arg(long, default_value = "#808080")]
        color: String,
    },
    List,
    Remove { id: LabelId },
}

#[derive(Subcommand)]
pub enum FolderCmd {
    Add {
        name: String,
        #[arg(long)]
        parent: Option<FolderId>,
    },
    List,
    /// Move a folder under a new parent (omit --parent for the root)
    Move {
        id: FolderId,
        #[arg(long)]
        parent: Option<FolderId>,
    },
    Remove { id: FolderId },
}

#[derive(Subcommand)]
pub enum TrashCmd {
    /// List trashed profiles
    List,
    /// Restore a profile from the trash
    Restore { id: ProfileId },
    /// Permanently delete a trashed profile and its browser data
    Purge { id: ProfileId },
    /// Permanently delete everything in the trash
    Empty,
}

#[derive(Subcommand)]
pub enum BatchCmd {
    /// Start many profiles with bounded parallelism
    Start {
        ids: Vec<ProfileId>,
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Stop many profiles
    Stop {
        ids: Vec<ProfileId>,
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Liveness-check many profiles
    Ping {
        ids: Vec<ProfileId>,
        #[arg(long)]
        concurrency: Option<usize>,
    },
}
