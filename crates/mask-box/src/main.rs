//! maskbox: browser identity profile manager
//!
//! Entry point. Initializes logging, resolves the data directory, and
//! dispatches CLI commands to the application layer.

mod app;
mod cli;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use cli::{BatchCmd, Cli, Command, FolderCmd, LabelCmd, ProfileCmd, ProxyCmd, TagCmd, TrashCmd};
use directories::ProjectDirs;
use mask_session::BatchOp;
use mask_store::{ParsedProxy, ProfileFilter, ProfilePatch};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn data_dir(cli: &Cli) -> Result<PathBuf> {
    if let Some(dir) = &cli.data_dir {
        return Ok(dir.clone());
    }
    let dirs = ProjectDirs::from("", "", "maskbox")
        .context("could not determine a platform data directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let app = App::open(&data_dir(&cli)?).await?;

    match cli.command {
        Command::Profile { cmd } => profile_cmd(&app, cmd).await?,
        Command::Proxy { cmd } => proxy_cmd(&app, cmd).await?,
        Command::Tag { cmd } => tag_cmd(&app, cmd).await?,
        Command::Label { cmd } => label_cmd(&app, cmd).await?,
        Command::Folder { cmd } => folder_cmd(&app, cmd).await?,
        Command::Trash { cmd } => trash_cmd(&app, cmd).await?,
        Command::Batch { cmd } => match cmd {
            BatchCmd::Start { ids, concurrency } => {
                app.run_batch(BatchOp::Start, ids, concurrency).await?
            }
            BatchCmd::Stop { ids, concurrency } => {
                app.run_batch(BatchOp::Stop, ids, concurrency).await?
            }
            BatchCmd::Ping { ids, concurrency } => {
                app.run_batch(BatchOp::Ping, ids, concurrency).await?
            }
        },
    }
    Ok(())
}

async fn profile_cmd(app: &App, cmd: ProfileCmd) -> Result<()> {
    match cmd {
        ProfileCmd::Create {
            name,
            os,
            proxy,
            folder,
        } => {
            let mut spec = mask_store::NewProfile::named(&name, os);
            spec.proxy_id = proxy;
            spec.folder_id = folder;
            let profile = app.create_profile(spec).await?;
            println!("created {} ({})", profile.name, profile.id);
        }
        ProfileCmd::List {
            folder,
            tag,
            search,
        } => {
            let filter = ProfileFilter {
                folder_id: folder,
                tag,
                search,
            };
            for p in app.list_profiles(&filter).await {
                println!(
                    "{}  {:<24} {:<8} {}  proxy={}",
                    p.id,
                    p.name,
                    p.os,
                    p.status,
                    p.proxy_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
                );
            }
        }
        ProfileCmd::Show { id } => {
            let profile = app.store.get_profile(id).await?;
            let fingerprint = app.store.load_fingerprint(id)?;
            println!("{profile:#?}");
            println!("{fingerprint:#?}");
        }
        ProfileCmd::Update {
            id,
            name,
            notes,
            proxy,
            no_proxy,
            folder,
            no_folder,
        } => {
            let patch = ProfilePatch {
                name,
                notes,
                proxy_id: if no_proxy { Some(None) } else { proxy.map(Some) },
                folder_id: if no_folder { Some(None) } else { folder.map(Some) },
                ..Default::default()
            };
            let profile = app.store.update_profile(id, patch).await?;
            println!("updated {}", profile.id);
        }
        ProfileCmd::Delete { id } => {
            app.store.delete_profile(id).await?;
            println!("moved {id} to trash");
        }
        ProfileCmd::Regen { id } => {
            app.regenerate_fingerprint(id).await?;
            println!("regenerated fingerprint for {id}");
        }
        ProfileCmd::Start { id } => {
            app.orchestrator.start(id).await?;
            println!("started {id}");
        }
        ProfileCmd::Stop { id } => {
            app.orchestrator.stop(id).await?;
            println!("stopped {id}");
        }
        ProfileCmd::Ping { id } => match app.orchestrator.ping(id).await {
            Ok(()) => println!("{id}: alive"),
            Err(e) => println!("{id}: {e}"),
        },
        ProfileCmd::Reset { id } => {
            app.orchestrator.reset(id).await?;
            println!("reset {id}");
        }
    }
    Ok(())
}

async fn proxy_cmd(app: &App, cmd: ProxyCmd) -> Result<()> {
    match cmd {
        ProxyCmd::Add { spec } => {
            let parsed = ParsedProxy::parse(&spec)?;
            let proxy = app.store.add_proxy(parsed).await?;
            println!("added {} ({})", proxy.server(), proxy.id);
        }
        ProxyCmd::List => {
            for p in app.store.list_proxies().await {
                let check = p
                    .last_check
                    .as_ref()
                    .map(|c| {
                        format!(
                            "{} {}ms exit={}",
                            c.at.format("%Y-%m-%d %H:%M"),
                            c.latency_ms.unwrap_or(0),
                            c.exit_ip.as_deref().unwrap_or("?"),
                        )
                    })
                    .unwrap_or_else(|| "never checked".into());
                println!("{}  {:<32} {:?}  {check}", p.id, p.server(), p.health);
            }
        }
        ProxyCmd::Remove { id } => {
            app.store.remove_proxy(id).await?;
            println!("removed {id}");
        }
        ProxyCmd::Check { id } => {
            let proxy = app.check_proxy(id).await?;
            println!("{}: {:?}", proxy.server(), proxy.health);
        }
    }
    Ok(())
}

async fn tag_cmd(app: &App, cmd: TagCmd) -> Result<()> {
    match cmd {
        TagCmd::Add { name, color } => {
            let tag = app.store.create_tag(&name, &color).await?;
            println!("added tag {} ({})", tag.name, tag.id);
        }
        TagCmd::List => {
            for t in app.store.list_tags().await {
                println!("{}  {} {}", t.id, t.name, t.color);
            }
        }
        TagCmd::Remove { id } => {
            app.store.delete_tag(id).await?;
            println!("removed tag {id}");
        }
    }
    Ok(())
}

async fn label_cmd(app: &App, cmd: LabelCmd) -> Result<()> {
    match cmd {
        LabelCmd::Add { name, color } => {
            let label = app.store.create_label(&name, &color).await?;
            println!("added label {} ({})", label.name, label.id);
        }
        LabelCmd::List => {
            for l in app.store.list_labels().await {
                println!("{}  {} {}", l.id, l.name, l.color);
            }
        }
        LabelCmd::Remove { id } => {
            app.store.delete_label(id).await?;
            println!("removed label {id}");
        }
    }
    Ok(())
}

async fn trash_cmd(app: &App, cmd: TrashCmd) -> Result<()> {
    match cmd {
        TrashCmd::List => {
            for t in app.store.list_trash().await {
                println!(
                    "{}  {:<24} deleted {}",
                    t.profile.id,
                    t.profile.name,
                    t.deleted_at.format("%Y-%m-%d %H:%M"),
                );
            }
        }
        TrashCmd::Restore { id } => {
            let profile = app.store.restore_from_trash(id).await?;
            println!("restored {} ({})", profile.name, profile.id);
        }
        TrashCmd::Purge { id } => {
            app.store.purge_profile(id).await?;
            println!("purged {id}");
        }
        TrashCmd::Empty => {
            let purged = app.store.empty_trash().await?;
            println!("purged {purged} profile(s)");
        }
    }
    Ok(())
}

async fn folder_cmd(app: &App, cmd: FolderCmd) -> Result<()> {
    match cmd {
        FolderCmd::Add { name, parent } => {
            let folder = app.store.create_folder(&name, parent).await?;
            println!("added folder {} ({})", folder.name, folder.id);
        }
        FolderCmd::List => {
            for f in app.store.list_folders().await {
                println!(
                    "{}  {:<24} parent={}",
                    f.id,
                    f.name,
                    f.parent.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                );
            }
        }
        FolderCmd::Move { id, parent } => {
            app.store.move_folder(id, parent).await?;
            println!("moved {id}");
        }
        FolderCmd::Remove { id } => {
            app.store.delete_folder(id).await?;
            println!("removed folder {id}");
        }
    }
    Ok(())
}
