use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use thread_sync_lib::adapters::remote::{HttpThreadsApi, ThreadsApi};
use thread_sync_lib::adapters::sqlite::{ThreadQuery, ThreadStore};
use thread_sync_lib::config;
use thread_sync_lib::state::SessionManager;
use thread_sync_lib::sync::{classify, ThreadListItem};
use thread_sync_lib::types::error::SyncError;
use thread_sync_lib::types::ParentSubscription;

#[derive(Parser)]
#[command(name = "thread-sync", version, about = "Local cache of a room's thread list")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Attach to a room, wait for the first sync and print its threads
    Sync {
        rid: String,

        /// Create the room record under this name if it is not cached yet
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Print the cached threads of a room
    List { rid: String },
    /// Forget the room's watermark so the next sync reloads every page
    Reset { rid: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    thread_sync_lib::init_tracing();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), SyncError> {
    match &cli.config {
        Some(path) => config::init_config_from_path(path)?,
        None => config::init_config()?,
    }
    let config = config::get_config()?;
    let store = ThreadStore::from_config(&config.store)?;

    match cli.command {
        Command::Sync {
            rid,
            name,
            timeout_secs,
        } => {
            if let Some(name) = name {
                match store.find_subscription(&rid) {
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {
                        info!("Tracking new room {} ({})", rid, name);
                        store.upsert_subscription(&ParentSubscription::new(rid.as_str(), name))?;
                    }
                    Err(e) => return Err(e),
                }
            }

            let api: Arc<dyn ThreadsApi> = Arc::new(HttpThreadsApi::new(&config.server)?);
            let manager = SessionManager::new(store, api, config.sync.clone());
            let session = manager.get_or_attach(&rid).await?;
            let events = session.events();

            let waited = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
                while let Ok(event) = events.recv_async().await {
                    debug!("Session event: {:?}", event);
                    if event.is_fetch_complete() {
                        break;
                    }
                }
            })
            .await;
            if waited.is_err() {
                warn!("Timed out after {}s waiting for {}", timeout_secs, rid);
            }

            let view = session.view();
            print_items(&view.items);
            if view.is_empty() {
                println!("No threads");
            }
            manager.detach_all().await;
        }
        Command::List { rid } => {
            let subscription = match store.find_subscription(&rid) {
                Ok(sub) => Some(sub),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            let items: Vec<ThreadListItem> = store
                .query_threads(&ThreadQuery::for_parent(rid.as_str()))?
                .into_iter()
                .map(|thread| ThreadListItem {
                    badge: classify(&thread.id, subscription.as_ref()),
                    thread,
                })
                .collect();
            print_items(&items);
            if items.is_empty() {
                println!("No cached threads for {}", rid);
            }
        }
        Command::Reset { rid } => {
            store.reset_watermark(&rid)?;
            println!("Watermark cleared for {}", rid);
        }
    }

    Ok(())
}

fn print_items(items: &[ThreadListItem]) {
    for item in items {
        let thread = &item.thread;
        println!(
            "{:<4} {:<20} {} {:>3} replies  {}",
            item.badge.label(),
            thread.id,
            thread.last_message_at.format("%Y-%m-%d %H:%M"),
            thread.payload.reply_count,
            thread.payload.msg.lines().next().unwrap_or_default()
        );
    }
}
