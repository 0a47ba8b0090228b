#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use lg_client::{ClientMetrics, SnapClient, SnapClientConfig};
use lg_core::gallery::{
    streak_days, thumbnail, Gallery, GalleryEntry, Thumbnail, DEFAULT_COLUMNS,
};
use lg_core::snap_key::Visibility;
use lg_core::tags::{Caption, SnapMetadata};
use lg_core::types::PushToken;
use lg_notify::expo::{ExpoPushClient, EXPO_PUSH_URL};
use lg_snap_store::SnapStore;

use crate::state::{default_state_path, ClientState};

#[derive(Debug, Parser)]
#[command(name = "lg", about = "Send and receive Looking Glass snaps")]
struct Args {
    /// Shared store: `s3://bucket[/prefix]` or a local directory.
    #[arg(long, env = "LG_STORE")]
    store: String,

    /// Client state file. Defaults to `<config dir>/looking-glass/state.json`.
    #[arg(long, env = "LG_STATE_PATH")]
    state_path: Option<PathBuf>,

    /// Push service endpoint.
    #[arg(long, env = "LG_PUSH_URL", default_value = EXPO_PUSH_URL)]
    push_url: String,

    /// Lifetime of presigned snap URLs.
    #[arg(long, env = "LG_URL_TTL_SECS", default_value_t = 900)]
    url_ttl_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Set the name peers see on notifications.
    Setup {
        #[arg(long)]
        name: String,
    },
    /// Store this device's push token and publish it to peers.
    RegisterToken {
        #[arg(long)]
        token: String,
    },
    /// Upload a JPEG and notify every peer.
    Send {
        file: PathBuf,
        /// Blur the snap in galleries until it is revealed.
        #[arg(long)]
        hidden: bool,
        #[arg(long)]
        caption: Option<String>,
        #[arg(long, default_value_t = 0.5)]
        caption_x: f32,
        #[arg(long, default_value_t = 0.5)]
        caption_y: f32,
    },
    /// Count snaps received since the last one opened.
    Pending,
    /// Open the oldest pending snap and mark it seen.
    Open,
    /// React to a snap; the sender is notified.
    React { key: String, emoji: String },
    /// Replace a snap's caption.
    Caption {
        key: String,
        text: String,
        #[arg(long, default_value_t = 0.5)]
        x: f32,
        #[arg(long, default_value_t = 0.5)]
        y: f32,
    },
    /// List every snap, newest first.
    Gallery {
        #[arg(long)]
        by_month: bool,
        #[arg(long, default_value_t = DEFAULT_COLUMNS)]
        columns: usize,
        /// Show hidden snaps instead of their placeholder.
        #[arg(long)]
        reveal: bool,
        /// First day of the streak counter (`YYYY-MM-DD`).
        #[arg(long, env = "LG_STREAK_START_DATE")]
        streak_start: Option<NaiveDate>,
    },
    /// Show or change client settings.
    Settings {
        /// Also deliver this client's own snaps to itself.
        #[arg(long)]
        self_send: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    lg_observe::logging::init_tracing();
    let args = Args::parse();

    let state_path = args.state_path.clone().unwrap_or_else(default_state_path);
    let mut state = ClientState::load_or_init(&state_path, Utc::now())?;

    // Settings changes apply before the client is built so it sees them.
    match &args.command {
        Command::Setup { name } => {
            state.display_name = name.trim().to_string();
            state.save(&state_path)?;
        }
        Command::RegisterToken { token } => {
            state.push_token = PushToken(token.trim().to_string());
            state.save(&state_path)?;
        }
        Command::Settings {
            self_send: Some(self_send),
        } => {
            state.self_send = *self_send;
            state.save(&state_path)?;
        }
        _ => {}
    }

    let store: Arc<dyn SnapStore> = Arc::from(
        lg_snap_store::open_from_root(&args.store)
            .with_context(|| format!("opening store {}", args.store))?,
    );
    let notifier = Arc::new(ExpoPushClient::new(args.push_url.clone())?);
    let client = SnapClient::new(
        store,
        notifier,
        SnapClientConfig {
            client_id: state.client_id.clone(),
            push_token: state.push_token.clone(),
            display_name: state.display_name.clone(),
            self_send: state.self_send,
            url_ttl: Duration::from_secs(args.url_ttl_secs),
        },
    );

    let result = run(&args, &client, &mut state, &state_path).await;
    emit_metrics_snapshot(&client.metrics());
    result
}

async fn run(
    args: &Args,
    client: &SnapClient,
    state: &mut ClientState,
    state_path: &std::path::Path,
) -> Result<()> {
    match &args.command {
        Command::Setup { .. } => {
            println!("display name: {}", state.display_name);
            if !state.push_token.is_empty() {
                client.register_token()?;
            }
        }
        Command::RegisterToken { .. } => {
            let key = client.register_token()?;
            println!("registered: {key}");
        }
        Command::Send {
            file,
            hidden,
            caption,
            caption_x,
            caption_y,
        } => {
            let jpeg = tokio::fs::read(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let caption = caption
                .as_deref()
                .map(|text| Caption::new(text, *caption_x, *caption_y))
                .transpose()?;
            let visibility = if *hidden {
                Visibility::Hidden
            } else {
                Visibility::Visible
            };
            let key = client.send_snap(&jpeg, visibility, caption, Utc::now())?;
            println!("sent: {key}");
        }
        Command::Pending => {
            let queue = client.check_pending(&state.last_snap)?;
            println!("pending: {}", queue.len());
            for snap in queue.iter() {
                println!("  {}", snap.object.key);
            }
        }
        Command::Open => {
            let mut queue = client.check_pending(&state.last_snap)?;
            let Some(next) = queue.pop() else {
                println!("no new snaps");
                return Ok(());
            };
            let opened = client.open(&next)?;
            println!("key: {}", next.object.key);
            println!("from: {}", opened.key.sender);
            println!("url: {}", opened.url);
            print_metadata(&opened.metadata);
            println!("remaining: {}", queue.len());

            state.last_snap = opened.marker;
            state.save(state_path)?;
        }
        Command::React { key, emoji } => {
            client.react(key, emoji)?;
            println!("reacted {emoji} to {key}");
        }
        Command::Caption { key, text, x, y } => {
            client.set_caption(key, Caption::new(text.as_str(), *x, *y)?)?;
            println!("caption set on {key}");
        }
        Command::Gallery {
            by_month,
            columns,
            reveal,
            streak_start,
        } => {
            let gallery = client.gallery()?;
            if let Some(start) = streak_start {
                let start = start.and_time(NaiveTime::MIN).and_utc();
                let days = streak_days(start, Utc::now());
                if days > 0 {
                    println!("streak: {days} days");
                }
            }
            print_gallery(client, &gallery, *by_month, *columns, *reveal)?;
        }
        Command::Settings { .. } => {
            println!("store: {}", args.store);
            println!("state: {}", state_path.display());
            println!("client id: {}", state.client_id);
            println!("display name: {}", state.display_name);
            println!("push token: {}", state.push_token.short());
            println!("self send: {}", state.self_send);
            match &state.last_snap.key {
                Some(key) => println!("last snap: {key}"),
                None => println!("last snap: none"),
            }
            println!(
                "last snap time: {}",
                lg_core::snap_key::format_timestamp(&state.last_snap.last_modified)
            );
        }
    }
    Ok(())
}

fn print_metadata(meta: &SnapMetadata) {
    if let Some(caption) = &meta.caption {
        println!(
            "caption: {:?} at ({:.2}, {:.2})",
            caption.text, caption.x, caption.y
        );
    }
    for (emoji, count) in meta.reaction_counts() {
        println!("reaction: {emoji} x{count}");
    }
}

fn print_gallery(
    client: &SnapClient,
    gallery: &Gallery,
    by_month: bool,
    columns: usize,
    reveal: bool,
) -> Result<()> {
    if gallery.is_empty() {
        println!("no snaps");
        return Ok(());
    }
    if by_month {
        for bucket in gallery.by_month(columns) {
            println!("{}", bucket.month);
            print_rows(client, &bucket.rows, reveal)?;
        }
    } else {
        print_rows(client, &gallery.rows(columns), reveal)?;
    }
    Ok(())
}

fn print_rows(client: &SnapClient, rows: &[Vec<GalleryEntry>], reveal: bool) -> Result<()> {
    for (i, row) in rows.iter().enumerate() {
        println!("  row {i}");
        for entry in row {
            // Hidden snaps are not presigned until revealed.
            let url = if entry.key.is_hidden() && !reveal {
                String::new()
            } else {
                client.snap_url(&entry.object.key)?
            };
            match thumbnail(&entry.key, url, reveal) {
                Thumbnail::Placeholder { blurhash } => {
                    println!("    {} [hidden {blurhash}]", entry.object.key)
                }
                Thumbnail::Image { url } => println!("    {} {url}", entry.object.key),
            }
        }
    }
    Ok(())
}

fn emit_metrics_snapshot(metrics: &ClientMetrics) {
    let list_latency = metrics.list_latency.snapshot();
    info!(
        target: "lg_metrics",
        snaps_sent_total = metrics.snaps_sent_total.get(),
        snaps_opened_total = metrics.snaps_opened_total.get(),
        reactions_total = metrics.reactions_total.get(),
        list_requests_total = metrics.list_requests_total.get(),
        notifications_sent_total = metrics.notifications_sent_total.get(),
        notifications_rejected_total = metrics.notifications_rejected_total.get(),
        notify_failures_total = metrics.notify_failures_total.get(),
        caption_failures_total = metrics.caption_failures_total.get(),
        pending_snaps = metrics.pending_snaps.get(),
        list_count = list_latency.count,
        list_avg_ns = list_latency.avg_ns(),
        list_max_ns = list_latency.max_ns,
        "metrics"
    );
}
