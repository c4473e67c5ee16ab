use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use inkwell::config::{Config, TOKEN_ENV_VAR};
use inkwell::feed::HttpFeedApi;
use inkwell::storage::{Database, DatabaseError};
use inkwell::timeline::{
    Command, EmptyState, MemoryHistory, Notification, Segment, Timeline, TimelineView,
};

/// Get the config directory path (~/.config/inkwell/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("inkwell"))
}

#[derive(Parser, Debug)]
#[command(name = "inkwell", about = "Feed timeline with read-state sync")]
struct Args {
    /// Config file (default: ~/.config/inkwell/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file (default: ~/.config/inkwell/inkwell.db)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    /// Initial route, e.g. "feed/42/post/9" or "feed?url=example.com"
    #[arg(long, value_name = "FRAGMENT")]
    route: Option<String>,

    /// Segment to show: today, recent or fading
    #[arg(long, default_value_t = Segment::Today)]
    segment: Segment,

    /// Search loaded posts instead of listing a segment
    #[arg(long, value_name = "QUERY")]
    search: Option<String>,

    /// Mark every loaded post read
    #[arg(long)]
    mark_all_read: bool,

    /// Keep running with periodic refresh until Ctrl-C
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let Some(token) = config.token() else {
        eprintln!("Error: No API token configured.");
        eprintln!();
        eprintln!("Set {} or add api_token to {}", TOKEN_ENV_VAR, config_path.display());
        std::process::exit(1);
    };

    let db_path = args
        .db
        .clone()
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(|| config_dir.join("inkwell.db"));
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of inkwell appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let api = HttpFeedApi::new(&config.api_base_url, token)
        .context("Invalid api_base_url")?
        .with_entries_per_page(config.entries_per_page)
        .with_max_entry_age_days(config.max_entry_age_days)
        .with_request_timeout(config.request_timeout());

    let history = Arc::new(MemoryHistory::new(args.route.clone().unwrap_or_default()));
    let mut timeline = Timeline::new(
        Arc::new(api),
        Arc::new(db),
        history,
        config.timeline_config(),
    );

    if args.watch {
        watch(timeline, &args).await
    } else {
        timeline.start();
        timeline.settle().await;
        timeline.set_segment(args.segment);
        if let Some(query) = &args.search {
            timeline.set_search_query(query);
        }
        if args.mark_all_read {
            timeline.mark_all_read();
            timeline.settle().await;
        }
        print_view(&timeline.view());
        timeline.shutdown().await;
        Ok(())
    }
}

async fn watch(mut timeline: Timeline, args: &Args) -> Result<()> {
    let (tx, rx) = mpsc::channel(16);
    tx.send(Command::SetSegment(args.segment))
        .await
        .context("Command channel closed")?;
    if let Some(query) = &args.search {
        tx.send(Command::SetSearchQuery(query.clone()))
            .await
            .context("Command channel closed")?;
    }

    let mut notifications = timeline.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => print_notification(&notification),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Notification printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let shutdown_tx = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
        if let Err(e) = shutdown_tx.send(Command::Shutdown).await {
            tracing::warn!(error = %e, "Failed to send shutdown (receiver dropped)");
        }
    });

    timeline.run(rx).await;
    print_view(&timeline.view());
    drop(timeline);
    printer.abort();
    Ok(())
}

fn print_notification(notification: &Notification) {
    match notification {
        Notification::SyncStarted { token } => println!("sync #{} started", token),
        Notification::SyncStopped { token } => println!("sync #{} finished", token),
        Notification::SyncFailed { error } => eprintln!("sync failed: {}", error),
        Notification::MarkAllReadFailed { error } => eprintln!("mark all read failed: {}", error),
        Notification::ReadStateChanged { post_ids, is_read } => {
            let state = if *is_read { "read" } else { "unread" };
            println!("{} post(s) marked {}", post_ids.len(), state);
        }
        Notification::RouteChanged { route } => println!("route: #{}", route),
        _ => {}
    }
}

fn print_view(view: &TimelineView) {
    if let Some(label) = view.feed_filter_label.as_deref().or(view.feed_filter.as_deref()) {
        println!("Feed: {}", label);
    }
    match &view.search_query {
        Some(query) => println!("Search: \"{}\"", query),
        None => println!("Segment: {}", view.segment),
    }
    if view.loading {
        println!("(not loaded)");
        return;
    }
    if let Some(empty) = view.empty_state {
        let message = match empty {
            EmptyState::NoPostsInFeed => "No posts from this feed in the last week.",
            EmptyState::NoSubscriptions => "You have no subscriptions yet.",
            EmptyState::Empty => "Nothing here.",
        };
        println!("{}", message);
        return;
    }
    for post in &view.posts {
        let read = if post.is_read { ' ' } else { '*' };
        let bookmark = if post.is_bookmarked { '+' } else { ' ' };
        let open = if view.open_post_id.as_deref() == Some(post.id.as_str()) {
            '>'
        } else {
            ' '
        };
        println!(
            "{}{}{} {:<6} {} ({})",
            open, read, bookmark, post.age_bucket.as_str(), post.title, post.source
        );
    }
}
