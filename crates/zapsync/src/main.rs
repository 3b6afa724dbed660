//! zapsync: WhatsApp bot connection watcher
//!
//! Attaches to one bot, keeps its connection view synchronized from the
//! push channel and the document store, and prints every view change as
//! a JSON line.
//!
//! Usage:
//!   zapsync <bot-id>           - Watch a bot's connection state
//!   zapsync <bot-id> --start   - Request a start, then watch
//!   zapsync <bot-id> --stop    - Request a stop, then watch
//!   zapsync --help             - Show help

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use zap_auth::{spawn_refresh_task, IdentityClient, TokenStore};
use zap_control::ControlClient;
use zap_core::{Config, TokenSource};
use zap_push::PushChannel;
use zap_store::StoreClient;
use zap_sync::{SyncDeps, Synchronizer};

/// Run mode
enum RunMode {
    /// Attach to a bot and stream its view
    Watch(WatchOpts),
    /// Show help
    Help,
    /// Show version
    Version,
}

struct WatchOpts {
    bot_id: String,
    start: bool,
    stop: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let opts = match parse_args() {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("zapsync {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Watch(opts) => opts,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting zapsync...");
    tracing::info!("Bot: {}", opts.bot_id);

    // Sign in and keep the token fresh in the background
    let tokens = Arc::new(TokenStore::new());
    let mut refresh_handle = None;

    match (&config.auth.email, &config.auth.password) {
        (Some(email), Some(password)) => {
            let identity = IdentityClient::new(&config.auth.url)
                .map_err(|e| anyhow::anyhow!("Failed to create identity client: {}", e))?;
            let session = identity
                .sign_in(email, password)
                .await
                .map_err(|e| anyhow::anyhow!("Sign-in failed: {}", e))?;
            tokens.set(session.id_token.clone());

            let interval = Duration::from_secs(config.auth.refresh_minutes * 60);
            refresh_handle = Some(spawn_refresh_task(
                identity,
                Arc::clone(&tokens),
                session,
                interval,
            ));
            tracing::info!("Signed in as {}", email);
        }
        _ => {
            tracing::warn!("No credentials configured; authenticated operations will fail");
        }
    }

    // Build the clients the synchronizer calls out to
    let token_source: Arc<dyn TokenSource> = Arc::clone(&tokens) as Arc<dyn TokenSource>;
    let store = StoreClient::new(&config.store.url, Arc::clone(&token_source))
        .map_err(|e| anyhow::anyhow!("Failed to create store client: {}", e))?;
    let control = ControlClient::new(&config.control.url, Arc::clone(&token_source))
        .map_err(|e| anyhow::anyhow!("Failed to create control client: {}", e))?;

    // One shared push connection; the synchronizer gets its own
    // per-bot subscription
    let channel = PushChannel::connect(config.push.clone());
    let subscription = channel.subscribe(&opts.bot_id);

    let deps = SyncDeps {
        store: Arc::new(store),
        control: Arc::new(control),
        tokens: token_source,
    };
    let handle = Synchronizer::spawn(opts.bot_id.clone(), deps, subscription, config.sync.clone());

    if opts.start {
        handle.start().await.map_err(|e| anyhow::anyhow!("{}", e))?;
    }
    if opts.stop {
        handle.stop().await.map_err(|e| anyhow::anyhow!("{}", e))?;
    }

    tracing::info!("Press Ctrl+C to exit");

    // Stream view changes until interrupted
    let mut views = handle.watch();
    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    tracing::error!("Synchronizer task ended");
                    break;
                }
                let line = serde_json::to_string(&*views.borrow_and_update())?;
                println!("{}", line);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    // Tear down in dependency order: the synchronizer drops its
    // subscription, then the channel task is aborted
    let _ = handle.shutdown().await;
    drop(channel);
    if let Some(task) = refresh_handle {
        task.abort();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Parse command line arguments
fn parse_args() -> RunMode {
    let args: Vec<String> = std::env::args().collect();
    let mut bot_id = None;
    let mut start = false;
    let mut stop = false;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            "--start" => start = true,
            "--stop" => stop = true,
            other if !other.starts_with('-') && bot_id.is_none() => {
                bot_id = Some(other.to_string());
            }
            _ => {}
        }
    }

    match bot_id {
        Some(bot_id) => RunMode::Watch(WatchOpts {
            bot_id,
            start,
            stop,
        }),
        None => RunMode::Help,
    }
}

/// Print help message
fn print_help() {
    println!("zapsync - WhatsApp bot connection watcher");
    println!();
    println!("Usage:");
    println!("  zapsync <bot-id>           Watch a bot's connection state");
    println!("  zapsync <bot-id> --start   Request a start, then watch");
    println!("  zapsync <bot-id> --stop    Request a stop, then watch");
    println!("  zapsync --help             Show this help message");
    println!("  zapsync --version          Show version");
    println!();
    println!("Configuration is read from zapsync.toml, then the environment:");
    println!("  ZAPSYNC_API_URL            Bot control backend URL");
    println!("  ZAPSYNC_STORE_URL          Document store URL");
    println!("  ZAPSYNC_AUTH_URL           Identity provider URL");
    println!("  ZAPSYNC_AUTH_EMAIL         Sign-in email");
    println!("  ZAPSYNC_AUTH_PASSWORD      Sign-in password");
    println!("  ZAPSYNC_PUSH_URL           Push channel WebSocket URL");
    println!("  ZAPSYNC_POLL_INTERVAL_SECS Store poll interval (default: 5)");
    println!("  ZAPSYNC_QR_TIMEOUT_SECS    Pairing code lifetime (default: 30)");
}
