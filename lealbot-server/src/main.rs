// File: lealbot-server/src/main.rs

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use lealbot_core::auth::{callback_server, TokenFileStore, TokenManager};
use lealbot_core::auth::OauthClient;
use lealbot_core::crypto::{load_or_create_key, Encryptor};
use lealbot_core::eventbus::{EventBus, ShopEvent};
use lealbot_core::platforms::twitch::{HelixClient, TwitchOauthClient};
use lealbot_core::repositories::postgres::PostgresCredentialsRepository;
use lealbot_core::services::PointsLedger;
use lealbot_core::tasks::token_refresh::DEFAULT_SWEEP_PERIOD;
use lealbot_core::tasks::{spawn_token_refresh_task, spawn_vip_grant_task};
use lealbot_core::{Database, Error};

/// How long `--mode authorize` waits for the operator to finish the consent
/// flow in the browser.
const AUTHORIZE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Parser, Debug, Clone)]
#[command(name = "lealbot")]
#[command(author, version, about = "Lealbot - loyalty points and shop backend for a streaming channel")]
struct Args {
    /// Mode: "server" or "authorize"
    #[arg(long, default_value = "server")]
    mode: String,

    /// Postgres connection URL. Overrides DATABASE_URL.
    #[arg(long)]
    db_path: Option<String>,

    /// Restrict token resolution to this bot account login.
    #[arg(long)]
    account: Option<String>,

    /// Loopback port the OAuth callback listener binds in authorize mode.
    /// Must match the redirect URI registered with the platform.
    #[arg(long, default_value = "9876")]
    callback_port: u16,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("lealbot=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("Lealbot starting. mode={}", args.mode);

    match args.mode.as_str() {
        "server" => {
            if let Err(e) = run_server(args).await {
                error!("Server error: {:?}", e);
            }
        }
        "authorize" => {
            if let Err(e) = run_authorize(args).await {
                error!("Authorization error: {:?}", e);
            }
        }
        other => {
            error!("Invalid mode '{}'. Use --mode=server or --mode=authorize.", other);
        }
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

fn resolve_db_url(args: &Args) -> String {
    args.db_path
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "postgres://lealbot@localhost:5432/lealbot".to_string())
}

fn env_var(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required_env(name: &str) -> Result<String, Error> {
    std::env::var(name).map_err(|_| Error::Auth(format!("environment variable {name} is not set")))
}

fn build_oauth_client(args: &Args) -> Result<TwitchOauthClient, Error> {
    let client_id = required_env("TWITCH_CLIENT_ID")?;
    let client_secret = required_env("TWITCH_CLIENT_SECRET")?;
    let redirect_uri = format!("http://localhost:{}/callback", args.callback_port);
    TwitchOauthClient::new(client_id, client_secret, redirect_uri)
}

fn build_token_manager(
    db: &Database,
    args: &Args,
    oauth: Arc<TwitchOauthClient>,
) -> Result<TokenManager, Error> {
    let key_path = env_var("LEALBOT_KEY_FILE", "lealbot.key");
    let key = load_or_create_key(Path::new(&key_path))?;
    let encryptor = Encryptor::new(&key)?;
    let creds_repo = Arc::new(PostgresCredentialsRepository::new(
        db.pool().clone(),
        encryptor,
    ));

    let token_file = TokenFileStore::new(env_var("LEALBOT_TOKEN_FILE", "twitch_tokens.json"));
    Ok(TokenManager::new(
        creds_repo,
        oauth,
        token_file,
        args.account.clone(),
    ))
}

async fn run_server(args: Args) -> Result<(), Error> {
    let db_url = resolve_db_url(&args);
    info!("Using Postgres DB URL: {}", db_url);
    let db = Database::new(&db_url).await?;
    db.migrate().await?;

    let client_id = required_env("TWITCH_CLIENT_ID")?;
    let oauth = Arc::new(build_oauth_client(&args)?);
    let token_manager = build_token_manager(&db, &args, oauth)?;

    let event_bus = Arc::new(EventBus::new());
    let ledger = PointsLedger::new(db.pool().clone(), event_bus.clone());
    let helix = Arc::new(HelixClient::new(token_manager.clone(), client_id)?);

    let _refresh_handle = spawn_token_refresh_task(
        token_manager.clone(),
        event_bus.clone(),
        DEFAULT_SWEEP_PERIOD,
    );

    match std::env::var("LEALBOT_CHANNEL_ID") {
        Ok(channel_id) => {
            let _vip_handle = spawn_vip_grant_task(
                event_bus.clone(),
                helix.clone(),
                ledger.clone(),
                channel_id,
            );
        }
        Err(_) => {
            warn!("LEALBOT_CHANNEL_ID is not set; vip grants are disabled");
        }
    }

    // Handle Ctrl-C to signal shutdown
    let eb_clone = event_bus.clone();
    let _ctrlc_handle = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
        }
        info!("Ctrl-C detected; shutting down event bus...");
        eb_clone.shutdown();
    });

    // Main event loop
    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(10)) => {
                event_bus.publish(ShopEvent::Tick).await;
            }
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown signaled; exiting server loop.");
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Interactive consent flow: print the authorize URL, catch the redirect on
/// the loopback listener, exchange the code and store the credential.
async fn run_authorize(args: Args) -> Result<(), Error> {
    let db_url = resolve_db_url(&args);
    let db = Database::new(&db_url).await?;
    db.migrate().await?;

    let oauth = Arc::new(build_oauth_client(&args)?);
    let token_manager = build_token_manager(&db, &args, oauth.clone())?;

    callback_server::test_port_available(args.callback_port).await?;

    let state = random_state()?;
    let url = oauth.build_authorize_url(&state);
    println!("Open this URL in the bot account's browser session:\n\n  {url}\n");
    println!("Waiting for the callback on port {}...", args.callback_port);

    let (done_rx, shutdown_tx) = callback_server::start_callback_server(args.callback_port).await?;
    let result = tokio::time::timeout(AUTHORIZE_TIMEOUT, done_rx)
        .await?
        .map_err(|_| Error::Auth("callback server closed before a code arrived".to_string()))?;
    let _ = shutdown_tx.send(());

    if result.state.as_deref() != Some(state.as_str()) {
        return Err(Error::Auth(
            "state mismatch in authorization callback".to_string(),
        ));
    }

    let credential = token_manager.complete_authorization(&result.code).await?;
    println!(
        "Authorized bot account '{}' (platform id {}).",
        credential.user_name, credential.platform_user_id
    );
    Ok(())
}

/// CSRF nonce for the authorize URL. URL-safe so it survives the round trip
/// through the query string unchanged.
fn random_state() -> Result<String, Error> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use rand_core::TryRngCore;

    let mut bytes = [0u8; 16];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Auth(format!("failed to generate state nonce: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
