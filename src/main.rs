//! companiond — local companion-chat daemon.
//!
//! Runs as a per-user service, listening on a Unix socket for JSON-RPC
//! requests from the chat frontend. Owns the bot roster, transcripts,
//! sessions, and usage counters; routes chat turns to cloud providers
//! with retry and quota fail-over, or to the offline rule engine for
//! the local model.
//!
//! Storage:
//! - SQLite for state, with a debounced saver task
//! - JSON shadow snapshot of bots and personas for recovery
//! - API keys encrypted at rest (AES-256-GCM + Argon2id)

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};

mod adapters;
mod error;
mod offline;
mod prompt;
mod relay;
mod router;
mod server;
mod state;
mod store;
mod usage;

use adapters::ProviderAdapter;
use relay::{CredentialSource, Relay};
use router::Provider;
use state::AppState;
use store::saver::Saver;
use store::shadow::ShadowFile;
use store::Store;

/// Configuration loaded from the environment or defaults.
struct Config {
    data_dir: PathBuf,
    db_path: PathBuf,
    shadow_path: PathBuf,
    socket_path: PathBuf,
}

impl Config {
    fn from_env() -> Self {
        let data_dir = std::env::var("COMPANIOND_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .expect("cannot determine home directory")
                    .join(".companiond")
            });

        Self {
            db_path: data_dir.join("companiond.db"),
            shadow_path: data_dir.join("shadow.json"),
            socket_path: data_dir.join("companiond.sock"),
            data_dir,
        }
    }
}

/// Credentials for the relay: environment variables win, then the
/// encrypted key store.
struct VaultCredentials {
    store: Arc<Store>,
}

impl CredentialSource for VaultCredentials {
    fn key_for(&self, provider: Provider) -> Option<String> {
        let var = provider.env_key()?;
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                return Some(value);
            }
        }
        match self.store.decrypt_api_key(provider.as_str()) {
            Ok(value) => value,
            Err(err) => {
                warn!(provider = %provider, error = %err, "failed to decrypt stored key");
                None
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "companiond=info".into()),
        )
        .with_target(false)
        .init();

    info!("companiond v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)?;

    // ── Master Key ──────────────────────────────────────────────────
    let master_passphrase = match std::env::var("COMPANIOND_MASTER_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => load_or_create_master_key(&config.data_dir)?,
    };

    // ── Store + State ───────────────────────────────────────────────
    let store = Arc::new(
        Store::open(&config.db_path, master_passphrase.into_bytes())
            .context("failed to open companiond database")?,
    );
    let shadow = ShadowFile::new(&config.shadow_path);

    let state = Arc::new(Mutex::new(load_state(&store, &shadow)?));

    // ── Adapters + Relay ────────────────────────────────────────────
    let mut adapter_map: HashMap<Provider, Arc<dyn ProviderAdapter>> = HashMap::new();
    adapter_map.insert(
        Provider::Gemini,
        Arc::new(adapters::gemini::GeminiAdapter::new()),
    );
    adapter_map.insert(Provider::Groq, Arc::new(adapters::groq::GroqAdapter::new()));
    adapter_map.insert(
        Provider::DeepSeek,
        Arc::new(adapters::deepseek::DeepSeekAdapter::new()),
    );
    adapter_map.insert(
        Provider::OpenRouter,
        Arc::new(adapters::openrouter::OpenRouterAdapter::new()),
    );

    let relay = Arc::new(Relay::with_parts(
        adapter_map,
        Arc::new(VaultCredentials {
            store: Arc::clone(&store),
        }),
        relay::RelayConfig::default(),
    ));

    // ── Saver ───────────────────────────────────────────────────────
    let (dirty_tx, dirty_rx) = mpsc::unbounded_channel();
    state.lock().unwrap().attach_saver(dirty_tx);
    let saver = Saver::new(
        Arc::clone(&state),
        Arc::clone(&store),
        ShadowFile::new(&config.shadow_path),
        dirty_rx,
    );
    let saver_handle = tokio::spawn(saver.run());

    // ── JSON-RPC Server ─────────────────────────────────────────────
    let srv = server::Server::new(
        config.socket_path,
        Arc::clone(&state),
        Arc::clone(&store),
        relay,
    );

    info!("companiond ready");

    tokio::select! {
        result = srv.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    // Closing the dirty channel makes the saver flush pending work and exit.
    let sender = state.lock().unwrap().take_saver();
    drop(sender);
    saver_handle.await.ok();

    Ok(())
}

/// Master key fallback when no env var is set: generated once and kept
/// in an owner-only file next to the database.
fn load_or_create_master_key(data_dir: &std::path::Path) -> Result<String> {
    let path = data_dir.join("master.key");
    if path.exists() {
        let key = std::fs::read_to_string(&path)?;
        let key = key.trim().to_string();
        if !key.is_empty() {
            return Ok(key);
        }
    }

    info!("no master key found, generating one");
    let key = uuid::Uuid::new_v4().to_string();
    std::fs::write(&path, &key)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(key)
}

/// Load persisted state. An empty database with a non-empty shadow is
/// treated as data loss; the shadow's bots and personas are restored
/// and written back.
fn load_state(store: &Store, shadow: &ShadowFile) -> Result<AppState> {
    let mut state = AppState::new();

    let mut bots = store.load_bots()?;
    let mut personas = store.load_personas()?;

    if bots.is_empty() {
        if let Some(snapshot) = shadow.read() {
            if !snapshot.bots.is_empty() {
                warn!(
                    bots = snapshot.bots.len(),
                    "database has no bots, restoring from shadow snapshot"
                );
                bots = snapshot.bots;
                personas = snapshot.personas;
                store.save_bots(&bots)?;
                store.save_personas(&personas)?;
            }
        }
    }

    let bot_count = bots.len();
    state.load_bots(bots);
    state.load_personas(personas);
    for (bot_id, messages) in store.load_messages()? {
        state.load_history(bot_id, messages);
    }
    state.load_sessions(store.load_sessions()?);
    state.usage.import(store.load_usage()?);

    info!(bots = bot_count, "state loaded");
    Ok(state)
}
