//! kbase server binary - composition root.
//!
//! 1. Parse CLI flags and load the TOML configuration
//! 2. Install the tracing subscriber
//! 3. Make sure an admin token exists
//! 4. Connect to the vector engine and warm the document cache
//! 5. Serve the REST API until Ctrl-C

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use kb_api::auth::load_or_generate_token;
use kb_api::state::AppState;
use kb_core::config::{KbConfig, TokenEntry};
use kb_core::types::Role;
use kb_vector::{HttpVectorEngine, InMemoryEngine, VectorEngine};

use cli::CliArgs;

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

/// Add a generated admin token when the configuration defines none.
///
/// The token is persisted next to the configuration file as `admin.token`.
fn ensure_admin_token(config: &mut KbConfig, config_file: &Path) {
    if config.auth.has_admin() {
        return;
    }
    let token_path = config_file
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("admin.token");
    let token = load_or_generate_token(&token_path);
    config.auth.tokens.push(TokenEntry {
        token,
        username: "admin".to_string(),
        role: Role::Admin,
    });
    tracing::info!(
        path = %token_path.display(),
        "No admin token configured, using the token stored in this file"
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match KbConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (KbConfig::default(), Some(e)),
    };
    config.general.port = args.resolve_port(config.general.port);
    config.engine.url = args.resolve_engine_url(&config.engine.url);

    // Tracing.
    init_tracing(&args.resolve_log_level(&config.general.log_level));
    tracing::info!("Starting kbase v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load configuration, using defaults"
        ),
    }

    ensure_admin_token(&mut config, &config_file);

    // Vector engine.
    let engine: Arc<dyn VectorEngine> = if args.offline {
        tracing::info!("Offline mode: using the in-process vector engine");
        Arc::new(InMemoryEngine::new(config.engine.embedding_dim))
    } else {
        let http = HttpVectorEngine::new(&config.engine)?;
        tracing::info!(
            url = %http.base_url(),
            model = %config.engine.model,
            "Using HTTP vector engine"
        );
        Arc::new(http)
    };

    let state = AppState::new(config.clone(), engine);

    let store = state.kb.store();
    if store.is_engine_healthy().await {
        match store.reload().await {
            Ok(count) => tracing::info!(count, "Document cache warmed"),
            Err(e) => tracing::warn!(error = %e, "Failed to warm document cache"),
        }
    } else {
        tracing::warn!(
            url = %config.engine.url,
            "Vector engine unreachable, serving cached data until it recovers"
        );
    }

    // === API server ===
    if let Err(e) = kb_api::start_server(&config, state).await {
        tracing::error!(error = %e, "API server failed");
        return Err(e.into());
    }
    tracing::info!("Server stopped");
    Ok(())
}
