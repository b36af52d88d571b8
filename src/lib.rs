//! Campus helpdesk backend.
//!
//! Serves FAQs, notices and timetables over a small REST API and answers
//! student questions on `POST /api/chat`, first from stored content and then
//! from a hosted language model.
//!
//! # Configuration
//!
//! Read from the environment at startup, see [`config::Config::load`].
//!
//! | Variable | Default |
//! |---|---|
//! | `PORT` | `5000` |
//! | `DATABASE_PATH` | `helpdesk.db` |
//! | `UPLOAD_DIR` | `uploads` |
//! | `JWT_SECRET` | required |
//! | `TOKEN_TTL_HOURS` | `24` |
//! | `GROQ_API_KEY` | required |
//! | `GROQ_BASE_URL` | `https://api.groq.com/openai/v1` |
//! | `GROQ_MODEL` | `llama-3.1-8b-instant` |
//! | `FALLBACK_MODE` | `minimal` (or `context`) |
//! | `FAQ_MATCH` | `either` (or `pattern`, `contains`, `keywords`) |
//! | `PUBLIC_URL` | unset |
//! | `PROVIDER_TIMEOUT_SECS` | `20` |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod routes;
pub mod state;

use tokio::{net::TcpListener, signal::ctrl_c};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use config::Config;
use error::ServerError;
use state::AppState;

pub async fn run() -> Result<(), ServerError> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Loading configuration...");
    let config = Config::load()?;
    info!("{config:?}");

    info!("Initializing state...");
    let state = AppState::new(config)?;
    let app = routes::router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    state.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
