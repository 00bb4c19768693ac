//! Backend of the frontend stack starter: account storage, bearer auth and a
//! one-time initial admin registration for a fresh install.
//!
//!
//!
//! # General Infrastructure
//! - Single axum server in front of Redis
//! - The SPA talks to `/api/*` only, JSON in and out
//! - Redis holds every account record, see [`store`]
//! - First start seeds a placeholder superuser, see [`migrations`]
//!
//!
//!
//! # Initial Admin Registration
//!
//! **Goal**: Let whoever deploys the stack claim the first admin account from
//! the browser, exactly once, without shipping default credentials.
//!
//! - Fresh install holds no users and one placeholder superuser
//! - Frontend asks `/api/auth/status`, shows the setup form when `canBootstrap` is true
//! - Form posts email, password and confirmation to `/api/bootstrap`
//! - Server re-checks the install state under a lock, then swaps the placeholder
//!   for a real user and superuser in one transaction
//! - Every later attempt answers 409
//! - `INITIAL_ADMIN_REGISTRATION=false` closes both bootstrap routes with 403
//!
//!
//!
//! # Endpoints
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | GET | `/api/bootstrap/exists` | `{"exists": bool}` |
//! | POST | `/api/bootstrap` | `{"success": true}` |
//! | GET | `/api/auth/status` | `{"authenticated": bool, "canBootstrap": bool}` |
//! | POST | `/api/auth/login` | `{"token": string, "collection": string}` |
//! | GET | `/api/health` | `ok` |
//!
//! Errors come back as `{"error": string}`.
//!
//!
//!
//! # Setup
//!
//! Run against a local Redis.
//! ```sh
//! AUTH_TOKEN_SECRET=dev RUST_LOG=info cargo run --bin stack-server
//! ```
//!
//! Run without Redis, state is lost on exit.
//! ```sh
//! AUTH_TOKEN_SECRET=dev STORE_BACKEND=memory cargo run --bin stack-server
//! ```
//!
//! Seed or inspect an install from the shell.
//! ```sh
//! cargo run --bin setup -- migrate
//! cargo run --bin setup -- status
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod accounts;
pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod migrations;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

use config::Config;
use routes::{
    auth_status_handler, bootstrap_handler, exists_handler, health_handler, login_handler,
};
use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/bootstrap/exists", get(exists_handler))
        .route("/api/bootstrap", post(bootstrap_handler))
        .route("/api/auth/status", get(auth_status_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state with {} store...", config.store_backend);
    let state = AppState::new(config).await?;

    migrations::ensure_placeholder_superuser(state.store.as_ref(), &state.hasher).await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
