//! # Ponsiv waitlist backend
//!
//! Two stateless endpoints backing the landing page waitlist, both reading
//! and writing a hosted key-value store:
//!
//! - `POST /api/waitlist` — validate, normalize, dedup, and persist a
//!   candidate email, rate limited by source address
//! - `GET /api/admin/waitlist` — bearer-token-gated listing of every
//!   registrant, newest first
//!
//! Each call is a single independent request/response; there is no cross-call
//! state beyond the store.
//!
//!
//!
//! # Configuration
//!
//! | Variable | Default | |
//! |---|---|---|
//! | `RUST_PORT` | `1111` | listen port |
//! | `REDIS_URL` | `redis://127.0.0.1:6379` | store address |
//! | `ADMIN_TOKEN` | *required* | bearer token for the admin listing |
//! | `WAITLIST_RATE_LIMIT` | `3` | admitted requests per window |
//! | `WAITLIST_RATE_WINDOW_SECS` | `900` | rate-limit window |
//!
//! `ADMIN_TOKEN` may also come from `/run/secrets/ADMIN_TOKEN`. Startup
//! fails when it is set nowhere.

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod config;
pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod store;
pub mod waitlist;

use routes::build_router;
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");
    let app = build_router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
