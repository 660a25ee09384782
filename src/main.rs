//! EduTutor · Adaptive Tutoring Backend
//!
//! - Axum HTTP API for the tutor/student education app
//! - Optional Gemini integration (via environment variables)
//! - File-backed persistence with cross-session change folding
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   GEMINI_API_KEY        : enables Gemini integration if present
//!   GEMINI_BASE_URL       : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_FAST_MODEL     : default "gemini-2.5-flash"
//!   GEMINI_INSIGHTS_MODEL : default "gemini-2.5-pro"
//!   APP_CONFIG_PATH       : path to TOML config (prompts + optional topic bank)
//!   DATA_DIR              : persistence directory (default "./data")
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod catalog;
mod config;
mod error;
mod store;
mod state;
mod protocol;
mod logic;
mod gemini;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{FileStore, StateStore};

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (file-backed stores, Gemini client, prompts).
  let store = Arc::new(FileStore::from_env());
  let state = Arc::new(AppState::new(store.clone()));

  // Fold external store writes (another session) back into memory. The
  // refresh pass deep-compares snapshots, so our own writes coalesce away.
  {
    let state = state.clone();
    let mut events = store.subscribe();
    tokio::spawn(async move {
      use tokio::sync::broadcast::error::RecvError;
      loop {
        match events.recv().await {
          Ok(key) => {
            if state.refresh_from_store().await {
              info!(target: "edututor_backend", %key, "State refreshed from store change");
            }
          }
          Err(RecvError::Lagged(_)) => continue,
          Err(RecvError::Closed) => break,
        }
      }
    });
  }

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "edututor_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
