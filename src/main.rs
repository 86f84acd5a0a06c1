//! LopHoc · Progression Backend
//!
//! - Axum HTTP API for XP, levels, streaks, achievements and quiz grading
//! - Optional per-learner JSON snapshots (DATA_DIR)
//! - Optional admin webhook for essay grading notices
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   LOPHOC_CONFIG_PATH : path to TOML config (policy, auth, catalogs)
//!   JWT_SECRET         : HS256 secret shared with the identity provider
//!   DATA_DIR           : directory for learner snapshots (in-memory if unset)
//!   ADMIN_WEBHOOK_URL  : receives pending-grade notices as JSON
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod achievements;
mod auth;
mod balancer;
mod config;
mod domain;
mod errors;
mod ledger;
mod leveling;
mod logic;
mod notify;
mod protocol;
mod quiz;
mod routes;
mod seeds;
mod state;
mod store;
mod streak;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: learner store, catalogs, token verifier, notifier.
  let state = Arc::new(AppState::new()?);

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "lophoc_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "lophoc_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "lophoc_backend", error = %e, "Could not listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
  info!(target: "lophoc_backend", "Shutdown requested");
}
