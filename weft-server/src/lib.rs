//! HTTP + WebSocket adapter over `weft-core`: the axum router, background
//! timers (heartbeat/stats-push/reaper), and config/auth wiring.

pub mod config;
pub mod error;
pub mod pagination;
pub mod routes;
pub mod state;
pub mod ws;

use config::Config;
use state::AppState;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::from_env();
    let bind_addr = config.bind_addr.clone();
    let heartbeat_interval_ms = config.heartbeat_interval_ms;
    let stats_interval_ms = config.stats_interval_ms;
    let cleanup_interval_ms = config.work.cleanup_interval_ms;

    let state = AppState::new(config);
    spawn_heartbeat_loop(state.clone(), heartbeat_interval_ms);
    spawn_stats_loop(state.clone(), stats_interval_ms);
    spawn_reaper_loop(state.clone(), cleanup_interval_ms);

    let app = routes::router(state).layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http());

    info!(%bind_addr, "starting weft-server");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Every 30s: ping live connections, drop ones that missed the
/// previous beat.
fn spawn_heartbeat_loop(state: AppState, interval_ms: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            ticker.tick().await;
            for id in state.projects.list_ids() {
                if let Some(ctx) = state.projects.get(&id) {
                    ctx.hub.heartbeat_tick();
                }
            }
        }
    });
}

/// Pushes the stats snapshot to every `stats`-topic subscriber on a fixed
/// cadence, independent of the ETag'd HTTP polling path.
fn spawn_stats_loop(state: AppState, interval_ms: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            ticker.tick().await;
            for id in state.projects.list_ids() {
                if let Some(ctx) = state.projects.get(&id) {
                    ctx.hub.push_stats(&id, ctx.stats_snapshot());
                }
            }
        }
    });
}

/// Stale-work reset and terminal-item eviction.
fn spawn_reaper_loop(state: AppState, interval_ms: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now();
            for id in state.projects.list_ids() {
                if let Some(ctx) = state.projects.get(&id) {
                    ctx.work.reap(now);
                }
            }
        }
    });
}
