pub mod agents;
pub mod health;
pub mod stats;
pub mod targets;
pub mod work;

use crate::state::AppState;
use crate::ws;
use axum::routing::{get, post};
use axum::Router;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/ws", get(ws::upgrade))
        .route("/api/agents", get(agents::list))
        .route("/api/agents/shutdown-batch", post(agents::shutdown_batch))
        .route("/api/agents/:guid", get(agents::get))
        .route("/api/agents/:guid/shutdown", post(agents::shutdown))
        .route("/api/work", get(work::list).post(work::create))
        .route("/api/work/cancel-batch", post(work::cancel_batch))
        .route("/api/work/:id", get(work::get))
        .route("/api/work/:id/cancel", post(work::cancel))
        .route("/api/targets", get(targets::list).post(targets::create))
        .route("/api/targets/disable-batch", post(targets::disable_batch))
        .route("/api/targets/:id", get(targets::get).put(targets::update).delete(targets::delete))
        .route("/api/targets/:id/test", post(targets::test))
        .route("/api/targets/:id/spin-up", post(targets::spin_up))
        .route("/api/targets/:id/enable", post(targets::enable))
        .route("/api/targets/:id/disable", post(targets::disable))
        .route("/api/stats", get(stats::project_stats))
        .route("/api/stats/projects", get(stats::all_projects_stats))
        .with_state(state)
}
