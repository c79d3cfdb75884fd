use crate::handlers;
use crate::state::AppState;
use crate::static_files::serve_static;
use axum::{
    Router,
    routing::{get, post, put},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route(
            "/api/records",
            get(handlers::list_records).post(handlers::submit_record),
        )
        .route(
            "/api/records/:date",
            put(handlers::edit_record).delete(handlers::delete_record),
        )
        .route("/api/streak", get(handlers::get_streak))
        .route("/api/achievements", get(handlers::get_achievements))
        .route(
            "/api/challenge",
            get(handlers::get_challenge)
                .post(handlers::set_challenge)
                .delete(handlers::clear_challenge),
        )
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/export.csv", get(handlers::export_csv))
        .route("/api/sync", post(handlers::sync_now))
        .route("/api/sync/status", get(handlers::sync_status))
        .route("/api/sync/remote", axum::routing::delete(handlers::reset_remote))
        .route("/api/connectivity", post(handlers::set_connectivity))
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/me", get(handlers::me))
        .route("/api/leaderboard", get(handlers::leaderboard))
        .route("/static/*path", get(serve_static))
        .with_state(state)
}
