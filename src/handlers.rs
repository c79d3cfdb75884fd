use crate::errors::{AppError, AuthError, RemoteError};
use crate::events::AppEvent;
use crate::export::records_to_csv;
use crate::leaderboard::{LeaderboardEntry, build_leaderboard};
use crate::models::{
    AchievementSet, ChallengeRequest, ChallengeState, ConnectivityRequest, CredentialsRequest,
    EditRecordRequest, LeaderboardQuery, MutationResponse, ProfileResponse, Record, StatsResponse,
    StreakState, SubmitRecordRequest,
};
use crate::state::AppState;
use crate::stats::build_stats_at;
use crate::sync::{SyncOutcome, SyncStatus};
use crate::ui::render_index;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub outcome: Option<SyncOutcome>,
    pub message: Option<String>,
    pub pending: usize,
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    let today = state.clock.today().to_string();
    let snapshot = state.tracker.snapshot().await;
    Html(render_index(&today, snapshot.records.last(), &snapshot.streak))
}

pub async fn list_records(State(state): State<AppState>) -> Json<Vec<Record>> {
    Json(state.tracker.records().await)
}

pub async fn submit_record(
    State(state): State<AppState>,
    Json(payload): Json<SubmitRecordRequest>,
) -> Result<(StatusCode, Json<MutationResponse>), AppError> {
    let response = state.tracker.submit(payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn edit_record(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
    Json(payload): Json<EditRecordRequest>,
) -> Result<Json<MutationResponse>, AppError> {
    Ok(Json(state.tracker.edit(date, payload).await?))
}

pub async fn delete_record(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> Result<Json<MutationResponse>, AppError> {
    Ok(Json(state.tracker.delete(date).await?))
}

pub async fn get_streak(State(state): State<AppState>) -> Result<Json<StreakState>, AppError> {
    Ok(Json(state.tracker.roll_over().await?))
}

pub async fn get_achievements(State(state): State<AppState>) -> Json<AchievementSet> {
    Json(state.tracker.achievements().await)
}

pub async fn get_challenge(State(state): State<AppState>) -> Json<Option<ChallengeState>> {
    Json(state.tracker.snapshot().await.challenge)
}

pub async fn set_challenge(
    State(state): State<AppState>,
    Json(payload): Json<ChallengeRequest>,
) -> Result<Json<MutationResponse>, AppError> {
    Ok(Json(state.tracker.set_challenge(payload).await?))
}

pub async fn clear_challenge(State(state): State<AppState>) -> Result<Json<MutationResponse>, AppError> {
    Ok(Json(state.tracker.clear_challenge().await?))
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let snapshot = state.tracker.snapshot().await;
    Json(build_stats_at(state.clock.today(), &snapshot.records))
}

pub async fn export_csv(State(state): State<AppState>) -> Response {
    let records = state.tracker.records().await;
    let body = records_to_csv(&records);
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"coin-records.csv\"",
            ),
        ],
        body,
    )
        .into_response()
}

/// Remote failures are reported in the body, never as an HTTP error.
pub async fn sync_now(State(state): State<AppState>) -> Json<SyncReport> {
    let result = state.sync.sync_all().await;
    let pending = state.sync.pending_len();
    Json(match result {
        Ok(outcome) => SyncReport {
            success: true,
            outcome: Some(outcome),
            message: None,
            pending,
        },
        Err(err) => {
            warn!("manual sync failed: {err}");
            SyncReport {
                success: false,
                outcome: None,
                message: Some(err.to_string()),
                pending,
            }
        }
    })
}

pub async fn sync_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.sync.status().await)
}

pub async fn reset_remote(State(state): State<AppState>) -> Json<SyncReport> {
    let pending = state.sync.pending_len();
    Json(match state.sync.reset_remote().await {
        Ok(_) => SyncReport {
            success: true,
            outcome: None,
            message: None,
            pending,
        },
        Err(err) => SyncReport {
            success: false,
            outcome: None,
            message: Some(err.to_string()),
            pending,
        },
    })
}

pub async fn set_connectivity(
    State(state): State<AppState>,
    Json(payload): Json<ConnectivityRequest>,
) -> Json<SyncStatus> {
    let event = if payload.online {
        AppEvent::Online
    } else {
        AppEvent::Offline
    };
    state.sync.handle_event(&event).await;
    Json(state.sync.status().await)
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<ProfileResponse>), AppError> {
    let profile = state
        .session
        .register(&payload.username, &payload.password)
        .await?;
    state.sync.set_authenticated(true);
    Ok((StatusCode::CREATED, Json(ProfileResponse::from(&profile))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let profile = state.session.login(&payload.username, &payload.password).await?;
    state.sync.set_authenticated(true);
    Ok(Json(ProfileResponse::from(&profile)))
}

pub async fn logout(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.session.logout().await?;
    // Applied here as well as on the bus so later requests never push.
    state.sync.handle_event(&AppEvent::LoggedOut).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(State(state): State<AppState>) -> Result<Json<ProfileResponse>, AppError> {
    let profile = state
        .session
        .current()
        .await
        .ok_or(AuthError::NotLoggedIn)?;
    Ok(Json(ProfileResponse::from(&profile)))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let remote = state
        .remote
        .as_deref()
        .ok_or(RemoteError::NotConfigured)?;
    let ids: Vec<String> = query
        .ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        return Err(AppError::bad_request("ids must list at least one document id"));
    }

    let board = build_leaderboard(remote, &ids, state.clock.today()).await?;
    Ok(Json(board))
}
