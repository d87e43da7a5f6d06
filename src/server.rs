//! HTTP surface: league CRUD, the merge endpoint, SSE updates, and the
//! admin wins-sync trigger.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};

use crate::code::generate_league_code;
use crate::config::SyncConfig;
use crate::db::{Database, League};
use crate::draft::{self, DraftTurn};
use crate::events::{EventBus, LeagueEvent};
use crate::merge::{self, LeaguePatch, MergeError};
use crate::sync::{self, SyncError, SyncOptions, WinsProvider};

const CODE_ATTEMPTS: usize = 10;
const SSE_KEEPALIVE: Duration = Duration::from_secs(25);

/// Shared handler state.
#[derive(Clone)]
pub struct AppContext {
    pub db: Arc<Database>,
    pub bus: Arc<EventBus>,
    pub sync: SyncConfig,
    pub provider: Arc<dyn WinsProvider>,
}

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/leagues", post(create_league))
        .route("/leagues/:key", get(get_league).patch(patch_league))
        .route("/leagues/:key/events", get(league_events))
        .route("/sync-wins", post(sync_wins))
        .with_state(ctx)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("league not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("wins sync is disabled")]
    SyncDisabled,
    #[error("missing or invalid sync credential")]
    Unauthorized,
    #[error("wins provider failure: {0}")]
    Provider(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::SyncDisabled => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref err) = self {
            error!(error = %err, "request failed");
        }
        let body = Json(json!({ "ok": false, "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

impl From<MergeError> for ApiError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::PlayersNotInLeague(_) | MergeError::InvalidPicks(_) => {
                ApiError::Validation(err.to_string())
            }
            MergeError::Db(e) => ApiError::Internal(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// League creation
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateLeagueRequest {
    pub name: Option<String>,
    pub teams_per_player: Option<i64>,
    pub snake: Option<bool>,
    /// Custom join code; generated when absent.
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeagueResponse {
    pub league: League,
}

pub async fn create_league(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateLeagueRequest>,
) -> Result<(StatusCode, Json<CreateLeagueResponse>), ApiError> {
    let name = match req.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => n.chars().take(merge::MAX_LEAGUE_NAME).collect(),
        _ => merge::DEFAULT_LEAGUE_NAME.to_string(),
    };
    let quota = req
        .teams_per_player
        .map(merge::clamp_quota)
        .unwrap_or(merge::DEFAULT_QUOTA);
    let snake = req.snake.unwrap_or(true);

    let code = match req.code.as_deref().map(str::trim) {
        Some(custom) if !custom.is_empty() => {
            let custom = custom.to_uppercase();
            if ctx.db.code_exists(&custom)? {
                return Err(ApiError::Validation(format!(
                    "league code {custom} is already taken"
                )));
            }
            custom
        }
        _ => available_code(&ctx.db)?,
    };

    let league = ctx.db.create_league(&name, quota, snake, &code)?;
    info!(league_id = %league.id, code = %league.code, "league created");
    Ok((StatusCode::CREATED, Json(CreateLeagueResponse { league })))
}

fn available_code(db: &Database) -> Result<String, ApiError> {
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_league_code();
        if !db.code_exists(&code)? {
            return Ok(code);
        }
    }
    Err(ApiError::Internal(anyhow::anyhow!(
        "could not find a free league code in {CODE_ATTEMPTS} attempts"
    )))
}

// ---------------------------------------------------------------------------
// League read
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueResponse {
    pub league: League,
    pub players: Vec<draft::Participant>,
    pub picks: Vec<draft::Pick>,
    pub team_wins: std::collections::HashMap<String, u32>,
    /// Derived turn summary so clients need not re-implement ordering.
    pub turn: DraftTurn,
}

pub async fn get_league(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<Json<LeagueResponse>, ApiError> {
    let league = resolve_league(&ctx, &key)?;
    let players = ctx.db.load_participants(&league.id)?;
    let picks = ctx.db.load_picks(&league.id)?;
    let team_wins = ctx.db.load_team_wins(&league.id)?;
    let turn = draft::compute_turn(
        &players,
        picks.len(),
        league.snake,
        league.teams_per_player,
    );
    Ok(Json(LeagueResponse {
        league,
        players,
        picks,
        team_wins,
        turn,
    }))
}

fn resolve_league(ctx: &AppContext, key: &str) -> Result<League, ApiError> {
    ctx.db
        .find_league(key)?
        .ok_or_else(|| ApiError::NotFound(key.to_string()))
}

// ---------------------------------------------------------------------------
// State merge
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchResponse {
    pub ok: bool,
    pub league_id: String,
    pub players_action: &'static str,
    pub picks_action: &'static str,
    pub wins_action: &'static str,
}

pub async fn patch_league(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    Json(patch): Json<LeaguePatch>,
) -> Result<Json<PatchResponse>, ApiError> {
    let league = resolve_league(&ctx, &key)?;
    let plan = merge::plan_merge(&patch);
    let outcome = ctx.db.apply_merge(&league.id, &plan)?;
    ctx.bus.emit(&league.id, LeagueEvent::Updated);
    info!(
        league_id = %league.id,
        players = outcome.players_action,
        picks = outcome.picks_action,
        wins = outcome.wins_action,
        "league merged"
    );
    Ok(Json(PatchResponse {
        ok: true,
        league_id: league.id,
        players_action: outcome.players_action,
        picks_action: outcome.picks_action,
        wins_action: outcome.wins_action,
    }))
}

// ---------------------------------------------------------------------------
// Live updates (SSE)
// ---------------------------------------------------------------------------

pub async fn league_events(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let league = resolve_league(&ctx, &key)?;
    let rx = ctx.bus.subscribe(&league.id);

    let hello = stream::once(async { Ok::<_, Infallible>(event_for(LeagueEvent::Hello)) });
    let updates = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(ev) => return Some((Ok::<_, Infallible>(event_for(ev)), rx)),
                // A slow consumer missed some events; it will re-fetch
                // on the next one anyway.
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(hello.chain(updates))
        .keep_alive(KeepAlive::new().interval(SSE_KEEPALIVE).text("keep-alive")))
}

fn event_for(ev: LeagueEvent) -> Event {
    // Serializing a unit enum tag cannot fail.
    let data = serde_json::to_string(&ev).unwrap_or_default();
    Event::default().data(data)
}

// ---------------------------------------------------------------------------
// Wins sync
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncRequest {
    pub season: Option<i32>,
    pub week: Option<u32>,
    pub dry_run: bool,
}

pub async fn sync_wins(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<SyncRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    sync::authorize(&ctx.sync, bearer_token(&headers)).map_err(auth_error)?;

    let opts = SyncOptions {
        season: req.season.or(ctx.sync.season),
        week: req.week,
        dry_run: req.dry_run || ctx.sync.dry_run,
    };
    match sync::run_sync(&ctx.db, &ctx.bus, ctx.provider.as_ref(), opts).await {
        Ok(report) => {
            let mut body = serde_json::to_value(&report)
                .map_err(|e| ApiError::Internal(e.into()))?;
            if let Some(obj) = body.as_object_mut() {
                obj.insert("ok".to_string(), json!(true));
            }
            Ok(Json(body))
        }
        Err(err @ (SyncError::NoUpdates | SyncError::AllZero)) => Ok(Json(json!({
            "ok": false,
            "skipped": true,
            "reason": err.to_string(),
        }))),
        Err(SyncError::Provider(e)) => Err(ApiError::Provider(e.to_string())),
        Err(SyncError::Db(e)) => Err(ApiError::Internal(e)),
        Err(e @ (SyncError::Disabled | SyncError::Unauthorized)) => Err(auth_error(e)),
    }
}

fn auth_error(err: SyncError) -> ApiError {
    match err {
        SyncError::Disabled => ApiError::SyncDisabled,
        _ => ApiError::Unauthorized,
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
