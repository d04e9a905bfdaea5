//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ApiState>`; runtime
//! settings sit behind a `RwLock` and are written through to the database.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Local};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::error::{ApiError, ApiJson, ApiQuery, ApiResult};
use crate::analysis::multibets::{self, DutchOutcome, DutchPlan, HedgePlan};
use crate::catalog;
use crate::collectors::odds::{self, OddsAgent, OddsRequest, FALLBACK_STEPS};
use crate::collectors::veto::{self, VetoTeam};
use crate::config::{AppConfig, Settings, SettingsUpdate};
use crate::engine::analyzer::{CrossMatchReport, LiveReport, LiveState, MatchReport, TeamOverview, UNKNOWN_MAP};
use crate::engine::MatchAnalyzer;
use crate::query::{self, StatsQueryResult};
use crate::storage::{AvailableFilters, Database, Dataset, ImportReport, LiveResultInput, MatchQuery, MatchRow, VetoRow};
use crate::types::{DataFilter, H2hStats, OddsEntry, OddsSnapshot, VctError, VetoAction};

/// Events and matches are listed from this year on unless asked otherwise.
const DEFAULT_FROM_YEAR: i32 = 2026;
const DEFAULT_MAX_LEGS: usize = 4;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ApiState {
    pub db: Database,
    pub config: AppConfig,
    pub settings: RwLock<Settings>,
    pub agent: Arc<dyn OddsAgent>,
}

impl ApiState {
    pub fn new(db: Database, config: AppConfig, settings: Settings, agent: Arc<dyn OddsAgent>) -> Self {
        Self {
            db,
            config,
            settings: RwLock::new(settings),
            agent,
        }
    }

    async fn match_or_404(&self, match_id: i64) -> ApiResult<MatchRow> {
        self.db
            .match_info(match_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Match {match_id}")))
    }

    async fn ensure_match(&self, match_id: i64) -> ApiResult<()> {
        if self.db.match_exists(match_id).await? {
            Ok(())
        } else {
            Err(ApiError::not_found(format!("Match {match_id}")))
        }
    }
}

pub type AppState = Arc<ApiState>;

#[derive(Debug, Serialize)]
pub struct Items<T> {
    pub items: Vec<T>,
}

fn items<T>(items: Vec<T>) -> Json<Items<T>> {
    Json(Items { items })
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct EventsParams {
    pub from_year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeamsParams {
    pub region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MatchesParams {
    #[serde(default)]
    pub event_id: Vec<i64>,
    pub status: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub from_year: Option<i32>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VetoRequest {
    pub veto_text: Option<String>,
    pub actions: Option<Vec<VetoAction>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OddsBatchRequest {
    #[serde(default)]
    pub entries: Vec<OddsEntry>,
    /// "bookmaker market selection odds; ..." as accepted by the paste box.
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OddsParams {
    pub latest_only: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AutoOddsRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct LiveMapResultRequest {
    pub map_number: i64,
    pub map_name: Option<String>,
    pub winner_side: String,
    pub score_a: Option<i64>,
    pub score_b: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MapParams {
    pub map_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct H2hParams {
    pub a: i64,
    pub b: i64,
    pub map_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ParlayParams {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub max_legs: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HedgeParams {
    pub stake: f64,
    pub odds: f64,
    pub hedge_odds: f64,
    pub lock_profit: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DutchRequest {
    pub outcomes: Vec<DutchOutcome>,
    pub total_stake: f64,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
}

#[derive(Debug, Serialize)]
pub struct MatchDetail {
    #[serde(rename = "match")]
    pub info: MatchRow,
    pub veto: Vec<VetoRow>,
    pub veto_markdown: String,
    pub odds_count: i64,
}

#[derive(Debug, Serialize)]
pub struct VetoMap {
    pub map_order: u32,
    pub map_name: String,
    pub action: String,
    pub pick_team: Option<String>,
    pub start_side: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VetoSaved {
    pub saved_count: usize,
    pub maps: Vec<VetoMap>,
}

#[derive(Debug, Serialize)]
pub struct LiveSaved {
    pub saved: bool,
    pub state: LiveState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_prob: Option<LiveReport>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub ok: bool,
    pub synced_events: i64,
    pub synced_matches: i64,
    pub synced_maps: i64,
    pub report: ImportReport,
}

// ---------------------------------------------------------------------------
// Catalog & lists
// ---------------------------------------------------------------------------

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_ok = state.db.ping().await;
    Json(HealthResponse {
        status: if db_ok { "ok" } else { "error" },
        db_ok,
    })
}

/// GET /api/events
pub async fn list_events(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<EventsParams>,
) -> ApiResult<impl IntoResponse> {
    let rows = state
        .db
        .list_events(params.from_year.unwrap_or(DEFAULT_FROM_YEAR))
        .await?;
    Ok(items(rows))
}

/// GET /api/teams
pub async fn list_teams(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<TeamsParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(items(state.db.list_teams(params.region.as_deref()).await?))
}

/// GET /api/maps
pub async fn list_maps(State(state): State<AppState>) -> impl IntoResponse {
    items(state.config.map_pool.maps.clone())
}

/// GET /api/markets
pub async fn list_markets() -> impl IntoResponse {
    items(catalog::markets())
}

/// GET /api/filters
pub async fn filters(State(state): State<AppState>) -> ApiResult<Json<AvailableFilters>> {
    Ok(Json(state.db.available_filters().await?))
}

/// GET /api/matches
pub async fn list_matches(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<MatchesParams>,
) -> ApiResult<impl IntoResponse> {
    let defaults = MatchQuery::default();
    let q = MatchQuery {
        event_ids: params.event_id,
        status: params.status.filter(|s| !s.trim().is_empty()),
        date_from: params.date_from.filter(|s| !s.trim().is_empty()),
        date_to: params.date_to.filter(|s| !s.trim().is_empty()),
        from_year: params.from_year.unwrap_or(defaults.from_year),
        limit: params.limit.unwrap_or(defaults.limit),
    };
    Ok(items(state.db.list_matches(&q).await?))
}

// ---------------------------------------------------------------------------
// Match detail & analysis
// ---------------------------------------------------------------------------

/// GET /api/matches/{id}
pub async fn match_detail(State(state): State<AppState>, Path(match_id): Path<i64>) -> ApiResult<Json<MatchDetail>> {
    let info = state.match_or_404(match_id).await?;
    let mut rows = state.db.veto_rows(match_id).await?;
    veto::enrich_start_sides(&mut rows, &state.db.map_sides_for_match(match_id).await?);

    Ok(Json(MatchDetail {
        info,
        veto_markdown: veto::veto_to_markdown(&rows),
        veto: rows,
        odds_count: state.db.odds_count(match_id).await?,
    }))
}

/// GET /api/matches/{id}/analysis
pub async fn match_analysis(State(state): State<AppState>, Path(match_id): Path<i64>) -> ApiResult<Json<MatchReport>> {
    let settings = state.settings.read().await;
    let analyzer = MatchAnalyzer::new(&state.db, &settings, &state.config);
    Ok(Json(analyzer.analyze_match(match_id).await?))
}

/// POST /api/matches/{id}/veto
pub async fn save_veto(
    State(state): State<AppState>,
    Path(match_id): Path<i64>,
    ApiJson(body): ApiJson<VetoRequest>,
) -> ApiResult<Json<VetoSaved>> {
    let info = state.match_or_404(match_id).await?;

    let actions = match (body.veto_text.filter(|t| !t.trim().is_empty()), body.actions) {
        (Some(text), _) => {
            let mut teams = Vec::new();
            if let (Some(id), Some(name)) = (info.team1_id, info.team1_name.as_deref()) {
                teams.push(VetoTeam { id, name, tag: info.team1_tag.as_deref() });
            }
            if let (Some(id), Some(name)) = (info.team2_id, info.team2_name.as_deref()) {
                teams.push(VetoTeam { id, name, tag: info.team2_tag.as_deref() });
            }
            let parsed = veto::parse_veto(&text, &teams);
            if parsed.is_empty() {
                return Err(ApiError::validation("Unable to parse veto_text"));
            }
            parsed
        }
        (None, Some(actions)) if !actions.is_empty() => actions,
        _ => return Err(ApiError::validation("Provide veto_text or actions")),
    };

    let saved_count = state.db.replace_manual_veto(match_id, &actions).await?;
    let maps = actions
        .into_iter()
        .filter(VetoAction::is_played)
        .map(|a| VetoMap {
            map_order: a.map_order,
            map_name: a.map_name,
            action: a.action,
            pick_team: a.team_name,
            start_side: a.start_side,
        })
        .collect();
    Ok(Json(VetoSaved { saved_count, maps }))
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// POST /api/matches/{id}/odds
pub async fn save_odds(
    State(state): State<AppState>,
    Path(match_id): Path<i64>,
    ApiJson(body): ApiJson<OddsBatchRequest>,
) -> ApiResult<impl IntoResponse> {
    state.ensure_match(match_id).await?;

    let mut entries = body.entries;
    if let Some(bad) = entries.iter().find(|e| e.odds_value <= 1.0) {
        return Err(ApiError::validation(format!(
            "odds_value must be greater than 1.0 (got {} for {} {})",
            bad.odds_value, bad.market_type, bad.selection
        )));
    }
    if let Some(text) = body.text.as_deref() {
        entries.extend(odds::parse_odds_string(text));
    }
    if entries.is_empty() {
        return Err(ApiError::validation("No odds entries provided"));
    }

    let inserted = state.db.insert_odds(match_id, &entries).await?;
    Ok(Json(json!({ "inserted": inserted })))
}

/// Newest quote per (map, bookmaker, market, selection); input is newest first.
fn dedup_latest(rows: Vec<OddsSnapshot>) -> Vec<OddsSnapshot> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|o| {
            seen.insert((
                o.map_number,
                o.bookmaker.clone(),
                o.market_type.clone(),
                o.selection.clone(),
            ))
        })
        .collect()
}

/// GET /api/matches/{id}/odds
pub async fn get_odds(
    State(state): State<AppState>,
    Path(match_id): Path<i64>,
    ApiQuery(params): ApiQuery<OddsParams>,
) -> ApiResult<impl IntoResponse> {
    state.ensure_match(match_id).await?;
    let rows = state.db.odds_for_match(match_id).await?;
    let latest_only = !matches!(
        params.latest_only.as_deref().map(str::to_lowercase).as_deref(),
        Some("0" | "false" | "no")
    );
    Ok(items(if latest_only { dedup_latest(rows) } else { rows }))
}

/// POST /api/matches/{id}/odds/auto
pub async fn auto_odds(
    State(state): State<AppState>,
    Path(match_id): Path<i64>,
    body: Option<Json<AutoOddsRequest>>,
) -> ApiResult<Response> {
    let info = state.match_or_404(match_id).await?;
    let force = body.map(|Json(b)| b.force).unwrap_or(false);

    let request = OddsRequest::for_match(&info);
    let start = Instant::now();
    let entries = match odds::collect_with_agent(state.agent.as_ref(), &request).await {
        Ok(entries) => entries,
        Err(e @ VctError::AgentUnavailable(_)) => {
            return Err(ApiError::Http(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{e}. Use POST /api/matches/{{id}}/odds with manual entries or the batch paste form."),
            ));
        }
        Err(e) => {
            warn!(match_id, error = %e, "Odds agent produced no usable odds");
            Vec::new()
        }
    };
    let inserted = if entries.is_empty() {
        0
    } else {
        state.db.insert_odds(match_id, &entries).await?
    };
    let duration_ms = (start.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;

    if inserted == 0 && !force {
        let body = json!({
            "error": "agent_failed",
            "detail": "No odds were inserted from the odds agent output",
            "fallback_steps": FALLBACK_STEPS,
        });
        return Ok((StatusCode::BAD_GATEWAY, Json(body)).into_response());
    }

    info!(match_id, inserted, duration_ms, "Automatic odds collection finished");
    Ok(Json(json!({
        "inserted": inserted,
        "source": "agent",
        "duration_ms": duration_ms,
    }))
    .into_response())
}

// ---------------------------------------------------------------------------
// Live
// ---------------------------------------------------------------------------

/// POST /api/matches/{id}/live/map-result
pub async fn save_live_map_result(
    State(state): State<AppState>,
    Path(match_id): Path<i64>,
    ApiJson(body): ApiJson<LiveMapResultRequest>,
) -> ApiResult<Json<LiveSaved>> {
    let info = state.match_or_404(match_id).await?;

    if body.map_number < 1 {
        return Err(ApiError::validation("map_number must be at least 1"));
    }
    if body.winner_side != "a" && body.winner_side != "b" {
        return Err(ApiError::validation("winner_side must be \"a\" or \"b\""));
    }
    if body.score_a.is_some_and(|s| s < 0) || body.score_b.is_some_and(|s| s < 0) {
        return Err(ApiError::validation("scores cannot be negative"));
    }

    let settings = state.settings.read().await;
    let analyzer = MatchAnalyzer::new(&state.db, &settings, &state.config);

    let map_name = match body.map_name.filter(|m| !m.trim().is_empty()) {
        Some(name) => name,
        None => {
            let (_, planned) = analyzer.resolve_bo(&info).await?;
            planned
                .get((body.map_number - 1) as usize)
                .filter(|m| m.map_name != UNKNOWN_MAP)
                .map(|m| m.map_name.clone())
                .unwrap_or_else(|| format!("Map {}", body.map_number))
        }
    };

    let input = LiveResultInput {
        map_number: body.map_number,
        map_name,
        winner_team_id: if body.winner_side == "a" { info.team1_id } else { info.team2_id },
        winner_side: body.winner_side,
        score_a: body.score_a,
        score_b: body.score_b,
    };
    state.db.upsert_live_result(match_id, &input).await?;

    let series_prob = if settings.live.auto_recalc_on_map_result {
        Some(analyzer.live_series_prob(match_id).await?)
    } else {
        None
    };
    Ok(Json(LiveSaved {
        saved: true,
        state: analyzer.live_state(match_id).await?,
        series_prob,
    }))
}

/// GET /api/matches/{id}/live/series-prob
pub async fn live_series_prob(State(state): State<AppState>, Path(match_id): Path<i64>) -> ApiResult<Json<LiveReport>> {
    state.ensure_match(match_id).await?;
    let settings = state.settings.read().await;
    let analyzer = MatchAnalyzer::new(&state.db, &settings, &state.config);
    Ok(Json(analyzer.live_series_prob(match_id).await?))
}

/// POST /api/matches/{id}/outcome
pub async fn register_outcome(State(state): State<AppState>, Path(match_id): Path<i64>) -> ApiResult<impl IntoResponse> {
    state.ensure_match(match_id).await?;
    let registered = state.db.register_match_outcome(match_id).await?;
    Ok(Json(json!({ "registered": registered })))
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// GET /api/stats/team/{id}
pub async fn team_stats(
    State(state): State<AppState>,
    Path(team_id): Path<i64>,
    ApiQuery(params): ApiQuery<MapParams>,
) -> ApiResult<Json<TeamOverview>> {
    let settings = state.settings.read().await;
    let analyzer = MatchAnalyzer::new(&state.db, &settings, &state.config);
    let map = params.map_name.filter(|m| !m.trim().is_empty());
    Ok(Json(analyzer.team_overview(team_id, map.as_deref()).await?))
}

/// GET /api/stats/query
pub async fn stats_query(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<QueryParams>,
) -> ApiResult<Json<StatsQueryResult>> {
    let settings = state.settings.read().await;
    let analyzer = MatchAnalyzer::new(&state.db, &settings, &state.config);
    let teams = state.db.all_teams().await?;
    let result = query::run(&analyzer, &teams, &state.config.map_pool.maps, &params.q).await?;
    Ok(Json(result))
}

/// GET /api/stats/h2h
pub async fn stats_h2h(State(state): State<AppState>, ApiQuery(params): ApiQuery<H2hParams>) -> ApiResult<Json<H2hStats>> {
    let settings = state.settings.read().await;
    let analyzer = MatchAnalyzer::new(&state.db, &settings, &state.config);
    let map = params.map_name.filter(|m| !m.trim().is_empty());
    let h2h = analyzer
        .h2h(params.a, params.b, map.as_deref(), &DataFilter::default(), None)
        .await?;
    Ok(Json(h2h))
}

/// GET /api/analysis/cross-match-parlays
pub async fn cross_match_parlays(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ParlayParams>,
) -> ApiResult<Json<CrossMatchReport>> {
    let max_legs = params.max_legs.unwrap_or(DEFAULT_MAX_LEGS);
    if !(2..=5).contains(&max_legs) {
        return Err(ApiError::validation("max_legs must be between 2 and 5"));
    }
    let today = Local::now().date_naive();
    let date_from = params
        .date_from
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| today.to_string());
    let date_to = params
        .date_to
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| (today + Duration::days(1)).to_string());

    let settings = state.settings.read().await;
    let analyzer = MatchAnalyzer::new(&state.db, &settings, &state.config);
    Ok(Json(analyzer.cross_match_parlays(&date_from, &date_to, max_legs).await?))
}

// ---------------------------------------------------------------------------
// Import & settings
// ---------------------------------------------------------------------------

/// POST /api/import
pub async fn import_dataset(
    State(state): State<AppState>,
    ApiJson(dataset): ApiJson<Dataset>,
) -> ApiResult<Json<ImportResponse>> {
    let before = state.db.counts().await?;
    let report = state.db.import_dataset(&dataset).await?;
    let after = state.db.counts().await?;

    Ok(Json(ImportResponse {
        ok: true,
        synced_events: (after.events - before.events).max(0),
        synced_matches: (after.matches - before.matches).max(0),
        synced_maps: (after.maps - before.maps).max(0),
        report,
    }))
}

/// GET /api/config
pub async fn get_config(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.read().await.clone())
}

/// PUT /api/config
pub async fn put_config(
    State(state): State<AppState>,
    ApiJson(update): ApiJson<SettingsUpdate>,
) -> ApiResult<Json<Settings>> {
    let mut settings = state.settings.write().await;
    let mut next = settings.clone();
    next.apply(update);
    state.db.save_settings(&next).await?;
    *settings = next.clone();
    info!(filter = %next.data_filter.description(), "Settings updated");
    Ok(Json(next))
}

// ---------------------------------------------------------------------------
// Calculators
// ---------------------------------------------------------------------------

/// GET /api/hedge
pub async fn hedge(ApiQuery(params): ApiQuery<HedgeParams>) -> ApiResult<Json<HedgePlan>> {
    if params.stake <= 0.0 {
        return Err(ApiError::validation("stake must be greater than 0"));
    }
    if params.odds <= 1.0 || params.hedge_odds <= 1.0 {
        return Err(ApiError::validation("odds and hedge_odds must be greater than 1.0"));
    }
    Ok(Json(multibets::hedge(
        params.stake,
        params.odds,
        params.hedge_odds,
        params.lock_profit.unwrap_or(true),
    )))
}

/// POST /api/dutch
pub async fn dutch(ApiJson(body): ApiJson<DutchRequest>) -> ApiResult<Json<DutchPlan>> {
    if body.total_stake <= 0.0 {
        return Err(ApiError::validation("total_stake must be greater than 0"));
    }
    multibets::dutch(&body.outcomes, body.total_stake)
        .map(Json)
        .ok_or_else(|| ApiError::validation("Provide at least one outcome, all with odds greater than 1.0"))
}
