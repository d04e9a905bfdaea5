//! Match analysis: the queries feeding the pure model, and the reports the
//! API returns.
//!
//! `MatchAnalyzer` borrows the database, the runtime settings snapshot and
//! the static configuration. Every method is a read; writes stay in the
//! handlers.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::analysis::arbitrage::{detect_arbitrage, ArbOpportunity};
use crate::analysis::compositions::{comp_winrate, likely_comps, matchup_advantage, CompMatchup, LikelyComp};
use crate::analysis::edge::{
    analyze_market_edges, build_market_probs, calculate_edge, latest_quotes, MarketKey,
};
use crate::analysis::multibets::{
    analyze_spread, correct_score_coverage, find_cross_match_parlays, find_profitable_parlays,
    MatchEdges, MultiBetOpportunity, ParlayLeg,
};
use crate::analysis::probability::{
    estimate_map_win, estimate_ot, series_from_state, series_probabilities, MapWinInputs, OtInputs,
};
use crate::analysis::stats::{aggregate_overall, aggregate_team_stats, global_map_stats, head_to_head, recent_form, OverallStats};
use crate::catalog;
use crate::collectors::veto::enrich_start_sides;
use crate::config::{AppConfig, Settings};
use crate::format::{infer_bo_type, score_chart, ChartPoint};
use crate::storage::{Database, LiveMapResult, MapRecord, MatchRow, TeamRow};
use crate::types::{
    BoType, Confidence, DataFilter, EdgeResult, H2hStats, MapAnalysis, OddsSnapshot, OtEstimate,
    SeriesProbabilities, TeamStats, VctError,
};

/// Map name used when the veto is not known yet.
pub const UNKNOWN_MAP: &str = "Unknown";
/// Latest maps (any map) used for the recency factor.
const RECENT_FORM_MAPS: i64 = 10;
/// Legs per same-match parlay.
const MATCH_PARLAY_LEGS: usize = 3;
/// Upcoming matches considered for cross-match parlays.
const CROSS_MATCH_LIMIT: i64 = 20;
/// Likely compositions listed per map.
const LIKELY_COMPS: usize = 2;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// A map expected to be played, from the veto or a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedMap {
    pub map_name: String,
    pub map_order: u32,
    pub pick_team: Option<String>,
    pub start_side: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRef {
    pub id: Option<i64>,
    pub name: String,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchTeams {
    pub team_a: TeamRef,
    pub team_b: TeamRef,
}

impl MatchTeams {
    fn of(info: &MatchRow) -> Self {
        Self {
            team_a: TeamRef {
                id: info.team1_id,
                name: info.team1_display(),
                tag: info.team1_tag.clone(),
            },
            team_b: TeamRef {
                id: info.team2_id,
                name: info.team2_display(),
                tag: info.team2_tag.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSummary {
    pub description: String,
    pub is_active: bool,
}

/// Full analysis of one match.
#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    #[serde(rename = "match")]
    pub info: MatchRow,
    pub h2h: H2hStats,
    pub bo_type: BoType,
    pub maps: Vec<MapAnalysis>,
    pub ot: Vec<OtEstimate>,
    pub series: SeriesProbabilities,
    pub score_chart: Vec<ChartPoint>,
    pub single_edges: Vec<EdgeResult>,
    pub multi_bets: Vec<MultiBetOpportunity>,
    pub arbitrage: Vec<ArbOpportunity>,
    pub odds_count: i64,
    pub filter: FilterSummary,
    pub teams: MatchTeams,
}

/// Series score as entered from the live tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveState {
    pub match_id: i64,
    pub team_a: TeamRef,
    pub team_b: TeamRef,
    pub maps_to_win: u32,
    pub a_score: u32,
    pub b_score: u32,
    pub map_results: Vec<LiveMapResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    Decided,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveSeriesProb {
    pub p_a_series: f64,
    pub p_b_series: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub score_probs: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub total_maps_dist: BTreeMap<u32, f64>,
    pub status: SeriesStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveReport {
    #[serde(flatten)]
    pub state: LiveState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_maps: Option<u32>,
    pub series_prob: LiveSeriesProb,
    /// Match-winner quotes from live bookmakers the model rates above
    /// their price.
    pub live_opportunities: Vec<EdgeResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingMatch {
    #[serde(flatten)]
    pub info: MatchRow,
    pub team1_display: String,
    pub team2_display: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossMatchReport {
    pub date_from: String,
    pub date_to: String,
    pub upcoming_matches: Vec<UpcomingMatch>,
    pub matches_with_edges: usize,
    pub cross_match_parlays: Vec<MultiBetOpportunity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamMapOverview {
    #[serde(flatten)]
    pub stats: TeamStats,
    pub likely_compositions: Vec<LikelyComp>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamOverview {
    pub team: TeamRow,
    pub overall: OverallStats,
    pub map_stats: Vec<TeamMapOverview>,
}

/// Model output for a match before any strategy is applied.
struct Pricing {
    bo: BoType,
    maps: Vec<MapAnalysis>,
    ots: Vec<OtEstimate>,
    series: SeriesProbabilities,
    odds: Vec<OddsSnapshot>,
    edges: Vec<EdgeResult>,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

pub struct MatchAnalyzer<'a> {
    db: &'a Database,
    settings: &'a Settings,
    config: &'a AppConfig,
}

impl<'a> MatchAnalyzer<'a> {
    pub fn new(db: &'a Database, settings: &'a Settings, config: &'a AppConfig) -> Self {
        Self { db, settings, config }
    }

    async fn match_row(&self, match_id: i64) -> Result<MatchRow> {
        self.db
            .match_info(match_id)
            .await?
            .ok_or_else(|| VctError::NotFound(format!("Match {match_id}")).into())
    }

    /// Maps of the pool to report on: the one asked for, or all of them.
    fn pool_maps(&self, map_name: Option<&str>) -> Vec<String> {
        match map_name {
            Some(m) => vec![m.to_string()],
            None => self.config.map_pool.maps.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub async fn team_map_stats(
        &self,
        team_id: i64,
        map_name: &str,
        filter: &DataFilter,
        bo: Option<BoType>,
    ) -> Result<TeamStats> {
        let records = self.db.team_maps(team_id, map_name, filter, bo).await?;
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let pistols = self.db.pistol_side_wins(&ids, team_id).await?;
        Ok(aggregate_team_stats(team_id, map_name, &records, pistols))
    }

    pub async fn h2h(
        &self,
        team_a: i64,
        team_b: i64,
        map_name: Option<&str>,
        filter: &DataFilter,
        bo: Option<BoType>,
    ) -> Result<H2hStats> {
        let records = self.db.h2h_maps(team_a, team_b, map_name, filter, bo).await?;
        Ok(head_to_head(team_a, team_b, &records))
    }

    /// Composition edge from each team's most played composition on the
    /// map. `None` when either team has never played it.
    async fn comp_matchup(
        &self,
        team_a: i64,
        team_b: i64,
        map_name: &str,
        bo: Option<BoType>,
    ) -> Result<Option<CompMatchup>> {
        let filter = &self.settings.data_filter;
        let a_recs = self.db.team_comp_records(team_a, map_name, filter).await?;
        let b_recs = self.db.team_comp_records(team_b, map_name, filter).await?;
        let (Some(a_comp), Some(b_comp)) = (
            likely_comps(&a_recs, 1).into_iter().next(),
            likely_comps(&b_recs, 1).into_iter().next(),
        ) else {
            return Ok(None);
        };

        let a_team = self.db.comp_records(&a_comp.comp_key, map_name, Some(team_a), filter, bo).await?;
        let b_team = self.db.comp_records(&b_comp.comp_key, map_name, Some(team_b), filter, bo).await?;
        let a_meta = self.db.comp_records(&a_comp.comp_key, map_name, None, filter, bo).await?;
        let b_meta = self.db.comp_records(&b_comp.comp_key, map_name, None, filter, bo).await?;

        Ok(Some(matchup_advantage(
            &comp_winrate(&a_comp.comp_key, &a_team),
            &comp_winrate(&b_comp.comp_key, &b_team),
            &comp_winrate(&a_comp.comp_key, &a_meta),
            &comp_winrate(&b_comp.comp_key, &b_meta),
        )))
    }

    /// Inputs of both models for one map, queried once.
    async fn map_inputs(
        &self,
        team_a: i64,
        team_b: i64,
        map_name: &str,
        start_side_a: Option<&str>,
        bo: Option<BoType>,
    ) -> Result<(MapWinInputs, OtInputs)> {
        let filter = &self.settings.data_filter;
        let description = filter.description();

        let a = self.team_map_stats(team_a, map_name, filter, bo).await?;
        let b = self.team_map_stats(team_b, map_name, filter, bo).await?;
        let h2h = self.h2h(team_a, team_b, Some(map_name), filter, bo).await?;
        let comp = self.comp_matchup(team_a, team_b, map_name, bo).await?;
        let global = global_map_stats(&self.db.maps_on(map_name, filter, bo).await?);

        let recent_a = self.db.recent_team_maps(team_a, None, RECENT_FORM_MAPS).await?;
        let recent_b = self.db.recent_team_maps(team_b, None, RECENT_FORM_MAPS).await?;

        let ot = OtInputs {
            team_a: a.clone(),
            team_b: b.clone(),
            h2h: h2h.clone(),
            global,
            comp_ot_rate: comp.as_ref().and_then(|c| c.ot_rate),
            filter_description: description.clone(),
        };
        let win = MapWinInputs {
            team_a: a,
            team_b: b,
            h2h,
            start_side_a: start_side_a.map(str::to_string),
            comp,
            recent_a: recent_form(team_a, &recent_a, RECENT_FORM_MAPS as usize),
            recent_b: recent_form(team_b, &recent_b, RECENT_FORM_MAPS as usize),
            filter_description: description,
        };
        Ok((win, ot))
    }

    pub async fn estimate_map(
        &self,
        team_a: i64,
        team_b: i64,
        map_name: &str,
        start_side_a: Option<&str>,
        bo: Option<BoType>,
    ) -> Result<MapAnalysis> {
        let (inputs, _) = self.map_inputs(team_a, team_b, map_name, start_side_a, bo).await?;
        Ok(estimate_map_win(inputs, &self.config.model, &self.settings.edge))
    }

    pub async fn estimate_ot(
        &self,
        team_a: i64,
        team_b: i64,
        map_name: &str,
        bo: Option<BoType>,
    ) -> Result<OtEstimate> {
        let (_, inputs) = self.map_inputs(team_a, team_b, map_name, None, bo).await?;
        Ok(estimate_ot(&inputs, &self.config.ot_model, &self.settings.edge))
    }

    // -----------------------------------------------------------------------
    // Veto
    // -----------------------------------------------------------------------

    /// Played maps in order. A manual veto replaces the scraped one; with
    /// no veto at all every map of the series is a placeholder.
    pub async fn veto_maps(&self, match_id: i64, bo: BoType) -> Result<Vec<PlannedMap>> {
        let mut rows = self.db.veto_rows(match_id).await?;
        enrich_start_sides(&mut rows, &self.db.map_sides_for_match(match_id).await?);

        let has_manual = rows.iter().any(|r| r.source == "manual");
        let mut maps: Vec<PlannedMap> = Vec::new();
        for row in rows {
            if has_manual && row.source != "manual" {
                continue;
            }
            let action = row.action.to_lowercase();
            if action != "pick" && action != "decider" {
                continue;
            }
            maps.push(PlannedMap {
                map_name: row.map_name,
                map_order: maps.len() as u32 + 1,
                pick_team: row.team_name,
                start_side: row.start_side,
            });
        }

        if maps.is_empty() {
            maps = (1..=bo.max_maps())
                .map(|i| PlannedMap {
                    map_name: UNKNOWN_MAP.to_string(),
                    map_order: i,
                    pick_team: None,
                    start_side: None,
                })
                .collect();
        }
        Ok(maps)
    }

    /// Series format of a match with its planned maps. An undeclared
    /// format falls back to the scores, then to the number of played maps
    /// in the veto.
    pub async fn resolve_bo(&self, info: &MatchRow) -> Result<(BoType, Vec<PlannedMap>)> {
        let declared = info.bo_type.as_deref();
        let bo = infer_bo_type(declared, info.score1, info.score2, 0);
        let planned = self.veto_maps(info.id, bo).await?;
        if declared.and_then(BoType::from_label).is_some() {
            return Ok((bo, planned));
        }
        let vetoed = planned.iter().filter(|m| m.map_name != UNKNOWN_MAP).count();
        let resolved = infer_bo_type(None, info.score1, info.score2, vetoed);
        if resolved == bo {
            return Ok((bo, planned));
        }
        Ok((resolved, self.veto_maps(info.id, resolved).await?))
    }

    // -----------------------------------------------------------------------
    // Full analysis
    // -----------------------------------------------------------------------

    async fn price(&self, info: &MatchRow) -> Result<Pricing> {
        let team_a = info.team1_id.unwrap_or_default();
        let team_b = info.team2_id.unwrap_or_default();

        let (bo, planned) = self.resolve_bo(info).await?;

        let mut maps = Vec::with_capacity(planned.len());
        let mut ots = Vec::with_capacity(planned.len());
        for pm in &planned {
            let (win_in, ot_in) = self
                .map_inputs(team_a, team_b, &pm.map_name, pm.start_side.as_deref(), Some(bo))
                .await?;
            let ot = estimate_ot(&ot_in, &self.config.ot_model, &self.settings.edge);
            let mut ma = estimate_map_win(win_in, &self.config.model, &self.settings.edge);
            ma.map_order = pm.map_order;
            ma.pick_team = pm.pick_team.clone();
            ma.p_ot = ot.p_ot;
            maps.push(ma);
            ots.push(ot);
        }

        let map_probs: Vec<f64> = maps.iter().map(|m| m.p_team_a_win).collect();
        let series = series_probabilities(&map_probs, bo.maps_to_win());

        let market_probs = build_market_probs(
            &maps,
            Some(&series),
            &ots,
            &aliases(info.team1_name.as_deref(), info.team1_tag.as_deref()),
            &aliases(info.team2_name.as_deref(), info.team2_tag.as_deref()),
            bo,
        );
        let odds = self.db.odds_for_match(info.id).await?;
        let edges: Vec<EdgeResult> = analyze_market_edges(&odds, &market_probs, self.settings)
            .into_iter()
            .filter(|e| self.settings.markets.is_enabled(&e.market))
            .collect();

        debug!(
            match_id = info.id,
            bo = %bo,
            maps = maps.len(),
            quotes = odds.len(),
            edges = edges.len(),
            "Match priced"
        );
        Ok(Pricing { bo, maps, ots, series, odds, edges })
    }

    pub async fn analyze_match(&self, match_id: i64) -> Result<MatchReport> {
        let info = self.match_row(match_id).await?;
        let pricing = self.price(&info).await?;
        let cfg = &self.config.multibet;

        let mut multi_bets = Vec::new();

        let ot_probs: Vec<f64> = pricing.ots.iter().map(|o| o.p_ot).collect();
        if let Some(ot_odds) = ot_yes_odds(&pricing.odds, ot_probs.len()) {
            let spread = analyze_spread(
                &ot_probs,
                &ot_odds,
                "OT yes",
                cfg.default_spread_stake,
                cfg.correlation_factor,
            );
            multi_bets.extend(spread.filter(|s| s.edge >= cfg.min_spread_edge));
        }

        let legs: Vec<ParlayLeg> = pricing
            .edges
            .iter()
            .filter(|e| e.edge > 0.0)
            .map(ParlayLeg::from)
            .collect();
        multi_bets.extend(find_profitable_parlays(&legs, MATCH_PARLAY_LEGS, cfg));

        let score_odds = correct_score_odds(&pricing.odds);
        if !score_odds.is_empty() {
            multi_bets.extend(correct_score_coverage(
                &pricing.series.score_probs,
                &score_odds,
                cfg.correct_score_budget,
            ));
        }

        let h2h = self
            .h2h(
                info.team1_id.unwrap_or_default(),
                info.team2_id.unwrap_or_default(),
                None,
                &self.settings.data_filter,
                None,
            )
            .await?;

        info!(
            match_id,
            edges = pricing.edges.len(),
            multi_bets = multi_bets.len(),
            "Match analysed"
        );

        Ok(MatchReport {
            h2h,
            bo_type: pricing.bo,
            score_chart: score_chart(&pricing.series.score_probs),
            arbitrage: detect_arbitrage(&pricing.odds),
            odds_count: pricing.odds.len() as i64,
            filter: FilterSummary {
                description: self.settings.data_filter.description(),
                is_active: self.settings.data_filter.is_active(),
            },
            teams: MatchTeams::of(&info),
            maps: pricing.maps,
            ot: pricing.ots,
            series: pricing.series,
            single_edges: pricing.edges,
            multi_bets,
            info,
        })
    }

    // -----------------------------------------------------------------------
    // Live
    // -----------------------------------------------------------------------

    pub async fn live_state(&self, match_id: i64) -> Result<LiveState> {
        let info = self.match_row(match_id).await?;
        let (bo, _) = self.resolve_bo(&info).await?;
        self.live_state_of(&info, bo).await
    }

    async fn live_state_of(&self, info: &MatchRow, bo: BoType) -> Result<LiveState> {
        let results = self.db.live_results(info.id).await?;
        let side_wins = |side: &str| {
            results
                .iter()
                .filter(|r| r.winner_team_side.as_deref() == Some(side))
                .count() as u32
        };
        let teams = MatchTeams::of(info);
        Ok(LiveState {
            match_id: info.id,
            team_a: teams.team_a,
            team_b: teams.team_b,
            maps_to_win: bo.maps_to_win(),
            a_score: side_wins("a"),
            b_score: side_wins("b"),
            map_results: results,
        })
    }

    /// Series probability from the current live score, pricing the maps
    /// still to come from the veto.
    pub async fn live_series_prob(&self, match_id: i64) -> Result<LiveReport> {
        let info = self.match_row(match_id).await?;
        let (bo, planned) = self.resolve_bo(&info).await?;
        let state = self.live_state_of(&info, bo).await?;
        let to_win = state.maps_to_win;

        if state.a_score >= to_win || state.b_score >= to_win {
            let a_won = state.a_score >= to_win;
            return Ok(LiveReport {
                state,
                remaining_maps: None,
                series_prob: LiveSeriesProb {
                    p_a_series: if a_won { 1.0 } else { 0.0 },
                    p_b_series: if a_won { 0.0 } else { 1.0 },
                    score_probs: BTreeMap::new(),
                    total_maps_dist: BTreeMap::new(),
                    status: SeriesStatus::Decided,
                },
                live_opportunities: Vec::new(),
            });
        }

        let played = state.map_results.len() as u32;
        let remaining = bo.max_maps().saturating_sub(played);
        let team_a = info.team1_id.unwrap_or_default();
        let team_b = info.team2_id.unwrap_or_default();

        let mut remaining_probs = Vec::with_capacity(remaining as usize);
        for idx in played..played + remaining {
            let map_name = planned
                .get(idx as usize)
                .map(|m| m.map_name.as_str())
                .unwrap_or(UNKNOWN_MAP);
            if map_name == UNKNOWN_MAP {
                remaining_probs.push(0.5);
            } else {
                let ma = self.estimate_map(team_a, team_b, map_name, None, Some(bo)).await?;
                remaining_probs.push(ma.p_team_a_win);
            }
        }

        let sim = series_from_state(&remaining_probs, state.a_score, state.b_score, to_win);
        let live_opportunities = if self.settings.live.show_live_opportunities {
            self.live_opportunities(&info, &sim).await?
        } else {
            Vec::new()
        };

        Ok(LiveReport {
            state,
            remaining_maps: Some(remaining),
            series_prob: LiveSeriesProb {
                p_a_series: sim.p_a_series,
                p_b_series: sim.p_b_series,
                score_probs: sim.score_probs,
                total_maps_dist: sim.total_maps_dist,
                status: SeriesStatus::InProgress,
            },
            live_opportunities,
        })
    }

    async fn live_opportunities(
        &self,
        info: &MatchRow,
        sim: &SeriesProbabilities,
    ) -> Result<Vec<EdgeResult>> {
        let books = self.settings.live.bookmakers();
        if books.is_empty() {
            return Ok(Vec::new());
        }
        let a_names = aliases(info.team1_name.as_deref(), info.team1_tag.as_deref());
        let b_names = aliases(info.team2_name.as_deref(), info.team2_tag.as_deref());
        let odds = self.db.odds_for_match(info.id).await?;

        let mut out: Vec<EdgeResult> = latest_quotes(&odds)
            .into_iter()
            .filter(|o| o.market_type.eq_ignore_ascii_case("match_winner"))
            .filter(|o| books.iter().any(|b| o.bookmaker.eq_ignore_ascii_case(b)))
            .filter_map(|o| {
                let sel = o.selection.trim().to_lowercase();
                let p = if a_names.contains(&sel) {
                    sim.p_a_series
                } else if b_names.contains(&sel) {
                    sim.p_b_series
                } else {
                    return None;
                };
                let mut edge = calculate_edge(p, o.odds_value, Confidence::Medium, 0, self.settings);
                edge.market = o.market_type.clone();
                edge.selection = o.selection.clone();
                edge.bookmaker = o.bookmaker.clone();
                (edge.edge > 0.0).then_some(edge)
            })
            .collect();
        out.sort_by(|a, b| b.edge.total_cmp(&a.edge));
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Parlays
    // -----------------------------------------------------------------------

    /// Positive edges of a match for cross-match parlays. `None` when the
    /// match is unknown or has nothing positive.
    pub async fn match_edges_for_parlay(&self, match_id: i64) -> Result<Option<MatchEdges>> {
        let Some(info) = self.db.match_info(match_id).await? else {
            return Ok(None);
        };
        let pricing = self.price(&info).await?;
        let edges: Vec<EdgeResult> = pricing.edges.into_iter().filter(|e| e.edge > 0.0).collect();
        if edges.is_empty() {
            return Ok(None);
        }
        Ok(Some(MatchEdges {
            match_id,
            match_label: info.label(),
            edges,
        }))
    }

    pub async fn cross_match_parlays(
        &self,
        date_from: &str,
        date_to: &str,
        max_legs: usize,
    ) -> Result<CrossMatchReport> {
        let ids = self.db.upcoming_with_odds(date_from, date_to, CROSS_MATCH_LIMIT).await?;

        let mut with_edges = Vec::new();
        let mut upcoming = Vec::new();
        for id in ids {
            if let Some(edges) = self.match_edges_for_parlay(id).await? {
                with_edges.push(edges);
            }
            if let Some(info) = self.db.match_info(id).await? {
                upcoming.push(UpcomingMatch {
                    team1_display: catalog::team_display_tag(
                        info.team1_name.as_deref(),
                        info.team1_tag.as_deref(),
                    ),
                    team2_display: catalog::team_display_tag(
                        info.team2_name.as_deref(),
                        info.team2_tag.as_deref(),
                    ),
                    info,
                });
            }
        }

        let parlays = find_cross_match_parlays(&with_edges, max_legs, &self.config.multibet);
        info!(
            matches = upcoming.len(),
            with_edges = with_edges.len(),
            parlays = parlays.len(),
            "Cross-match parlays built"
        );

        Ok(CrossMatchReport {
            date_from: date_from.to_string(),
            date_to: date_to.to_string(),
            upcoming_matches: upcoming,
            matches_with_edges: with_edges.len(),
            cross_match_parlays: parlays,
        })
    }

    // -----------------------------------------------------------------------
    // Team overview
    // -----------------------------------------------------------------------

    /// Per-map stats and likely compositions of a team over all data.
    pub async fn team_overview(&self, team_id: i64, map_name: Option<&str>) -> Result<TeamOverview> {
        let team = self
            .db
            .get_team(team_id)
            .await?
            .ok_or_else(|| VctError::NotFound(format!("Team {team_id}")))?;

        let all = DataFilter::default();
        let mut per_map = Vec::new();
        let mut map_stats = Vec::new();
        for map in self.pool_maps(map_name) {
            let stats = self.team_map_stats(team_id, &map, &all, None).await?;
            per_map.push(stats.clone());
            if stats.games_played > 0 || map_name.is_some() {
                let comps = self.db.team_comp_records(team_id, &map, &all).await?;
                map_stats.push(TeamMapOverview {
                    stats,
                    likely_compositions: likely_comps(&comps, LIKELY_COMPS),
                });
            }
        }

        Ok(TeamOverview {
            team,
            overall: aggregate_overall(&per_map),
            map_stats,
        })
    }

    /// Latest completed maps of a team regardless of the data filter.
    pub async fn recent_maps(&self, team_id: i64, map_name: Option<&str>, limit: i64) -> Result<Vec<MapRecord>> {
        self.db.recent_team_maps(team_id, map_name, limit).await
    }

    /// Stats of a team summed over the pool (or one map), all data.
    pub async fn overall_stats(&self, team_id: i64, map_name: Option<&str>) -> Result<OverallStats> {
        let all = DataFilter::default();
        let mut per_map = Vec::new();
        for map in self.pool_maps(map_name) {
            per_map.push(self.team_map_stats(team_id, &map, &all, None).await?);
        }
        Ok(aggregate_overall(&per_map))
    }

    /// Likely compositions of a team on each map of the pool (or one map).
    pub async fn likely_compositions(&self, team_id: i64, map_name: Option<&str>) -> Result<Vec<LikelyComp>> {
        let all = DataFilter::default();
        let mut out = Vec::new();
        for map in self.pool_maps(map_name) {
            let comps = self.db.team_comp_records(team_id, &map, &all).await?;
            out.extend(likely_comps(&comps, LIKELY_COMPS));
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lower-cased name and tag of a team, as selections may spell it.
fn aliases(name: Option<&str>, tag: Option<&str>) -> Vec<String> {
    [name, tag]
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Latest "yes" price of the overtime market on each of the first `n`
/// maps. `None` unless every map is quoted.
fn ot_yes_odds(odds: &[OddsSnapshot], n: usize) -> Option<Vec<f64>> {
    let latest = latest_quotes(odds);
    (1..=n as i64)
        .map(|i| {
            latest.iter().find_map(|o| {
                let key = MarketKey::for_snapshot(o);
                (key.market_type == format!("map{i}_ot") && key.selection == "yes")
                    .then_some(o.odds_value)
            })
        })
        .collect()
}

/// Best latest price per correct-score selection, keyed like the model's
/// score distribution ("2-1").
fn correct_score_odds(odds: &[OddsSnapshot]) -> BTreeMap<String, f64> {
    let mut out: BTreeMap<String, f64> = BTreeMap::new();
    for o in latest_quotes(odds) {
        let key = MarketKey::for_snapshot(o);
        if key.market_type != "correct_score" || o.odds_value <= 1.0 {
            continue;
        }
        let best = out.entry(key.selection).or_insert(o.odds_value);
        *best = best.max(o.odds_value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::edge::tests::snapshot;
    use crate::storage::import::MatchIn;
    use crate::storage::tests::{sample_dataset, seeded_db};
    use crate::storage::LiveResultInput;
    use crate::types::{OddsEntry, VetoAction};

    fn entry(book: &str, market: &str, sel: &str, odds: f64) -> OddsEntry {
        OddsEntry {
            bookmaker: book.into(),
            market_type: market.into(),
            selection: sel.into(),
            odds_value: odds,
            map_number: None,
        }
    }

    fn veto(order: u32, action: &str, team: Option<&str>, map: &str) -> VetoAction {
        VetoAction {
            map_order: order,
            action: action.into(),
            team_id: None,
            team_name: team.map(str::to_string),
            map_name: map.into(),
            start_side: None,
        }
    }

    #[tokio::test]
    async fn test_team_map_stats_from_history() {
        let db = seeded_db().await;
        let (settings, config) = (Settings::default(), AppConfig::default());
        let analyzer = MatchAnalyzer::new(&db, &settings, &config);
        let stats = analyzer
            .team_map_stats(1, "Bind", &DataFilter::default(), None)
            .await
            .unwrap();
        assert_eq!(stats.games_played, 1);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.team_name, "Sentinels");
    }

    #[tokio::test]
    async fn test_veto_placeholders_without_veto() {
        let db = seeded_db().await;
        let (settings, config) = (Settings::default(), AppConfig::default());
        let analyzer = MatchAnalyzer::new(&db, &settings, &config);
        let maps = analyzer.veto_maps(101, BoType::Bo5).await.unwrap();
        assert_eq!(maps.len(), 5);
        assert!(maps.iter().all(|m| m.map_name == UNKNOWN_MAP));
        assert_eq!(maps[4].map_order, 5);
    }

    #[tokio::test]
    async fn test_manual_veto_drives_maps() {
        let db = seeded_db().await;
        db.replace_manual_veto(
            101,
            &[
                veto(1, "ban", Some("SEN"), "Pearl"),
                veto(2, "pick", Some("SEN"), "Bind"),
                veto(3, "pick", Some("NRG"), "Haven"),
                veto(4, "decider", None, "Split"),
            ],
        )
        .await
        .unwrap();
        let (settings, config) = (Settings::default(), AppConfig::default());
        let analyzer = MatchAnalyzer::new(&db, &settings, &config);
        let maps = analyzer.veto_maps(101, BoType::Bo3).await.unwrap();
        let names: Vec<&str> = maps.iter().map(|m| m.map_name.as_str()).collect();
        assert_eq!(names, vec!["Bind", "Haven", "Split"]);
        assert_eq!(maps[1].pick_team.as_deref(), Some("NRG"));
    }

    #[tokio::test]
    async fn test_analyze_match_with_odds() {
        let db = seeded_db().await;
        db.insert_odds(
            101,
            &[
                entry("betano", "match_winner", "Sentinels", 2.5),
                entry("betano", "match_winner", "NRG", 1.5),
                entry("betano", "map1_winner", "SEN", 2.4),
            ],
        )
        .await
        .unwrap();
        let (settings, config) = (Settings::default(), AppConfig::default());
        let analyzer = MatchAnalyzer::new(&db, &settings, &config);
        let report = analyzer.analyze_match(101).await.unwrap();

        assert_eq!(report.bo_type, BoType::Bo3);
        assert_eq!(report.maps.len(), 3);
        assert_eq!(report.odds_count, 3);
        assert!((report.series.p_a_series + report.series.p_b_series - 1.0).abs() < 1e-3);
        assert!(report.single_edges.iter().any(|e| e.market == "match_winner"));
        assert!(report.single_edges.iter().any(|e| e.market == "map1_winner"));
        assert_eq!(report.teams.team_a.name, "Sentinels");
        assert_eq!(report.h2h.total_maps, 3);
        assert!(!report.score_chart.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_market_is_filtered() {
        let db = seeded_db().await;
        db.insert_odds(101, &[entry("betano", "match_winner", "Sentinels", 2.5)])
            .await
            .unwrap();
        let mut settings = Settings::default();
        settings.markets.enabled_markets = vec!["map_winner".into()];
        let config = AppConfig::default();
        let analyzer = MatchAnalyzer::new(&db, &settings, &config);
        let report = analyzer.analyze_match(101).await.unwrap();
        assert!(report.single_edges.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_match_is_not_found() {
        let db = seeded_db().await;
        let (settings, config) = (Settings::default(), AppConfig::default());
        let analyzer = MatchAnalyzer::new(&db, &settings, &config);
        let err = analyzer.analyze_match(999).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<VctError>(), Some(VctError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_live_series_in_progress_then_decided() {
        let db = seeded_db().await;
        let (settings, config) = (Settings::default(), AppConfig::default());
        let analyzer = MatchAnalyzer::new(&db, &settings, &config);

        let result = |n: i64, side: &str| LiveResultInput {
            map_number: n,
            map_name: format!("Map {n}"),
            winner_team_id: Some(if side == "a" { 1 } else { 2 }),
            winner_side: side.into(),
            score_a: Some(13),
            score_b: Some(7),
        };

        db.upsert_live_result(101, &result(1, "a")).await.unwrap();
        let live = analyzer.live_series_prob(101).await.unwrap();
        assert_eq!(live.state.a_score, 1);
        assert_eq!(live.series_prob.status, SeriesStatus::InProgress);
        assert_eq!(live.remaining_maps, Some(2));
        // Unknown maps are coin flips: A needs one of two.
        assert!((live.series_prob.p_a_series - 0.75).abs() < 1e-3);

        db.upsert_live_result(101, &result(2, "a")).await.unwrap();
        let live = analyzer.live_series_prob(101).await.unwrap();
        assert_eq!(live.series_prob.status, SeriesStatus::Decided);
        assert_eq!(live.series_prob.p_a_series, 1.0);
    }

    #[tokio::test]
    async fn test_undeclared_bo5_agrees_between_analysis_and_live() {
        let mut dataset = sample_dataset();
        dataset.matches.push(MatchIn {
            id: 102,
            event_id: Some(10),
            date: Some("2026-02-08".into()),
            team1_id: Some(1),
            team2_id: Some(2),
            status: Some("upcoming".into()),
            ..Default::default()
        });
        let db = Database::in_memory().await.unwrap();
        db.import_dataset(&dataset).await.unwrap();
        db.replace_manual_veto(
            102,
            &[
                veto(1, "ban", Some("SEN"), "Pearl"),
                veto(2, "ban", Some("NRG"), "Abyss"),
                veto(3, "pick", Some("SEN"), "Bind"),
                veto(4, "pick", Some("NRG"), "Haven"),
                veto(5, "pick", Some("SEN"), "Ascent"),
                veto(6, "pick", Some("NRG"), "Lotus"),
                veto(7, "decider", None, "Split"),
            ],
        )
        .await
        .unwrap();

        let (settings, config) = (Settings::default(), AppConfig::default());
        let analyzer = MatchAnalyzer::new(&db, &settings, &config);
        let report = analyzer.analyze_match(102).await.unwrap();
        assert_eq!(report.bo_type, BoType::Bo5);
        assert_eq!(report.maps.len(), 5);

        for n in 1..=2 {
            let input = LiveResultInput {
                map_number: n,
                map_name: format!("Map {n}"),
                winner_team_id: Some(1),
                winner_side: "a".into(),
                score_a: Some(13),
                score_b: Some(9),
            };
            db.upsert_live_result(102, &input).await.unwrap();
        }
        let live = analyzer.live_series_prob(102).await.unwrap();
        assert_eq!(live.state.maps_to_win, report.bo_type.maps_to_win());
        assert_eq!(live.series_prob.status, SeriesStatus::InProgress);
        assert_eq!(live.remaining_maps, Some(3));
        assert!(live.series_prob.p_a_series < 1.0);
    }

    #[tokio::test]
    async fn test_team_overview() {
        let db = seeded_db().await;
        let (settings, config) = (Settings::default(), AppConfig::default());
        let analyzer = MatchAnalyzer::new(&db, &settings, &config);
        let overview = analyzer.team_overview(1, None).await.unwrap();
        assert_eq!(overview.overall.games_played, 3);
        assert_eq!(overview.overall.wins, 2);
        assert_eq!(overview.map_stats.len(), 3);

        let err = analyzer.team_overview(42, None).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<VctError>(), Some(VctError::NotFound(_))));
    }

    #[test]
    fn test_ot_yes_odds_needs_every_map() {
        let odds = vec![
            snapshot(3, "map2_ot", Some(2), "Yes", "betano", 4.0),
            snapshot(2, "map1_ot", Some(1), "yes", "betano", 4.5),
            snapshot(1, "map1_ot", Some(1), "no", "betano", 1.2),
        ];
        assert_eq!(ot_yes_odds(&odds, 2), Some(vec![4.5, 4.0]));
        assert_eq!(ot_yes_odds(&odds, 3), None);
    }

    #[test]
    fn test_correct_score_odds_best_price() {
        let odds = vec![
            snapshot(3, "correct_score", None, "2:0", "betano", 3.0),
            snapshot(2, "correct_score", None, "2-0", "bet365", 3.4),
            snapshot(1, "correct_score", None, "2-1", "betano", 4.0),
        ];
        let best = correct_score_odds(&odds);
        assert_eq!(best.get("2-0"), Some(&3.4));
        assert_eq!(best.get("2-1"), Some(&4.0));
    }
}
