//! Shared types for the VCT edge terminal.
//!
//! These types form the data model used across storage, analytics and the
//! API. Analytics functions only ever see these types, never database rows,
//! so they stay pure and testable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Series format
// ---------------------------------------------------------------------------

/// Best-of format of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoType {
    Bo3,
    Bo5,
}

impl BoType {
    /// Maps a team needs to take the series.
    pub fn maps_to_win(self) -> u32 {
        match self {
            BoType::Bo3 => 2,
            BoType::Bo5 => 3,
        }
    }

    /// Maximum number of maps the series can go to.
    pub fn max_maps(self) -> u32 {
        2 * self.maps_to_win() - 1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoType::Bo3 => "bo3",
            BoType::Bo5 => "bo5",
        }
    }

    /// Lenient parse of stored labels ("bo3", "Bo5", "5", "BO 5").
    /// Anything mentioning a 5 is a Bo5; blank labels are unknown.
    pub fn from_label(label: &str) -> Option<Self> {
        let l = label.trim().to_lowercase();
        if l.is_empty() {
            None
        } else if l.contains('5') {
            Some(BoType::Bo5)
        } else {
            Some(BoType::Bo3)
        }
    }
}

impl fmt::Display for BoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Confidence & recommendation
// ---------------------------------------------------------------------------

/// Sample-size driven confidence in a model estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Confidence {
    type Err = VctError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" | "med" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            other => Err(VctError::Validation(format!("unknown confidence level: {other}"))),
        }
    }
}

/// What the edge calculator suggests doing with a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    StrongEdge,
    Observe,
    NoEdge,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::StrongEdge => write!(f, "STRONG EDGE"),
            Recommendation::Observe => write!(f, "OBSERVE"),
            Recommendation::NoEdge => write!(f, "NO EDGE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Data filter
// ---------------------------------------------------------------------------

/// Restricts which historical matches feed the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataFilter {
    pub event_ids: Vec<i64>,
    pub stage_names: Vec<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl DataFilter {
    /// Human-readable description of the active restrictions.
    pub fn description(&self) -> String {
        let mut parts = Vec::new();
        if !self.event_ids.is_empty() {
            parts.push(format!("events={:?}", self.event_ids));
        }
        if !self.stage_names.is_empty() {
            parts.push(format!("stages={:?}", self.stage_names));
        }
        if let Some(from) = &self.date_from {
            parts.push(format!("from={from}"));
        }
        if let Some(to) = &self.date_to {
            parts.push(format!("to={to}"));
        }
        if parts.is_empty() {
            "all data (no filters)".to_string()
        } else {
            parts.join(" | ")
        }
    }

    pub fn is_active(&self) -> bool {
        !self.event_ids.is_empty()
            || !self.stage_names.is_empty()
            || self.date_from.is_some()
            || self.date_to.is_some()
    }
}

// ---------------------------------------------------------------------------
// Team / map statistics
// ---------------------------------------------------------------------------

/// Aggregated stats for a team on one map under the active filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub team_id: i64,
    pub team_name: String,
    pub map_name: String,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub ot_count: u32,
    pub avg_rounds_won: f64,
    pub avg_rounds_lost: f64,
    pub avg_round_diff: f64,
    pub atk_rounds_won: u32,
    pub atk_rounds_played: u32,
    pub def_rounds_won: u32,
    pub def_rounds_played: u32,
    pub pistols_won: u32,
    pub pistols_played: u32,
    pub pistol_conversions: u32,
    pub pistol_atk_won: u32,
    pub pistol_def_won: u32,
    pub pistol_atk_played: u32,
    pub pistol_def_played: u32,
    pub close_maps: u32,
    pub stomps_won: u32,
    pub stomps_lost: u32,
}

fn ratio(num: u32, den: u32) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl TeamStats {
    pub fn empty(team_id: i64, map_name: &str) -> Self {
        Self {
            team_id,
            map_name: map_name.to_string(),
            ..Default::default()
        }
    }

    pub fn winrate(&self) -> f64 {
        ratio(self.wins, self.games_played)
    }

    pub fn ot_rate(&self) -> f64 {
        ratio(self.ot_count, self.games_played)
    }

    pub fn atk_round_rate(&self) -> f64 {
        ratio(self.atk_rounds_won, self.atk_rounds_played)
    }

    pub fn def_round_rate(&self) -> f64 {
        ratio(self.def_rounds_won, self.def_rounds_played)
    }

    pub fn pistol_rate(&self) -> f64 {
        ratio(self.pistols_won, self.pistols_played)
    }

    /// Share of won pistols converted into the following round.
    pub fn pistol_conversion_rate(&self) -> f64 {
        ratio(self.pistol_conversions, self.pistols_won)
    }

    pub fn close_rate(&self) -> f64 {
        ratio(self.close_maps, self.games_played)
    }
}

/// Head-to-head record between two teams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct H2hStats {
    pub total_maps: u32,
    pub a_wins: u32,
    pub b_wins: u32,
    pub ot_count: u32,
    pub ot_rate: f64,
}

/// Map-wide statistics across every team.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMapStats {
    pub total_maps: u32,
    pub ot_count: u32,
    pub ot_rate: f64,
    pub close_count: u32,
    pub close_rate: f64,
    pub avg_total_rounds: f64,
}

// ---------------------------------------------------------------------------
// Model outputs
// ---------------------------------------------------------------------------

/// Individual factor values behind a map-win estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapFactors {
    pub filter: String,
    pub sample_a: u32,
    pub sample_b: u32,
    pub base_winrate: f64,
    pub opponent_adjusted: f64,
    pub h2h: f64,
    pub h2h_maps: u32,
    pub side_advantage: f64,
    pub comp_factor: f64,
    pub pistol: f64,
    pub recency: f64,
}

/// Analysis results for a single map of a matchup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapAnalysis {
    pub map_name: String,
    pub map_order: u32,
    pub pick_team: Option<String>,
    pub start_side: Option<String>,
    pub team_a_stats: TeamStats,
    pub team_b_stats: TeamStats,
    pub p_team_a_win: f64,
    pub p_ot: f64,
    pub confidence: Confidence,
    pub sample_size: u32,
    pub factors: MapFactors,
}

/// Individual factor values behind an overtime estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtFactors {
    pub filter: String,
    pub global_ot_rate: f64,
    pub closeness: f64,
    pub comp_ot_rate: f64,
    pub pistol_swing: f64,
}

/// P(overtime) on one map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtEstimate {
    pub p_ot: f64,
    pub confidence: Confidence,
    pub sample_size: u32,
    pub factors: OtFactors,
}

/// Outcome distribution of a best-of series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesProbabilities {
    pub p_a_series: f64,
    pub p_b_series: f64,
    /// Final series score ("2-1") → probability.
    pub score_probs: BTreeMap<String, f64>,
    /// Number of maps played → probability.
    pub total_maps_dist: BTreeMap<u32, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_3_maps: Option<f64>,
    #[serde(rename = "p_over_3.5_maps", skip_serializing_if = "Option::is_none")]
    pub p_over_3_5_maps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_5_maps: Option<f64>,
}

// ---------------------------------------------------------------------------
// Odds & edges
// ---------------------------------------------------------------------------

/// A single quote as entered by the user or returned by the odds agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsEntry {
    pub bookmaker: String,
    pub market_type: String,
    pub selection: String,
    pub odds_value: f64,
    #[serde(default)]
    pub map_number: Option<i64>,
}

impl OddsEntry {
    /// Implied probability of the quote (no margin removal).
    pub fn p_impl(&self) -> f64 {
        if self.odds_value > 0.0 {
            1.0 / self.odds_value
        } else {
            0.0
        }
    }
}

/// A stored quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OddsSnapshot {
    pub id: i64,
    pub match_id: i64,
    pub map_number: Option<i64>,
    pub bookmaker: String,
    pub market_type: String,
    pub selection: String,
    pub odds_value: f64,
    pub timestamp: String,
}

/// Model probability vs. bookmaker quote for one selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeResult {
    pub market: String,
    pub selection: String,
    pub bookmaker: String,
    pub map_number: Option<i64>,
    pub odds: f64,
    pub p_impl: f64,
    pub p_model: f64,
    pub edge: f64,
    pub confidence: Confidence,
    pub sample_size: u32,
    pub recommendation: Recommendation,
    pub suggested_stake: f64,
}

impl fmt::Display for EdgeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} @ {:.2} | model={:.1}% impl={:.1}% edge={:+.1}% | {}",
            self.bookmaker,
            self.market,
            self.selection,
            self.odds,
            self.p_model * 100.0,
            self.p_impl * 100.0,
            self.edge * 100.0,
            self.recommendation,
        )
    }
}

// ---------------------------------------------------------------------------
// Veto
// ---------------------------------------------------------------------------

/// One step of a map veto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VetoAction {
    pub map_order: u32,
    pub action: String,
    #[serde(default)]
    pub team_id: Option<i64>,
    #[serde(default)]
    pub team_name: Option<String>,
    pub map_name: String,
    #[serde(default)]
    pub start_side: Option<String>,
}

impl VetoAction {
    /// Picks and the decider are the maps that get played.
    pub fn is_played(&self) -> bool {
        matches!(self.action.to_lowercase().as_str(), "pick" | "decider")
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum VctError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Odds agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("Odds agent failed: {0}")]
    AgentFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bo_type_from_label() {
        assert_eq!(BoType::from_label("bo3"), Some(BoType::Bo3));
        assert_eq!(BoType::from_label("Bo5"), Some(BoType::Bo5));
        assert_eq!(BoType::from_label("5"), Some(BoType::Bo5));
        assert_eq!(BoType::from_label("  "), None);
    }

    #[test]
    fn test_bo_type_shape() {
        assert_eq!(BoType::Bo3.maps_to_win(), 2);
        assert_eq!(BoType::Bo3.max_maps(), 3);
        assert_eq!(BoType::Bo5.maps_to_win(), 3);
        assert_eq!(BoType::Bo5.max_maps(), 5);
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
        assert_eq!("MEDIUM".parse::<Confidence>().unwrap(), Confidence::Medium);
        assert!("certain".parse::<Confidence>().is_err());
    }

    #[test]
    fn test_recommendation_serializes() {
        let json = serde_json::to_string(&Recommendation::StrongEdge).unwrap();
        assert_eq!(json, "\"STRONG_EDGE\"");
    }

    #[test]
    fn test_data_filter_description() {
        let filt = DataFilter::default();
        assert_eq!(filt.description(), "all data (no filters)");
        assert!(!filt.is_active());

        let filt = DataFilter {
            event_ids: vec![2682],
            date_from: Some("2026-01-01".into()),
            ..Default::default()
        };
        assert_eq!(filt.description(), "events=[2682] | from=2026-01-01");
        assert!(filt.is_active());
    }

    #[test]
    fn test_team_stats_rates_without_games() {
        let stats = TeamStats::empty(1, "Bind");
        assert_eq!(stats.winrate(), 0.0);
        assert_eq!(stats.pistol_conversion_rate(), 0.0);
    }

    #[test]
    fn test_series_probabilities_rename() {
        let series = SeriesProbabilities {
            p_over_3_5_maps: Some(0.6),
            ..Default::default()
        };
        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(json["p_over_3.5_maps"], 0.6);
        assert!(json.get("p_3_maps").is_none());
    }

    #[test]
    fn test_veto_action_is_played() {
        let pick = VetoAction {
            map_order: 3,
            action: "Pick".into(),
            team_id: None,
            team_name: Some("NRG".into()),
            map_name: "Bind".into(),
            start_side: None,
        };
        assert!(pick.is_played());
        let ban = VetoAction { action: "ban".into(), ..pick };
        assert!(!ban.is_played());
    }
}
