//! Configuration loading from TOML plus the user-editable runtime settings.
//!
//! `config.toml` holds deployment concerns (server, database, model weights,
//! odds agent). The runtime [`Settings`] (data filter, bankroll, edge
//! thresholds, markets, live flags) start from the `[defaults]` section and
//! are then owned by the database so the dashboard can edit them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::catalog;
use crate::types::{Confidence, DataFilter};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub model: ModelWeights,
    pub ot_model: OtWeights,
    pub multibet: MultiBetConfig,
    pub odds_agent: OddsAgentConfig,
    pub display: DisplayConfig,
    pub map_pool: MapPoolConfig,
    pub defaults: Settings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://localhost:4173".to_string(),
                "http://127.0.0.1:4173".to_string(),
            ],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/vct.db".to_string(),
        }
    }
}

/// Weights for the map-level win model. They sum to 1.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModelWeights {
    pub base_map_winrate: f64,
    pub opponent_adjusted: f64,
    pub h2h: f64,
    pub side_advantage: f64,
    pub comp_factor: f64,
    pub pistol_factor: f64,
    pub recency: f64,
}

impl Default for ModelWeights {
    fn default() -> Self {
        Self {
            base_map_winrate: 0.30,
            opponent_adjusted: 0.25,
            h2h: 0.15,
            side_advantage: 0.10,
            comp_factor: 0.10,
            pistol_factor: 0.05,
            recency: 0.05,
        }
    }
}

/// Weights for the overtime model.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct OtWeights {
    pub global_ot_rate: f64,
    pub closeness_index: f64,
    pub comp_ot_rate: f64,
    pub pistol_swing: f64,
}

impl Default for OtWeights {
    fn default() -> Self {
        Self {
            global_ot_rate: 0.30,
            closeness_index: 0.30,
            comp_ot_rate: 0.25,
            pistol_swing: 0.15,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MultiBetConfig {
    pub correlation_factor: f64,
    pub min_spread_edge: f64,
    pub min_parlay_edge: f64,
    pub default_spread_stake: f64,
    pub correct_score_budget: f64,
}

impl Default for MultiBetConfig {
    fn default() -> Self {
        Self {
            correlation_factor: 0.10,
            min_spread_edge: 0.02,
            min_parlay_edge: 0.05,
            default_spread_stake: 10.0,
            correct_score_budget: 50.0,
        }
    }
}

/// External odds-scraping agent, invoked as a process.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OddsAgentConfig {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub skill_path: String,
}

impl Default for OddsAgentConfig {
    fn default() -> Self {
        Self {
            command: "openclaw".to_string(),
            args: vec!["agent".to_string(), "--message".to_string()],
            timeout_secs: 180,
            skill_path: "skills/odds_scraper.md".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub currency_symbol: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            currency_symbol: "R$".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapPoolConfig {
    pub maps: Vec<String>,
}

impl Default for MapPoolConfig {
    fn default() -> Self {
        Self {
            maps: catalog::MAP_POOL.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Load `path` when it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::load(path)
        } else {
            tracing::warn!(path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankrollSettings {
    pub total: f64,
    pub max_stake_pct: f64,
    pub daily_limit: f64,
    pub event_limit: f64,
    pub kelly_fraction: f64,
}

impl Default for BankrollSettings {
    fn default() -> Self {
        Self {
            total: 1300.0,
            max_stake_pct: 0.03,
            daily_limit: 300.0,
            event_limit: 500.0,
            kelly_fraction: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeSettings {
    pub min_edge: f64,
    pub strong_edge: f64,
    pub min_confidence: Confidence,
    pub min_sample_map: u32,
    pub min_sample_general: u32,
    /// Minimum sample before a STRONG_EDGE call; unset means no floor.
    pub min_sample_for_strong: Option<u32>,
    pub min_sample_for_observe: Option<u32>,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            min_edge: 0.03,
            strong_edge: 0.08,
            min_confidence: Confidence::Medium,
            min_sample_map: 3,
            min_sample_general: 5,
            min_sample_for_strong: None,
            min_sample_for_observe: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub enabled_markets: Vec<String>,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            enabled_markets: catalog::DEFAULT_ENABLED_MARKETS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl MarketSettings {
    /// Whether the family of `market_type` is switched on.
    pub fn is_enabled(&self, market_type: &str) -> bool {
        let family = catalog::market_family(market_type);
        self.enabled_markets.iter().any(|m| m.eq_ignore_ascii_case(&family))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    pub betano_live: bool,
    pub bet365_live: bool,
    pub show_live_opportunities: bool,
    pub auto_recalc_on_map_result: bool,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            betano_live: true,
            bet365_live: false,
            show_live_opportunities: true,
            auto_recalc_on_map_result: true,
        }
    }
}

impl LiveSettings {
    /// Bookmakers whose live lines are considered.
    pub fn bookmakers(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.betano_live {
            out.push("betano");
        }
        if self.bet365_live {
            out.push("bet365");
        }
        out
    }
}

/// Everything the user can change from the settings page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_filter: DataFilter,
    pub bankroll: BankrollSettings,
    pub edge: EdgeSettings,
    pub markets: MarketSettings,
    pub live: LiveSettings,
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataFilterUpdate {
    pub event_ids: Option<Vec<i64>>,
    pub stage_names: Option<Vec<String>>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BankrollUpdate {
    pub total: Option<f64>,
    pub max_stake_pct: Option<f64>,
    pub daily_limit: Option<f64>,
    pub event_limit: Option<f64>,
    pub kelly_fraction: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EdgeUpdate {
    pub min_edge: Option<f64>,
    pub strong_edge: Option<f64>,
    pub min_confidence: Option<Confidence>,
    pub min_sample_map: Option<u32>,
    pub min_sample_general: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketsUpdate {
    pub enabled_markets: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiveUpdate {
    pub betano_live: Option<bool>,
    pub bet365_live: Option<bool>,
    pub show_live_opportunities: Option<bool>,
    pub auto_recalc_on_map_result: Option<bool>,
}

/// Body of `PUT /api/config`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub data_filter: Option<DataFilterUpdate>,
    pub bankroll: Option<BankrollUpdate>,
    pub edge: Option<EdgeUpdate>,
    pub markets: Option<MarketsUpdate>,
    pub live: Option<LiveUpdate>,
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

/// Empty strings clear a date bound.
fn date_bound(value: String) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

impl Settings {
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(df) = update.data_filter {
            set(&mut self.data_filter.event_ids, df.event_ids);
            set(&mut self.data_filter.stage_names, df.stage_names);
            if let Some(from) = df.date_from {
                self.data_filter.date_from = date_bound(from);
            }
            if let Some(to) = df.date_to {
                self.data_filter.date_to = date_bound(to);
            }
        }
        if let Some(b) = update.bankroll {
            set(&mut self.bankroll.total, b.total);
            set(&mut self.bankroll.max_stake_pct, b.max_stake_pct);
            set(&mut self.bankroll.daily_limit, b.daily_limit);
            set(&mut self.bankroll.event_limit, b.event_limit);
            set(&mut self.bankroll.kelly_fraction, b.kelly_fraction);
        }
        if let Some(e) = update.edge {
            set(&mut self.edge.min_edge, e.min_edge);
            set(&mut self.edge.strong_edge, e.strong_edge);
            set(&mut self.edge.min_confidence, e.min_confidence);
            set(&mut self.edge.min_sample_map, e.min_sample_map);
            set(&mut self.edge.min_sample_general, e.min_sample_general);
        }
        if let Some(m) = update.markets {
            set(&mut self.markets.enabled_markets, m.enabled_markets);
        }
        if let Some(l) = update.live {
            set(&mut self.live.betano_live, l.betano_live);
            set(&mut self.live.bet365_live, l.bet365_live);
            set(&mut self.live.show_live_opportunities, l.show_live_opportunities);
            set(&mut self.live.auto_recalc_on_map_result, l.auto_recalc_on_map_result);
        }
    }
}
