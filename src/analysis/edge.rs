//! Edge calculation: model probabilities against bookmaker quotes.
//!
//! Model probabilities and quotes meet through [`MarketKey`]. Both sides
//! build their keys with the same constructor, so a quote only finds a
//! probability when market, map and selection agree after normalisation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::kelly::Kelly;
use crate::config::Settings;
use crate::format::round_to;
use crate::types::{
    BoType, Confidence, EdgeResult, MapAnalysis, OddsSnapshot, OtEstimate, Recommendation,
    SeriesProbabilities,
};

// ---------------------------------------------------------------------------
// Margin removal
// ---------------------------------------------------------------------------

/// Fair odds of a complete book, with the overround spread proportionally.
///
/// Books with no overround, or containing odds at or below 1.0, come back
/// unchanged.
pub fn remove_margin(odds: &[f64]) -> Vec<f64> {
    if odds.is_empty() || odds.iter().any(|&o| o <= 1.0) {
        return odds.to_vec();
    }
    let implied: Vec<f64> = odds.iter().map(|o| 1.0 / o).collect();
    let total: f64 = implied.iter().sum();
    if total <= 1.0 {
        return odds.to_vec();
    }
    implied.iter().map(|p| total / p).collect()
}

// ---------------------------------------------------------------------------
// Single edge
// ---------------------------------------------------------------------------

/// Compare a model probability with a quote.
///
/// The returned result carries no market identity; callers fill in
/// market, selection, bookmaker and map.
pub fn calculate_edge(
    p_model: f64,
    odds: f64,
    confidence: Confidence,
    sample_size: u32,
    settings: &Settings,
) -> EdgeResult {
    let p_impl = if odds > 0.0 { 1.0 / odds } else { 0.0 };
    let edge = p_model - p_impl;
    let es = &settings.edge;

    let confident = confidence >= es.min_confidence;
    let strong_ok = es.min_sample_for_strong.map_or(true, |n| sample_size >= n);
    let observe_ok = es.min_sample_for_observe.map_or(true, |n| sample_size >= n);

    let recommendation = if edge >= es.strong_edge && confident && strong_ok {
        Recommendation::StrongEdge
    } else if edge >= es.min_edge && confident && observe_ok {
        Recommendation::Observe
    } else {
        Recommendation::NoEdge
    };

    let suggested_stake = if edge > 0.0 {
        Kelly::new(&settings.bankroll).stake(p_model, odds)
    } else {
        0.0
    };

    EdgeResult {
        market: String::new(),
        selection: String::new(),
        bookmaker: String::new(),
        map_number: None,
        odds,
        p_impl: round_to(p_impl, 4),
        p_model: round_to(p_model, 4),
        edge: round_to(edge, 4),
        confidence,
        sample_size,
        recommendation,
        suggested_stake,
    }
}

// ---------------------------------------------------------------------------
// Market keys
// ---------------------------------------------------------------------------

/// Normalised identity of a market selection: `market_type|mapN|selection`,
/// with an empty map segment for series markets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarketKey {
    pub market_type: String,
    pub map_number: Option<i64>,
    pub selection: String,
}

impl MarketKey {
    pub fn new(market_type: &str, map_number: Option<i64>, selection: &str) -> Self {
        let mut market_type = market_type.trim().to_lowercase();
        // "map_winner" on map 2 is the same market as "map2_winner".
        if let (Some(n), Some(rest)) = (map_number, market_type.strip_prefix("map_")) {
            market_type = format!("map{n}_{rest}");
        }

        let mut selection = selection
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if market_type == "correct_score" {
            selection = selection.replace([':', ' '], "-").replace("--", "-");
        }

        Self {
            market_type,
            map_number: map_number.filter(|n| *n > 0),
            selection,
        }
    }

    pub fn for_snapshot(odds: &OddsSnapshot) -> Self {
        Self::new(&odds.market_type, odds.map_number, &odds.selection)
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.map_number {
            Some(n) => write!(f, "{}|map{}|{}", self.market_type, n, self.selection),
            None => write!(f, "{}||{}", self.market_type, self.selection),
        }
    }
}

/// Model probability behind a market key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketProb {
    pub p_model: f64,
    pub confidence: Confidence,
    pub sample_size: u32,
    pub map_number: Option<i64>,
}

/// Market key (rendered) → model probability.
pub type MarketProbs = BTreeMap<String, MarketProb>;

fn insert_prob(probs: &mut MarketProbs, key: MarketKey, prob: MarketProb) {
    probs.insert(key.to_string(), prob);
}

fn alias_list(primary: &str, aliases: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for a in std::iter::once(primary).chain(aliases.iter().map(String::as_str)) {
        let n = a.trim().to_lowercase();
        if !n.is_empty() && !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

/// Model probabilities for every market the analysis can price.
///
/// Per-map markets are keyed by `map_order` (or position when unset).
/// Series-level markets inherit the weakest confidence and smallest sample
/// among the maps.
pub fn build_market_probs(
    maps: &[MapAnalysis],
    series: Option<&SeriesProbabilities>,
    ots: &[OtEstimate],
    team_a_aliases: &[String],
    team_b_aliases: &[String],
    bo: BoType,
) -> MarketProbs {
    let mut probs = MarketProbs::new();
    let map_num = |i: usize| -> i64 {
        match maps.get(i).map(|m| m.map_order) {
            Some(order) if order > 0 => order as i64,
            _ => i as i64 + 1,
        }
    };

    let (a_primary, b_primary) = maps
        .first()
        .map(|m| (m.team_a_stats.team_name.as_str(), m.team_b_stats.team_name.as_str()))
        .unwrap_or(("", ""));
    let a_names = alias_list(a_primary, team_a_aliases);
    let b_names = alias_list(b_primary, team_b_aliases);

    for (i, ma) in maps.iter().enumerate() {
        let n = map_num(i);
        let market = format!("map{n}_winner");
        let prob = |p: f64| MarketProb {
            p_model: round_to(p, 4),
            confidence: ma.confidence,
            sample_size: ma.sample_size,
            map_number: Some(n),
        };
        for sel in &a_names {
            insert_prob(&mut probs, MarketKey::new(&market, Some(n), sel), prob(ma.p_team_a_win));
        }
        for sel in &b_names {
            insert_prob(&mut probs, MarketKey::new(&market, Some(n), sel), prob(1.0 - ma.p_team_a_win));
        }
    }

    for (i, ot) in ots.iter().enumerate() {
        let n = map_num(i);
        let market = format!("map{n}_ot");
        for (sel, p) in [("yes", ot.p_ot), ("no", 1.0 - ot.p_ot)] {
            insert_prob(
                &mut probs,
                MarketKey::new(&market, Some(n), sel),
                MarketProb {
                    p_model: round_to(p, 4),
                    confidence: ot.confidence,
                    sample_size: ot.sample_size,
                    map_number: Some(n),
                },
            );
        }
    }

    let Some(series) = series else {
        return probs;
    };

    let confidence = maps.iter().map(|m| m.confidence).min().unwrap_or(Confidence::Low);
    let sample_size = maps.iter().map(|m| m.sample_size).min().unwrap_or(0);
    let series_prob = |p: f64| MarketProb {
        p_model: round_to(p, 4),
        confidence,
        sample_size,
        map_number: None,
    };

    for (score, &p) in &series.score_probs {
        insert_prob(&mut probs, MarketKey::new("correct_score", None, score), series_prob(p));
    }

    for sel in &a_names {
        insert_prob(&mut probs, MarketKey::new("match_winner", None, sel), series_prob(series.p_a_series));
    }
    for sel in &b_names {
        insert_prob(&mut probs, MarketKey::new("match_winner", None, sel), series_prob(series.p_b_series));
    }

    let totals: Vec<(&str, Option<f64>)> = match bo {
        BoType::Bo3 => vec![("2.5", series.p_3_maps)],
        BoType::Bo5 => vec![("3.5", series.p_over_3_5_maps), ("4.5", series.p_5_maps)],
    };
    for (line, p_over) in totals {
        let Some(p_over) = p_over else { continue };
        let over = format!("over_{line}_maps");
        let under = format!("under_{line}_maps");
        insert_prob(&mut probs, MarketKey::new(&over, None, "yes"), series_prob(p_over));
        insert_prob(&mut probs, MarketKey::new(&over, None, "no"), series_prob(1.0 - p_over));
        insert_prob(&mut probs, MarketKey::new(&under, None, "yes"), series_prob(1.0 - p_over));
        insert_prob(&mut probs, MarketKey::new(&under, None, "no"), series_prob(p_over));
    }

    probs
}

/// Latest quote per (market, selection, bookmaker, map).
///
/// `odds` must be newest first, as storage returns them.
pub fn latest_quotes(odds: &[OddsSnapshot]) -> Vec<&OddsSnapshot> {
    let mut seen = HashSet::new();
    odds.iter()
        .filter(|o| {
            seen.insert((
                MarketKey::for_snapshot(o),
                o.bookmaker.trim().to_lowercase(),
            ))
        })
        .collect()
}

/// Edge of every quote that has a model probability, best first.
pub fn analyze_market_edges(
    odds: &[OddsSnapshot],
    market_probs: &MarketProbs,
    settings: &Settings,
) -> Vec<EdgeResult> {
    let mut results: Vec<EdgeResult> = latest_quotes(odds)
        .into_iter()
        .filter_map(|o| {
            let prob = market_probs.get(&MarketKey::for_snapshot(o).to_string())?;
            let mut edge = calculate_edge(
                prob.p_model,
                o.odds_value,
                prob.confidence,
                prob.sample_size,
                settings,
            );
            edge.market = o.market_type.clone();
            edge.selection = o.selection.clone();
            edge.bookmaker = o.bookmaker.clone();
            edge.map_number = o.map_number;
            Some(edge)
        })
        .collect();

    results.sort_by(|a, b| b.edge.total_cmp(&a.edge));
    results
}
