//! Display formatting helpers shared by the API, CLI and dashboard payloads.

use rust_decimal::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::BoType;

/// Round half away from zero to `dp` decimal places.
pub fn round_to(x: f64, dp: u32) -> f64 {
    match Decimal::from_f64(x) {
        Some(d) => d
            .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
            .to_f64()
            .unwrap_or(x),
        None => x,
    }
}

/// Round a money amount to cents.
pub fn round_money(x: f64) -> f64 {
    round_to(x, 2)
}

/// `0.123` → `"12.3%"`.
pub fn format_pct(p: f64) -> String {
    format!("{:.1}%", p * 100.0)
}

/// `12.5` → `"R$ 12.50"`.
pub fn format_currency(x: f64, symbol: &str) -> String {
    format!("{symbol} {:.2}", round_money(x))
}

pub fn format_odds(o: f64) -> String {
    format!("{o:.2}")
}

pub fn bo_label(bo: BoType) -> &'static str {
    match bo {
        BoType::Bo3 => "BO3",
        BoType::Bo5 => "BO5",
    }
}

/// Work out the series format.
///
/// A declared value wins. Otherwise more than three maps played, or a side
/// reaching three map wins, means a Bo5, as does a veto listing five played
/// maps. Everything else is treated as a Bo3.
pub fn infer_bo_type(
    declared: Option<&str>,
    score1: Option<i64>,
    score2: Option<i64>,
    veto_played_maps: usize,
) -> BoType {
    if let Some(bo) = declared.and_then(BoType::from_label) {
        return bo;
    }
    let s1 = score1.unwrap_or(0);
    let s2 = score2.unwrap_or(0);
    if s1 + s2 > 3 || s1 >= 3 || s2 >= 3 {
        return BoType::Bo5;
    }
    if veto_played_maps >= 5 {
        return BoType::Bo5;
    }
    BoType::Bo3
}

// ---------------------------------------------------------------------------
// Chart shaping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    /// Probability as a percentage, one decimal.
    pub value: f64,
    /// `"a"` when team A takes the series with this score, else `"b"`.
    pub team: &'static str,
}

fn parse_score(label: &str) -> Option<(u32, u32)> {
    let (a, b) = label.split_once('-')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// Shape a correct-score distribution for the bar chart: team A wins first,
/// widest margin first, then team B wins from narrowest to widest.
pub fn score_chart(score_probs: &BTreeMap<String, f64>) -> Vec<ChartPoint> {
    let mut a_wins = Vec::new();
    let mut b_wins = Vec::new();
    for (label, p) in score_probs {
        let Some((a, b)) = parse_score(label) else {
            continue;
        };
        let point = ChartPoint {
            label: label.clone(),
            value: round_to(p * 100.0, 1),
            team: if a > b { "a" } else { "b" },
        };
        if a > b {
            a_wins.push((a as i64 - b as i64, point));
        } else {
            b_wins.push((b as i64 - a as i64, point));
        }
    }
    a_wins.sort_by(|x, y| y.0.cmp(&x.0));
    b_wins.sort_by(|x, y| x.0.cmp(&y.0));
    a_wins
        .into_iter()
        .chain(b_wins)
        .map(|(_, point)| point)
        .collect()
}
