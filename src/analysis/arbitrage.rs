//! Cross-bookmaker comparison: surebets and price anomalies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::edge::{latest_quotes, remove_margin, MarketKey};
use crate::format::{round_money, round_to};
use crate::types::OddsSnapshot;

/// Spread between bookmakers, relative to the lowest price, that flags an
/// anomaly.
pub const ANOMALY_SPREAD: f64 = 0.08;
/// Total stake the surebet split is expressed for.
const ARB_UNITS: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbQuote {
    pub selection: String,
    pub bookmaker: String,
    pub odds: f64,
    /// Share of [`ARB_UNITS`] to place on this quote (surebets only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stake: Option<f64>,
    /// Margin-free price of the selection's best quote (anomalies only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fair_odds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbOpportunity {
    pub market_type: String,
    pub map_number: Option<i64>,
    pub is_arb: bool,
    pub implied_sum: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overround_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_selection: Option<String>,
    pub selections: Vec<ArbQuote>,
    pub description: String,
}

/// Scan a match's quotes (newest first) for surebets and anomalies.
pub fn detect_arbitrage(odds: &[OddsSnapshot]) -> Vec<ArbOpportunity> {
    // (market, map) → selection → quotes from each bookmaker
    let mut markets: BTreeMap<(String, Option<i64>), BTreeMap<String, Vec<&OddsSnapshot>>> =
        BTreeMap::new();
    for quote in latest_quotes(odds) {
        if quote.odds_value <= 1.0 {
            continue;
        }
        let key = MarketKey::for_snapshot(quote);
        markets
            .entry((key.market_type, key.map_number))
            .or_default()
            .entry(key.selection)
            .or_default()
            .push(quote);
    }

    let mut out = Vec::new();
    for ((market_type, map_number), selections) in markets {
        if selections.len() < 2 {
            continue;
        }

        let best: Vec<&OddsSnapshot> = selections
            .values()
            .filter_map(|quotes| {
                quotes
                    .iter()
                    .copied()
                    .max_by(|a, b| a.odds_value.total_cmp(&b.odds_value))
            })
            .collect();
        let implied_sum: f64 = best.iter().map(|q| 1.0 / q.odds_value).sum();

        if implied_sum < 1.0 {
            let margin = round_to((1.0 - implied_sum) * 100.0, 2);
            let map_label = map_number.map(|n| n.to_string()).unwrap_or_default();
            info!(market = %market_type, margin, "Surebet found");
            out.push(ArbOpportunity {
                description: format!("SUREBET {market_type} map{map_label}: margin={margin}%"),
                market_type,
                map_number,
                is_arb: true,
                implied_sum: round_to(implied_sum, 4),
                margin_pct: Some(margin),
                overround_pct: None,
                anomaly_selection: None,
                selections: best
                    .iter()
                    .map(|q| ArbQuote {
                        selection: q.selection.clone(),
                        bookmaker: q.bookmaker.clone(),
                        odds: q.odds_value,
                        stake: Some(round_money(ARB_UNITS / q.odds_value / implied_sum)),
                        fair_odds: None,
                    })
                    .collect(),
            });
            continue;
        }

        let overround = round_to((implied_sum - 1.0) * 100.0, 2);
        let best_odds: Vec<f64> = best.iter().map(|q| q.odds_value).collect();
        let fair = remove_margin(&best_odds);
        for (quotes, fair_odds) in selections.values().zip(fair) {
            if quotes.len() < 2 {
                continue;
            }
            let max_o = quotes.iter().map(|q| q.odds_value).fold(f64::MIN, f64::max);
            let min_o = quotes.iter().map(|q| q.odds_value).fold(f64::MAX, f64::min);
            if (max_o - min_o) / min_o <= ANOMALY_SPREAD {
                continue;
            }
            let selection = quotes[0].selection.clone();
            out.push(ArbOpportunity {
                description: format!(
                    "ANOMALY {market_type} {selection}: spread={} ({min_o} vs {max_o})",
                    round_to(max_o - min_o, 2)
                ),
                market_type: market_type.clone(),
                map_number,
                is_arb: false,
                implied_sum: round_to(implied_sum, 4),
                margin_pct: None,
                overround_pct: Some(overround),
                anomaly_selection: Some(selection),
                selections: quotes
                    .iter()
                    .map(|q| ArbQuote {
                        selection: q.selection.clone(),
                        bookmaker: q.bookmaker.clone(),
                        odds: q.odds_value,
                        stake: None,
                        fair_odds: Some(round_to(fair_odds, 3)),
                    })
                    .collect(),
            });
        }
    }
    out
}
