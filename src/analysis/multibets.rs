//! Multi-bet strategies: map spreads, parlays, dutching, hedging and
//! correct-score coverage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::MultiBetConfig;
use crate::format::{round_money, round_to};
use crate::types::{Confidence, EdgeResult};

/// Parlays and cross-match parlays returned at most.
const MAX_PARLAYS: usize = 10;
/// Combined probability never exceeds this.
const MAX_PARLAY_P: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Spread,
    Parlay,
    CorrectScore,
}

/// A multi-selection bet worth placing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiBetOpportunity {
    pub strategy: Strategy,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_stake: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_payout: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_odds: Option<f64>,
    pub p_model: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_impl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ev: Option<f64>,
    pub edge: f64,
    pub details: MultiBetDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MultiBetDetails {
    Spread(SpreadDetails),
    Parlay(ParlayDetails),
    CorrectScore(CorrectScoreDetails),
}

// ---------------------------------------------------------------------------
// Spread
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadDetails {
    pub maps: usize,
    pub stake_per_map: f64,
    pub p_at_least_1: f64,
    pub p_at_least_2: f64,
    pub mean_hits: f64,
    /// Fewest hits that return a profit.
    pub breakeven_hits: usize,
    pub hit_distribution: BTreeMap<usize, f64>,
    pub map_probs: Vec<f64>,
    pub map_odds: Vec<f64>,
}

/// Distribution of the number of successes among independent events,
/// widened by `correlation` and renormalised.
pub fn hit_distribution(probs: &[f64], correlation: f64) -> Vec<f64> {
    let n = probs.len();
    let mut dp = vec![0.0; n + 1];
    dp[0] = 1.0;
    for &p in probs {
        let mut next = vec![0.0; n + 1];
        for k in 0..=n {
            next[k] += dp[k] * (1.0 - p);
            if k > 0 {
                next[k] += dp[k - 1] * p;
            }
        }
        dp = next;
    }

    if correlation > 0.0 && n >= 2 {
        let mean: f64 = probs.iter().sum();
        for (k, v) in dp.iter_mut().enumerate() {
            *v *= 1.0 + correlation * (k as f64 - mean).abs() * 0.1;
        }
        let total: f64 = dp.iter().sum();
        if total > 0.0 {
            dp.iter_mut().for_each(|v| *v /= total);
        }
    }
    dp
}

/// The same bet (e.g. overtime yes) on every map.
///
/// Returns `None` unless the expected value over the hit distribution is
/// positive.
pub fn analyze_spread(
    map_probs: &[f64],
    map_odds: &[f64],
    label: &str,
    stake_per_map: f64,
    correlation: f64,
) -> Option<MultiBetOpportunity> {
    let n = map_probs.len();
    if n == 0 || map_odds.len() != n {
        return None;
    }

    let total_stake = stake_per_map * n as f64;
    let min_payout = map_odds
        .iter()
        .map(|o| stake_per_map * o)
        .fold(f64::INFINITY, f64::min);
    let avg_odds = map_odds.iter().sum::<f64>() / n as f64;

    // Average payout over every set of k winning maps is k·stake·avg_odds.
    let ev_by_hits: Vec<f64> = (0..=n)
        .map(|k| stake_per_map * k as f64 * avg_odds - total_stake)
        .collect();
    let dist = hit_distribution(map_probs, correlation);
    let total_ev: f64 = dist.iter().zip(&ev_by_hits).map(|(p, ev)| p * ev).sum();

    if total_ev <= 0.0 {
        return None;
    }

    let breakeven_hits = (1..=n).find(|&k| ev_by_hits[k] > 0.0).unwrap_or(0);
    let p_at_least_1 = 1.0 - dist[0];
    let p_at_least_2: f64 = dist.iter().skip(2).sum();

    Some(MultiBetOpportunity {
        strategy: Strategy::Spread,
        description: format!("{label} on all {n} maps"),
        total_stake: Some(total_stake),
        min_payout: Some(round_money(min_payout)),
        combined_odds: None,
        p_model: round_to(p_at_least_1, 4),
        p_impl: None,
        ev: Some(round_money(total_ev)),
        edge: round_to(total_ev / total_stake, 4),
        details: MultiBetDetails::Spread(SpreadDetails {
            maps: n,
            stake_per_map,
            p_at_least_1: round_to(p_at_least_1, 4),
            p_at_least_2: round_to(p_at_least_2, 4),
            mean_hits: round_to(map_probs.iter().sum(), 2),
            breakeven_hits,
            hit_distribution: dist
                .iter()
                .enumerate()
                .map(|(k, p)| (k, round_to(*p, 4)))
                .collect(),
            map_probs: map_probs.iter().map(|p| round_to(*p, 4)).collect(),
            map_odds: map_odds.to_vec(),
        }),
    })
}

// ---------------------------------------------------------------------------
// Parlays
// ---------------------------------------------------------------------------

/// One selection of a parlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParlayLeg {
    pub market: String,
    pub selection: String,
    pub map_number: Option<i64>,
    pub p_model: f64,
    pub odds: f64,
    pub bookmaker: String,
    pub confidence: Confidence,
    pub edge: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_label: Option<String>,
}

impl From<&EdgeResult> for ParlayLeg {
    fn from(e: &EdgeResult) -> Self {
        Self {
            market: e.market.clone(),
            selection: e.selection.clone(),
            map_number: e.map_number,
            p_model: e.p_model,
            odds: e.odds,
            bookmaker: e.bookmaker.clone(),
            confidence: e.confidence,
            edge: Some(e.edge),
            match_id: None,
            match_label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParlayDetails {
    pub legs: Vec<ParlayLeg>,
    pub n_legs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_factor: Option<f64>,
    pub cross_match: bool,
}

fn parlay(
    legs: &[ParlayLeg],
    correlation: Option<f64>,
    min_edge: f64,
    description: String,
) -> Option<MultiBetOpportunity> {
    if legs.len() < 2 {
        return None;
    }
    let n = legs.len();
    let combined_odds: f64 = legs.iter().map(|l| l.odds).product();
    let mut combined_p: f64 = legs.iter().map(|l| l.p_model).product();
    if let Some(c) = correlation {
        combined_p *= (1.0 - c * (n - 1) as f64 * 0.5).max(0.5);
    }
    let combined_p = combined_p.min(MAX_PARLAY_P);

    let p_impl = if combined_odds > 0.0 { 1.0 / combined_odds } else { 0.0 };
    let edge = combined_p - p_impl;
    if edge < min_edge {
        return None;
    }

    Some(MultiBetOpportunity {
        strategy: Strategy::Parlay,
        description,
        total_stake: None,
        min_payout: None,
        combined_odds: Some(round_to(combined_odds, 2)),
        p_model: round_to(combined_p, 4),
        p_impl: Some(round_to(p_impl, 4)),
        ev: None,
        edge: round_to(edge, 4),
        details: MultiBetDetails::Parlay(ParlayDetails {
            legs: legs.to_vec(),
            n_legs: n,
            correlation_factor: correlation,
            cross_match: correlation.is_none(),
        }),
    })
}

/// Same-match accumulator with a correlation penalty on the combined
/// probability.
pub fn analyze_parlay(legs: &[ParlayLeg], cfg: &MultiBetConfig) -> Option<MultiBetOpportunity> {
    let description = legs
        .iter()
        .map(|l| format!("{}@{}", l.selection, l.odds))
        .collect::<Vec<_>>()
        .join(" + ");
    parlay(legs, Some(cfg.correlation_factor), cfg.min_parlay_edge, description)
}

/// Parlay whose legs come from different matches; legs are independent.
pub fn analyze_cross_match_parlay(
    legs: &[ParlayLeg],
    cfg: &MultiBetConfig,
) -> Option<MultiBetOpportunity> {
    let description = legs
        .iter()
        .map(|l| {
            format!(
                "{}: {}@{}",
                l.match_label.as_deref().unwrap_or("?"),
                l.selection,
                l.odds
            )
        })
        .collect::<Vec<_>>()
        .join(" | ");
    parlay(legs, None, cfg.min_parlay_edge, description)
}

/// Every k-combination of `0..n`, in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if k == 0 || k > n {
        return out;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.clone());
        let Some(i) = (0..k).rev().find(|&i| idx[i] != i + n - k) else {
            return out;
        };
        idx[i] += 1;
        for j in i + 1..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

fn best_parlays(mut found: Vec<MultiBetOpportunity>) -> Vec<MultiBetOpportunity> {
    found.sort_by(|a, b| b.edge.total_cmp(&a.edge));
    found.truncate(MAX_PARLAYS);
    found
}

/// Best parlays from a match's positive-edge bets, 2 to `max_legs` legs.
/// Combinations holding two selections of the same market are skipped.
pub fn find_profitable_parlays(
    bets: &[ParlayLeg],
    max_legs: usize,
    cfg: &MultiBetConfig,
) -> Vec<MultiBetOpportunity> {
    let mut found = Vec::new();
    for size in 2..=max_legs {
        for combo in combinations(bets.len(), size) {
            let legs: Vec<ParlayLeg> = combo.iter().map(|&i| bets[i].clone()).collect();
            let mut markets: Vec<(String, Option<i64>)> = legs
                .iter()
                .map(|l| (l.market.to_lowercase(), l.map_number))
                .collect();
            markets.sort();
            markets.dedup();
            if markets.len() < legs.len() {
                continue;
            }
            if let Some(opp) = analyze_parlay(&legs, cfg) {
                found.push(opp);
            }
        }
    }
    best_parlays(found)
}

/// Edges available on one match, for cross-match parlays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchEdges {
    pub match_id: i64,
    pub match_label: String,
    pub edges: Vec<EdgeResult>,
}

/// Parlays with one leg (the best edge) from each of 2 to `max_legs`
/// matches.
pub fn find_cross_match_parlays(
    matches: &[MatchEdges],
    max_legs: usize,
    cfg: &MultiBetConfig,
) -> Vec<MultiBetOpportunity> {
    let best_legs: Vec<Option<ParlayLeg>> = matches
        .iter()
        .map(|m| {
            m.edges
                .iter()
                .filter(|e| e.p_model > 0.0 && e.odds > 1.0)
                .max_by(|a, b| a.edge.total_cmp(&b.edge))
                .map(|e| ParlayLeg {
                    match_id: Some(m.match_id),
                    match_label: Some(m.match_label.clone()),
                    ..ParlayLeg::from(e)
                })
        })
        .collect();

    let mut found = Vec::new();
    for size in 2..=max_legs.min(matches.len()) {
        for combo in combinations(matches.len(), size) {
            let legs: Option<Vec<ParlayLeg>> = combo.iter().map(|&i| best_legs[i].clone()).collect();
            if let Some(opp) = legs.and_then(|legs| analyze_cross_match_parlay(&legs, cfg)) {
                found.push(opp);
            }
        }
    }
    best_parlays(found)
}

// ---------------------------------------------------------------------------
// Dutching & hedging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutchOutcome {
    pub selection: String,
    pub odds: f64,
    #[serde(default)]
    pub bookmaker: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DutchStake {
    pub selection: String,
    pub bookmaker: String,
    pub odds: f64,
    pub stake: f64,
    pub payout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DutchPlan {
    pub stakes: Vec<DutchStake>,
    pub total_stake: f64,
    pub guaranteed_return: f64,
    pub profit: f64,
    pub is_profitable: bool,
    pub roi_pct: f64,
}

/// Split `total_stake` so every outcome returns the same amount.
///
/// Returns `None` without outcomes or when any price is not above 1.0.
pub fn dutch(outcomes: &[DutchOutcome], total_stake: f64) -> Option<DutchPlan> {
    if outcomes.is_empty() || outcomes.iter().any(|o| o.odds <= 1.0) {
        return None;
    }
    let total_implied: f64 = outcomes.iter().map(|o| 1.0 / o.odds).sum();
    let stakes: Vec<DutchStake> = outcomes
        .iter()
        .map(|o| {
            let stake = total_stake * (1.0 / o.odds) / total_implied;
            DutchStake {
                selection: o.selection.clone(),
                bookmaker: o.bookmaker.clone(),
                odds: o.odds,
                stake: round_money(stake),
                payout: round_money(stake * o.odds),
            }
        })
        .collect();

    let guaranteed = stakes.iter().map(|s| s.payout).fold(f64::INFINITY, f64::min);
    let profit = guaranteed - total_stake;
    Some(DutchPlan {
        stakes,
        total_stake: round_money(total_stake),
        guaranteed_return: round_money(guaranteed),
        profit: round_money(profit),
        is_profitable: profit > 0.0,
        roi_pct: if total_stake > 0.0 {
            round_money(profit / total_stake * 100.0)
        } else {
            0.0
        },
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HedgePlan {
    pub original_stake: f64,
    pub original_odds: f64,
    pub original_payout: f64,
    pub hedge_stake: f64,
    pub hedge_odds: f64,
    pub hedge_payout: f64,
    pub profit_if_original_wins: f64,
    pub profit_if_hedge_wins: f64,
    pub total_invested: f64,
    pub guaranteed_profit: f64,
}

/// Stake on the opposite outcome that either equalises both results
/// (`lock_profit`) or only recovers the original stake.
pub fn hedge(stake: f64, odds: f64, hedge_odds: f64, lock_profit: bool) -> HedgePlan {
    let original_payout = stake * odds;
    let hedge_stake = if lock_profit {
        original_payout / hedge_odds
    } else {
        stake / (hedge_odds - 1.0)
    };
    let if_original = original_payout - stake - hedge_stake;
    let if_hedge = hedge_stake * hedge_odds - stake - hedge_stake;

    HedgePlan {
        original_stake: round_money(stake),
        original_odds: odds,
        original_payout: round_money(original_payout),
        hedge_stake: round_money(hedge_stake),
        hedge_odds,
        hedge_payout: round_money(hedge_stake * hedge_odds),
        profit_if_original_wins: round_money(if_original),
        profit_if_hedge_wins: round_money(if_hedge),
        total_invested: round_money(stake + hedge_stake),
        guaranteed_profit: round_money(if_original.min(if_hedge)),
    }
}

// ---------------------------------------------------------------------------
// Correct score
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBet {
    pub score: String,
    pub p_model: f64,
    pub odds: f64,
    pub p_impl: f64,
    pub edge: f64,
    pub ev_per_unit: f64,
    pub stake: f64,
    pub potential_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectScoreDetails {
    pub scores: Vec<ScoreBet>,
    pub expected_return: f64,
}

/// Back every series score the model rates above its price, splitting
/// `budget` by expected value per unit.
pub fn correct_score_coverage(
    score_probs: &BTreeMap<String, f64>,
    score_odds: &BTreeMap<String, f64>,
    budget: f64,
) -> Option<MultiBetOpportunity> {
    let mut bets: Vec<ScoreBet> = score_probs
        .iter()
        .filter_map(|(score, &p)| {
            let odds = *score_odds.get(score)?;
            if odds <= 0.0 {
                return None;
            }
            let p_impl = 1.0 / odds;
            let edge = p - p_impl;
            (edge > 0.0).then(|| ScoreBet {
                score: score.clone(),
                p_model: round_to(p, 4),
                odds,
                p_impl: round_to(p_impl, 4),
                edge: round_to(edge, 4),
                ev_per_unit: round_to(p * odds - 1.0, 4),
                stake: 0.0,
                potential_return: 0.0,
            })
        })
        .collect();
    if bets.is_empty() {
        return None;
    }

    bets.sort_by(|a, b| b.ev_per_unit.total_cmp(&a.ev_per_unit));
    let total_ev: f64 = bets.iter().map(|b| b.ev_per_unit).filter(|&e| e > 0.0).sum();
    let n = bets.len() as f64;
    for b in &mut bets {
        b.stake = if total_ev > 0.0 {
            round_money(budget * b.ev_per_unit / total_ev)
        } else {
            round_money(budget / n)
        };
        b.potential_return = round_money(b.stake * b.odds);
    }

    let staked: f64 = bets.iter().map(|b| b.stake).sum();
    let combined_p: f64 = bets.iter().map(|b| b.p_model).sum();
    let expected_return: f64 = bets.iter().map(|b| b.p_model * b.potential_return).sum();
    let ev = expected_return - staked;

    Some(MultiBetOpportunity {
        strategy: Strategy::CorrectScore,
        description: format!(
            "Correct score coverage: {}",
            bets.iter().map(|b| b.score.as_str()).collect::<Vec<_>>().join(", ")
        ),
        total_stake: Some(round_money(staked)),
        min_payout: None,
        combined_odds: None,
        p_model: round_to(combined_p, 4),
        p_impl: None,
        ev: Some(round_money(ev)),
        edge: if staked > 0.0 { round_to(ev / staked, 4) } else { 0.0 },
        details: MultiBetDetails::CorrectScore(CorrectScoreDetails {
            scores: bets,
            expected_return: round_money(expected_return),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(market: &str, sel: &str, p: f64, odds: f64) -> ParlayLeg {
        ParlayLeg {
            market: market.into(),
            selection: sel.into(),
            map_number: None,
            p_model: p,
            odds,
            bookmaker: "betano".into(),
            confidence: Confidence::High,
            edge: Some(p - 1.0 / odds),
            match_id: None,
            match_label: None,
        }
    }

    fn edge(market: &str, p: f64, odds: f64) -> EdgeResult {
        EdgeResult {
            market: market.into(),
            selection: "x".into(),
            bookmaker: "betano".into(),
            map_number: None,
            odds,
            p_impl: 1.0 / odds,
            p_model: p,
            edge: p - 1.0 / odds,
            confidence: Confidence::High,
            sample_size: 10,
            recommendation: crate::types::Recommendation::StrongEdge,
            suggested_stake: 0.0,
        }
    }

    #[test]
    fn test_hit_distribution_sums_to_one() {
        let d = hit_distribution(&[0.5, 0.5], 0.0);
        assert_eq!(d, vec![0.25, 0.5, 0.25]);
        let d = hit_distribution(&[0.3, 0.4, 0.2], 0.1);
        assert!((d.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(hit_distribution(&[], 0.1), vec![1.0]);
    }

    #[test]
    fn test_spread_positive_ev() {
        let opp = analyze_spread(&[0.3, 0.3, 0.3], &[5.0, 5.0, 5.0], "OT", 10.0, 0.0).unwrap();
        // EV = 30 * (0.3 * 5 - 1) = 15
        assert_eq!(opp.ev, Some(15.0));
        assert_eq!(opp.total_stake, Some(30.0));
        assert_eq!(opp.strategy, Strategy::Spread);
        let MultiBetDetails::Spread(d) = &opp.details else {
            panic!("expected spread details");
        };
        assert_eq!(d.breakeven_hits, 1);
        assert_eq!(opp.description, "OT on all 3 maps");
    }

    #[test]
    fn test_spread_rejects_negative_ev() {
        assert!(analyze_spread(&[0.1, 0.1], &[4.0, 4.0], "OT", 10.0, 0.1).is_none());
        assert!(analyze_spread(&[0.3], &[5.0, 5.0], "OT", 10.0, 0.1).is_none());
    }

    #[test]
    fn test_parlay_penalty_and_threshold() {
        let cfg = MultiBetConfig::default();
        let legs = vec![leg("map1_winner", "SEN", 0.7, 2.0), leg("map1_ot", "yes", 0.4, 4.0)];
        let opp = analyze_parlay(&legs, &cfg).unwrap();
        // 0.28 * (1 - 0.1 * 0.5) = 0.266
        assert_eq!(opp.p_model, 0.266);
        assert_eq!(opp.combined_odds, Some(8.0));
        assert_eq!(opp.description, "SEN@2 + yes@4");

        let weak = vec![leg("a", "x", 0.5, 2.0), leg("b", "y", 0.5, 2.0)];
        assert!(analyze_parlay(&weak, &cfg).is_none());
        assert!(analyze_parlay(&legs[..1], &cfg).is_none());
    }

    #[test]
    fn test_find_parlays_skips_same_market() {
        let cfg = MultiBetConfig::default();
        let bets = vec![
            leg("map1_winner", "SEN", 0.7, 2.0),
            leg("map1_winner", "NRG", 0.5, 3.0),
            leg("map1_ot", "yes", 0.4, 4.0),
        ];
        let parlays = find_profitable_parlays(&bets, 3, &cfg);
        assert!(!parlays.is_empty());
        for p in &parlays {
            let MultiBetDetails::Parlay(d) = &p.details else {
                panic!("expected parlay details");
            };
            assert_eq!(d.n_legs, 2);
            let winners = d.legs.iter().filter(|l| l.market == "map1_winner").count();
            assert!(winners <= 1);
        }
        assert!(parlays.windows(2).all(|w| w[0].edge >= w[1].edge));
    }

    #[test]
    fn test_combinations() {
        assert_eq!(combinations(3, 2), vec![vec![0, 1], vec![0, 2], vec![1, 2]]);
        assert_eq!(combinations(4, 4).len(), 1);
        assert!(combinations(2, 3).is_empty());
    }

    #[test]
    fn test_cross_match_parlays() {
        let cfg = MultiBetConfig::default();
        let matches = vec![
            MatchEdges {
                match_id: 1,
                match_label: "SEN vs NRG".into(),
                edges: vec![edge("match_winner", 0.7, 2.0), edge("map1_ot", 0.3, 4.0)],
            },
            MatchEdges {
                match_id: 2,
                match_label: "FNC vs TH".into(),
                edges: vec![edge("match_winner", 0.6, 2.0)],
            },
            MatchEdges {
                match_id: 3,
                match_label: "PRX vs T1".into(),
                edges: vec![],
            },
        ];
        let parlays = find_cross_match_parlays(&matches, 4, &cfg);
        assert_eq!(parlays.len(), 1);
        // No penalty: 0.7 * 0.6
        assert_eq!(parlays[0].p_model, 0.42);
        assert!(parlays[0].description.starts_with("SEN vs NRG: x@2"));
    }

    #[test]
    fn test_dutch_equal_returns() {
        let outcomes = vec![
            DutchOutcome { selection: "A".into(), odds: 2.0, bookmaker: "b1".into() },
            DutchOutcome { selection: "B".into(), odds: 2.0, bookmaker: "b2".into() },
        ];
        let plan = dutch(&outcomes, 100.0).unwrap();
        assert_eq!(plan.stakes[0].stake, 50.0);
        assert_eq!(plan.guaranteed_return, 100.0);
        assert!(!plan.is_profitable);
        assert!(dutch(&[], 100.0).is_none());
    }

    #[test]
    fn test_hedge_lock_profit() {
        let plan = hedge(100.0, 3.0, 2.0, true);
        assert_eq!(plan.hedge_stake, 150.0);
        assert_eq!(plan.profit_if_original_wins, 50.0);
        assert_eq!(plan.profit_if_hedge_wins, 50.0);
        assert_eq!(plan.guaranteed_profit, 50.0);

        let plan = hedge(100.0, 3.0, 2.0, false);
        assert_eq!(plan.hedge_stake, 100.0);
        assert_eq!(plan.profit_if_hedge_wins, 0.0);
    }

    #[test]
    fn test_correct_score_coverage() {
        let probs: BTreeMap<String, f64> =
            [("2-0".to_string(), 0.4), ("2-1".to_string(), 0.2), ("0-2".to_string(), 0.1)].into();
        let odds: BTreeMap<String, f64> =
            [("2-0".to_string(), 3.0), ("2-1".to_string(), 4.0), ("0-2".to_string(), 5.0)].into();
        let opp = correct_score_coverage(&probs, &odds, 50.0).unwrap();
        let MultiBetDetails::CorrectScore(d) = &opp.details else {
            panic!("expected correct score details");
        };
        // Only 2-0 beats its price.
        assert_eq!(d.scores.len(), 1);
        assert_eq!(d.scores[0].stake, 50.0);
        assert_eq!(opp.total_stake, Some(50.0));
        assert!(correct_score_coverage(&probs, &BTreeMap::new(), 50.0).is_none());
    }
}
