//! Probability model: map win, overtime and series outcome estimates.
//!
//! Inputs are aggregated stats; the engine does the querying. Every estimate
//! records the factor values that produced it so the dashboard can show them.

use std::collections::BTreeMap;

use super::compositions::CompMatchup;
use crate::config::{EdgeSettings, ModelWeights, OtWeights};
use crate::format::round_to;
use crate::types::{
    Confidence, GlobalMapStats, H2hStats, MapAnalysis, MapFactors, OtEstimate, OtFactors,
    SeriesProbabilities, TeamStats,
};

/// Global OT rate used when a map has too few games on record.
const DEFAULT_OT_RATE: f64 = 0.15;
const MIN_MAPS_FOR_GLOBAL_OT: u32 = 3;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn confidence_level(sample_size: u32, settings: &EdgeSettings) -> Confidence {
    if sample_size >= settings.min_sample_general * 2 {
        Confidence::High
    } else if sample_size >= settings.min_sample_map {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Win rate pulled towards 0.5 for tiny samples.
pub fn smoothed_rate(wins: u32, total: u32) -> f64 {
    if total == 0 {
        0.5
    } else {
        (wins as f64 + 0.5) / (total as f64 + 1.0)
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Share of `a` in `a + b`, 0.5 when both are zero.
fn normalized(a: f64, b: f64) -> f64 {
    if a + b > 0.0 {
        a / (a + b)
    } else {
        0.5
    }
}

// ---------------------------------------------------------------------------
// Map win
// ---------------------------------------------------------------------------

/// Everything the map-win model looks at for one map of a matchup.
#[derive(Debug, Clone, Default)]
pub struct MapWinInputs {
    pub team_a: TeamStats,
    pub team_b: TeamStats,
    /// Head-to-head on this map, from team A's perspective.
    pub h2h: H2hStats,
    /// Side team A starts on, if the veto says so.
    pub start_side_a: Option<String>,
    pub comp: Option<CompMatchup>,
    /// (wins, games) over the latest maps of each team.
    pub recent_a: (u32, u32),
    pub recent_b: (u32, u32),
    pub filter_description: String,
}

/// P(team A wins the map) as a weighted blend of seven factors.
pub fn estimate_map_win(
    inputs: MapWinInputs,
    weights: &ModelWeights,
    settings: &EdgeSettings,
) -> MapAnalysis {
    let a = &inputs.team_a;
    let b = &inputs.team_b;
    let sample = a.games_played + b.games_played;

    let p_base = normalized(
        smoothed_rate(a.wins, a.games_played),
        smoothed_rate(b.wins, b.games_played),
    );

    let p_opp = logistic((a.avg_round_diff - b.avg_round_diff) / 3.0);

    let p_h2h = if inputs.h2h.total_maps >= 1 {
        smoothed_rate(inputs.h2h.a_wins, inputs.h2h.total_maps)
    } else {
        0.5
    };

    let p_side = match inputs.start_side_a.as_deref() {
        Some(side) => {
            let side = side.trim().to_lowercase();
            let rate = if side == "attacker" || side == "atk" {
                a.atk_round_rate()
            } else {
                a.def_round_rate()
            };
            (0.5 + (rate - 0.5) * 0.3).clamp(0.3, 0.7)
        }
        None => 0.5,
    };

    let p_comp = match &inputs.comp {
        Some(c) if c.has_data => c.p_a_advantage,
        _ => 0.5,
    };

    let p_pistol = (0.5 + (a.pistol_rate() - b.pistol_rate()) * 0.5).clamp(0.3, 0.7);

    let p_recency = if inputs.recent_a.1 + inputs.recent_b.1 == 0 {
        p_base
    } else {
        normalized(
            smoothed_rate(inputs.recent_a.0, inputs.recent_a.1),
            smoothed_rate(inputs.recent_b.0, inputs.recent_b.1),
        )
    };

    let p_model = weights.base_map_winrate * p_base
        + weights.opponent_adjusted * p_opp
        + weights.h2h * p_h2h
        + weights.side_advantage * p_side
        + weights.comp_factor * p_comp
        + weights.pistol_factor * p_pistol
        + weights.recency * p_recency;
    let p_model = p_model.clamp(0.05, 0.95);

    let factors = MapFactors {
        filter: inputs.filter_description.clone(),
        sample_a: a.games_played,
        sample_b: b.games_played,
        base_winrate: round_to(p_base, 4),
        opponent_adjusted: round_to(p_opp, 4),
        h2h: round_to(p_h2h, 4),
        h2h_maps: inputs.h2h.total_maps,
        side_advantage: round_to(p_side, 4),
        comp_factor: round_to(p_comp, 4),
        pistol: round_to(p_pistol, 4),
        recency: round_to(p_recency, 4),
    };

    MapAnalysis {
        map_name: a.map_name.clone(),
        map_order: 0,
        pick_team: None,
        start_side: inputs.start_side_a.clone(),
        p_team_a_win: round_to(p_model, 4),
        p_ot: 0.0,
        confidence: confidence_level(sample, settings),
        sample_size: sample,
        factors,
        team_a_stats: inputs.team_a,
        team_b_stats: inputs.team_b,
    }
}

// ---------------------------------------------------------------------------
// Overtime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct OtInputs {
    pub team_a: TeamStats,
    pub team_b: TeamStats,
    pub h2h: H2hStats,
    pub global: GlobalMapStats,
    /// Mean OT rate of the expected compositions, if any were seen.
    pub comp_ot_rate: Option<f64>,
    pub filter_description: String,
}

pub fn estimate_ot(inputs: &OtInputs, weights: &OtWeights, settings: &EdgeSettings) -> OtEstimate {
    let a = &inputs.team_a;
    let b = &inputs.team_b;
    let sample = inputs.global.total_maps;

    let global_ot = if inputs.global.total_maps >= MIN_MAPS_FOR_GLOBAL_OT {
        inputs.global.ot_rate
    } else {
        DEFAULT_OT_RATE
    };

    let mut closeness = (a.close_rate() + b.close_rate()) / 2.0;
    if inputs.h2h.total_maps >= 2 {
        closeness = closeness * 0.6 + inputs.h2h.ot_rate * 0.4;
    }

    let comp_ot = inputs.comp_ot_rate.unwrap_or(global_ot);

    // Evenly matched pistol teams trade momentum more often.
    let avg_pistol = (a.pistol_rate() + b.pistol_rate()) / 2.0;
    let pistol_gap = (a.pistol_rate() - b.pistol_rate()).abs();
    let pistol_swing = (avg_pistol * 0.5 - pistol_gap * 0.3 + 0.3).clamp(0.0, 1.0);

    let p_ot = weights.global_ot_rate * global_ot
        + weights.closeness_index * closeness
        + weights.comp_ot_rate * comp_ot
        + weights.pistol_swing * pistol_swing;

    OtEstimate {
        p_ot: round_to(p_ot.clamp(0.02, 0.60), 4),
        confidence: confidence_level(sample, settings),
        sample_size: sample,
        factors: OtFactors {
            filter: inputs.filter_description.clone(),
            global_ot_rate: round_to(global_ot, 4),
            closeness: round_to(closeness, 4),
            comp_ot_rate: round_to(comp_ot, 4),
            pistol_swing: round_to(pistol_swing, 4),
        },
    }
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// Exact outcome distribution of a best-of series from the start.
///
/// `map_probs[i]` is P(team A wins map i + 1). Missing maps reuse the last
/// probability (0.5 when none is given).
pub fn series_probabilities(map_probs: &[f64], maps_to_win: u32) -> SeriesProbabilities {
    series_from_state(map_probs, 0, 0, maps_to_win)
}

/// Outcome distribution of a series already at `a_score`-`b_score`.
///
/// `remaining_probs[0]` is P(team A wins the next map). A decided series
/// returns a certain outcome.
pub fn series_from_state(
    remaining_probs: &[f64],
    a_score: u32,
    b_score: u32,
    maps_to_win: u32,
) -> SeriesProbabilities {
    let mut scores: BTreeMap<(u32, u32), f64> = BTreeMap::new();
    let fallback = remaining_probs.last().copied().unwrap_or(0.5);
    let prob_at = |i: usize| remaining_probs.get(i).copied().unwrap_or(fallback).clamp(0.0, 1.0);

    // Walk every path; each state branches on the next map.
    let mut stack = vec![(a_score, b_score, 0usize, 1.0f64)];
    while let Some((a, b, idx, p)) = stack.pop() {
        if a >= maps_to_win || b >= maps_to_win {
            *scores.entry((a, b)).or_default() += p;
            continue;
        }
        let q = prob_at(idx);
        stack.push((a + 1, b, idx + 1, p * q));
        stack.push((a, b + 1, idx + 1, p * (1.0 - q)));
    }

    let mut p_a = 0.0;
    let mut score_probs = BTreeMap::new();
    let mut total_maps_dist: BTreeMap<u32, f64> = BTreeMap::new();
    for (&(a, b), &p) in &scores {
        if a >= maps_to_win {
            p_a += p;
        }
        score_probs.insert(format!("{a}-{b}"), round_to(p, 4));
        *total_maps_dist.entry(a + b).or_default() += p;
    }

    let mut result = SeriesProbabilities {
        p_a_series: round_to(p_a, 4),
        p_b_series: round_to(1.0 - p_a, 4),
        score_probs,
        total_maps_dist: BTreeMap::new(),
        ..Default::default()
    };
    match maps_to_win {
        2 => {
            result.p_3_maps = Some(round_to(total_maps_dist.get(&3).copied().unwrap_or(0.0), 4));
        }
        3 => {
            let over: f64 = total_maps_dist.range(4..).map(|(_, p)| p).sum();
            result.p_over_3_5_maps = Some(round_to(over, 4));
            result.p_5_maps = Some(round_to(total_maps_dist.get(&5).copied().unwrap_or(0.0), 4));
        }
        _ => {}
    }
    result.total_maps_dist = total_maps_dist
        .into_iter()
        .map(|(k, v)| (k, round_to(v, 4)))
        .collect();
    result
}
