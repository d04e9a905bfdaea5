//! Agent compositions: role classification, per-composition records and
//! matchup scoring.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::stats::CLOSE_MAP_ROUNDS;
use crate::catalog::{agent_role, Role};
use crate::storage::CompRecord;

const TEAM_WEIGHT: f64 = 0.6;
const META_WEIGHT: f64 = 0.4;

/// Role counts of a composition.
pub fn classify_comp(agents: &[String]) -> BTreeMap<Role, u32> {
    let mut roles: BTreeMap<Role, u32> = [Role::Controller, Role::Duelist, Role::Initiator, Role::Sentinel]
        .into_iter()
        .map(|r| (r, 0))
        .collect();
    for agent in agents {
        if let Some(role) = agent_role(agent) {
            *roles.entry(role).or_default() += 1;
        }
    }
    roles
}

/// Order-independent key of a composition: agents lower-cased, sorted and
/// joined with `|`.
pub fn comp_key(agents: &[String]) -> String {
    let mut names: Vec<String> = agents
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect();
    names.sort();
    names.join("|")
}

/// How a composition has fared on a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompWinrate {
    pub comp_key: String,
    pub total: u32,
    pub wins: u32,
    /// 0.5 without data.
    pub winrate: f64,
    pub ot_count: u32,
    pub ot_rate: Option<f64>,
    pub close_rate: Option<f64>,
}

pub fn comp_winrate(comp_key: &str, records: &[CompRecord]) -> CompWinrate {
    let total = records.len() as u32;
    let wins = records.iter().filter(|r| r.won()).count() as u32;
    let ot_count = records.iter().filter(|r| r.is_ot).count() as u32;
    let close = records
        .iter()
        .filter(|r| r.total_rounds() >= CLOSE_MAP_ROUNDS)
        .count() as u32;
    let rate = |n: u32| (total > 0).then(|| n as f64 / total as f64);
    CompWinrate {
        comp_key: comp_key.to_string(),
        total,
        wins,
        winrate: rate(wins).unwrap_or(0.5),
        ot_count,
        ot_rate: rate(ot_count),
        close_rate: rate(close),
    }
}

/// Composition edge of team A over team B on a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompMatchup {
    pub has_data: bool,
    pub p_a_advantage: f64,
    pub ot_rate: Option<f64>,
}

/// Blend each side's team-specific record (60 %) with the meta record of
/// the same composition (40 %), normalised into P(A has the edge).
pub fn matchup_advantage(
    a_team: &CompWinrate,
    b_team: &CompWinrate,
    a_meta: &CompWinrate,
    b_meta: &CompWinrate,
) -> CompMatchup {
    let has_data = a_team.total + b_team.total + a_meta.total + b_meta.total > 0;
    let a_score = TEAM_WEIGHT * a_team.winrate + META_WEIGHT * a_meta.winrate;
    let b_score = TEAM_WEIGHT * b_team.winrate + META_WEIGHT * b_meta.winrate;
    let total = a_score + b_score;
    let p_a = if total > 0.0 { a_score / total } else { 0.5 };

    let known: Vec<f64> = [a_team, b_team, a_meta, b_meta]
        .iter()
        .filter_map(|c| c.ot_rate)
        .collect();
    let ot_rate = (!known.is_empty()).then(|| known.iter().sum::<f64>() / known.len() as f64);

    CompMatchup {
        has_data,
        p_a_advantage: crate::format::round_to(p_a, 4),
        ot_rate,
    }
}

/// A composition a team tends to play.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LikelyComp {
    pub comp_key: String,
    pub agents: Vec<String>,
    pub roles: BTreeMap<Role, u32>,
    pub used: u32,
    pub wins: u32,
    pub winrate: f64,
}

/// Most used compositions (records newest first; ties keep first-seen order).
pub fn likely_comps(records: &[CompRecord], limit: usize) -> Vec<LikelyComp> {
    let mut out: Vec<LikelyComp> = Vec::new();
    for r in records {
        let agents = r.agents();
        let key = r.comp_hash.clone().unwrap_or_else(|| comp_key(&agents));
        let idx = match out.iter().position(|c| c.comp_key == key) {
            Some(i) => i,
            None => {
                out.push(LikelyComp {
                    comp_key: key,
                    roles: classify_comp(&agents),
                    agents,
                    used: 0,
                    wins: 0,
                    winrate: 0.0,
                });
                out.len() - 1
            }
        };
        out[idx].used += 1;
        if r.won() {
            out[idx].wins += 1;
        }
    }
    out.sort_by(|a, b| b.used.cmp(&a.used));
    out.truncate(limit);
    for c in &mut out {
        c.winrate = if c.used > 0 { c.wins as f64 / c.used as f64 } else { 0.0 };
    }
    out
}
