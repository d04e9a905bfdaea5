//! Map veto text: parsing pasted VLR-style vetoes and rendering them back.

use regex::Regex;
use std::sync::LazyLock;

use crate::storage::{MapSide, VetoRow};
use crate::types::VetoAction;

/// A team a veto line can refer to.
#[derive(Debug, Clone, Copy)]
pub struct VetoTeam<'a> {
    pub id: i64,
    pub name: &'a str,
    pub tag: Option<&'a str>,
}

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\s+(ban|pick)\s+(.+?)(?:\s*\((attacker|defender|atk|def)\))?$").unwrap()
});
static REMAINS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(.+?)\s+remains$").unwrap());

/// Resolve a team mention: exact name or tag first, then containment.
fn resolve_team(raw: &str, teams: &[VetoTeam<'_>]) -> Option<i64> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    let names = |t: &VetoTeam<'_>| {
        std::iter::once(t.name.to_lowercase())
            .chain(t.tag.map(str::to_lowercase))
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
    };
    teams
        .iter()
        .find(|t| names(t).iter().any(|n| *n == lower))
        .or_else(|| {
            teams
                .iter()
                .find(|t| names(t).iter().any(|n| n.contains(&lower) || lower.contains(n.as_str())))
        })
        .map(|t| t.id)
}

fn normalize_side(side: &str) -> String {
    if side.to_lowercase().starts_with("at") {
        "Attacker".to_string()
    } else {
        "Defender".to_string()
    }
}

/// Parse "SEN ban Pearl; NRG pick Bind (Attacker); ...; Haven remains".
///
/// Steps are separated by `;` or newlines. Unrecognised steps are skipped;
/// "X remains" becomes the decider.
pub fn parse_veto(text: &str, teams: &[VetoTeam<'_>]) -> Vec<VetoAction> {
    let mut actions = Vec::new();
    for step in text.split([';', '\n']).map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(caps) = REMAINS_RE.captures(step) {
            actions.push(VetoAction {
                map_order: actions.len() as u32 + 1,
                action: "decider".to_string(),
                team_id: None,
                team_name: Some("Decider".to_string()),
                map_name: caps[1].trim().to_string(),
                start_side: None,
            });
            continue;
        }
        let Some(caps) = ACTION_RE.captures(step) else {
            continue;
        };
        let team = caps[1].trim();
        actions.push(VetoAction {
            map_order: actions.len() as u32 + 1,
            action: caps[2].to_lowercase(),
            team_id: resolve_team(team, teams),
            team_name: Some(team.to_string()),
            map_name: caps[3].trim().to_string(),
            start_side: caps.get(4).map(|m| normalize_side(m.as_str())),
        });
    }
    actions
}

/// Stored-row view of parsed actions.
pub fn to_rows(source: &str, actions: &[VetoAction]) -> Vec<VetoRow> {
    actions
        .iter()
        .map(|a| VetoRow {
            source: source.to_string(),
            map_order: a.map_order as i64,
            action: a.action.clone(),
            team_id: a.team_id,
            team_name: a.team_name.clone(),
            map_name: a.map_name.clone(),
            start_side: a.start_side.clone(),
        })
        .collect()
}

/// Render rows in the same format [`parse_veto`] accepts.
pub fn veto_to_markdown(rows: &[VetoRow]) -> String {
    rows.iter()
        .map(|v| {
            let action = v.action.to_lowercase();
            let map = Some(v.map_name.trim()).filter(|m| !m.is_empty()).unwrap_or("?");
            if action == "decider" {
                return format!("{map} remains");
            }
            let team = v
                .team_name
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or("?");
            match v.start_side.as_deref().map(str::trim) {
                Some(side) if !side.is_empty() && action == "pick" => {
                    format!("{team} {action} {map} ({side})")
                }
                _ => format!("{team} {action} {map}"),
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fill missing start sides on picks and the decider from maps already
/// played. The picker keeps team 1's recorded side when it is team 1 and
/// takes the opposite side otherwise.
pub fn enrich_start_sides(rows: &mut [VetoRow], map_sides: &[MapSide]) {
    for row in rows.iter_mut() {
        let action = row.action.to_lowercase();
        if row.start_side.is_some() || (action != "pick" && action != "decider") {
            continue;
        }
        let key = row.map_name.trim().to_lowercase();
        let Some(side) = map_sides.iter().find(|s| {
            s.map_name.as_deref().map(|m| m.trim().to_lowercase()) == Some(key.clone())
        }) else {
            continue;
        };
        let (Some(t1_side), Some(pick_id)) = (side.team1_start_side.as_deref(), side.pick_team_id) else {
            continue;
        };
        row.start_side = Some(if Some(pick_id) == side.team1_id {
            t1_side.to_string()
        } else if t1_side.to_lowercase().contains("attack") {
            "Defender".to_string()
        } else {
            "Attacker".to_string()
        });
    }
}
