//! Natural-language stats queries ("ot MIBR", "pistol NRG Abyss",
//! "h2h FURIA G2"), in English or Portuguese.
//!
//! Intent comes from a keyword table, teams and map from the known names.
//! Answers are JSON for the dashboard plus a markdown rendering of the same
//! payload.

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::engine::MatchAnalyzer;
use crate::format::format_pct;
use crate::storage::TeamRow;
use crate::types::DataFilter;

/// Recent maps listed per team for a scores query.
const SCORES_LIMIT: i64 = 15;

const NO_TEAM_HINT: &str = "The teams (e.g. DFM, PRX) may not be in the database yet. \
     Import a dataset that includes their region; stats use every match once teams are found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatType {
    Ot,
    Pistol,
    Winrate,
    Scores,
    Close,
    Sides,
    Comp,
    H2h,
    Overview,
    Rounds,
}

/// Checked in order; the first hit decides the intent.
const STAT_KEYWORDS: &[(&str, StatType)] = &[
    ("ot", StatType::Ot),
    ("overtime", StatType::Ot),
    ("pistol", StatType::Pistol),
    ("pistols", StatType::Pistol),
    ("winrate", StatType::Winrate),
    ("win rate", StatType::Winrate),
    ("taxa de vitoria", StatType::Winrate),
    ("placar", StatType::Scores),
    ("placares", StatType::Scores),
    ("score", StatType::Scores),
    ("scores", StatType::Scores),
    ("resultado", StatType::Scores),
    ("resultados", StatType::Scores),
    ("close", StatType::Close),
    ("apertado", StatType::Close),
    ("apertados", StatType::Close),
    ("atk", StatType::Sides),
    ("def", StatType::Sides),
    ("attack", StatType::Sides),
    ("defense", StatType::Sides),
    ("lado", StatType::Sides),
    ("sides", StatType::Sides),
    ("comp", StatType::Comp),
    ("comps", StatType::Comp),
    ("composicao", StatType::Comp),
    ("composicoes", StatType::Comp),
    ("agents", StatType::Comp),
    ("agentes", StatType::Comp),
    ("h2h", StatType::H2h),
    ("head to head", StatType::H2h),
    ("historico", StatType::H2h),
    ("stats", StatType::Overview),
    ("estatisticas", StatType::Overview),
    ("overview", StatType::Overview),
    ("geral", StatType::Overview),
    ("round", StatType::Rounds),
    ("rounds", StatType::Rounds),
];

/// Words never taken for a team name.
const STOPWORDS: &[&str] = &[
    "e", "o", "a", "vs", "de", "da", "do", "em", "no", "na", "in", "on", "the", "and", "of", "for",
];

fn words(q: &str) -> Vec<String> {
    q.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Intent of a query. Single-word keywords must match a whole word, so
/// "hotdog" is not an overtime question.
pub fn detect_stat_type(q: &str) -> Option<StatType> {
    let lower = q.to_lowercase();
    let tokens = words(q);
    STAT_KEYWORDS
        .iter()
        .find(|(kw, _)| {
            if kw.contains(' ') {
                lower.contains(kw)
            } else {
                tokens.iter().any(|t| t == kw)
            }
        })
        .map(|(_, st)| *st)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoundTeam {
    pub id: i64,
    pub name: String,
    pub tag: Option<String>,
}

/// Teams mentioned in a query, by tag, full name, or a word of at least
/// three letters that is part of the name. First mention order, no repeats.
pub fn find_teams(q: &str, teams: &[TeamRow], map_pool: &[String]) -> Vec<FoundTeam> {
    let lower = q.to_lowercase();
    let candidates: Vec<String> = words(q)
        .into_iter()
        .filter(|w| w.len() >= 2)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .filter(|w| !STAT_KEYWORDS.iter().any(|(kw, _)| kw == w))
        .filter(|w| !map_pool.iter().any(|m| m.eq_ignore_ascii_case(w)))
        .collect();

    let mut found: Vec<(usize, FoundTeam)> = Vec::new();
    for team in teams {
        let name = team.name.trim().to_lowercase();
        let tag = team.tag.as_deref().unwrap_or_default().trim().to_lowercase();

        let position = candidates
            .iter()
            .position(|w| {
                (tag.len() >= 2 && *w == tag)
                    || (!name.is_empty() && *w == name)
                    || (w.len() >= 3 && name.contains(w.as_str()))
            })
            .or_else(|| (name.len() >= 2 && lower.contains(&name)).then_some(candidates.len()));

        if let Some(pos) = position {
            if !found.iter().any(|(_, f)| f.id == team.id) {
                found.push((
                    pos,
                    FoundTeam {
                        id: team.id,
                        name: team.name.clone(),
                        tag: team.tag.clone(),
                    },
                ));
            }
        }
    }
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, t)| t).collect()
}

/// First map of the pool named in the query.
pub fn find_map(q: &str, map_pool: &[String]) -> Option<String> {
    let tokens = words(q);
    map_pool
        .iter()
        .find(|m| tokens.iter().any(|t| t.eq_ignore_ascii_case(m)))
        .cloned()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsQueryResult {
    pub intent: Option<StatType>,
    pub teams: Vec<FoundTeam>,
    pub map_name: Option<String>,
    pub result: Option<Value>,
    pub markdown: Option<String>,
}

/// Answer a query. Without an intent but with teams the answer is an
/// overview; with neither there is nothing to answer.
pub async fn run(analyzer: &MatchAnalyzer<'_>, teams: &[TeamRow], map_pool: &[String], q: &str) -> Result<StatsQueryResult> {
    let found = find_teams(q, teams, map_pool);
    let map_name = find_map(q, map_pool);
    let intent = match detect_stat_type(q) {
        Some(st) => Some(st),
        None if !found.is_empty() => Some(StatType::Overview),
        None => None,
    };
    debug!(query = q, ?intent, teams = found.len(), map = ?map_name, "Stats query parsed");

    let Some(stat) = intent else {
        return Ok(StatsQueryResult {
            intent: None,
            teams: found,
            map_name,
            result: None,
            markdown: None,
        });
    };

    let result = answer(analyzer, stat, &found, map_name.as_deref()).await?;
    let markdown = render_markdown(&result);
    Ok(StatsQueryResult {
        intent,
        teams: found,
        map_name,
        result: Some(result),
        markdown: Some(markdown),
    })
}

async fn answer(
    analyzer: &MatchAnalyzer<'_>,
    stat: StatType,
    teams: &[FoundTeam],
    map_name: Option<&str>,
) -> Result<Value> {
    if stat == StatType::H2h {
        let [a, b, ..] = teams else {
            return Ok(json!({ "error": "h2h requires two teams" }));
        };
        let h2h = analyzer.h2h(a.id, b.id, map_name, &DataFilter::default(), None).await?;
        return Ok(serde_json::to_value(h2h)?);
    }

    if stat == StatType::Scores {
        let mut items = Vec::new();
        for team in teams {
            for r in analyzer.recent_maps(team.id, map_name, SCORES_LIMIT).await? {
                items.push(json!({
                    "team": team.name,
                    "date": r.date,
                    "map_name": r.map_name,
                    "score": r.score_label(),
                    "matchup": format!(
                        "{} vs {}",
                        r.t1_name.as_deref().unwrap_or("?"),
                        r.t2_name.as_deref().unwrap_or("?")
                    ),
                    "is_ot": r.is_ot,
                }));
            }
        }
        return Ok(json!({ "items": items }));
    }

    if teams.is_empty() {
        return Ok(json!({ "error": "No teams recognized in query", "hint": NO_TEAM_HINT }));
    }

    let mut items = Vec::new();
    for team in teams {
        if stat == StatType::Comp {
            let comps = analyzer.likely_compositions(team.id, map_name).await?;
            items.push(json!({ "team": team, "compositions": comps }));
        } else {
            let overall = analyzer.overall_stats(team.id, map_name).await?;
            let mut row = Map::new();
            row.insert("team".into(), serde_json::to_value(team)?);
            if let Value::Object(fields) = serde_json::to_value(overall)? {
                row.extend(fields);
            }
            items.push(Value::Object(row));
        }
    }
    Ok(json!({ "items": items }))
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

fn cell(key: &str, value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Bool(b) => if *b { "yes" } else { "" }.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if key.contains("rate") && (0.0..=1.0).contains(&f) => format_pct(f),
            (None, Some(f)) => format!("{f:.2}"),
            _ => n.to_string(),
        },
        Value::String(s) => s.replace('|', "/"),
        Value::Object(obj) => obj
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} fields", obj.len())),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => cell(key, other),
            })
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn table(rows: &[&Map<String, Value>]) -> String {
    let Some(first) = rows.first() else {
        return "_No data._".to_string();
    };
    // "team" leads, nested lists are rendered separately.
    let mut keys: Vec<&String> = first
        .iter()
        .filter(|(_, v)| !matches!(v, Value::Array(a) if a.iter().any(Value::is_object)))
        .map(|(k, _)| k)
        .collect();
    keys.sort_by_key(|k| k.as_str() != "team");

    let mut out = format!(
        "| {} |\n|{}|\n",
        keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(" | "),
        keys.iter().map(|_| "---").collect::<Vec<_>>().join("|")
    );
    for row in rows {
        let cells: Vec<String> = keys
            .iter()
            .map(|k| row.get(k.as_str()).map(|v| cell(k, v)).unwrap_or_default())
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

/// Markdown for a query result: tables for item lists (nested lists get
/// their own table), a two-column table for flat objects, and the error
/// with its hint.
pub fn render_markdown(result: &Value) -> String {
    let Some(obj) = result.as_object() else {
        return cell("", result);
    };

    if let Some(err) = obj.get("error").and_then(Value::as_str) {
        let mut out = format!("**{err}**");
        if let Some(hint) = obj.get("hint").and_then(Value::as_str) {
            out.push_str(&format!("\n\n{hint}"));
        }
        return out;
    }

    if let Some(items) = obj.get("items").and_then(Value::as_array) {
        let rows: Vec<&Map<String, Value>> = items.iter().filter_map(Value::as_object).collect();
        let mut out = table(&rows);
        for row in &rows {
            for (key, value) in row.iter() {
                let Some(nested) = value.as_array() else { continue };
                let nested: Vec<&Map<String, Value>> = nested.iter().filter_map(Value::as_object).collect();
                if nested.is_empty() {
                    continue;
                }
                let title = row.get("team").map(|t| cell("team", t)).unwrap_or_default();
                out.push_str(&format!("\n### {title} {key}\n\n{}", table(&nested)));
            }
        }
        return out;
    }

    let mut out = String::from("| Stat | Value |\n|---|---|\n");
    for (key, value) in obj {
        out.push_str(&format!("| {key} | {} |\n", cell(key, value)));
    }
    out
}
