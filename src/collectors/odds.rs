//! Odds intake: pasted batch strings, JSON files and the external odds
//! agent.
//!
//! The agent is an external CLI that browses bookmaker pages and prints a
//! JSON array of quotes. It sits behind the [`OddsAgent`] trait so the API
//! can be tested without it.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::OddsAgentConfig;
use crate::storage::MatchRow;
use crate::types::{OddsEntry, VctError};

/// Suggested manual steps when the agent returns nothing usable.
pub const FALLBACK_STEPS: [&str; 3] = [
    "Confirm the odds agent can access bookmaker pages",
    "Retry with {\"force\": true} if you only want timing",
    "Fall back to POST /api/matches/{id}/odds with a manual batch",
];

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Map number of a per-map market ("map2_winner" → 2). Only a `map`
/// prefix followed by digits counts.
pub fn infer_map_number(market: &str) -> Option<i64> {
    let rest = market.trim().to_lowercase();
    let digits: String = rest
        .strip_prefix("map")?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().filter(|n| *n > 0)
}

/// Parse "bookmaker market selection odds" entries separated by `;` or
/// newlines. Selections may contain spaces; odds must exceed 1.0.
pub fn parse_odds_string(text: &str) -> Vec<OddsEntry> {
    text.split([';', '\n'])
        .filter_map(|part| {
            let tokens: Vec<&str> = part.split_whitespace().collect();
            if tokens.len() < 4 {
                return None;
            }
            let odds_value: f64 = tokens[tokens.len() - 1].replace(',', ".").parse().ok()?;
            if odds_value <= 1.0 {
                return None;
            }
            let market_type = tokens[1].to_lowercase();
            Some(OddsEntry {
                bookmaker: tokens[0].to_lowercase(),
                map_number: infer_map_number(&market_type),
                market_type,
                selection: tokens[2..tokens.len() - 1].join(" "),
                odds_value,
            })
        })
        .collect()
}

/// Pull the first JSON array out of free text (code fences, prose around
/// it). Brackets inside strings are ignored. Returns the trimmed input when
/// no array starts.
pub fn extract_json_array(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let Some(start) = cleaned.find('[') else {
        return cleaned;
    };

    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut escape = false;
    for (i, c) in cleaned[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match (in_string, c) {
            (Some(_), '\\') => escape = true,
            (Some(q), c) if c == q => in_string = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => in_string = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return cleaned[start..start + i + 1].to_string();
                }
            }
            _ => {}
        }
    }
    cleaned[start..].to_string()
}

/// A quote as the agent or an odds file spells it.
#[derive(Debug, Deserialize)]
struct RawOdds {
    #[serde(default)]
    bookmaker: Option<String>,
    #[serde(default, alias = "market")]
    market_type: Option<String>,
    #[serde(default)]
    selection: Option<serde_json::Value>,
    #[serde(default, alias = "odds")]
    odds_value: Option<serde_json::Value>,
    #[serde(default)]
    map_number: Option<serde_json::Value>,
}

fn value_f64(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn value_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl RawOdds {
    fn into_entry(self, min_odds: f64) -> Option<OddsEntry> {
        let bookmaker = self.bookmaker?.trim().to_lowercase();
        let market_type = self.market_type?.trim().to_lowercase();
        let odds_value = self.odds_value.as_ref().and_then(value_f64)?;
        if bookmaker.is_empty() || market_type.is_empty() || odds_value <= min_odds {
            return None;
        }
        let map_number = self
            .map_number
            .as_ref()
            .and_then(value_f64)
            .map(|n| n as i64)
            .or_else(|| infer_map_number(&market_type));
        Some(OddsEntry {
            bookmaker,
            selection: self.selection.as_ref().map(value_string).unwrap_or_default(),
            market_type,
            odds_value,
            map_number,
        })
    }
}

fn parse_array(json: &str, min_odds: f64) -> Result<Vec<OddsEntry>, VctError> {
    let items: Vec<RawOdds> = serde_json::from_str(json)
        .map_err(|e| VctError::Parse(format!("expected a JSON array of odds objects: {e}")))?;
    Ok(items.into_iter().filter_map(|r| r.into_entry(min_odds)).collect())
}

/// Parse agent output. Entries without bookmaker or market, or with
/// non-positive odds, are dropped.
pub fn parse_odds_json(raw: &str) -> Result<Vec<OddsEntry>, VctError> {
    parse_array(&extract_json_array(raw), 0.0)
}

/// Parse an odds file (`market`/`market_type`, `odds`/`odds_value`).
/// Odds must exceed 1.0.
pub fn parse_odds_file(contents: &str) -> Result<Vec<OddsEntry>, VctError> {
    parse_array(contents.trim(), 1.0)
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Match the agent should collect quotes for.
#[derive(Debug, Clone, PartialEq)]
pub struct OddsRequest {
    pub match_id: i64,
    /// "Sentinels vs NRG - Masters Toronto - Playoffs - bo3"
    pub description: String,
}

impl OddsRequest {
    pub fn for_match(info: &MatchRow) -> Self {
        let mut parts = vec![format!("{} vs {}", info.team1_display(), info.team2_display())];
        parts.extend(
            [&info.event_name, &info.stage_name, &info.bo_type]
                .into_iter()
                .filter_map(|p| p.as_deref().map(str::trim).filter(|p| !p.is_empty()))
                .map(str::to_string),
        );
        Self {
            match_id: info.id,
            description: parts.join(" - "),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OddsAgent: Send + Sync {
    /// Raw agent output for a match.
    async fn fetch(&self, request: &OddsRequest) -> Result<String, VctError>;
}

/// Runs the configured agent CLI as a child process.
pub struct ProcessOddsAgent {
    config: OddsAgentConfig,
}

impl ProcessOddsAgent {
    pub fn new(config: OddsAgentConfig) -> Self {
        Self { config }
    }

    fn prompt(&self, request: &OddsRequest) -> String {
        format!(
            "Follow the skill instructions in {} to extract odds for:\n{}\n\n\
             Return ONLY the JSON array as described in the skill.",
            self.config.skill_path, request.description
        )
    }
}

#[async_trait]
impl OddsAgent for ProcessOddsAgent {
    async fn fetch(&self, request: &OddsRequest) -> Result<String, VctError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        info!(
            match_id = request.match_id,
            command = %self.config.command,
            "Launching odds agent"
        );

        let child = Command::new(&self.config.command)
            .args(&self.config.args)
            .arg(self.prompt(request))
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Err(_) => {
                return Err(VctError::AgentFailed(format!(
                    "timed out after {}s",
                    self.config.timeout_secs
                )))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VctError::AgentUnavailable(format!(
                    "{} is not installed or not in PATH",
                    self.config.command
                )))
            }
            Ok(Err(e)) => return Err(VctError::AgentFailed(e.to_string())),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr.trim(), "Odds agent exited with error");
            return Err(VctError::AgentFailed(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(bytes = stdout.len(), "Odds agent output received");
        Ok(stdout)
    }
}

/// Ask the agent and parse whatever it printed.
pub async fn collect_with_agent(
    agent: &dyn OddsAgent,
    request: &OddsRequest,
) -> Result<Vec<OddsEntry>, VctError> {
    let raw = agent.fetch(request).await?;
    let entries = parse_odds_json(&raw)?;
    info!(match_id = request.match_id, count = entries.len(), "Odds parsed from agent output");
    Ok(entries)
}
