//! Row types returned by the storage layer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRow {
    pub id: i64,
    pub name: String,
    pub region: Option<String>,
    pub tier: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub prize: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamRow {
    pub id: i64,
    pub name: String,
    pub tag: Option<String>,
}

/// A match joined with both teams and its event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MatchRow {
    pub id: i64,
    pub event_id: Option<i64>,
    pub stage_name: Option<String>,
    pub phase: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub bo_type: Option<String>,
    pub patch: Option<String>,
    pub status: Option<String>,
    pub score1: Option<i64>,
    pub score2: Option<i64>,
    pub team1_id: Option<i64>,
    pub team1_name: Option<String>,
    pub team1_tag: Option<String>,
    pub team2_id: Option<i64>,
    pub team2_name: Option<String>,
    pub team2_tag: Option<String>,
    pub event_name: Option<String>,
}

impl MatchRow {
    /// "SEN vs PRX" style label.
    pub fn label(&self) -> String {
        format!(
            "{} vs {}",
            self.team1_tag.as_deref().or(self.team1_name.as_deref()).unwrap_or("?"),
            self.team2_tag.as_deref().or(self.team2_name.as_deref()).unwrap_or("?"),
        )
    }

    pub fn team1_display(&self) -> String {
        self.team1_name.clone().unwrap_or_else(|| "Team A".to_string())
    }

    pub fn team2_display(&self) -> String {
        self.team2_name.clone().unwrap_or_else(|| "Team B".to_string())
    }
}

/// One played map with its match date, as seen from the map table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MapRecord {
    pub id: i64,
    pub match_id: i64,
    pub map_name: Option<String>,
    pub map_order: Option<i64>,
    pub pick_team_id: Option<i64>,
    pub team1_id: Option<i64>,
    pub team2_id: Option<i64>,
    pub team1_score: Option<i64>,
    pub team2_score: Option<i64>,
    pub team1_atk_rounds: Option<i64>,
    pub team1_def_rounds: Option<i64>,
    pub team2_atk_rounds: Option<i64>,
    pub team2_def_rounds: Option<i64>,
    pub team1_start_side: Option<String>,
    pub team1_pistols_won: Option<i64>,
    pub team2_pistols_won: Option<i64>,
    pub team1_pistol_conversions: Option<i64>,
    pub team2_pistol_conversions: Option<i64>,
    pub is_ot: bool,
    pub winner_team_id: Option<i64>,
    pub date: Option<String>,
    pub t1_name: Option<String>,
    pub t2_name: Option<String>,
}

impl MapRecord {
    pub fn total_rounds(&self) -> i64 {
        self.team1_score.unwrap_or(0) + self.team2_score.unwrap_or(0)
    }

    pub fn score_label(&self) -> String {
        format!(
            "{}-{}",
            self.team1_score.unwrap_or(0),
            self.team2_score.unwrap_or(0)
        )
    }
}

/// A composition played on a map, joined with the map result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CompRecord {
    pub map_id: i64,
    pub team_id: i64,
    pub comp_hash: Option<String>,
    pub agent1: Option<String>,
    pub agent2: Option<String>,
    pub agent3: Option<String>,
    pub agent4: Option<String>,
    pub agent5: Option<String>,
    pub winner_team_id: Option<i64>,
    pub is_ot: bool,
    pub team1_score: Option<i64>,
    pub team2_score: Option<i64>,
}

impl CompRecord {
    pub fn agents(&self) -> Vec<String> {
        [&self.agent1, &self.agent2, &self.agent3, &self.agent4, &self.agent5]
            .into_iter()
            .flatten()
            .filter(|a| !a.trim().is_empty())
            .cloned()
            .collect()
    }

    pub fn won(&self) -> bool {
        self.winner_team_id == Some(self.team_id)
    }

    pub fn total_rounds(&self) -> i64 {
        self.team1_score.unwrap_or(0) + self.team2_score.unwrap_or(0)
    }
}

/// A stored veto step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VetoRow {
    pub source: String,
    pub map_order: i64,
    pub action: String,
    pub team_id: Option<i64>,
    pub team_name: Option<String>,
    pub map_name: String,
    pub start_side: Option<String>,
}

/// Starting side of team 1 on a played map, used to fill veto start sides.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MapSide {
    pub map_name: Option<String>,
    pub team1_start_side: Option<String>,
    pub pick_team_id: Option<i64>,
    pub team1_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LiveMapResult {
    pub map_number: i64,
    pub map_name: Option<String>,
    pub winner_team_id: Option<i64>,
    pub winner_team_side: Option<String>,
    pub score_a: Option<i64>,
    pub score_b: Option<i64>,
    pub updated_at: Option<String>,
}

/// Result of one map as recorded with a match outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapResult {
    pub map_order: i64,
    pub map_name: String,
    pub team1_score: Option<i64>,
    pub team2_score: Option<i64>,
    pub winner_team_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbCounts {
    pub events: i64,
    pub matches: i64,
    pub maps: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventSummary {
    pub id: i64,
    pub name: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StageSummary {
    pub event_id: i64,
    pub event_name: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DateRange {
    pub min_date: Option<String>,
    pub max_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventMatchCount {
    pub name: String,
    pub cnt: i64,
}

/// Which events, stages and dates exist, for building a data filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableFilters {
    pub events: Vec<EventSummary>,
    pub stages: Vec<StageSummary>,
    pub date_range: DateRange,
    pub match_counts: Vec<EventMatchCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_label_prefers_tags() {
        let row = MatchRow {
            id: 1,
            event_id: None,
            stage_name: None,
            phase: None,
            date: None,
            time: None,
            bo_type: None,
            patch: None,
            status: None,
            score1: None,
            score2: None,
            team1_id: Some(1),
            team1_name: Some("Sentinels".into()),
            team1_tag: Some("SEN".into()),
            team2_id: Some(2),
            team2_name: Some("Paper Rex".into()),
            team2_tag: None,
            event_name: None,
        };
        assert_eq!(row.label(), "SEN vs Paper Rex");
    }

    #[test]
    fn test_comp_record_agents_skip_blanks() {
        let rec = CompRecord {
            team_id: 3,
            agent1: Some("Jett".into()),
            agent2: Some(" ".into()),
            agent3: Some("Omen".into()),
            winner_team_id: Some(3),
            ..Default::default()
        };
        assert_eq!(rec.agents(), vec!["Jett".to_string(), "Omen".to_string()]);
        assert!(rec.won());
    }
}
