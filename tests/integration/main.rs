//! End-to-end tests against an in-memory database.
//!
//! `api_flow` drives the HTTP router the way the dashboard does;
//! `analysis_flow` calls the library directly.

mod analysis_flow;
mod api_flow;

use async_trait::async_trait;
use serde_json::json;

use vct_edge::collectors::odds::{OddsAgent, OddsRequest};
use vct_edge::storage::{Database, Dataset};
use vct_edge::types::VctError;

pub const UPCOMING_MATCH: i64 = 300;

/// Three teams, four completed series and one upcoming Bo3 with a full veto.
pub fn dataset() -> Dataset {
    let map = |order: i64, name: &str, s1: i64, s2: i64| {
        json!({
            "map_name": name,
            "map_order": order,
            "team1_score": s1,
            "team2_score": s2,
            "team1_atk_rounds": s1 / 2,
            "team1_def_rounds": s1 - s1 / 2,
            "team2_atk_rounds": s2 / 2,
            "team2_def_rounds": s2 - s2 / 2,
            "team1_start_side": "Attacker",
            "team1_pistols_won": 1,
            "team2_pistols_won": 1,
            "is_ot": s1 + s2 > 24
        })
    };
    let series = |id: i64, date: &str, t1: i64, t2: i64, maps: Vec<serde_json::Value>| {
        let (w1, w2) = maps.iter().fold((0, 0), |(a, b), m| {
            if m["team1_score"].as_i64() > m["team2_score"].as_i64() {
                (a + 1, b)
            } else {
                (a, b + 1)
            }
        });
        json!({
            "id": id,
            "event_id": 20,
            "stage_name": "Group Stage",
            "date": date,
            "bo_type": "bo3",
            "team1_id": t1,
            "team2_id": t2,
            "score1": w1,
            "score2": w2,
            "status": "completed",
            "maps": maps
        })
    };

    let veto = [
        (1, "ban", 1, "Pearl"),
        (2, "ban", 2, "Breeze"),
        (3, "pick", 1, "Bind"),
        (4, "pick", 2, "Haven"),
        (5, "ban", 1, "Abyss"),
        (6, "ban", 2, "Corrode"),
    ]
    .iter()
    .map(|(order, action, team, name)| {
        let team_name = if *team == 1 { "Sentinels" } else { "NRG" };
        json!({
            "map_order": order,
            "action": action,
            "team_id": team,
            "team_name": team_name,
            "map_name": name
        })
    })
    .chain(std::iter::once(json!({ "map_order": 7, "action": "decider", "map_name": "Split" })))
    .collect::<Vec<_>>();

    let raw = json!({
        "events": [
            { "id": 20, "name": "VCT 2026: Americas Stage 1", "region": "Americas", "status": "ongoing" }
        ],
        "teams": [
            { "id": 1, "name": "Sentinels", "tag": "SEN" },
            { "id": 2, "name": "NRG", "tag": "NRG" },
            { "id": 3, "name": "LOUD", "tag": "LOUD" }
        ],
        "matches": [
            series(200, "2026-03-01", 1, 2, vec![map(1, "Bind", 13, 7), map(2, "Haven", 10, 13), map(3, "Split", 13, 11)]),
            series(201, "2026-03-04", 1, 3, vec![map(1, "Bind", 13, 5), map(2, "Split", 14, 12)]),
            series(202, "2026-03-06", 2, 3, vec![map(1, "Haven", 13, 9), map(2, "Bind", 9, 13), map(3, "Split", 11, 13)]),
            series(203, "2026-03-09", 2, 1, vec![map(1, "Haven", 13, 8), map(2, "Bind", 6, 13), map(3, "Split", 12, 14)]),
            {
                "id": UPCOMING_MATCH,
                "event_id": 20,
                "stage_name": "Playoffs",
                "date": "2026-03-20",
                "bo_type": "bo3",
                "team1_id": 1,
                "team2_id": 2,
                "status": "upcoming",
                "veto": veto
            }
        ]
    });
    Dataset::from_json(&raw.to_string()).unwrap()
}

pub async fn seeded() -> Database {
    let db = Database::in_memory().await.unwrap();
    db.import_dataset(&dataset()).await.unwrap();
    db
}

/// Odds agent replaying a canned answer; `None` behaves like a missing CLI.
pub struct CannedAgent {
    pub output: Option<String>,
}

impl CannedAgent {
    pub fn answering(output: &str) -> Self {
        Self { output: Some(output.to_string()) }
    }

    pub fn unavailable() -> Self {
        Self { output: None }
    }
}

#[async_trait]
impl OddsAgent for CannedAgent {
    async fn fetch(&self, _request: &OddsRequest) -> Result<String, VctError> {
        self.output
            .clone()
            .ok_or_else(|| VctError::AgentUnavailable("agent not installed".into()))
    }
}
