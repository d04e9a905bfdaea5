//! Bulk import of historical match data from a JSON dataset.
//!
//! The dataset mirrors the tables: events, teams and matches, where each
//! match carries its maps (with rounds and compositions) and, optionally,
//! the veto as published by the match page. Everything is upserted inside a
//! single transaction so a failed import leaves the database untouched.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, Transaction};
use tracing::info;

use super::Database;
use crate::analysis::compositions::comp_key;
use crate::types::VetoAction;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub events: Vec<EventIn>,
    pub teams: Vec<TeamIn>,
    pub matches: Vec<MatchIn>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventIn {
    pub id: i64,
    pub name: String,
    pub region: Option<String>,
    pub tier: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub prize: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamIn {
    pub id: i64,
    pub name: String,
    pub tag: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchIn {
    pub id: i64,
    pub event_id: Option<i64>,
    pub stage_name: Option<String>,
    pub phase: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub bo_type: Option<String>,
    pub patch: Option<String>,
    pub team1_id: Option<i64>,
    pub team2_id: Option<i64>,
    pub score1: Option<i64>,
    pub score2: Option<i64>,
    pub status: Option<String>,
    pub maps: Vec<MapIn>,
    pub veto: Vec<VetoAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapIn {
    /// Stable id of the game within the match; defaults to the map order.
    pub game_id: Option<String>,
    pub map_name: String,
    pub map_order: i64,
    pub pick_team_id: Option<i64>,
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
    pub is_ot: Option<bool>,
    pub winner_team_id: Option<i64>,
    pub rounds: Vec<RoundIn>,
    pub compositions: Vec<CompositionIn>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundIn {
    pub round_number: i64,
    pub winner_team_id: Option<i64>,
    pub winner_side: Option<String>,
    pub method: Option<String>,
    pub score_t1: Option<i64>,
    pub score_t2: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionIn {
    pub team_id: i64,
    pub agents: Vec<String>,
}

/// Rows touched per table by an import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub events: usize,
    pub teams: usize,
    pub matches: usize,
    pub maps: usize,
    pub rounds: usize,
    pub compositions: usize,
    pub vetos: usize,
}

impl Dataset {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse dataset JSON")
    }
}

/// Pistols won and converted by each team, derived from the round log.
/// Returns `((t1_won, t1_conv), (t2_won, t2_conv))`.
pub fn pistols_from_rounds(rounds: &[RoundIn], team1: Option<i64>, team2: Option<i64>) -> ((i64, i64), (i64, i64)) {
    let winner_of = |n: i64| {
        rounds
            .iter()
            .find(|r| r.round_number == n)
            .and_then(|r| r.winner_team_id)
    };
    let mut t1 = (0, 0);
    let mut t2 = (0, 0);
    for (pistol, follow_up) in [(1, 2), (13, 14)] {
        let Some(winner) = winner_of(pistol) else {
            continue;
        };
        let converted = winner_of(follow_up) == Some(winner);
        let slot = if Some(winner) == team1 {
            &mut t1
        } else if Some(winner) == team2 {
            &mut t2
        } else {
            continue;
        };
        slot.0 += 1;
        if converted {
            slot.1 += 1;
        }
    }
    (t1, t2)
}

fn map_winner(map: &MapIn, team1: Option<i64>, team2: Option<i64>) -> Option<i64> {
    if map.winner_team_id.is_some() {
        return map.winner_team_id;
    }
    match (map.team1_score, map.team2_score) {
        (Some(a), Some(b)) if a > b => team1,
        (Some(a), Some(b)) if b > a => team2,
        _ => None,
    }
}

impl Database {
    pub async fn import_dataset(&self, dataset: &Dataset) -> Result<ImportReport> {
        let mut tx = self.pool.begin().await?;
        let mut report = ImportReport::default();

        for event in &dataset.events {
            sqlx::query(
                r#"
                INSERT INTO events (id, name, region, tier, status, start_date, end_date, prize)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    region = excluded.region,
                    tier = excluded.tier,
                    status = excluded.status,
                    start_date = excluded.start_date,
                    end_date = excluded.end_date,
                    prize = excluded.prize,
                    updated_at = datetime('now')
                "#,
            )
            .bind(event.id)
            .bind(&event.name)
            .bind(&event.region)
            .bind(&event.tier)
            .bind(&event.status)
            .bind(&event.start_date)
            .bind(&event.end_date)
            .bind(&event.prize)
            .execute(&mut *tx)
            .await?;
            report.events += 1;
        }

        for team in &dataset.teams {
            sqlx::query(
                r#"
                INSERT INTO teams (id, name, tag, country)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    tag = excluded.tag,
                    country = excluded.country,
                    updated_at = datetime('now')
                "#,
            )
            .bind(team.id)
            .bind(&team.name)
            .bind(&team.tag)
            .bind(&team.country)
            .execute(&mut *tx)
            .await?;
            report.teams += 1;
        }

        for m in &dataset.matches {
            import_match(&mut tx, m, &mut report)
                .await
                .with_context(|| format!("Failed to import match {}", m.id))?;
        }

        tx.commit().await?;
        info!(
            events = report.events,
            teams = report.teams,
            matches = report.matches,
            maps = report.maps,
            "Dataset imported"
        );
        Ok(report)
    }
}

async fn ensure_referenced(tx: &mut Transaction<'_, Sqlite>, m: &MatchIn) -> Result<()> {
    if let Some(event_id) = m.event_id {
        sqlx::query("INSERT OR IGNORE INTO events (id, name) VALUES (?, ?)")
            .bind(event_id)
            .bind(format!("Event {event_id}"))
            .execute(&mut **tx)
            .await?;
    }
    for team_id in [m.team1_id, m.team2_id].into_iter().flatten() {
        sqlx::query("INSERT OR IGNORE INTO teams (id, name) VALUES (?, ?)")
            .bind(team_id)
            .bind(format!("Team {team_id}"))
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn import_match(tx: &mut Transaction<'_, Sqlite>, m: &MatchIn, report: &mut ImportReport) -> Result<()> {
    ensure_referenced(tx, m).await?;

    let stage_id = match (m.event_id, m.stage_name.as_deref()) {
        (Some(event_id), Some(stage)) if !stage.trim().is_empty() => {
            sqlx::query("INSERT OR IGNORE INTO stages (event_id, name) VALUES (?, ?)")
                .bind(event_id)
                .bind(stage)
                .execute(&mut **tx)
                .await?;
            sqlx::query_scalar::<_, i64>("SELECT id FROM stages WHERE event_id = ? AND name = ?")
                .bind(event_id)
                .bind(stage)
                .fetch_optional(&mut **tx)
                .await?
        }
        _ => None,
    };

    sqlx::query(
        r#"
        INSERT INTO matches
            (id, event_id, stage_id, stage_name, phase, date, time, bo_type, patch,
             team1_id, team2_id, score1, score2, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            event_id = excluded.event_id,
            stage_id = excluded.stage_id,
            stage_name = excluded.stage_name,
            phase = excluded.phase,
            date = excluded.date,
            time = excluded.time,
            bo_type = excluded.bo_type,
            patch = excluded.patch,
            team1_id = excluded.team1_id,
            team2_id = excluded.team2_id,
            score1 = excluded.score1,
            score2 = excluded.score2,
            status = excluded.status,
            updated_at = datetime('now')
        "#,
    )
    .bind(m.id)
    .bind(m.event_id)
    .bind(stage_id)
    .bind(&m.stage_name)
    .bind(&m.phase)
    .bind(&m.date)
    .bind(&m.time)
    .bind(&m.bo_type)
    .bind(&m.patch)
    .bind(m.team1_id)
    .bind(m.team2_id)
    .bind(m.score1)
    .bind(m.score2)
    .bind(&m.status)
    .execute(&mut **tx)
    .await?;
    report.matches += 1;

    for map in &m.maps {
        import_map(tx, m, map, report).await?;
    }

    if !m.veto.is_empty() {
        sqlx::query("DELETE FROM pending_vetos WHERE match_id = ? AND source = 'vlr'")
            .bind(m.id)
            .execute(&mut **tx)
            .await?;
        for action in &m.veto {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO pending_vetos
                    (match_id, source, map_order, action, team_id, team_name, map_name, start_side)
                VALUES (?, 'vlr', ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(m.id)
            .bind(action.map_order as i64)
            .bind(action.action.trim().to_lowercase())
            .bind(action.team_id)
            .bind(&action.team_name)
            .bind(&action.map_name)
            .bind(&action.start_side)
            .execute(&mut **tx)
            .await?;
            report.vetos += 1;
        }
    }
    Ok(())
}

async fn import_map(
    tx: &mut Transaction<'_, Sqlite>,
    m: &MatchIn,
    map: &MapIn,
    report: &mut ImportReport,
) -> Result<()> {
    let game_id = map
        .game_id
        .clone()
        .unwrap_or_else(|| map.map_order.to_string());
    let winner = map_winner(map, m.team1_id, m.team2_id);
    let total = map.team1_score.unwrap_or(0) + map.team2_score.unwrap_or(0);
    let is_ot = map.is_ot.unwrap_or(total > 24);
    let round_diff = match (map.team1_score, map.team2_score) {
        (Some(a), Some(b)) => Some(a - b),
        _ => None,
    };

    let ((t1_won, t1_conv), (t2_won, t2_conv)) = pistols_from_rounds(&map.rounds, m.team1_id, m.team2_id);
    let derive = !map.rounds.is_empty();
    let pick = |given: Option<i64>, derived: i64| given.unwrap_or(if derive { derived } else { 0 });

    let map_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO maps
            (match_id, game_id, map_name, map_order, pick_team_id, team1_id, team2_id,
             team1_score, team2_score, team1_atk_rounds, team1_def_rounds,
             team2_atk_rounds, team2_def_rounds, team1_start_side,
             team1_pistols_won, team2_pistols_won,
             team1_pistol_conversions, team2_pistol_conversions,
             is_ot, round_diff, winner_team_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(match_id, game_id) DO UPDATE SET
            map_name = excluded.map_name,
            map_order = excluded.map_order,
            pick_team_id = excluded.pick_team_id,
            team1_id = excluded.team1_id,
            team2_id = excluded.team2_id,
            team1_score = excluded.team1_score,
            team2_score = excluded.team2_score,
            team1_atk_rounds = excluded.team1_atk_rounds,
            team1_def_rounds = excluded.team1_def_rounds,
            team2_atk_rounds = excluded.team2_atk_rounds,
            team2_def_rounds = excluded.team2_def_rounds,
            team1_start_side = excluded.team1_start_side,
            team1_pistols_won = excluded.team1_pistols_won,
            team2_pistols_won = excluded.team2_pistols_won,
            team1_pistol_conversions = excluded.team1_pistol_conversions,
            team2_pistol_conversions = excluded.team2_pistol_conversions,
            is_ot = excluded.is_ot,
            round_diff = excluded.round_diff,
            winner_team_id = excluded.winner_team_id
        RETURNING id
        "#,
    )
    .bind(m.id)
    .bind(&game_id)
    .bind(&map.map_name)
    .bind(map.map_order)
    .bind(map.pick_team_id)
    .bind(m.team1_id)
    .bind(m.team2_id)
    .bind(map.team1_score)
    .bind(map.team2_score)
    .bind(map.team1_atk_rounds)
    .bind(map.team1_def_rounds)
    .bind(map.team2_atk_rounds)
    .bind(map.team2_def_rounds)
    .bind(&map.team1_start_side)
    .bind(pick(map.team1_pistols_won, t1_won))
    .bind(pick(map.team2_pistols_won, t2_won))
    .bind(pick(map.team1_pistol_conversions, t1_conv))
    .bind(pick(map.team2_pistol_conversions, t2_conv))
    .bind(is_ot)
    .bind(round_diff)
    .bind(winner)
    .fetch_one(&mut **tx)
    .await?;
    report.maps += 1;

    for round in &map.rounds {
        sqlx::query(
            r#"
            INSERT INTO rounds (map_id, round_number, winner_team_id, winner_side, method, score_t1, score_t2)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(map_id, round_number) DO UPDATE SET
                winner_team_id = excluded.winner_team_id,
                winner_side = excluded.winner_side,
                method = excluded.method,
                score_t1 = excluded.score_t1,
                score_t2 = excluded.score_t2
            "#,
        )
        .bind(map_id)
        .bind(round.round_number)
        .bind(round.winner_team_id)
        .bind(&round.winner_side)
        .bind(&round.method)
        .bind(round.score_t1)
        .bind(round.score_t2)
        .execute(&mut **tx)
        .await?;
        report.rounds += 1;
    }

    for comp in &map.compositions {
        let agents: Vec<Option<&str>> = (0..5).map(|i| comp.agents.get(i).map(String::as_str)).collect();
        sqlx::query(
            r#"
            INSERT INTO map_compositions
                (map_id, team_id, agent1, agent2, agent3, agent4, agent5, comp_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(map_id, team_id) DO UPDATE SET
                agent1 = excluded.agent1,
                agent2 = excluded.agent2,
                agent3 = excluded.agent3,
                agent4 = excluded.agent4,
                agent5 = excluded.agent5,
                comp_hash = excluded.comp_hash
            "#,
        )
        .bind(map_id)
        .bind(comp.team_id)
        .bind(agents[0])
        .bind(agents[1])
        .bind(agents[2])
        .bind(agents[3])
        .bind(agents[4])
        .bind(comp_key(&comp.agents))
        .execute(&mut **tx)
        .await?;
        report.compositions += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::sample_dataset;
    use crate::types::DataFilter;

    fn round(n: i64, winner: i64, side: &str) -> RoundIn {
        RoundIn {
            round_number: n,
            winner_team_id: Some(winner),
            winner_side: Some(side.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_pistols_from_rounds() {
        let rounds = vec![
            round(1, 1, "Attacker"),
            round(2, 1, "Attacker"),
            round(13, 2, "Attacker"),
            round(14, 1, "Defender"),
        ];
        let ((t1_won, t1_conv), (t2_won, t2_conv)) = pistols_from_rounds(&rounds, Some(1), Some(2));
        assert_eq!((t1_won, t1_conv), (1, 1));
        assert_eq!((t2_won, t2_conv), (1, 0));
    }

    #[test]
    fn test_dataset_from_json_defaults() {
        let ds = Dataset::from_json(r#"{"teams": [{"id": 5, "name": "FNATIC"}]}"#).unwrap();
        assert_eq!(ds.teams.len(), 1);
        assert!(ds.matches.is_empty());
        assert!(Dataset::from_json("not json").is_err());
    }

    #[tokio::test]
    async fn test_import_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let ds = sample_dataset();
        let first = db.import_dataset(&ds).await.unwrap();
        assert_eq!(first.matches, 2);
        assert_eq!(first.maps, 3);

        db.import_dataset(&ds).await.unwrap();
        let counts = db.counts().await.unwrap();
        assert_eq!(counts.events, 1);
        assert_eq!(counts.matches, 2);
        assert_eq!(counts.maps, 3);
    }

    #[tokio::test]
    async fn test_import_rounds_and_comps() {
        let db = Database::in_memory().await.unwrap();
        let mut ds = sample_dataset();
        {
            let map = &mut ds.matches[0].maps[0];
            map.rounds = vec![round(1, 1, "Attacker"), round(2, 1, "Attacker"), round(13, 1, "Defender")];
            map.compositions = vec![CompositionIn {
                team_id: 1,
                agents: vec!["Jett".into(), "Omen".into(), "Sova".into(), "Killjoy".into(), "Skye".into()],
            }];
        }
        let report = db.import_dataset(&ds).await.unwrap();
        assert_eq!(report.rounds, 3);
        assert_eq!(report.compositions, 1);

        let recs = db.team_maps(1, "Bind", &DataFilter::default(), None).await.unwrap();
        assert_eq!(recs[0].team1_pistols_won, Some(2));
        assert_eq!(recs[0].team1_pistol_conversions, Some(1));

        let sides = db.pistol_side_wins(&[recs[0].id], 1).await.unwrap();
        assert_eq!(sides.atk_won, 1);
        assert_eq!(sides.def_won, 1);

        let key = comp_key(&["Skye".into(), "Killjoy".into(), "Sova".into(), "Omen".into(), "Jett".into()]);
        let comps = db
            .comp_records(&key, "Bind", Some(1), &DataFilter::default(), None)
            .await
            .unwrap();
        assert_eq!(comps.len(), 1);
        assert!(comps[0].won());
    }

    #[tokio::test]
    async fn test_import_creates_missing_references() {
        let db = Database::in_memory().await.unwrap();
        let ds = Dataset {
            matches: vec![MatchIn {
                id: 7,
                event_id: Some(3),
                team1_id: Some(40),
                team2_id: Some(41),
                veto: vec![VetoAction {
                    map_order: 1,
                    action: "Pick".into(),
                    team_id: Some(40),
                    team_name: Some("Team 40".into()),
                    map_name: "Pearl".into(),
                    start_side: None,
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let report = db.import_dataset(&ds).await.unwrap();
        assert_eq!(report.vetos, 1);
        assert_eq!(db.get_team(40).await.unwrap().unwrap().name, "Team 40");
        let vetos = db.veto_rows(7).await.unwrap();
        assert_eq!(vetos[0].source, "vlr");
        assert_eq!(vetos[0].action, "pick");
    }
}
