//! Persistence layer.
//!
//! SQLite through `sqlx`. The schema is created idempotently on startup and
//! every query the dashboard needs lives here, so the analytics above only
//! ever see plain row structs.

pub mod import;
pub mod models;
pub mod records;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::collectors::odds::infer_map_number;
use crate::config::Settings;
use crate::types::{BoType, DataFilter, OddsEntry, OddsSnapshot, VetoAction};

pub use import::{Dataset, ImportReport};
pub use models::*;

/// Key of the persisted runtime settings in `app_config`.
pub const SETTINGS_KEY: &str = "app_config";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id              INTEGER PRIMARY KEY,
    name            TEXT NOT NULL,
    region          TEXT,
    tier            TEXT,
    status          TEXT,
    start_date      TEXT,
    end_date        TEXT,
    prize           TEXT,
    updated_at      TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS stages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id        INTEGER NOT NULL REFERENCES events(id),
    name            TEXT NOT NULL,
    UNIQUE(event_id, name)
);

CREATE TABLE IF NOT EXISTS teams (
    id              INTEGER PRIMARY KEY,
    name            TEXT NOT NULL,
    tag             TEXT,
    country         TEXT,
    updated_at      TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS matches (
    id              INTEGER PRIMARY KEY,
    event_id        INTEGER REFERENCES events(id),
    stage_id        INTEGER REFERENCES stages(id),
    stage_name      TEXT,
    phase           TEXT,
    date            TEXT,
    time            TEXT,
    bo_type         TEXT,
    patch           TEXT,
    team1_id        INTEGER REFERENCES teams(id),
    team2_id        INTEGER REFERENCES teams(id),
    score1          INTEGER,
    score2          INTEGER,
    status          TEXT,
    updated_at      TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS maps (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id        INTEGER NOT NULL REFERENCES matches(id),
    game_id         TEXT NOT NULL,
    map_name        TEXT,
    map_order       INTEGER,
    pick_team_id    INTEGER REFERENCES teams(id),
    team1_id        INTEGER REFERENCES teams(id),
    team2_id        INTEGER REFERENCES teams(id),
    team1_score     INTEGER,
    team2_score     INTEGER,
    team1_atk_rounds    INTEGER,
    team1_def_rounds    INTEGER,
    team2_atk_rounds    INTEGER,
    team2_def_rounds    INTEGER,
    team1_start_side    TEXT,
    team1_pistols_won   INTEGER DEFAULT 0,
    team2_pistols_won   INTEGER DEFAULT 0,
    team1_pistol_conversions INTEGER DEFAULT 0,
    team2_pistol_conversions INTEGER DEFAULT 0,
    is_ot           INTEGER NOT NULL DEFAULT 0,
    round_diff      INTEGER,
    winner_team_id  INTEGER REFERENCES teams(id),
    UNIQUE(match_id, game_id)
);

CREATE TABLE IF NOT EXISTS rounds (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    map_id          INTEGER NOT NULL REFERENCES maps(id),
    round_number    INTEGER NOT NULL,
    winner_team_id  INTEGER REFERENCES teams(id),
    winner_side     TEXT,
    method          TEXT,
    score_t1        INTEGER,
    score_t2        INTEGER,
    UNIQUE(map_id, round_number)
);

CREATE TABLE IF NOT EXISTS map_compositions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    map_id          INTEGER NOT NULL REFERENCES maps(id),
    team_id         INTEGER NOT NULL REFERENCES teams(id),
    agent1          TEXT,
    agent2          TEXT,
    agent3          TEXT,
    agent4          TEXT,
    agent5          TEXT,
    comp_hash       TEXT,
    UNIQUE(map_id, team_id)
);

CREATE TABLE IF NOT EXISTS pending_vetos (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id        INTEGER NOT NULL REFERENCES matches(id),
    source          TEXT NOT NULL DEFAULT 'manual',
    map_order       INTEGER NOT NULL,
    action          TEXT NOT NULL,
    team_id         INTEGER REFERENCES teams(id),
    team_name       TEXT,
    map_name        TEXT NOT NULL,
    start_side      TEXT,
    created_at      TEXT DEFAULT (datetime('now')),
    UNIQUE(match_id, source, map_order, action)
);

CREATE TABLE IF NOT EXISTS odds_snapshots (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id        INTEGER NOT NULL REFERENCES matches(id),
    map_number      INTEGER,
    bookmaker       TEXT NOT NULL,
    market_type     TEXT NOT NULL,
    selection       TEXT NOT NULL,
    odds_value      REAL NOT NULL,
    timestamp       TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS app_config (
    key             TEXT PRIMARY KEY,
    value           TEXT NOT NULL,
    updated_at      TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS live_map_results (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id        INTEGER NOT NULL REFERENCES matches(id),
    map_number      INTEGER NOT NULL,
    map_name        TEXT,
    winner_team_id  INTEGER REFERENCES teams(id),
    winner_team_side TEXT,
    score_a         INTEGER,
    score_b         INTEGER,
    created_at      TEXT DEFAULT (datetime('now')),
    updated_at      TEXT DEFAULT (datetime('now')),
    UNIQUE(match_id, map_number)
);

CREATE TABLE IF NOT EXISTS match_outcomes (
    match_id        INTEGER PRIMARY KEY REFERENCES matches(id),
    score1          INTEGER NOT NULL,
    score2          INTEGER NOT NULL,
    map_results_json TEXT,
    created_at      TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_matches_event ON matches(event_id);
CREATE INDEX IF NOT EXISTS idx_matches_teams ON matches(team1_id, team2_id);
CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(date);
CREATE INDEX IF NOT EXISTS idx_matches_status_date ON matches(status, date);
CREATE INDEX IF NOT EXISTS idx_maps_match ON maps(match_id);
CREATE INDEX IF NOT EXISTS idx_maps_name ON maps(map_name);
CREATE INDEX IF NOT EXISTS idx_maps_teams ON maps(team1_id, team2_id);
CREATE INDEX IF NOT EXISTS idx_rounds_map ON rounds(map_id);
CREATE INDEX IF NOT EXISTS idx_compositions_map ON map_compositions(map_id);
CREATE INDEX IF NOT EXISTS idx_compositions_team ON map_compositions(team_id);
CREATE INDEX IF NOT EXISTS idx_odds_match ON odds_snapshots(match_id);
CREATE INDEX IF NOT EXISTS idx_odds_market ON odds_snapshots(market_type);
CREATE INDEX IF NOT EXISTS idx_vetos_match ON pending_vetos(match_id);
CREATE INDEX IF NOT EXISTS idx_live_results_match ON live_map_results(match_id);
"#;

const MATCH_COLUMNS: &str = "SELECT m.id, m.event_id, m.stage_name, m.phase, m.date, m.time, \
     m.bo_type, m.patch, m.status, m.score1, m.score2, \
     t1.id AS team1_id, t1.name AS team1_name, t1.tag AS team1_tag, \
     t2.id AS team2_id, t2.name AS team2_name, t2.tag AS team2_tag, \
     e.name AS event_name \
     FROM matches m \
     LEFT JOIN teams t1 ON m.team1_id = t1.id \
     LEFT JOIN teams t2 ON m.team2_id = t2.id \
     LEFT JOIN events e ON m.event_id = e.id";

/// Filters for the match list.
#[derive(Debug, Clone)]
pub struct MatchQuery {
    pub event_ids: Vec<i64>,
    pub status: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub from_year: i32,
    pub limit: i64,
}

impl Default for MatchQuery {
    fn default() -> Self {
        Self {
            event_ids: Vec::new(),
            status: None,
            date_from: None,
            date_to: None,
            from_year: 2026,
            limit: 50,
        }
    }
}

/// A live map result as entered from the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveResultInput {
    pub map_number: i64,
    pub map_name: String,
    pub winner_team_id: Option<i64>,
    pub winner_side: String,
    pub score_a: Option<i64>,
    pub score_b: Option<i64>,
}

/// Handle to the SQLite database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url: {url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        if let Some(parent) = opts.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .with_context(|| format!("Failed to open database {url}"))?;

        let db = Self { pool };
        db.init_schema().await?;
        info!(url, "Database ready");
        Ok(db)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .context("Failed to open in-memory database")?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .context("Failed to create schema")?;
        debug!("Schema ensured");
        Ok(())
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    // -----------------------------------------------------------------------
    // Events & teams
    // -----------------------------------------------------------------------

    /// Events starting in `from_year` or later (or without a start date).
    pub async fn list_events(&self, from_year: i32) -> Result<Vec<EventRow>> {
        let cutoff = format!("{from_year}-01-01");
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, name, region, tier, status, start_date, end_date, prize
            FROM events
            WHERE (start_date IS NULL OR start_date >= ?)
            ORDER BY start_date DESC, id DESC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Teams for dropdowns; `region` narrows to that league's franchised teams.
    /// Tags are always filled in.
    pub async fn list_teams(&self, region: Option<&str>) -> Result<Vec<TeamRow>> {
        let names = region
            .filter(|r| !r.eq_ignore_ascii_case("all"))
            .and_then(catalog::region_team_names);

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id, name, tag FROM teams");
        if let Some(names) = names {
            qb.push(" WHERE LOWER(TRIM(name)) IN (");
            let mut sep = qb.separated(", ");
            for name in names {
                sep.push_bind(*name);
            }
            sep.push_unseparated(")");
        }
        qb.push(" ORDER BY name");

        let mut rows = qb.build_query_as::<TeamRow>().fetch_all(&self.pool).await?;
        for row in &mut rows {
            row.tag = Some(catalog::team_display_tag(Some(&row.name), row.tag.as_deref()));
        }
        Ok(rows)
    }

    pub async fn get_team(&self, team_id: i64) -> Result<Option<TeamRow>> {
        let row = sqlx::query_as::<_, TeamRow>("SELECT id, name, tag FROM teams WHERE id = ?")
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Every team as stored, without tag completion.
    pub async fn all_teams(&self) -> Result<Vec<TeamRow>> {
        let rows = sqlx::query_as::<_, TeamRow>("SELECT id, name, tag FROM teams ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Matches
    // -----------------------------------------------------------------------

    /// Match list: ongoing first, then upcoming, then the rest, newest first.
    pub async fn list_matches(&self, q: &MatchQuery) -> Result<Vec<MatchRow>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(MATCH_COLUMNS);
        qb.push(" WHERE (m.date IS NULL OR m.date >= ")
            .push_bind(format!("{}-01-01", q.from_year))
            .push(")");

        if !q.event_ids.is_empty() {
            qb.push(" AND m.event_id IN (");
            let mut sep = qb.separated(", ");
            for id in &q.event_ids {
                sep.push_bind(*id);
            }
            sep.push_unseparated(")");
        }
        if let Some(status) = &q.status {
            qb.push(" AND m.status = ").push_bind(status.clone());
        }
        if let Some(from) = &q.date_from {
            qb.push(" AND m.date >= ").push_bind(from.clone());
        }
        if let Some(to) = &q.date_to {
            qb.push(" AND m.date <= ").push_bind(to.clone());
        }
        qb.push(
            " ORDER BY CASE m.status WHEN 'ongoing' THEN 0 WHEN 'upcoming' THEN 1 ELSE 2 END, \
             m.date DESC, m.id DESC LIMIT ",
        )
        .push_bind(q.limit.clamp(1, 500));

        let mut rows = qb.build_query_as::<MatchRow>().fetch_all(&self.pool).await?;
        rows.iter_mut().for_each(fill_tags);
        Ok(rows)
    }

    pub async fn match_info(&self, match_id: i64) -> Result<Option<MatchRow>> {
        let sql = format!("{MATCH_COLUMNS} WHERE m.id = ?");
        let row = sqlx::query_as::<_, MatchRow>(&sql)
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|mut r| {
            fill_tags(&mut r);
            r
        }))
    }

    pub async fn match_exists(&self, match_id: i64) -> Result<bool> {
        let row = sqlx::query_scalar::<_, i64>("SELECT 1 FROM matches WHERE id = ?")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Upcoming or ongoing matches in a date window that have odds recorded.
    pub async fn upcoming_with_odds(
        &self,
        date_from: &str,
        date_to: &str,
        limit: i64,
    ) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT m.id
            FROM matches m
            WHERE m.date >= ? AND m.date <= ?
              AND m.status IN ('upcoming', 'ongoing')
              AND EXISTS (SELECT 1 FROM odds_snapshots o WHERE o.match_id = m.id)
            ORDER BY m.date, m.id
            LIMIT ?
            "#,
        )
        .bind(date_from)
        .bind(date_to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn counts(&self) -> Result<DbCounts> {
        let events = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        let matches = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM matches")
            .fetch_one(&self.pool)
            .await?;
        let maps = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM maps")
            .fetch_one(&self.pool)
            .await?;
        Ok(DbCounts { events, matches, maps })
    }

    // -----------------------------------------------------------------------
    // Vetos
    // -----------------------------------------------------------------------

    /// Replace the manually entered veto of a match. Returns the rows stored,
    /// so repeated `(map_order, action)` steps count once.
    pub async fn replace_manual_veto(&self, match_id: i64, actions: &[VetoAction]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM pending_vetos WHERE match_id = ? AND source = 'manual'")
            .bind(match_id)
            .execute(&mut *tx)
            .await?;

        for action in actions {
            sqlx::query(
                r#"
                INSERT INTO pending_vetos
                    (match_id, source, map_order, action, team_id, team_name, map_name, start_side)
                VALUES (?, 'manual', ?, ?, ?, ?, ?, ?)
                ON CONFLICT(match_id, source, map_order, action) DO UPDATE SET
                    team_id = excluded.team_id,
                    team_name = excluded.team_name,
                    map_name = excluded.map_name,
                    start_side = excluded.start_side
                "#,
            )
            .bind(match_id)
            .bind(action.map_order as i64)
            .bind(action.action.trim().to_lowercase())
            .bind(action.team_id)
            .bind(&action.team_name)
            .bind(&action.map_name)
            .bind(&action.start_side)
            .execute(&mut *tx)
            .await?;
        }
        let saved = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM pending_vetos WHERE match_id = ? AND source = 'manual'",
        )
        .bind(match_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(match_id, saved, "Manual veto saved");
        Ok(saved as usize)
    }

    /// Veto rows for a match, manual entries first, each by map order.
    pub async fn veto_rows(&self, match_id: i64) -> Result<Vec<VetoRow>> {
        let rows = sqlx::query_as::<_, VetoRow>(
            r#"
            SELECT source, map_order, action, team_id, team_name, map_name, start_side
            FROM pending_vetos
            WHERE match_id = ?
            ORDER BY CASE source WHEN 'manual' THEN 0 ELSE 1 END, map_order
            "#,
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Played maps of a match that know both the picker and team 1's side.
    pub async fn map_sides_for_match(&self, match_id: i64) -> Result<Vec<MapSide>> {
        let rows = sqlx::query_as::<_, MapSide>(
            r#"
            SELECT map_name, team1_start_side, pick_team_id, team1_id
            FROM maps
            WHERE match_id = ? AND team1_start_side IS NOT NULL AND pick_team_id IS NOT NULL
            "#,
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Odds
    // -----------------------------------------------------------------------

    /// Store quotes for a match. Bookmaker and market are normalised to
    /// lower case; a missing map number is taken from a `mapN` market prefix.
    pub async fn insert_odds(&self, match_id: i64, entries: &[OddsEntry]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let market = entry.market_type.trim().to_lowercase();
            let map_number = entry.map_number.or_else(|| infer_map_number(&market));
            sqlx::query(
                r#"
                INSERT INTO odds_snapshots
                    (match_id, map_number, bookmaker, market_type, selection, odds_value)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(match_id)
            .bind(map_number)
            .bind(entry.bookmaker.trim().to_lowercase())
            .bind(market)
            .bind(entry.selection.trim())
            .bind(entry.odds_value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(match_id, inserted = entries.len(), "Odds stored");
        Ok(entries.len())
    }

    /// All quotes of a match, newest first.
    pub async fn odds_for_match(&self, match_id: i64) -> Result<Vec<OddsSnapshot>> {
        let rows = sqlx::query_as::<_, OddsSnapshot>(
            r#"
            SELECT id, match_id, map_number, bookmaker, market_type, selection,
                   odds_value, timestamp
            FROM odds_snapshots
            WHERE match_id = ?
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn odds_count(&self, match_id: i64) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM odds_snapshots WHERE match_id = ?")
                .bind(match_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Live results
    // -----------------------------------------------------------------------

    pub async fn upsert_live_result(&self, match_id: i64, input: &LiveResultInput) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO live_map_results
                (match_id, map_number, map_name, winner_team_id, winner_team_side,
                 score_a, score_b, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(match_id, map_number) DO UPDATE SET
                map_name = excluded.map_name,
                winner_team_id = excluded.winner_team_id,
                winner_team_side = excluded.winner_team_side,
                score_a = excluded.score_a,
                score_b = excluded.score_b,
                updated_at = datetime('now')
            "#,
        )
        .bind(match_id)
        .bind(input.map_number)
        .bind(&input.map_name)
        .bind(input.winner_team_id)
        .bind(&input.winner_side)
        .bind(input.score_a)
        .bind(input.score_b)
        .execute(&self.pool)
        .await?;

        info!(
            match_id,
            map_number = input.map_number,
            winner = %input.winner_side,
            "Live map result saved"
        );
        Ok(())
    }

    pub async fn live_results(&self, match_id: i64) -> Result<Vec<LiveMapResult>> {
        let rows = sqlx::query_as::<_, LiveMapResult>(
            r#"
            SELECT map_number, map_name, winner_team_id, winner_team_side,
                   score_a, score_b, updated_at
            FROM live_map_results
            WHERE match_id = ?
            ORDER BY map_number
            "#,
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Runtime settings
    // -----------------------------------------------------------------------

    /// Persisted runtime settings. `None` when nothing is stored yet; an
    /// unreadable payload is logged and treated the same way.
    pub async fn load_settings(&self) -> Result<Option<Settings>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM app_config WHERE key = ?")
            .bind(SETTINGS_KEY)
            .fetch_optional(&self.pool)
            .await?;

        let Some(value) = value else {
            return Ok(None);
        };
        match serde_json::from_str::<Settings>(&value) {
            Ok(settings) => Ok(Some(settings)),
            Err(e) => {
                warn!(error = %e, "Stored settings unreadable, falling back to defaults");
                Ok(None)
            }
        }
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_string(settings).context("Failed to serialise settings")?;
        sqlx::query(
            r#"
            INSERT INTO app_config (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')
            "#,
        )
        .bind(SETTINGS_KEY)
        .bind(json)
        .execute(&self.pool)
        .await?;
        debug!("Settings persisted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    /// Record the final result of a completed match, once. Map results come
    /// from the map table, falling back to live results. Returns whether a
    /// row was written.
    pub async fn register_match_outcome(&self, match_id: i64) -> Result<bool> {
        let row = sqlx::query_as::<_, (Option<i64>, Option<i64>, Option<String>)>(
            "SELECT score1, score2, status FROM matches WHERE id = ?",
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((score1, score2, status)) = row else {
            return Ok(false);
        };
        if status.as_deref() != Some("completed") || (score1.is_none() && score2.is_none()) {
            return Ok(false);
        }

        let existing = sqlx::query_scalar::<_, i64>("SELECT 1 FROM match_outcomes WHERE match_id = ?")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Ok(false);
        }

        let results = self.map_results(match_id).await?;
        let results_json = if results.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&results)?)
        };

        sqlx::query(
            r#"
            INSERT INTO match_outcomes (match_id, score1, score2, map_results_json)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(match_id)
        .bind(score1.unwrap_or(0))
        .bind(score2.unwrap_or(0))
        .bind(results_json)
        .execute(&self.pool)
        .await?;

        info!(match_id, maps = results.len(), "Match outcome registered");
        Ok(true)
    }

    async fn map_results(&self, match_id: i64) -> Result<Vec<MapResult>> {
        let rows = sqlx::query_as::<_, (Option<i64>, Option<String>, Option<i64>, Option<i64>, Option<i64>)>(
            r#"
            SELECT map_order, map_name, team1_score, team2_score, winner_team_id
            FROM maps
            WHERE match_id = ? AND team1_score IS NOT NULL AND team2_score IS NOT NULL
            ORDER BY map_order
            "#,
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;

        if !rows.is_empty() {
            return Ok(rows
                .into_iter()
                .map(|(order, name, s1, s2, winner)| {
                    let order = order.unwrap_or(0);
                    MapResult {
                        map_order: order,
                        map_name: name.unwrap_or_else(|| format!("Map {order}")),
                        team1_score: s1,
                        team2_score: s2,
                        winner_team_id: winner,
                    }
                })
                .collect());
        }

        Ok(self
            .live_results(match_id)
            .await?
            .into_iter()
            .map(|r| MapResult {
                map_order: r.map_number,
                map_name: r.map_name.unwrap_or_else(|| format!("Map {}", r.map_number)),
                team1_score: r.score_a,
                team2_score: r.score_b,
                winner_team_id: r.winner_team_id,
            })
            .collect())
    }

    #[cfg(test)]
    pub(crate) async fn outcome_json(&self, match_id: i64) -> Result<Option<String>> {
        let row = sqlx::query_scalar::<_, Option<String>>(
            "SELECT map_results_json FROM match_outcomes WHERE match_id = ?",
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.flatten())
    }

    // -----------------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------------

    /// Events, stages and the date span available for building a data filter.
    pub async fn available_filters(&self) -> Result<AvailableFilters> {
        let events = sqlx::query_as::<_, EventSummary>(
            "SELECT id, name, status FROM events ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let stages = sqlx::query_as::<_, StageSummary>(
            r#"
            SELECT DISTINCT s.event_id, e.name AS event_name, s.name
            FROM stages s JOIN events e ON s.event_id = e.id
            ORDER BY s.event_id DESC, s.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let date_range = sqlx::query_as::<_, DateRange>(
            "SELECT MIN(date) AS min_date, MAX(date) AS max_date FROM matches WHERE date IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        let match_counts = sqlx::query_as::<_, EventMatchCount>(
            r#"
            SELECT e.name, COUNT(*) AS cnt
            FROM matches m JOIN events e ON m.event_id = e.id
            WHERE m.status = 'completed'
            GROUP BY m.event_id
            ORDER BY cnt DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(AvailableFilters {
            events,
            stages,
            date_range,
            match_counts,
        })
    }
}

fn fill_tags(row: &mut MatchRow) {
    row.team1_tag = Some(catalog::team_display_tag(
        row.team1_name.as_deref(),
        row.team1_tag.as_deref(),
    ));
    row.team2_tag = Some(catalog::team_display_tag(
        row.team2_name.as_deref(),
        row.team2_tag.as_deref(),
    ));
}

/// Append the data-filter and series-format restrictions for a query whose
/// matches table is aliased `mt`.
pub(crate) fn push_data_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &DataFilter, bo: Option<BoType>) {
    if !filter.event_ids.is_empty() {
        qb.push(" AND mt.event_id IN (");
        let mut sep = qb.separated(", ");
        for id in &filter.event_ids {
            sep.push_bind(*id);
        }
        sep.push_unseparated(")");
    }
    if !filter.stage_names.is_empty() {
        qb.push(" AND mt.stage_name IN (");
        let mut sep = qb.separated(", ");
        for name in &filter.stage_names {
            sep.push_bind(name.clone());
        }
        sep.push_unseparated(")");
    }
    if let Some(from) = &filter.date_from {
        qb.push(" AND mt.date >= ").push_bind(from.clone());
    }
    if let Some(to) = &filter.date_to {
        qb.push(" AND mt.date <= ").push_bind(to.clone());
    }
    match bo {
        Some(BoType::Bo5) => {
            qb.push(" AND (mt.bo_type IS NOT NULL AND mt.bo_type LIKE '%5%')");
        }
        Some(BoType::Bo3) => {
            qb.push(" AND (mt.bo_type IS NULL OR mt.bo_type = '' OR mt.bo_type LIKE '%3%')");
        }
        None => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::import::{Dataset, EventIn, MapIn, MatchIn, TeamIn};

    /// Two teams, one completed Bo3 and one upcoming match with a pick veto.
    pub(crate) fn sample_dataset() -> Dataset {
        let map = |order: i64, name: &str, s1: i64, s2: i64| MapIn {
            map_name: name.to_string(),
            map_order: order,
            team1_score: Some(s1),
            team2_score: Some(s2),
            team1_atk_rounds: Some(s1 / 2),
            team1_def_rounds: Some(s1 - s1 / 2),
            team2_atk_rounds: Some(s2 / 2),
            team2_def_rounds: Some(s2 - s2 / 2),
            team1_start_side: Some("Attacker".into()),
            pick_team_id: Some(1),
            ..Default::default()
        };
        Dataset {
            events: vec![EventIn {
                id: 10,
                name: "VCT 2026: Americas Kickoff".into(),
                region: Some("Americas".into()),
                status: Some("ongoing".into()),
                start_date: Some("2026-01-15".into()),
                ..Default::default()
            }],
            teams: vec![
                TeamIn { id: 1, name: "Sentinels".into(), tag: Some("SEN".into()), country: None },
                TeamIn { id: 2, name: "NRG".into(), tag: None, country: None },
            ],
            matches: vec![
                MatchIn {
                    id: 100,
                    event_id: Some(10),
                    stage_name: Some("Group Stage".into()),
                    date: Some("2026-01-20".into()),
                    bo_type: Some("bo3".into()),
                    team1_id: Some(1),
                    team2_id: Some(2),
                    score1: Some(2),
                    score2: Some(1),
                    status: Some("completed".into()),
                    maps: vec![
                        map(1, "Bind", 13, 9),
                        map(2, "Haven", 11, 13),
                        map(3, "Split", 14, 12),
                    ],
                    ..Default::default()
                },
                MatchIn {
                    id: 101,
                    event_id: Some(10),
                    stage_name: Some("Playoffs".into()),
                    date: Some("2026-02-01".into()),
                    bo_type: Some("bo3".into()),
                    team1_id: Some(1),
                    team2_id: Some(2),
                    status: Some("upcoming".into()),
                    ..Default::default()
                },
            ],
        }
    }

    pub(crate) async fn seeded_db() -> Database {
        let db = Database::in_memory().await.unwrap();
        db.import_dataset(&sample_dataset()).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.init_schema().await.unwrap();
        assert!(db.ping().await);
    }

    #[tokio::test]
    async fn test_list_matches_orders_upcoming_first() {
        let db = seeded_db().await;
        let rows = db.list_matches(&MatchQuery::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 101);
        assert_eq!(rows[0].team2_tag.as_deref(), Some("NRG"));
        assert_eq!(rows[0].event_name.as_deref(), Some("VCT 2026: Americas Kickoff"));
    }

    #[tokio::test]
    async fn test_list_matches_filters() {
        let db = seeded_db().await;
        let q = MatchQuery {
            status: Some("completed".into()),
            ..Default::default()
        };
        let rows = db.list_matches(&q).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![100]);

        let q = MatchQuery {
            from_year: 2027,
            ..Default::default()
        };
        assert!(db.list_matches(&q).await.unwrap().is_empty());

        let q = MatchQuery {
            event_ids: vec![999],
            ..Default::default()
        };
        assert!(db.list_matches(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_events_year_cutoff() {
        let db = seeded_db().await;
        assert_eq!(db.list_events(2026).await.unwrap().len(), 1);
        assert!(db.list_events(2027).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_teams_region_and_tags() {
        let db = seeded_db().await;
        let all = db.list_teams(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|t| t.tag.is_some()));

        let americas = db.list_teams(Some("Americas")).await.unwrap();
        assert_eq!(americas.len(), 2);
        let emea = db.list_teams(Some("EMEA")).await.unwrap();
        assert!(emea.is_empty());
    }

    #[tokio::test]
    async fn test_insert_odds_normalises() {
        let db = seeded_db().await;
        let entries = vec![OddsEntry {
            bookmaker: " Betano ".into(),
            market_type: "Map2_Winner".into(),
            selection: " SEN ".into(),
            odds_value: 1.85,
            map_number: None,
        }];
        assert_eq!(db.insert_odds(101, &entries).await.unwrap(), 1);

        let odds = db.odds_for_match(101).await.unwrap();
        assert_eq!(odds.len(), 1);
        assert_eq!(odds[0].bookmaker, "betano");
        assert_eq!(odds[0].market_type, "map2_winner");
        assert_eq!(odds[0].selection, "SEN");
        assert_eq!(odds[0].map_number, Some(2));
        assert_eq!(db.odds_count(101).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_odds_newest_first() {
        let db = seeded_db().await;
        let entry = |odds: f64| OddsEntry {
            bookmaker: "betano".into(),
            market_type: "match_winner".into(),
            selection: "SEN".into(),
            odds_value: odds,
            map_number: None,
        };
        db.insert_odds(101, &[entry(1.70)]).await.unwrap();
        db.insert_odds(101, &[entry(1.75)]).await.unwrap();
        let odds = db.odds_for_match(101).await.unwrap();
        assert_eq!(odds[0].odds_value, 1.75);
        assert_eq!(odds[0].map_number, None);
    }

    #[tokio::test]
    async fn test_manual_veto_replaces_previous() {
        let db = seeded_db().await;
        let action = |order: u32, act: &str, map: &str| VetoAction {
            map_order: order,
            action: act.into(),
            team_id: None,
            team_name: Some("SEN".into()),
            map_name: map.into(),
            start_side: None,
        };
        db.replace_manual_veto(101, &[action(1, "ban", "Abyss"), action(2, "pick", "Bind")])
            .await
            .unwrap();
        db.replace_manual_veto(101, &[action(1, "Pick", "Pearl")]).await.unwrap();

        let rows = db.veto_rows(101).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "pick");
        assert_eq!(rows[0].map_name, "Pearl");
    }

    #[tokio::test]
    async fn test_manual_veto_counts_merged_steps_once() {
        let db = seeded_db().await;
        let step = |order: u32, act: &str, map: &str| VetoAction {
            map_order: order,
            action: act.into(),
            team_id: None,
            team_name: None,
            map_name: map.into(),
            start_side: None,
        };
        let saved = db
            .replace_manual_veto(
                101,
                &[step(1, "ban", "Abyss"), step(1, "ban", "Lotus"), step(2, "pick", "Bind")],
            )
            .await
            .unwrap();
        assert_eq!(saved, 2);

        let rows = db.veto_rows(101).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].map_name, "Lotus");
    }

    #[tokio::test]
    async fn test_settings_roundtrip_and_default() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.load_settings().await.unwrap().is_none());

        let mut settings = Settings::default();
        settings.bankroll.total = 999.0;
        db.save_settings(&settings).await.unwrap();
        assert_eq!(db.load_settings().await.unwrap(), Some(settings));
    }

    #[tokio::test]
    async fn test_register_outcome_once() {
        let db = seeded_db().await;
        assert!(db.register_match_outcome(100).await.unwrap());
        assert!(!db.register_match_outcome(100).await.unwrap());
        // Upcoming match is not registered.
        assert!(!db.register_match_outcome(101).await.unwrap());

        let json = db.outcome_json(100).await.unwrap().unwrap();
        let results: Vec<MapResult> = serde_json::from_str(&json).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].map_name, "Bind");
    }

    #[tokio::test]
    async fn test_live_results_upsert() {
        let db = seeded_db().await;
        let mut input = LiveResultInput {
            map_number: 1,
            map_name: "Bind".into(),
            winner_team_id: Some(1),
            winner_side: "a".into(),
            score_a: Some(13),
            score_b: Some(7),
        };
        db.upsert_live_result(101, &input).await.unwrap();
        input.winner_side = "b".into();
        input.winner_team_id = Some(2);
        db.upsert_live_result(101, &input).await.unwrap();

        let rows = db.live_results(101).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].winner_team_side.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_available_filters() {
        let db = seeded_db().await;
        let f = db.available_filters().await.unwrap();
        assert_eq!(f.events.len(), 1);
        assert_eq!(f.stages.len(), 2);
        assert_eq!(f.date_range.min_date.as_deref(), Some("2026-01-20"));
        assert_eq!(f.match_counts[0].cnt, 1);
    }

    #[tokio::test]
    async fn test_upcoming_with_odds() {
        let db = seeded_db().await;
        assert!(db.upcoming_with_odds("2026-01-01", "2026-12-31", 20).await.unwrap().is_empty());
        db.insert_odds(
            101,
            &[OddsEntry {
                bookmaker: "betano".into(),
                market_type: "match_winner".into(),
                selection: "SEN".into(),
                odds_value: 1.9,
                map_number: None,
            }],
        )
        .await
        .unwrap();
        assert_eq!(
            db.upcoming_with_odds("2026-01-01", "2026-12-31", 20).await.unwrap(),
            vec![101]
        );
    }
}
