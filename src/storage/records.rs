//! Historical map and composition records feeding the model.
//!
//! Every query honours the active [`DataFilter`] and, when given, restricts
//! to matches of the same series format.

use anyhow::Result;
use sqlx::{QueryBuilder, Sqlite};

use super::{push_data_filter, CompRecord, Database, MapRecord};
use crate::types::{BoType, DataFilter};

const MAP_RECORD_SELECT: &str = "SELECT m.id, m.match_id, m.map_name, m.map_order, m.pick_team_id, \
     m.team1_id, m.team2_id, m.team1_score, m.team2_score, \
     m.team1_atk_rounds, m.team1_def_rounds, m.team2_atk_rounds, m.team2_def_rounds, \
     m.team1_start_side, m.team1_pistols_won, m.team2_pistols_won, \
     m.team1_pistol_conversions, m.team2_pistol_conversions, \
     m.is_ot, m.winner_team_id, mt.date, t1.name AS t1_name, t2.name AS t2_name \
     FROM maps m \
     JOIN matches mt ON m.match_id = mt.id \
     LEFT JOIN teams t1 ON m.team1_id = t1.id \
     LEFT JOIN teams t2 ON m.team2_id = t2.id \
     WHERE m.team1_score IS NOT NULL AND m.team2_score IS NOT NULL";

const COMP_RECORD_SELECT: &str = "SELECT mc.map_id, mc.team_id, mc.comp_hash, \
     mc.agent1, mc.agent2, mc.agent3, mc.agent4, mc.agent5, \
     m.winner_team_id, m.is_ot, m.team1_score, m.team2_score \
     FROM map_compositions mc \
     JOIN maps m ON mc.map_id = m.id \
     JOIN matches mt ON m.match_id = mt.id \
     WHERE m.team1_score IS NOT NULL";

/// Pistol rounds (1 and 13) won by a team, split by side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PistolSides {
    pub atk_won: u32,
    pub def_won: u32,
}

impl Database {
    /// Completed maps of `team_id` on `map_name`, newest first.
    pub async fn team_maps(
        &self,
        team_id: i64,
        map_name: &str,
        filter: &DataFilter,
        bo: Option<BoType>,
    ) -> Result<Vec<MapRecord>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(MAP_RECORD_SELECT);
        qb.push(" AND m.map_name = ").push_bind(map_name.to_string());
        qb.push(" AND (m.team1_id = ")
            .push_bind(team_id)
            .push(" OR m.team2_id = ")
            .push_bind(team_id)
            .push(")");
        push_data_filter(&mut qb, filter, bo);
        qb.push(" ORDER BY mt.date DESC, m.id DESC");

        Ok(qb.build_query_as::<MapRecord>().fetch_all(&self.pool).await?)
    }

    /// Maps played between two teams, optionally on one map.
    pub async fn h2h_maps(
        &self,
        team_a: i64,
        team_b: i64,
        map_name: Option<&str>,
        filter: &DataFilter,
        bo: Option<BoType>,
    ) -> Result<Vec<MapRecord>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(MAP_RECORD_SELECT);
        qb.push(" AND ((m.team1_id = ")
            .push_bind(team_a)
            .push(" AND m.team2_id = ")
            .push_bind(team_b)
            .push(") OR (m.team1_id = ")
            .push_bind(team_b)
            .push(" AND m.team2_id = ")
            .push_bind(team_a)
            .push("))");
        if let Some(map) = map_name {
            qb.push(" AND m.map_name = ").push_bind(map.to_string());
        }
        push_data_filter(&mut qb, filter, bo);
        qb.push(" ORDER BY mt.date DESC, m.id DESC");

        Ok(qb.build_query_as::<MapRecord>().fetch_all(&self.pool).await?)
    }

    /// Every completed game on a map, any teams.
    pub async fn maps_on(
        &self,
        map_name: &str,
        filter: &DataFilter,
        bo: Option<BoType>,
    ) -> Result<Vec<MapRecord>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(MAP_RECORD_SELECT);
        qb.push(" AND m.map_name = ").push_bind(map_name.to_string());
        push_data_filter(&mut qb, filter, bo);

        Ok(qb.build_query_as::<MapRecord>().fetch_all(&self.pool).await?)
    }

    /// Latest completed maps of a team regardless of filter.
    pub async fn recent_team_maps(
        &self,
        team_id: i64,
        map_name: Option<&str>,
        limit: i64,
    ) -> Result<Vec<MapRecord>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(MAP_RECORD_SELECT);
        qb.push(" AND (m.team1_id = ")
            .push_bind(team_id)
            .push(" OR m.team2_id = ")
            .push_bind(team_id)
            .push(")");
        if let Some(map) = map_name {
            qb.push(" AND m.map_name = ").push_bind(map.to_string());
        }
        qb.push(" ORDER BY mt.date DESC, m.id DESC LIMIT ").push_bind(limit);

        Ok(qb.build_query_as::<MapRecord>().fetch_all(&self.pool).await?)
    }

    /// Pistol rounds won by `team_id` on the given maps, by winning side.
    pub async fn pistol_side_wins(&self, map_ids: &[i64], team_id: i64) -> Result<PistolSides> {
        if map_ids.is_empty() {
            return Ok(PistolSides::default());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT winner_side, COUNT(*) AS cnt FROM rounds WHERE round_number IN (1, 13) AND winner_team_id = ",
        );
        qb.push_bind(team_id);
        qb.push(" AND map_id IN (");
        let mut sep = qb.separated(", ");
        for id in map_ids {
            sep.push_bind(*id);
        }
        sep.push_unseparated(") GROUP BY winner_side");

        let rows = qb
            .build_query_as::<(Option<String>, i64)>()
            .fetch_all(&self.pool)
            .await?;

        let mut sides = PistolSides::default();
        for (side, cnt) in rows {
            let side = side.unwrap_or_default().to_lowercase();
            if side.contains("att") {
                sides.atk_won += cnt as u32;
            } else if side.contains("def") {
                sides.def_won += cnt as u32;
            }
        }
        Ok(sides)
    }

    /// Maps where a composition with `comp_key` was played on `map_name`,
    /// by `team_id` when given or by anyone otherwise.
    pub async fn comp_records(
        &self,
        comp_key: &str,
        map_name: &str,
        team_id: Option<i64>,
        filter: &DataFilter,
        bo: Option<BoType>,
    ) -> Result<Vec<CompRecord>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(COMP_RECORD_SELECT);
        qb.push(" AND mc.comp_hash = ").push_bind(comp_key.to_string());
        qb.push(" AND m.map_name = ").push_bind(map_name.to_string());
        if let Some(team) = team_id {
            qb.push(" AND mc.team_id = ").push_bind(team);
        }
        push_data_filter(&mut qb, filter, bo);

        Ok(qb.build_query_as::<CompRecord>().fetch_all(&self.pool).await?)
    }

    /// Every composition a team played on a map, newest first.
    pub async fn team_comp_records(
        &self,
        team_id: i64,
        map_name: &str,
        filter: &DataFilter,
    ) -> Result<Vec<CompRecord>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(COMP_RECORD_SELECT);
        qb.push(" AND mc.team_id = ").push_bind(team_id);
        qb.push(" AND m.map_name = ").push_bind(map_name.to_string());
        push_data_filter(&mut qb, filter, None);
        qb.push(" ORDER BY mt.date DESC, m.id DESC");

        Ok(qb.build_query_as::<CompRecord>().fetch_all(&self.pool).await?)
    }
}
