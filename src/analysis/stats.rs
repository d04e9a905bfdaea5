//! Aggregation of raw map records into team, head-to-head and map-wide stats.

use serde::{Deserialize, Serialize};

use crate::storage::records::PistolSides;
use crate::storage::MapRecord;
use crate::types::{GlobalMapStats, H2hStats, TeamStats};

/// Total rounds from which a map counts as close.
pub const CLOSE_MAP_ROUNDS: i64 = 23;
/// Round margin from which a map counts as a stomp.
pub const STOMP_DIFF: i64 = 7;

/// Aggregate the records of one team on one map.
///
/// Rounds per half are `max(12, ceil(total / 2))`, and every map has two
/// pistol rounds. Pistol wins by side come from the round log.
pub fn aggregate_team_stats(
    team_id: i64,
    map_name: &str,
    records: &[MapRecord],
    pistol_sides: PistolSides,
) -> TeamStats {
    let mut stats = TeamStats::empty(team_id, map_name);
    let mut rounds_won = 0i64;
    let mut rounds_lost = 0i64;

    for r in records {
        let is_team1 = r.team1_id == Some(team_id);
        if stats.team_name.is_empty() {
            let name = if is_team1 { &r.t1_name } else { &r.t2_name };
            stats.team_name = name.clone().unwrap_or_default();
        }

        let (mine, theirs) = if is_team1 {
            (r.team1_score.unwrap_or(0), r.team2_score.unwrap_or(0))
        } else {
            (r.team2_score.unwrap_or(0), r.team1_score.unwrap_or(0))
        };
        let won = r.winner_team_id == Some(team_id);

        stats.games_played += 1;
        if won {
            stats.wins += 1;
        } else {
            stats.losses += 1;
        }
        rounds_won += mine;
        rounds_lost += theirs;

        if r.is_ot {
            stats.ot_count += 1;
        }

        let total = mine + theirs;
        if total >= CLOSE_MAP_ROUNDS {
            stats.close_maps += 1;
        }
        if (mine - theirs).abs() >= STOMP_DIFF {
            if won {
                stats.stomps_won += 1;
            } else {
                stats.stomps_lost += 1;
            }
        }

        let (atk, def, pistols, conversions) = if is_team1 {
            (
                r.team1_atk_rounds,
                r.team1_def_rounds,
                r.team1_pistols_won,
                r.team1_pistol_conversions,
            )
        } else {
            (
                r.team2_atk_rounds,
                r.team2_def_rounds,
                r.team2_pistols_won,
                r.team2_pistol_conversions,
            )
        };
        let half = 12.max((total + 1) / 2) as u32;
        stats.atk_rounds_won += atk.unwrap_or(0) as u32;
        stats.def_rounds_won += def.unwrap_or(0) as u32;
        stats.atk_rounds_played += half;
        stats.def_rounds_played += half;
        stats.pistols_won += pistols.unwrap_or(0) as u32;
        stats.pistols_played += 2;
        stats.pistol_conversions += conversions.unwrap_or(0) as u32;
    }

    if stats.games_played > 0 {
        let n = stats.games_played as f64;
        stats.avg_rounds_won = rounds_won as f64 / n;
        stats.avg_rounds_lost = rounds_lost as f64 / n;
        stats.avg_round_diff = (rounds_won - rounds_lost) as f64 / n;
        stats.pistol_atk_won = pistol_sides.atk_won;
        stats.pistol_def_won = pistol_sides.def_won;
        stats.pistol_atk_played = stats.games_played;
        stats.pistol_def_played = stats.games_played;
    }
    stats
}

/// Head-to-head record from the perspective of `team_a`.
pub fn head_to_head(team_a: i64, team_b: i64, records: &[MapRecord]) -> H2hStats {
    let total = records.len() as u32;
    let a_wins = records.iter().filter(|r| r.winner_team_id == Some(team_a)).count() as u32;
    let b_wins = records.iter().filter(|r| r.winner_team_id == Some(team_b)).count() as u32;
    let ot_count = records.iter().filter(|r| r.is_ot).count() as u32;
    H2hStats {
        total_maps: total,
        a_wins,
        b_wins,
        ot_count,
        ot_rate: if total > 0 { ot_count as f64 / total as f64 } else { 0.0 },
    }
}

pub fn global_map_stats(records: &[MapRecord]) -> GlobalMapStats {
    let total = records.len() as u32;
    if total == 0 {
        return GlobalMapStats::default();
    }
    let ot_count = records.iter().filter(|r| r.is_ot).count() as u32;
    let close_count = records
        .iter()
        .filter(|r| r.total_rounds() >= CLOSE_MAP_ROUNDS)
        .count() as u32;
    let rounds: i64 = records.iter().map(MapRecord::total_rounds).sum();
    let n = total as f64;
    GlobalMapStats {
        total_maps: total,
        ot_count,
        ot_rate: ot_count as f64 / n,
        close_count,
        close_rate: close_count as f64 / n,
        avg_total_rounds: rounds as f64 / n,
    }
}

/// Wins and games over the latest `n` records (records are newest first).
pub fn recent_form(team_id: i64, records: &[MapRecord], n: usize) -> (u32, u32) {
    let recent = &records[..records.len().min(n)];
    let wins = recent.iter().filter(|r| r.winner_team_id == Some(team_id)).count();
    (wins as u32, recent.len() as u32)
}

/// Team stats summed across maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub winrate: f64,
    pub ot_count: u32,
    pub ot_rate: f64,
    pub pistols_won: u32,
    pub pistols_played: u32,
    pub pistol_rate: f64,
    pub pistol_conversions: u32,
    pub pistol_conversion_rate: f64,
    pub pistol_atk_won: u32,
    pub pistol_def_won: u32,
    pub pistol_atk_played: u32,
    pub pistol_def_played: u32,
    pub close_maps: u32,
    /// Attack round rate weighted by games per map.
    pub atk_rate: f64,
    pub def_rate: f64,
}

pub fn aggregate_overall(per_map: &[TeamStats]) -> OverallStats {
    let mut o = OverallStats::default();
    let mut atk = 0.0;
    let mut def = 0.0;
    let mut converted = 0.0;
    for s in per_map {
        o.games_played += s.games_played;
        o.wins += s.wins;
        o.losses += s.losses;
        o.ot_count += s.ot_count;
        o.pistols_won += s.pistols_won;
        o.pistols_played += s.pistols_played;
        o.pistol_conversions += s.pistol_conversions;
        converted += s.pistol_conversion_rate() * s.pistols_won as f64;
        o.pistol_atk_won += s.pistol_atk_won;
        o.pistol_def_won += s.pistol_def_won;
        o.pistol_atk_played += s.pistol_atk_played;
        o.pistol_def_played += s.pistol_def_played;
        o.close_maps += s.close_maps;
        atk += s.atk_round_rate() * s.games_played as f64;
        def += s.def_round_rate() * s.games_played as f64;
    }
    if o.games_played > 0 {
        let n = o.games_played as f64;
        o.winrate = o.wins as f64 / n;
        o.ot_rate = o.ot_count as f64 / n;
        o.atk_rate = atk / n;
        o.def_rate = def / n;
    }
    if o.pistols_played > 0 {
        o.pistol_rate = o.pistols_won as f64 / o.pistols_played as f64;
    }
    if o.pistols_won > 0 {
        o.pistol_conversion_rate = converted / o.pistols_won as f64;
    }
    o
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A finished map between teams 1 and 2.
    pub(crate) fn record(s1: i64, s2: i64) -> MapRecord {
        MapRecord {
            id: 1,
            match_id: 1,
            map_name: Some("Bind".into()),
            team1_id: Some(1),
            team2_id: Some(2),
            team1_score: Some(s1),
            team2_score: Some(s2),
            team1_atk_rounds: Some(s1 / 2),
            team1_def_rounds: Some(s1 - s1 / 2),
            team2_atk_rounds: Some(s2 / 2),
            team2_def_rounds: Some(s2 - s2 / 2),
            team1_pistols_won: Some(1),
            team2_pistols_won: Some(1),
            team1_pistol_conversions: Some(1),
            team2_pistol_conversions: Some(0),
            is_ot: s1 + s2 > 24,
            winner_team_id: Some(if s1 > s2 { 1 } else { 2 }),
            t1_name: Some("Sentinels".into()),
            t2_name: Some("NRG".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_aggregate_basic_counts() {
        let recs = vec![record(13, 5), record(11, 13), record(14, 12)];
        let s = aggregate_team_stats(1, "Bind", &recs, PistolSides { atk_won: 2, def_won: 1 });
        assert_eq!(s.team_name, "Sentinels");
        assert_eq!(s.games_played, 3);
        assert_eq!(s.wins, 2);
        assert_eq!(s.losses, 1);
        assert_eq!(s.ot_count, 1);
        assert_eq!(s.close_maps, 2);
        assert_eq!(s.stomps_won, 1);
        assert_eq!(s.stomps_lost, 0);
        assert_eq!(s.pistols_played, 6);
        assert_eq!(s.pistol_atk_won, 2);
        assert_eq!(s.pistol_atk_played, 3);
        assert!((s.avg_round_diff - (8.0 - 2.0 + 2.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_half_length_grows_in_overtime() {
        let s = aggregate_team_stats(2, "Bind", &[record(16, 14)], PistolSides::default());
        // 30 rounds → 15 per half.
        assert_eq!(s.atk_rounds_played, 15);
        assert_eq!(s.team_name, "NRG");
        assert_eq!(s.losses, 1);

        let s = aggregate_team_stats(2, "Bind", &[record(13, 2)], PistolSides::default());
        assert_eq!(s.atk_rounds_played, 12);
        assert_eq!(s.stomps_lost, 1);
    }

    #[test]
    fn test_empty_records() {
        let s = aggregate_team_stats(1, "Bind", &[], PistolSides { atk_won: 3, def_won: 3 });
        assert_eq!(s.games_played, 0);
        assert_eq!(s.pistol_atk_won, 0);
        assert_eq!(s.avg_round_diff, 0.0);
    }

    #[test]
    fn test_head_to_head_and_global() {
        let recs = vec![record(13, 5), record(12, 14), record(14, 12)];
        let h = head_to_head(2, 1, &recs);
        assert_eq!(h.total_maps, 3);
        assert_eq!(h.a_wins, 1);
        assert_eq!(h.b_wins, 2);
        assert_eq!(h.ot_count, 2);

        let g = global_map_stats(&recs);
        assert_eq!(g.close_count, 2);
        assert!((g.avg_total_rounds - 70.0 / 3.0).abs() < 1e-9);
        assert_eq!(global_map_stats(&[]), GlobalMapStats::default());
    }

    #[test]
    fn test_recent_form() {
        let recs = vec![record(13, 5), record(5, 13), record(13, 5)];
        assert_eq!(recent_form(1, &recs, 2), (1, 2));
        assert_eq!(recent_form(1, &recs, 10), (2, 3));
    }

    #[test]
    fn test_aggregate_overall() {
        let a = aggregate_team_stats(1, "Bind", &[record(13, 5)], PistolSides::default());
        let b = aggregate_team_stats(1, "Haven", &[record(5, 13), record(13, 11)], PistolSides::default());
        let o = aggregate_overall(&[a, b]);
        assert_eq!(o.games_played, 3);
        assert_eq!(o.wins, 2);
        assert!((o.winrate - 2.0 / 3.0).abs() < 1e-9);
        assert!((o.pistol_rate - 0.5).abs() < 1e-9);
        assert_eq!(o.pistol_conversions, 3);
        assert_eq!(o.pistol_conversion_rate, 1.0);
        assert_eq!(aggregate_overall(&[]), OverallStats::default());
    }
}
