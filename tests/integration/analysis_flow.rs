use vct_edge::analysis::multibets;
use vct_edge::collectors::odds::parse_odds_string;
use vct_edge::config::{AppConfig, Settings};
use vct_edge::engine::MatchAnalyzer;
use vct_edge::query::{self, StatType};
use vct_edge::types::BoType;

use crate::{seeded, UPCOMING_MATCH};

#[tokio::test]
async fn test_full_match_report() {
    let db = seeded().await;
    let settings = Settings::default();
    let config = AppConfig::default();
    let analyzer = MatchAnalyzer::new(&db, &settings, &config);

    let report = analyzer.analyze_match(UPCOMING_MATCH).await.unwrap();
    assert_eq!(report.bo_type, BoType::Bo3);
    assert_eq!(report.maps.len(), 3);
    assert_eq!(report.maps[2].map_name, "Split");
    assert_eq!(report.maps[0].pick_team.as_deref(), Some("Sentinels"));
    for m in &report.maps {
        assert!(m.p_team_a_win > 0.0 && m.p_team_a_win < 1.0);
        assert!(m.p_ot >= 0.0 && m.p_ot <= 1.0);
        assert!(m.sample_size > 0);
    }

    let total: f64 = report.series.score_probs.values().sum();
    assert!((total - 1.0).abs() < 1e-3);
    assert!(report.series.p_3_maps.is_some());
    // No quotes yet: nothing to bet on.
    assert!(report.single_edges.is_empty());
    assert!(report.arbitrage.is_empty());
    assert_eq!(report.score_chart.len(), report.series.score_probs.len());
}

#[tokio::test]
async fn test_team_overview_counts_every_map() {
    let db = seeded().await;
    let settings = Settings::default();
    let config = AppConfig::default();
    let analyzer = MatchAnalyzer::new(&db, &settings, &config);

    let overview = analyzer.team_overview(1, None).await.unwrap();
    assert_eq!(overview.team.name, "Sentinels");
    assert_eq!(overview.overall.games_played, 8);
    assert_eq!(overview.overall.wins, 6);
    assert_eq!(overview.overall.ot_count, 2);
    let maps: Vec<&str> = overview.map_stats.iter().map(|m| m.stats.map_name.as_str()).collect();
    assert_eq!(maps.len(), 3);
    assert!(maps.contains(&"Haven"));

    assert!(analyzer.team_overview(99, None).await.is_err());
}

#[tokio::test]
async fn test_data_filter_restricts_history() {
    let db = seeded().await;
    let mut settings = Settings::default();
    settings.data_filter.date_from = Some("2026-03-05".into());
    let config = AppConfig::default();
    let analyzer = MatchAnalyzer::new(&db, &settings, &config);

    let bind = analyzer
        .team_map_stats(1, "Bind", &settings.data_filter, None)
        .await
        .unwrap();
    // Only the 2026-03-09 series survives the filter.
    assert_eq!(bind.games_played, 1);

    let report = analyzer.analyze_match(UPCOMING_MATCH).await.unwrap();
    assert!(report.filter.is_active);
}

#[tokio::test]
async fn test_cross_match_parlays_need_quotes() {
    let db = seeded().await;
    let settings = Settings::default();
    let config = AppConfig::default();

    {
        let analyzer = MatchAnalyzer::new(&db, &settings, &config);
        let empty = analyzer.cross_match_parlays("2026-03-01", "2026-03-31", 3).await.unwrap();
        assert!(empty.upcoming_matches.is_empty());
    }

    let quotes = parse_odds_string("betano match_winner Sentinels 8.0; betano map1_winner Sentinels 8.0");
    db.insert_odds(UPCOMING_MATCH, &quotes).await.unwrap();

    let analyzer = MatchAnalyzer::new(&db, &settings, &config);
    let report = analyzer.cross_match_parlays("2026-03-01", "2026-03-31", 3).await.unwrap();
    assert_eq!(report.upcoming_matches.len(), 1);
    assert_eq!(report.upcoming_matches[0].team1_display, "SEN");
    assert_eq!(report.matches_with_edges, 1);
    // A single match cannot form a cross-match parlay.
    assert!(report.cross_match_parlays.is_empty());
}

#[tokio::test]
async fn test_outcome_registration_once() {
    let db = seeded().await;
    assert!(db.register_match_outcome(200).await.unwrap());
    assert!(!db.register_match_outcome(200).await.unwrap());
    assert!(!db.register_match_outcome(UPCOMING_MATCH).await.unwrap());
    // Completed matches still register once each.
    assert!(db.register_match_outcome(201).await.unwrap());
}

#[tokio::test]
async fn test_settings_persist() {
    let db = seeded().await;
    assert!(db.load_settings().await.unwrap().is_none());

    let mut settings = Settings::default();
    settings.bankroll.total = 2500.0;
    settings.live.bet365_live = true;
    db.save_settings(&settings).await.unwrap();
    assert_eq!(db.load_settings().await.unwrap(), Some(settings));
}

#[tokio::test]
async fn test_stats_queries() {
    let db = seeded().await;
    let settings = Settings::default();
    let config = AppConfig::default();
    let analyzer = MatchAnalyzer::new(&db, &settings, &config);
    let teams = db.all_teams().await.unwrap();
    let pool = config.map_pool.maps.clone();

    let h2h = query::run(&analyzer, &teams, &pool, "LOUD vs NRG h2h").await.unwrap();
    assert_eq!(h2h.intent, Some(StatType::H2h));
    let names: Vec<&str> = h2h.teams.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["LOUD", "NRG"]);
    assert_eq!(h2h.result.as_ref().unwrap()["total_maps"], 3);

    let overview = query::run(&analyzer, &teams, &pool, "sentinels").await.unwrap();
    assert_eq!(overview.intent, Some(StatType::Overview));
    assert!(overview.markdown.unwrap().contains("Sentinels"));

    let unknown = query::run(&analyzer, &teams, &pool, "ot rate").await.unwrap();
    assert!(unknown.teams.is_empty());
    assert!(unknown.result.unwrap().get("error").is_some());
}

#[test]
fn test_hedge_locks_profit() {
    let plan = multibets::hedge(100.0, 3.0, 1.8, true);
    assert!((plan.profit_if_original_wins - plan.profit_if_hedge_wins).abs() < 0.02);
    assert!(plan.guaranteed_profit > 0.0);
}
