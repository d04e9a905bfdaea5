use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use vct_edge::api::{build_router, ApiState};
use vct_edge::config::{AppConfig, Settings};
use vct_edge::storage::Database;

use crate::{dataset, seeded, CannedAgent, UPCOMING_MATCH};

async fn router_with(db: Database, agent: CannedAgent) -> Router {
    let state = Arc::new(ApiState::new(db, AppConfig::default(), Settings::default(), Arc::new(agent)));
    build_router(state)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 4_000_000).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn approx(v: &Value, expected: f64) -> bool {
    v.as_f64().is_some_and(|x| (x - expected).abs() < 1e-6)
}

#[tokio::test]
async fn test_import_then_browse() {
    let db = Database::in_memory().await.unwrap();
    let app = router_with(db, CannedAgent::unavailable()).await;

    let payload = serde_json::to_value(dataset()).unwrap();
    let (status, res) = call(&app, "POST", "/api/import", Some(payload.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["synced_events"], 1);
    assert_eq!(res["synced_matches"], 5);
    assert_eq!(res["report"]["vetos"], 7);

    // Re-importing upserts in place.
    let (_, again) = call(&app, "POST", "/api/import", Some(payload)).await;
    assert_eq!(again["synced_matches"], 0);

    let (_, teams) = call(&app, "GET", "/api/teams", None).await;
    assert_eq!(teams["items"].as_array().unwrap().len(), 3);

    let (_, upcoming) = call(&app, "GET", "/api/matches?status=upcoming", None).await;
    assert_eq!(upcoming["items"][0]["id"], UPCOMING_MATCH);

    let (status, detail) = call(&app, "GET", &format!("/api/matches/{UPCOMING_MATCH}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["veto"].as_array().unwrap().len(), 7);
    assert!(detail["veto_markdown"].as_str().unwrap().contains("Split"));
}

#[tokio::test]
async fn test_odds_drive_edges_and_arbitrage() {
    let app = router_with(seeded().await, CannedAgent::unavailable()).await;

    let body = json!({
        "entries": [
            { "bookmaker": "betano", "market_type": "match_winner", "selection": "Sentinels", "odds_value": 9.0 },
            { "bookmaker": "betano", "market_type": "map1_winner", "selection": "Sentinels", "odds_value": 2.2 },
            { "bookmaker": "bet365", "market_type": "map1_winner", "selection": "NRG", "odds_value": 2.2 }
        ]
    });
    let uri = format!("/api/matches/{UPCOMING_MATCH}/odds");
    let (status, res) = call(&app, "POST", &uri, Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["inserted"], 3);

    let (status, report) = call(&app, "GET", &format!("/api/matches/{UPCOMING_MATCH}/analysis"), None).await;
    assert_eq!(status, StatusCode::OK);

    let maps: Vec<&str> = report["maps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["map_name"].as_str().unwrap())
        .collect();
    assert_eq!(maps, vec!["Bind", "Haven", "Split"]);

    let p_a = report["series"]["p_a_series"].as_f64().unwrap();
    let p_b = report["series"]["p_b_series"].as_f64().unwrap();
    assert!((p_a + p_b - 1.0).abs() < 1e-3);
    assert_eq!(report["odds_count"], 3);

    let edges = report["single_edges"].as_array().unwrap();
    assert!(edges
        .iter()
        .any(|e| e["market"] == "match_winner" && e["edge"].as_f64().unwrap() > 0.0));

    let arb = report["arbitrage"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["market_type"] == "map1_winner")
        .expect("map 1 surebet");
    assert_eq!(arb["is_arb"], true);
    assert!(arb["implied_sum"].as_f64().unwrap() < 1.0);
}

#[tokio::test]
async fn test_auto_odds_with_agent_output() {
    let output = r#"Found these lines:
```json
[
  {"bookmaker": "Betano", "market_type": "match_winner", "selection": "SEN", "odds_value": 1.72},
  {"bookmaker": "Betano", "market_type": "match_winner", "selection": "NRG", "odds_value": 2.10},
  {"bookmaker": "bet365", "market_type": "map2_ot", "selection": "Yes", "odds_value": 5.5}
]
```"#;
    let app = router_with(seeded().await, CannedAgent::answering(output)).await;
    let (status, res) = call(&app, "POST", &format!("/api/matches/{UPCOMING_MATCH}/odds/auto"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["inserted"], 3);
    assert_eq!(res["source"], "agent");

    let (_, odds) = call(&app, "GET", &format!("/api/matches/{UPCOMING_MATCH}/odds"), None).await;
    let odds = odds["items"].as_array().unwrap();
    assert_eq!(odds.len(), 3);
    assert!(odds.iter().any(|o| o["market_type"] == "map2_ot" && o["map_number"] == 2));
}

#[tokio::test]
async fn test_auto_odds_fallbacks() {
    let app = router_with(seeded().await, CannedAgent::unavailable()).await;
    let uri = format!("/api/matches/{UPCOMING_MATCH}/odds/auto");
    let (status, err) = call(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(err["error"], "http_error");

    let app = router_with(seeded().await, CannedAgent::answering("no odds today")).await;
    let (status, err) = call(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!err["fallback_steps"].as_array().unwrap().is_empty());

    let (status, res) = call(&app, "POST", &uri, Some(json!({ "force": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["inserted"], 0);
}

#[tokio::test]
async fn test_live_tracking_until_decided() {
    let app = router_with(seeded().await, CannedAgent::unavailable()).await;
    let uri = format!("/api/matches/{UPCOMING_MATCH}/live/map-result");

    let (status, first) = call(
        &app,
        "POST",
        &uri,
        Some(json!({ "map_number": 1, "winner_side": "a", "score_a": 13, "score_b": 8 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["state"]["a_score"], 1);
    assert_eq!(first["state"]["map_results"][0]["map_name"], "Bind");
    assert_eq!(first["series_prob"]["remaining_maps"], 2);
    assert_eq!(first["series_prob"]["series_prob"]["status"], "in_progress");
    let p_after_one = first["series_prob"]["series_prob"]["p_a_series"].as_f64().unwrap();
    assert!(p_after_one > 0.0 && p_after_one < 1.0);

    let (_, second) = call(
        &app,
        "POST",
        &uri,
        Some(json!({ "map_number": 2, "winner_side": "a", "score_a": 13, "score_b": 11 })),
    )
    .await;
    assert_eq!(second["state"]["map_results"][1]["map_name"], "Haven");
    assert_eq!(second["series_prob"]["series_prob"]["status"], "decided");
    assert!(approx(&second["series_prob"]["series_prob"]["p_a_series"], 1.0));

    let (status, live) = call(&app, "GET", &format!("/api/matches/{UPCOMING_MATCH}/live/series-prob"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(live["a_score"], 2);
    assert_eq!(live["b_score"], 0);
}

#[tokio::test]
async fn test_live_map_result_validation() {
    let app = router_with(seeded().await, CannedAgent::unavailable()).await;
    let uri = format!("/api/matches/{UPCOMING_MATCH}/live/map-result");
    let (status, _) = call(&app, "POST", &uri, Some(json!({ "map_number": 1, "winner_side": "c" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = call(&app, "POST", &uri, Some(json!({ "map_number": 0, "winner_side": "a" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = call(&app, "POST", "/api/matches/999/live/map-result", Some(json!({ "map_number": 1, "winner_side": "a" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_settings_change_what_analysis_sees() {
    let app = router_with(seeded().await, CannedAgent::unavailable()).await;

    let body = json!({
        "markets": { "enabled_markets": ["map_winner"] },
        "edge": { "min_edge": 0.05 }
    });
    let (status, settings) = call(&app, "PUT", "/api/config", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["markets"]["enabled_markets"], json!(["map_winner"]));
    assert!(approx(&settings["edge"]["min_edge"], 0.05));

    let odds = json!({
        "text": "betano match_winner Sentinels 9.0; betano map1_winner Sentinels 9.0"
    });
    call(&app, "POST", &format!("/api/matches/{UPCOMING_MATCH}/odds"), Some(odds)).await;

    let (_, report) = call(&app, "GET", &format!("/api/matches/{UPCOMING_MATCH}/analysis"), None).await;
    let edges = report["single_edges"].as_array().unwrap();
    assert!(!edges.is_empty());
    assert!(edges.iter().all(|e| e["market"] == "map1_winner"));
}

#[tokio::test]
async fn test_stats_query_answers_in_markdown() {
    let app = router_with(seeded().await, CannedAgent::unavailable()).await;
    let (status, res) = call(&app, "GET", "/api/stats/query?q=sentinels%20ot%20rate%20on%20split", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["intent"], "ot");
    assert_eq!(res["map_name"], "Split");
    assert_eq!(res["teams"][0]["tag"], "SEN");
    assert!(res["markdown"].as_str().unwrap().contains('|'));

    let (status, h2h) = call(&app, "GET", "/api/stats/h2h?a=1&b=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h2h["total_maps"], 6);
}
