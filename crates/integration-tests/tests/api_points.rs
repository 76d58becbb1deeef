use axum::http::StatusCode;
use integration_tests::TestApp;
use serde_json::json;

#[tokio::test]
async fn packages_and_presets_are_listed() {
    let app = TestApp::new();
    let alice = app.user("alice", 0).await;

    let (status, catalogue) = app.get(&alice, "/api/points/packages").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(catalogue["donation_presets"], json!([10, 50, 100, 500]));
    let ids: Vec<_> = catalogue["packages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["starter", "value", "pro"]);
}

#[tokio::test]
async fn buying_a_package_credits_points_and_ledgers_it() {
    let app = TestApp::new();
    let alice = app.user("alice", 40).await;

    let (status, receipt) = app.post(&alice, "/api/points/purchase", json!({ "package_id": "starter" })).await;
    assert_eq!(status, StatusCode::OK, "{receipt}");
    assert_eq!(receipt["points_added"], 500);
    assert_eq!(receipt["new_points_balance"], 540);

    let (_, entries) = app.get(&alice, "/api/me/transactions").await;
    assert_eq!(entries[0]["kind"], "points_purchase");
    assert_eq!(entries[0]["points_amount"], 500);

    let (status, body) = app.post(&alice, "/api/points/purchase", json!({ "package_id": "mega" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert_eq!(app.points(&alice).await, 540);
}

#[tokio::test]
async fn transactions_are_newest_first_and_paged() {
    let app = TestApp::new();
    let alice = app.user("alice", 0).await;
    for package in ["starter", "value", "pro"] {
        let (status, _) = app.post(&alice, "/api/points/purchase", json!({ "package_id": package })).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, page) = app.get(&alice, "/api/me/transactions?limit=2").await;
    let points: Vec<_> = page.as_array().unwrap().iter().map(|e| e["points_amount"].as_i64().unwrap()).collect();
    assert_eq!(points, [6_000, 1_100]);

    let (_, page) = app.get(&alice, "/api/me/transactions?limit=2&offset=2").await;
    let points: Vec<_> = page.as_array().unwrap().iter().map(|e| e["points_amount"].as_i64().unwrap()).collect();
    assert_eq!(points, [500]);

    let (status, _) = app.get(&alice, "/api/me/transactions?limit=ten").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
