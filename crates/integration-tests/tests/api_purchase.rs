use std::sync::Arc;

use axum::http::StatusCode;
use integration_tests::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

fn decimal(value: &serde_json::Value) -> Decimal {
    value.as_str().expect("decimal string").parse().expect("decimal")
}

#[tokio::test]
async fn points_purchase_discounts_buyer_and_pays_seller_list_price() {
    let app = TestApp::new();
    let seller = app.user("maya", 0).await;
    let buyer = app.user("alice", 2_000).await;
    let note = app.note(&seller, dec!(10.00), false).await;

    let (status, receipt) = app
        .post(&buyer, &format!("/api/notes/{note}/purchase"), json!({ "method": "points" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{receipt}");
    assert_eq!(receipt["points_deducted"], 950);
    assert_eq!(receipt["new_points_balance"], 1_050);
    assert_eq!(decimal(&receipt["amount_charged"]), dec!(9.50));

    let (_, balance) = app.get(&seller, "/api/me/balance").await;
    assert_eq!(decimal(&balance["dollar_balance"]), dec!(10.00));

    let (_, entries) = app.get(&buyer, "/api/me/transactions").await;
    assert_eq!(entries[0]["kind"], "note_bought_points");
    assert_eq!(entries[0]["points_amount"], 950);
    let (_, entries) = app.get(&seller, "/api/me/transactions").await;
    assert_eq!(entries[0]["kind"], "note_sale");

    let (status, access) = app.get(&buyer, &format!("/api/notes/{note}/access")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(access["can_access"], true);

    let (_, purchases) = app.get(&buyer, "/api/me/purchases").await;
    assert_eq!(purchases.as_array().map(Vec::len), Some(1));
    assert_eq!(purchases[0]["payment_method"], "points");
}

#[tokio::test]
async fn second_purchase_is_rejected_without_charging() {
    let app = TestApp::new();
    let seller = app.user("maya", 0).await;
    let buyer = app.user("alice", 2_000).await;
    let note = app.note(&seller, dec!(10.00), false).await;
    let uri = format!("/api/notes/{note}/purchase");

    let (status, _) = app.post(&buyer, &uri, json!({ "method": "points" })).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.post(&buyer, &uri, json!({ "method": "points" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_purchased");
    assert_eq!(app.points(&buyer).await, 1_050);
}

#[tokio::test]
async fn insufficient_points_leaves_no_trace() {
    let app = TestApp::new();
    let seller = app.user("maya", 0).await;
    let buyer = app.user("bruno", 120).await;
    let note = app.note(&seller, dec!(10.00), false).await;

    let (status, body) = app
        .post(&buyer, &format!("/api/notes/{note}/purchase"), json!({ "method": "points" }))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "insufficient_points");

    assert_eq!(app.points(&buyer).await, 120);
    let (_, purchases) = app.get(&buyer, "/api/me/purchases").await;
    assert_eq!(purchases, json!([]));
    let (_, entries) = app.get(&seller, "/api/me/transactions").await;
    assert_eq!(entries, json!([]));
    let (_, access) = app.get(&buyer, &format!("/api/notes/{note}/access")).await;
    assert_eq!(access["can_access"], false);
}

#[tokio::test]
async fn dollar_purchase_charges_list_price_and_no_points() {
    let app = TestApp::new();
    let seller = app.user("maya", 0).await;
    let buyer = app.user("alice", 300).await;
    let note = app.note(&seller, dec!(4.99), false).await;

    let (status, receipt) = app
        .post(&buyer, &format!("/api/notes/{note}/purchase"), json!({ "method": "dollars" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{receipt}");
    assert_eq!(receipt["points_deducted"], 0);
    assert_eq!(decimal(&receipt["amount_charged"]), dec!(4.99));
    assert_eq!(app.points(&buyer).await, 300);

    let (_, entries) = app.get(&buyer, "/api/me/transactions").await;
    assert_eq!(entries[0]["kind"], "note_bought_dollars");
}

#[tokio::test]
async fn own_and_free_notes_cannot_be_bought() {
    let app = TestApp::new();
    let seller = app.user("maya", 5_000).await;
    let buyer = app.user("alice", 5_000).await;
    let paid = app.note(&seller, dec!(3.00), false).await;
    let free = app.note(&seller, Decimal::ZERO, false).await;

    let (status, _) = app
        .post(&seller, &format!("/api/notes/{paid}/purchase"), json!({ "method": "points" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(&buyer, &format!("/api/notes/{free}/purchase"), json!({ "method": "points" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Free, published notes are readable without a purchase; owners always are.
    let (_, access) = app.get(&buyer, &format!("/api/notes/{free}/access")).await;
    assert_eq!(access["can_access"], true);
    let (_, access) = app.get(&seller, &format!("/api/notes/{paid}/access")).await;
    assert_eq!(access["can_access"], true);
}

#[tokio::test]
async fn unknown_note_is_404() {
    let app = TestApp::new();
    let buyer = app.user("alice", 2_000).await;

    let (status, body) = app
        .post(
            &buyer,
            &format!("/api/notes/{}/purchase", uuid::Uuid::new_v4()),
            json!({ "method": "points" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "note_not_found");
}

#[tokio::test]
async fn exclusive_note_has_exactly_one_winner() {
    let app = Arc::new(TestApp::new());
    let seller = app.user("maya", 0).await;
    let note = app.note(&seller, dec!(25.00), true).await;

    let mut buyers = Vec::new();
    for i in 0..8 {
        buyers.push(app.user(&format!("buyer{i}"), 10_000).await);
    }

    let mut tasks = Vec::new();
    for buyer in buyers.clone() {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            app.post(&buyer, &format!("/api/notes/{note}/purchase"), json!({ "method": "points" }))
                .await
        }));
    }

    let mut winners = 0;
    for task in tasks {
        let (status, body) = task.await.unwrap();
        match status {
            StatusCode::OK => winners += 1,
            StatusCode::CONFLICT => assert_eq!(body["error"], "exclusive_already_sold"),
            other => panic!("unexpected status {other}: {body}"),
        }
    }
    assert_eq!(winners, 1);

    // 25.00 * 0.95 * 100 = 2375 points, charged once.
    let mut total_points = 0;
    for buyer in &buyers {
        total_points += app.points(buyer).await;
    }
    assert_eq!(total_points, 8 * 10_000 - 2_375);
    let (_, balance) = app.get(&seller, "/api/me/balance").await;
    assert_eq!(decimal(&balance["dollar_balance"]), dec!(25.00));
}

#[tokio::test]
async fn concurrent_spends_never_overdraw() {
    let app = Arc::new(TestApp::new());
    let seller = app.user("maya", 0).await;
    let buyer = app.user("alice", 2_000).await;

    let mut notes = Vec::new();
    for _ in 0..5 {
        notes.push(app.note(&seller, dec!(10.00), false).await);
    }

    let mut tasks = Vec::new();
    for note in notes {
        let app = app.clone();
        let buyer = buyer.clone();
        tasks.push(tokio::spawn(async move {
            app.post(&buyer, &format!("/api/notes/{note}/purchase"), json!({ "method": "points" }))
                .await
                .0
        }));
    }

    let mut bought = 0;
    for task in tasks {
        match task.await.unwrap() {
            StatusCode::OK => bought += 1,
            StatusCode::PAYMENT_REQUIRED => {}
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(bought, 2);
    assert_eq!(app.points(&buyer).await, 2_000 - 2 * 950);
}

#[tokio::test]
async fn quote_previews_cost_without_charging() {
    let app = TestApp::new();
    let seller = app.user("maya", 0).await;
    let buyer = app.user("alice", 2_000).await;
    let note = app.note(&seller, dec!(10.00), false).await;

    let (status, quote) = app.get(&buyer, &format!("/api/notes/{note}/quote?method=points")).await;
    assert_eq!(status, StatusCode::OK, "{quote}");
    assert_eq!(quote["points_cost"], 950);
    assert_eq!(decimal(&quote["amount_charged"]), dec!(9.50));
    assert_eq!(decimal(&quote["dollar_price"]), dec!(10.00));

    let (status, _) = app.get(&buyer, &format!("/api/notes/{note}/quote?method=crypto")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.points(&buyer).await, 2_000);
}
