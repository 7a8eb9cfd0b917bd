//! Webhook deliveries through the HTTP surface.

#![allow(clippy::unwrap_used)]

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use rygstore_core::{PaymentMethod, UserId};
use rygstore_storefront::db::{CartStore, OrderStore};
use rygstore_storefront::testing::{event_payload, new_order};

use common::{TestApp, sign};

#[tokio::test]
async fn test_missing_signature_is_rejected_before_storage() {
    let app = TestApp::new();
    let payload = event_payload("evt_1", "payment_intent.succeeded", "pi_1");

    let response = app.webhook(&payload, None).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.calls(), 0);
    assert_eq!(app.processor.lookups(), 0);
}

#[tokio::test]
async fn test_tampered_payload_is_rejected_before_storage() {
    let app = TestApp::new();
    let payload = event_payload("evt_1", "payment_intent.succeeded", "pi_1");
    let signature = sign(&payload);
    let tampered = event_payload("evt_1", "payment_intent.succeeded", "pi_2");

    let response = app.webhook(&tampered, Some(&signature)).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.calls(), 0);
    assert_eq!(app.processor.lookups(), 0);
}

#[tokio::test]
async fn test_duplicate_success_delivery_converges() {
    let app = TestApp::new();
    let user = UserId::new("buyer_1");
    let order = app
        .store
        .create_order(&new_order(&user, PaymentMethod::Card))
        .await
        .unwrap();
    let cookie = app.sign_in(&user).await;
    app.json(
        Method::PUT,
        "/cart",
        Some(&cookie),
        Some(json!({"cartItems": {"3fa85f64-5717-4562-b3fc-2c963f66afa6": 2}})),
    )
    .await;
    let session = app.processor.open_session(order.id, &user);
    let payload = event_payload(
        "evt_1",
        "payment_intent.succeeded",
        session.payment_intent.as_deref().unwrap(),
    );

    let first = app.signed_webhook(&payload).await;
    let second = app.signed_webhook(&payload).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body, json!({"received": true, "outcome": "processed"}));
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["outcome"], "ignored");

    assert!(app.store.get_order(order.id).await.unwrap().unwrap().paid);
    assert!(app.store.get(&user).await.unwrap().is_empty());
    assert_eq!(app.store.settlements(), 1);
}

#[tokio::test]
async fn test_concurrent_success_deliveries_settle_once() {
    let app = TestApp::new();
    let user = UserId::new("buyer_1");
    let order = app
        .store
        .create_order(&new_order(&user, PaymentMethod::Card))
        .await
        .unwrap();
    let session = app.processor.open_session(order.id, &user);
    let payload = event_payload(
        "evt_1",
        "payment_intent.succeeded",
        session.payment_intent.as_deref().unwrap(),
    );

    let (a, b) = tokio::join!(app.signed_webhook(&payload), app.signed_webhook(&payload));

    assert_eq!(a.status, StatusCode::OK);
    assert_eq!(b.status, StatusCode::OK);
    assert!(app.store.get_order(order.id).await.unwrap().unwrap().paid);
    assert_eq!(app.store.settlements(), 1);
}

#[tokio::test]
async fn test_cancel_after_paid_is_a_conflict() {
    let app = TestApp::new();
    let user = UserId::new("buyer_1");
    let order = app
        .store
        .create_order(&new_order(&user, PaymentMethod::Card))
        .await
        .unwrap();
    app.store.settle_payment(order.id).await.unwrap();
    let session = app.processor.open_session(order.id, &user);
    let payload = event_payload(
        "evt_2",
        "payment_intent.canceled",
        session.payment_intent.as_deref().unwrap(),
    );

    let response = app.signed_webhook(&payload).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["outcome"], "conflict");
    assert!(app.store.get_order(order.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_storage_outage_asks_for_redelivery() {
    let app = TestApp::new();
    let user = UserId::new("buyer_1");
    let order = app
        .store
        .create_order(&new_order(&user, PaymentMethod::Card))
        .await
        .unwrap();
    let session = app.processor.open_session(order.id, &user);
    let payload = event_payload(
        "evt_1",
        "payment_intent.succeeded",
        session.payment_intent.as_deref().unwrap(),
    );
    app.store.set_unavailable(true);

    let response = app.signed_webhook(&payload).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    app.store.set_unavailable(false);
    assert!(!app.store.get_order(order.id).await.unwrap().unwrap().paid);
}

#[tokio::test]
async fn test_unknown_intent_is_acknowledged_as_unresolved() {
    let app = TestApp::new();
    let payload = event_payload("evt_9", "payment_intent.succeeded", "pi_unknown");

    let response = app.signed_webhook(&payload).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["outcome"], "unresolved");
}
