//! Checkout through the HTTP surface.

#![allow(clippy::unwrap_used)]

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use rygstore_core::{PaymentMethod, UserId};

use common::TestApp;

#[tokio::test]
async fn test_checkout_requires_sign_in() {
    let app = TestApp::new();

    let response = app
        .json(
            Method::POST,
            "/checkout",
            None,
            Some(json!({"addressId": "00000000-0000-0000-0000-000000000000", "items": [], "paymentMethod": "card"})),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["success"], false);
    assert_eq!(app.store.calls(), 0);
}

#[tokio::test]
async fn test_cash_checkout_places_order_and_clears_cart() {
    let app = TestApp::new();
    let user = UserId::new("buyer_1");
    let cookie = app.sign_in(&user).await;
    let address = app.store.insert_address(&user);
    let mango = app.store.insert_product("Mango", 10);

    app.json(
        Method::POST,
        &format!("/cart/items/{}", mango.id),
        Some(&cookie),
        None,
    )
    .await;

    let response = app
        .json(
            Method::POST,
            "/checkout",
            Some(&cookie),
            Some(json!({
                "addressId": address.id,
                "items": [{"product": mango.id, "quantity": 2}],
                "paymentMethod": "cash_on_delivery"
            })),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["orderId"].is_string());
    assert!(response.body.get("url").is_none());

    let cart = app.json(Method::GET, "/cart", Some(&cookie), None).await;
    assert_eq!(cart.body["totalQuantity"], 0);

    let orders = app.json(Method::GET, "/orders", Some(&cookie), None).await;
    let orders = orders.body["orders"].as_array().unwrap().clone();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["amount"], 20);
    assert_eq!(orders[0]["paymentMethod"], PaymentMethod::CashOnDelivery.as_str());
}

#[tokio::test]
async fn test_card_checkout_returns_redirect_url() {
    let app = TestApp::new();
    let user = UserId::new("buyer_1");
    let cookie = app.sign_in(&user).await;
    let address = app.store.insert_address(&user);
    let mango = app.store.insert_product("Mango", 100);

    let response = app
        .json(
            Method::POST,
            "/checkout",
            Some(&cookie),
            Some(json!({
                "addressId": address.id,
                "items": [{"product": mango.id, "quantity": 1}],
                "paymentMethod": "card"
            })),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(
        response.body["url"]
            .as_str()
            .unwrap()
            .starts_with("https://checkout.test/")
    );

    // Unpaid card orders are not in the default listing
    let orders = app.json(Method::GET, "/orders", Some(&cookie), None).await;
    assert!(orders.body["orders"].as_array().unwrap().is_empty());

    let unpaid = app
        .json(Method::GET, "/orders?paymentMethod=card&paid=false", Some(&cookie), None)
        .await;
    assert_eq!(unpaid.body["orders"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_checkout_is_rejected_without_creating_an_order() {
    let app = TestApp::new();
    let user = UserId::new("buyer_1");
    let cookie = app.sign_in(&user).await;
    let address = app.store.insert_address(&user);

    let response = app
        .json(
            Method::POST,
            "/checkout",
            Some(&cookie),
            Some(json!({"addressId": address.id, "items": [], "paymentMethod": "card"})),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.store.all_orders().is_empty());
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let app = TestApp::new();
    let user = UserId::new("buyer_1");
    let cookie = app.sign_in(&user).await;
    let address = app.store.insert_address(&user);

    let response = app
        .json(
            Method::POST,
            "/checkout",
            Some(&cookie),
            Some(json!({
                "addressId": address.id,
                "items": [{"product": "7c9e6679-7425-40de-944b-e07fc1f90ae7", "quantity": 1}],
                "paymentMethod": "cash_on_delivery"
            })),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(app.store.all_orders().is_empty());
}

#[tokio::test]
async fn test_processor_timeout_rolls_back_and_answers_503() {
    let app = TestApp::new();
    let user = UserId::new("buyer_1");
    let cookie = app.sign_in(&user).await;
    let address = app.store.insert_address(&user);
    let mango = app.store.insert_product("Mango", 10);
    app.processor.fail_sessions_with_timeout();

    let response = app
        .json(
            Method::POST,
            "/checkout",
            Some(&cookie),
            Some(json!({
                "addressId": address.id,
                "items": [{"product": mango.id, "quantity": 1}],
                "paymentMethod": "card"
            })),
        )
        .await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(app.store.all_orders().is_empty());
}

#[tokio::test]
async fn test_retry_with_idempotency_key_returns_same_order() {
    let app = TestApp::new();
    let user = UserId::new("buyer_1");
    let cookie = app.sign_in(&user).await;
    let address = app.store.insert_address(&user);
    let mango = app.store.insert_product("Mango", 10);
    let body = json!({
        "addressId": address.id,
        "items": [{"product": mango.id, "quantity": 1}],
        "paymentMethod": "card"
    });

    let first = app
        .json_with_headers(
            Method::POST,
            "/checkout",
            Some(&cookie),
            Some(body.clone()),
            &[("Idempotency-Key", "retry-abc")],
        )
        .await;
    let second = app
        .json_with_headers(
            Method::POST,
            "/checkout",
            Some(&cookie),
            Some(body),
            &[("Idempotency-Key", "retry-abc")],
        )
        .await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(first.body["orderId"], second.body["orderId"]);
    assert_eq!(first.body["url"], second.body["url"]);
    assert_eq!(app.store.all_orders().len(), 1);
    assert_eq!(app.processor.requests().len(), 1);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = TestApp::new();
    let cookie = app.sign_in(&UserId::new("buyer_1")).await;

    let response = app
        .json(
            Method::POST,
            "/checkout",
            Some(&cookie),
            Some(json!({"items": "not a list"})),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["success"], false);
}
