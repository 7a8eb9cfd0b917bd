//! Cart, address, and order endpoints through the HTTP surface.

#![allow(clippy::unwrap_used)]

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use rygstore_core::{PaymentMethod, UserId};
use rygstore_storefront::db::OrderStore;
use rygstore_storefront::testing::new_order;

use common::TestApp;

#[tokio::test]
async fn test_cart_edits() {
    let app = TestApp::new();
    let cookie = app.sign_in(&UserId::new("buyer_1")).await;
    let a = app.store.insert_product("Mango", 10);
    let b = app.store.insert_product("Banana", 5);

    for product in [a.id, a.id, b.id] {
        let response = app
            .json(Method::POST, &format!("/cart/items/{product}"), Some(&cookie), None)
            .await;
        assert_eq!(response.status, StatusCode::OK);
    }

    let response = app
        .json(
            Method::PATCH,
            &format!("/cart/items/{}", b.id),
            Some(&cookie),
            Some(json!({"quantity": 0})),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["cartItems"], json!({ (a.id.to_string()): 2 }));
    assert_eq!(response.body["totalQuantity"], 2);
}

#[tokio::test]
async fn test_replace_cart_drops_non_positive_quantities() {
    let app = TestApp::new();
    let cookie = app.sign_in(&UserId::new("buyer_1")).await;
    let a = app.store.insert_product("Mango", 10);
    let b = app.store.insert_product("Banana", 5);

    app.json(
        Method::PUT,
        "/cart",
        Some(&cookie),
        Some(json!({"cartItems": { (a.id.to_string()): 3, (b.id.to_string()): 0 }})),
    )
    .await;

    let response = app.json(Method::GET, "/cart", Some(&cookie), None).await;
    assert_eq!(response.body["cartItems"], json!({ (a.id.to_string()): 3 }));
}

#[tokio::test]
async fn test_cart_requires_sign_in() {
    let app = TestApp::new();
    let response = app.json(Method::GET, "/cart", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_blank_session_identity_is_unauthorized() {
    let app = TestApp::new();
    let cookie = app.sign_in(&UserId::new("   ")).await;

    let response = app.json(Method::GET, "/cart", Some(&cookie), None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.calls(), 0);
}

#[tokio::test]
async fn test_malformed_product_id_is_bad_request() {
    let app = TestApp::new();
    let cookie = app.sign_in(&UserId::new("buyer_1")).await;
    let response = app
        .json(Method::POST, "/cart/items/not-a-uuid", Some(&cookie), None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_address_book() {
    let app = TestApp::new();
    let cookie = app.sign_in(&UserId::new("buyer_1")).await;

    let created = app
        .json(
            Method::POST,
            "/addresses",
            Some(&cookie),
            Some(json!({
                "fullName": " Asha Rao ",
                "phoneNumber": "5550100",
                "pincode": "560001",
                "area": "MG Road",
                "city": "Bengaluru",
                "state": "KA"
            })),
        )
        .await;
    assert_eq!(created.status, StatusCode::OK);
    assert_eq!(created.body["address"]["fullName"], "Asha Rao");

    let blank = app
        .json(
            Method::POST,
            "/addresses",
            Some(&cookie),
            Some(json!({
                "fullName": "  ",
                "phoneNumber": "5550100",
                "pincode": "560001",
                "area": "MG Road",
                "city": "Bengaluru",
                "state": "KA"
            })),
        )
        .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    let listed = app.json(Method::GET, "/addresses", Some(&cookie), None).await;
    assert_eq!(listed.body["addresses"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_buyer_cancels_unpaid_card_order() {
    let app = TestApp::new();
    let user = UserId::new("buyer_1");
    let cookie = app.sign_in(&user).await;
    let order = app
        .store
        .create_order(&new_order(&user, PaymentMethod::Card))
        .await
        .unwrap();

    let response = app
        .json(Method::DELETE, &format!("/orders/{}", order.id), Some(&cookie), None)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["deleted"], true);
    assert!(app.store.get_order(order.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cannot_cancel_paid_or_foreign_orders() {
    let app = TestApp::new();
    let user = UserId::new("buyer_1");
    let cookie = app.sign_in(&user).await;
    let paid = app
        .store
        .create_order(&new_order(&user, PaymentMethod::Card))
        .await
        .unwrap();
    app.store.settle_payment(paid.id).await.unwrap();
    let foreign = app
        .store
        .create_order(&new_order(&UserId::new("someone_else"), PaymentMethod::Card))
        .await
        .unwrap();

    let paid_response = app
        .json(Method::DELETE, &format!("/orders/{}", paid.id), Some(&cookie), None)
        .await;
    let foreign_response = app
        .json(Method::DELETE, &format!("/orders/{}", foreign.id), Some(&cookie), None)
        .await;

    assert_eq!(paid_response.status, StatusCode::CONFLICT);
    assert_eq!(foreign_response.status, StatusCode::NOT_FOUND);
    assert!(app.store.get_order(foreign.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let live = app.json(Method::GET, "/health", None, None).await;
    let ready = app.json(Method::GET, "/health/ready", None, None).await;
    assert_eq!(live.status, StatusCode::OK);
    assert_eq!(ready.status, StatusCode::OK);
}
