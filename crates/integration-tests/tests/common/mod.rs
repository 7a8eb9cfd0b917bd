//! Shared harness for router tests.

#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;
use tower_sessions::cookie::time::{Duration as CookieDuration, OffsetDateTime};
use tower_sessions::session::{Id, Record};
use tower_sessions::{MemoryStore as SessionMemoryStore, SessionStore};

use rygstore_core::UserId;
use rygstore_storefront::middleware::{SESSION_COOKIE_NAME, create_session_layer};
use rygstore_storefront::models::{CurrentUser, session_keys};
use rygstore_storefront::payments::signature::unix_now;
use rygstore_storefront::payments::{SIGNATURE_HEADER, WebhookVerifier};
use rygstore_storefront::testing::{FakeProcessor, MemoryStore, TEST_WEBHOOK_SECRET, memory_state};

pub struct TestApp {
    router: Router,
    sessions: SessionMemoryStore,
    pub store: Arc<MemoryStore>,
    pub processor: Arc<FakeProcessor>,
}

/// A decoded response.
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        let (state, store, processor) = memory_state();
        let sessions = SessionMemoryStore::default();
        let layer = create_session_layer(sessions.clone(), state.config());

        Self {
            router: rygstore_storefront::app(state, layer),
            sessions,
            store,
            processor,
        }
    }

    /// Create a session for `user` as the sign-in integration would, and
    /// return the cookie header that carries it.
    pub async fn sign_in(&self, user: &UserId) -> String {
        let current = CurrentUser { id: user.clone() };
        let mut record = Record {
            id: Id::default(),
            data: HashMap::from([(
                session_keys::CURRENT_USER.to_string(),
                serde_json::to_value(&current).unwrap(),
            )]),
            expiry_date: OffsetDateTime::now_utc() + CookieDuration::hours(1),
        };
        self.sessions.create(&mut record).await.unwrap();
        format!("{SESSION_COOKIE_NAME}={}", record.id)
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        TestResponse { status, body }
    }

    /// JSON request, optionally signed in.
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        self.json_with_headers(method, uri, cookie, body, &[]).await
    }

    pub async fn json_with_headers(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    /// Deliver a webhook payload with the given signature header.
    pub async fn webhook(&self, payload: &[u8], signature: Option<&str>) -> TestResponse {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/webhooks/payment")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        self.send(builder.body(Body::from(payload.to_vec())).unwrap())
            .await
    }

    /// Deliver a correctly signed webhook payload.
    pub async fn signed_webhook(&self, payload: &[u8]) -> TestResponse {
        let signature = sign(payload);
        self.webhook(payload, Some(&signature)).await
    }
}

/// Signature header for `payload` under the test webhook secret.
pub fn sign(payload: &[u8]) -> String {
    WebhookVerifier::new(TEST_WEBHOOK_SECRET.into(), Duration::from_secs(300))
        .sign(payload, unix_now())
        .unwrap()
}
