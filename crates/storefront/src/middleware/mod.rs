//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions)
//!
//! Authentication is an extractor ([`RequireUser`]) rather than a layer so the
//! webhook route stays reachable without a session.

pub mod auth;
pub mod request_id;
pub mod session;

pub use auth::{AuthRejection, RequireUser};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use session::{SESSION_COOKIE_NAME, create_session_layer};
