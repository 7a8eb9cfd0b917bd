//! Authentication extractor.
//!
//! The sign-in integration stores a [`CurrentUser`] in the session. Handlers
//! that act for a buyer take [`RequireUser`] and get a 401 when it is absent.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

use crate::error::{AppError, set_sentry_user};
use crate::models::{CurrentUser, session_keys};

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireUser(user): RequireUser) -> impl IntoResponse {
///     format!("Hello, {}!", user.id)
/// }
/// ```
pub struct RequireUser(pub CurrentUser);

/// Rejection when no user is signed in.
#[derive(Debug)]
pub struct AuthRejection;

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        AppError::Unauthorized("Not authorized, login again".to_string()).into_response()
    }
}

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Get the session from extensions (set by SessionManagerLayer)
        let session = parts.extensions.get::<Session>().ok_or(AuthRejection)?;

        // A session read failure is treated like a missing user
        let user: CurrentUser = session
            .get(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten()
            .filter(|u: &CurrentUser| !u.id.is_empty())
            .ok_or(AuthRejection)?;

        tracing::Span::current().record("user_id", user.id.as_str());
        set_sentry_user(&user.id);

        Ok(Self(user))
    }
}
