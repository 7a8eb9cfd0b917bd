//! Session-related types.
//!
//! Sign-in happens elsewhere; the identity integration writes a
//! [`CurrentUser`] under [`keys::CURRENT_USER`] and this service only reads it.

use serde::{Deserialize, Serialize};

use rygstore_core::UserId;

/// Session-stored user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Stable identifier issued by the identity provider.
    pub id: UserId,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const CURRENT_USER: &str = "current_user";
}
