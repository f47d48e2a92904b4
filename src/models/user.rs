//! Represents an authenticated user of the gallery.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A local user record, joined to the external identity provider through
/// `oauth_key`.
///
/// The OAuth key is the immutable link to the provider and is never
/// serialized; `display_name` is the user-facing (and user-editable) name,
/// exposed in JSON as `"name"`.
#[derive(Serialize, Clone, FromRow, Debug)]
pub struct User {
    /// Unique identifier, assigned at creation.
    #[sqlx(rename = "user_id")]
    pub id: Uuid,

    /// When this user was first persisted (first connection to the service).
    pub created: DateTime<Utc>,

    /// When this user was most recently updated.
    pub updated: DateTime<Utc>,

    /// Opaque identifier provided (and recognized) by the OpenID/OAuth2
    /// provider. Unique, immutable after creation.
    #[serde(skip_serializing)]
    pub oauth_key: String,

    /// Unique human-readable name, mutable by the user themself only.
    #[serde(rename = "name")]
    pub display_name: String,

    /// Location of the REST resource for this user. Derived, not stored.
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl User {
    /// Attach the fully-qualified resource link for this user.
    pub fn with_href(mut self, base_url: &str) -> Self {
        self.href = Some(user_href(base_url, &self.id));
        self
    }
}

/// Persisted records are equal iff their assigned identifiers are equal.
impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for User {}

/// Build the resource location of a user from the configured base URL.
pub fn user_href(base_url: &str, id: &Uuid) -> String {
    format!("{}/users/{}", base_url.trim_end_matches('/'), id)
}
