//! Represents an uploaded image and its metadata.

use crate::models::user::User;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::cmp::Ordering;
use uuid::Uuid;

/// Metadata for one uploaded image.
///
/// The stored bytes live behind `path`, an opaque reference meaningful only
/// to the storage service and never serialized. `contributor_id` establishes
/// the immutable many-to-one ownership link; only `title` and `description`
/// are mutable, and only by the owning contributor.
#[derive(Serialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Unique identifier, assigned at creation.
    #[sqlx(rename = "image_id")]
    pub id: Uuid,

    /// When this image was first persisted.
    pub created: DateTime<Utc>,

    /// When this image was most recently updated.
    pub updated: DateTime<Utc>,

    /// Optional title (min length 3 when present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Optional description (min length 3 when present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Original uploaded filename. Immutable.
    pub name: String,

    /// Opaque storage reference. Meaningful only to the storage service.
    #[serde(skip_serializing)]
    pub path: String,

    /// MIME type of the stored content. Immutable.
    pub content_type: String,

    /// Owning user. Set at creation, never reassigned.
    pub contributor_id: Uuid,

    /// Owning user record, attached when available. Derived, not stored.
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributor: Option<User>,

    /// Location of the REST resource for this image. Derived, not stored.
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl Image {
    /// Attach the fully-qualified resource link for this image.
    pub fn with_href(mut self, base_url: &str) -> Self {
        self.href = Some(image_href(base_url, &self.id));
        self
    }

    /// Attach the owning user record.
    pub fn with_contributor(mut self, contributor: User) -> Self {
        self.contributor = Some(contributor);
        self
    }

    /// Sort key for natural ordering: title when present, else the original
    /// filename.
    pub fn natural_key(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    /// Natural ordering: title-else-name ascending, ties broken by creation
    /// time descending. Matches the ordering produced by catalog queries.
    pub fn natural_cmp(&self, other: &Self) -> Ordering {
        self.natural_key()
            .cmp(other.natural_key())
            .then_with(|| other.created.cmp(&self.created))
    }
}

/// Persisted records are equal iff their assigned identifiers are equal.
impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Image {}

/// Build the resource location of an image from the configured base URL.
pub fn image_href(base_url: &str, id: &Uuid) -> String {
    format!("{}/images/{}", base_url.trim_end_matches('/'), id)
}
