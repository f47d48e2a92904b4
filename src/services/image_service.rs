//! ImageService — owns `Image` metadata records and coordinates them with
//! the storage backend. Implements the multi-criteria search and enforces
//! that mutation requires ownership.

use crate::{
    models::{image::Image, user::User},
    services::storage_service::{StorageError, StorageService},
};
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{io, sync::Arc};
use thiserror::Error;
use tokio::fs::File;
use tracing::debug;
use uuid::Uuid;

const IMAGE_COLUMNS: &str =
    "image_id, name, path, content_type, title, description, contributor_id, created, updated";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Clone)]
pub struct ImageService {
    db: Arc<SqlitePool>,
    storage: StorageService,
}

impl ImageService {
    pub fn new(db: Arc<SqlitePool>, storage: StorageService) -> Self {
        Self { db, storage }
    }

    /// Lookup by identifier, no ownership check. Used by public read
    /// endpoints. The contributor record is attached when found.
    pub async fn get(&self, id: Uuid) -> CatalogResult<Option<Image>> {
        let image = sqlx::query_as::<_, Image>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM image WHERE image_id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        match image {
            Some(image) => {
                let contributor = sqlx::query_as::<_, User>(
                    "SELECT user_id, oauth_key, display_name, created, updated
                     FROM user_profile WHERE user_id = ?",
                )
                .bind(image.contributor_id)
                .fetch_optional(&*self.db)
                .await?;
                Ok(Some(match contributor {
                    Some(user) => image.with_contributor(user),
                    None => image,
                }))
            }
            None => Ok(None),
        }
    }

    /// Ownership-scoped lookup: the image is returned only when its
    /// contributor is the caller. Non-owned and nonexistent ids are
    /// indistinguishable, so nothing leaks about other users' records.
    pub async fn get_owned(&self, id: Uuid, principal: &User) -> CatalogResult<Option<Image>> {
        let image = sqlx::query_as::<_, Image>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM image WHERE image_id = ? AND contributor_id = ?"
        ))
        .bind(id)
        .bind(principal.id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(image.map(|img| img.with_contributor(principal.clone())))
    }

    /// Persist uploaded content, then create the metadata record pointing at
    /// the returned storage reference.
    ///
    /// A storage failure means no record is created; a failed insert removes
    /// the stored bytes again. No orphans in either direction.
    pub async fn store<S>(
        &self,
        stream: S,
        original_filename: &str,
        content_type: &str,
        title: Option<String>,
        description: Option<String>,
        contributor: &User,
    ) -> CatalogResult<Image>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let stored = self.storage.store(stream, original_filename).await?;
        let now = Utc::now();

        let insert = sqlx::query_as::<_, Image>(&format!(
            "INSERT INTO image
                 (image_id, name, path, content_type, title, description,
                  contributor_id, created, updated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {IMAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&stored.filename)
        .bind(&stored.reference)
        .bind(content_type)
        .bind(&title)
        .bind(&description)
        .bind(contributor.id)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await;

        match insert {
            Ok(image) => {
                debug!("stored image `{}` for user `{}`", image.id, contributor.id);
                Ok(image.with_contributor(contributor.clone()))
            }
            Err(err) => {
                let _ = self.storage.delete(&stored.reference).await;
                Err(CatalogError::Sqlx(err))
            }
        }
    }

    /// Destroy an image: stored content first, the metadata record only once
    /// content deletion has succeeded. A content-deletion failure leaves the
    /// record in place, so no record ever points at nothing.
    pub async fn delete(&self, image: &Image) -> CatalogResult<()> {
        self.storage.delete(&image.path).await?;
        sqlx::query("DELETE FROM image WHERE image_id = ?")
            .bind(image.id)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    /// Multi-criteria search over the catalog.
    ///
    /// Four-way dispatch on the two optional criteria: contributor filter,
    /// case-sensitive substring containment of `fragment` in title OR
    /// description (via `instr`, since SQLite `LIKE` folds ASCII case), both
    /// combined, or the full catalog. One query per combination, so a record
    /// matching both halves of the OR appears exactly once. Ordering is
    /// title-else-name ascending, ties broken by creation time descending.
    pub async fn search(
        &self,
        contributor: Option<&User>,
        fragment: Option<&str>,
    ) -> CatalogResult<Vec<Image>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {IMAGE_COLUMNS} FROM image WHERE 1 = 1"
        ));

        if let Some(user) = contributor {
            builder.push(" AND contributor_id = ");
            builder.push_bind(user.id);
        }
        if let Some(fragment) = fragment {
            builder.push(" AND (instr(COALESCE(title, ''), ");
            builder.push_bind(fragment);
            builder.push(") > 0 OR instr(COALESCE(description, ''), ");
            builder.push_bind(fragment);
            builder.push(") > 0)");
        }
        builder.push(" ORDER BY COALESCE(title, name) ASC, created DESC");

        let mut images: Vec<Image> = builder.build_query_as().fetch_all(&*self.db).await?;
        if let Some(user) = contributor {
            for image in &mut images {
                image.contributor = Some(user.clone());
            }
        }
        Ok(images)
    }

    /// All uploads of one user, newest first (the `User::images`
    /// back-reference ordering).
    pub async fn images_of(&self, user: &User) -> CatalogResult<Vec<Image>> {
        let mut images = sqlx::query_as::<_, Image>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM image WHERE contributor_id = ? ORDER BY created DESC"
        ))
        .bind(user.id)
        .fetch_all(&*self.db)
        .await?;
        for image in &mut images {
            image.contributor = Some(user.clone());
        }
        Ok(images)
    }

    /// Persist title/description edits, bumping `updated`. Ownership and
    /// validation are enforced at the boundary before this layer.
    pub async fn save(&self, image: &Image) -> CatalogResult<Image> {
        let saved = sqlx::query_as::<_, Image>(&format!(
            "UPDATE image SET title = ?, description = ?, updated = ?
             WHERE image_id = ?
             RETURNING {IMAGE_COLUMNS}"
        ))
        .bind(&image.title)
        .bind(&image.description)
        .bind(Utc::now())
        .bind(image.id)
        .fetch_one(&*self.db)
        .await?;
        Ok(saved)
    }

    /// Open the stored content of an image for reading.
    pub async fn retrieve(&self, image: &Image) -> CatalogResult<File> {
        Ok(self.storage.retrieve(&image.path).await?)
    }
}
