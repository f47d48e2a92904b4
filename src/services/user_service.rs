//! UserService — owns `User` records: resolution of external identity
//! claims to local rows (creating on first sight), ordered listing, and
//! ownership-checked lookup.

use crate::models::user::User;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const USER_COLUMNS: &str = "user_id, oauth_key, display_name, created, updated";

#[derive(Clone)]
pub struct UserService {
    db: Arc<SqlitePool>,
}

impl UserService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Look up a user by external identity key, creating one on first sight.
    ///
    /// Safe under concurrent calls with the same key: the unique constraint
    /// on `oauth_key` makes the losing writer's insert fail, and that
    /// conflict is recovered by re-reading the winning row. At most one
    /// record per key ever exists, and the conflict is never surfaced.
    pub async fn get_or_create(
        &self,
        oauth_key: &str,
        display_name: &str,
    ) -> Result<User, sqlx::Error> {
        if let Some(user) = self.find_by_oauth_key(oauth_key).await? {
            return Ok(user);
        }

        let now = Utc::now();
        let insert = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO user_profile (user_id, oauth_key, display_name, created, updated)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(oauth_key)
        .bind(display_name)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await;

        match insert {
            Ok(user) => {
                debug!("created user `{}` for key `{}`", user.id, oauth_key);
                Ok(user)
            }
            Err(err) if is_unique_violation(&err) => {
                // A concurrent first login won the insert; return its row.
                // A conflict on display_name alone (different key) still
                // surfaces as an error.
                self.find_by_oauth_key(oauth_key).await?.ok_or(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn find_by_oauth_key(&self, oauth_key: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM user_profile WHERE oauth_key = ?"
        ))
        .bind(oauth_key)
        .fetch_optional(&*self.db)
        .await
    }

    /// Lookup by identifier. Absence is an empty result, not an error.
    pub async fn get(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM user_profile WHERE user_id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await
    }

    /// Self-only lookup: yields the principal itself when `id` is their own
    /// identifier, empty otherwise. No query runs, so other users' records
    /// leak nothing — not even their existence.
    pub fn get_owned(&self, id: Uuid, principal: &User) -> Option<User> {
        (principal.id == id).then(|| principal.clone())
    }

    /// All users, ordered by display name ascending.
    pub async fn get_all(&self) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM user_profile ORDER BY display_name ASC"
        ))
        .fetch_all(&*self.db)
        .await
    }

    /// Persist a display-name edit, bumping `updated`. Validation of the
    /// new name happens at the boundary before this layer is reached.
    pub async fn save(&self, user: &User) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE user_profile SET display_name = ?, updated = ?
             WHERE user_id = ?
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.display_name)
        .bind(Utc::now())
        .bind(user.id)
        .fetch_one(&*self.db)
        .await
    }
}

/// Return true if the SQLx error indicates a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::test_pool;

    #[tokio::test]
    async fn get_or_create_creates_once_per_key() {
        let users = UserService::new(test_pool().await);

        let first = users.get_or_create("ext-1", "Alice").await.unwrap();
        let second = users.get_or_create("ext-1", "ignored hint").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.display_name, "Alice");
    }

    #[tokio::test]
    async fn concurrent_first_logins_yield_a_single_record() {
        let users = UserService::new(test_pool().await);

        let (a, b) = tokio::join!(
            users.get_or_create("ext-racer", "Racer"),
            users.get_or_create("ext-racer", "Racer"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.id, b.id);

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_profile WHERE oauth_key = 'ext-racer'")
                .fetch_one(&*users.db)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn get_all_orders_by_display_name() {
        let users = UserService::new(test_pool().await);
        users.get_or_create("k1", "carol").await.unwrap();
        users.get_or_create("k2", "Bob").await.unwrap();
        users.get_or_create("k3", "alice").await.unwrap();

        let names: Vec<String> = users
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.display_name)
            .collect();
        assert_eq!(names, ["Bob", "alice", "carol"]);
    }

    #[tokio::test]
    async fn get_owned_is_self_only() {
        let users = UserService::new(test_pool().await);
        let alice = users.get_or_create("ext-a", "Alice").await.unwrap();
        let bob = users.get_or_create("ext-b", "Bob").await.unwrap();

        assert_eq!(users.get_owned(alice.id, &alice), Some(alice.clone()));
        assert_eq!(users.get_owned(bob.id, &alice), None);
    }

    #[tokio::test]
    async fn save_persists_display_name_edit() {
        let users = UserService::new(test_pool().await);
        let mut alice = users.get_or_create("ext-a", "Alice").await.unwrap();

        alice.display_name = "Alicia".into();
        let saved = users.save(&alice).await.unwrap();
        assert_eq!(saved.display_name, "Alicia");
        assert!(saved.updated >= saved.created);

        let reloaded = users.get(alice.id).await.unwrap().unwrap();
        assert_eq!(reloaded.display_name, "Alicia");
    }

    #[tokio::test]
    async fn save_rejects_duplicate_display_name() {
        let users = UserService::new(test_pool().await);
        users.get_or_create("ext-a", "Alice").await.unwrap();
        let mut bob = users.get_or_create("ext-b", "Bob").await.unwrap();

        bob.display_name = "Alice".into();
        let err = users.save(&bob).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }
}
