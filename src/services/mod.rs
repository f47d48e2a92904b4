pub mod image_service;
pub mod storage_service;
pub mod user_service;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{config::AppConfig, services::storage_service::StorageService};
    use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
    use std::{env, sync::Arc};
    use uuid::Uuid;

    const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

    /// Configuration pointing at throwaway locations under the system temp
    /// directory.
    pub fn test_config() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: "sqlite::memory:".into(),
            upload_dir: env::temp_dir()
                .join(format!("gallery-uploads-{}", Uuid::new_v4()))
                .display()
                .to_string(),
            upload_relative_to_home: false,
            base_url: "http://localhost:3000".into(),
            timestamp_format: "%Y%m%d%H%M%S%3f".into(),
            timestamp_timezone: "utc".into(),
            filename_template: "{timestamp}-{random}{extension}".into(),
            random_bound: 1_000_000,
            fallback_filename: "upload".into(),
            max_upload_bytes: 8 * 1024 * 1024,
            jwt_secret: "test-secret".into(),
            jwt_issuer: None,
            jwt_audience: None,
        }
    }

    pub fn test_storage() -> StorageService {
        StorageService::new(&test_config())
    }

    /// Fresh file-backed database with the schema applied. File-backed so
    /// every pooled connection sees the same data.
    pub async fn test_pool() -> Arc<SqlitePool> {
        let db_path = env::temp_dir().join(format!("gallery-test-{}.db", Uuid::new_v4()));
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("connecting test database");
        for stmt in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt).execute(&pool).await.expect("applying schema");
        }
        Arc::new(pool)
    }
}
