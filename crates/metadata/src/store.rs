//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{DatasetRepo, FolderRepo, ImageRepo, ModelRepo, PollJobRepo, UserRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    UserRepo + FolderRepo + ImageRepo + DatasetRepo + ModelRepo + PollJobRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
            .map_err(MetadataError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under server concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn create_user(&self, user: &UserRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO users (user_id, username, password_hash, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(user.user_id)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl FolderRepo for SqliteStore {
        async fn create_folder(&self, folder: &FolderRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO folders (folder_id, user_id, parent_id, name, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(folder.folder_id)
            .bind(folder.user_id)
            .bind(folder.parent_id)
            .bind(&folder.name)
            .bind(folder.created_at)
            .bind(folder.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_folder(
            &self,
            user_id: Uuid,
            folder_id: Uuid,
        ) -> MetadataResult<Option<FolderRow>> {
            let row = sqlx::query_as::<_, FolderRow>(
                "SELECT * FROM folders WHERE user_id = ? AND folder_id = ?",
            )
            .bind(user_id)
            .bind(folder_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_folders(&self, user_id: Uuid) -> MetadataResult<Vec<FolderRow>> {
            let rows = sqlx::query_as::<_, FolderRow>(
                "SELECT * FROM folders WHERE user_id = ? ORDER BY name",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn rename_folder(
            &self,
            user_id: Uuid,
            folder_id: Uuid,
            name: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE folders SET name = ?, updated_at = ? WHERE user_id = ? AND folder_id = ?",
            )
            .bind(name)
            .bind(updated_at)
            .bind(user_id)
            .bind(folder_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "folder {folder_id} not found"
                )));
            }
            Ok(())
        }

        async fn move_folder(
            &self,
            user_id: Uuid,
            folder_id: Uuid,
            new_parent: Option<Uuid>,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE folders SET parent_id = ?, updated_at = ? \
                 WHERE user_id = ? AND folder_id = ?",
            )
            .bind(new_parent)
            .bind(updated_at)
            .bind(user_id)
            .bind(folder_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "folder {folder_id} not found"
                )));
            }
            Ok(())
        }

        async fn delete_folder(&self, user_id: Uuid, folder_id: Uuid) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM folders WHERE user_id = ? AND folder_id = ?")
                .bind(user_id)
                .bind(folder_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "folder {folder_id} not found"
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ImageRepo for SqliteStore {
        async fn insert_images(&self, images: &[ImageRow]) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;
            for image in images {
                sqlx::query(
                    "INSERT INTO images (image_id, user_id, folder_id, object_key, \
                     original_name, content_type, size_bytes, permanent_url, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(image.image_id)
                .bind(image.user_id)
                .bind(image.folder_id)
                .bind(&image.object_key)
                .bind(&image.original_name)
                .bind(&image.content_type)
                .bind(image.size_bytes)
                .bind(&image.permanent_url)
                .bind(image.created_at)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        }

        async fn get_image(
            &self,
            user_id: Uuid,
            image_id: Uuid,
        ) -> MetadataResult<Option<ImageRow>> {
            let row = sqlx::query_as::<_, ImageRow>(
                "SELECT * FROM images WHERE user_id = ? AND image_id = ?",
            )
            .bind(user_id)
            .bind(image_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_images(
            &self,
            user_id: Uuid,
            folder_id: Option<Uuid>,
        ) -> MetadataResult<Vec<ImageRow>> {
            let rows = match folder_id {
                Some(folder_id) => {
                    sqlx::query_as::<_, ImageRow>(
                        "SELECT * FROM images WHERE user_id = ? AND folder_id = ? \
                         ORDER BY created_at DESC",
                    )
                    .bind(user_id)
                    .bind(folder_id)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, ImageRow>(
                        "SELECT * FROM images WHERE user_id = ? AND folder_id IS NULL \
                         ORDER BY created_at DESC",
                    )
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows)
        }

        async fn list_all_images(&self, user_id: Uuid) -> MetadataResult<Vec<ImageRow>> {
            let rows = sqlx::query_as::<_, ImageRow>(
                "SELECT * FROM images WHERE user_id = ? ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_images_in_folders(
            &self,
            user_id: Uuid,
            folder_ids: &[Uuid],
        ) -> MetadataResult<Vec<ImageRow>> {
            if folder_ids.is_empty() {
                return Ok(Vec::new());
            }
            let mut builder = sqlx::QueryBuilder::<Sqlite>::new(
                "SELECT * FROM images WHERE user_id = ",
            );
            builder.push_bind(user_id);
            builder.push(" AND folder_id IN (");
            let mut separated = builder.separated(", ");
            for folder_id in folder_ids {
                separated.push_bind(*folder_id);
            }
            builder.push(")");
            let rows = builder
                .build_query_as::<ImageRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn move_image(
            &self,
            user_id: Uuid,
            image_id: Uuid,
            folder_id: Option<Uuid>,
            _updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result =
                sqlx::query("UPDATE images SET folder_id = ? WHERE user_id = ? AND image_id = ?")
                    .bind(folder_id)
                    .bind(user_id)
                    .bind(image_id)
                    .execute(&self.pool)
                    .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "image {image_id} not found"
                )));
            }
            Ok(())
        }

        async fn delete_image(&self, user_id: Uuid, image_id: Uuid) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM images WHERE user_id = ? AND image_id = ?")
                .bind(user_id)
                .bind(image_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "image {image_id} not found"
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DatasetRepo for SqliteStore {
        async fn create_dataset(&self, dataset: &DatasetRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO datasets (dataset_id, user_id, name, object_key, size_bytes, \
                 status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(dataset.dataset_id)
            .bind(dataset.user_id)
            .bind(&dataset.name)
            .bind(&dataset.object_key)
            .bind(dataset.size_bytes)
            .bind(&dataset.status)
            .bind(dataset.created_at)
            .bind(dataset.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_dataset(
            &self,
            user_id: Uuid,
            dataset_id: Uuid,
        ) -> MetadataResult<Option<DatasetRow>> {
            let row = sqlx::query_as::<_, DatasetRow>(
                "SELECT * FROM datasets WHERE user_id = ? AND dataset_id = ?",
            )
            .bind(user_id)
            .bind(dataset_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_datasets(&self, user_id: Uuid) -> MetadataResult<Vec<DatasetRow>> {
            let rows = sqlx::query_as::<_, DatasetRow>(
                "SELECT * FROM datasets WHERE user_id = ? ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn update_dataset_status(
            &self,
            dataset_id: Uuid,
            status: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result =
                sqlx::query("UPDATE datasets SET status = ?, updated_at = ? WHERE dataset_id = ?")
                    .bind(status)
                    .bind(updated_at)
                    .bind(dataset_id)
                    .execute(&self.pool)
                    .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "dataset {dataset_id} not found"
                )));
            }
            Ok(())
        }

        async fn delete_dataset(&self, user_id: Uuid, dataset_id: Uuid) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM datasets WHERE user_id = ? AND dataset_id = ?")
                .bind(user_id)
                .bind(dataset_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "dataset {dataset_id} not found"
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ModelRepo for SqliteStore {
        async fn create_model(&self, model: &ModelRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO models (model_id, user_id, dataset_id, name, status, \
                 artifact_prefix, endpoint_name, endpoint_status, error_detail, \
                 created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(model.model_id)
            .bind(model.user_id)
            .bind(model.dataset_id)
            .bind(&model.name)
            .bind(&model.status)
            .bind(&model.artifact_prefix)
            .bind(&model.endpoint_name)
            .bind(&model.endpoint_status)
            .bind(&model.error_detail)
            .bind(model.created_at)
            .bind(model.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_model(
            &self,
            user_id: Uuid,
            model_id: Uuid,
        ) -> MetadataResult<Option<ModelRow>> {
            let row = sqlx::query_as::<_, ModelRow>(
                "SELECT * FROM models WHERE user_id = ? AND model_id = ?",
            )
            .bind(user_id)
            .bind(model_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_model_by_id(&self, model_id: Uuid) -> MetadataResult<Option<ModelRow>> {
            let row = sqlx::query_as::<_, ModelRow>("SELECT * FROM models WHERE model_id = ?")
                .bind(model_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_models(&self, user_id: Uuid) -> MetadataResult<Vec<ModelRow>> {
            let rows = sqlx::query_as::<_, ModelRow>(
                "SELECT * FROM models WHERE user_id = ? AND status != 'deleted' \
                 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn update_model_status(
            &self,
            model_id: Uuid,
            status: &str,
            error_detail: Option<&str>,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE models SET status = ?, error_detail = ?, updated_at = ? \
                 WHERE model_id = ?",
            )
            .bind(status)
            .bind(error_detail)
            .bind(updated_at)
            .bind(model_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "model {model_id} not found"
                )));
            }
            Ok(())
        }

        async fn set_model_artifact(
            &self,
            model_id: Uuid,
            artifact_prefix: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE models SET artifact_prefix = ?, updated_at = ? WHERE model_id = ?",
            )
            .bind(artifact_prefix)
            .bind(updated_at)
            .bind(model_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "model {model_id} not found"
                )));
            }
            Ok(())
        }

        async fn set_model_endpoint(
            &self,
            model_id: Uuid,
            endpoint_name: Option<&str>,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE models SET endpoint_name = ?, updated_at = ? WHERE model_id = ?",
            )
            .bind(endpoint_name)
            .bind(updated_at)
            .bind(model_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "model {model_id} not found"
                )));
            }
            Ok(())
        }

        async fn set_endpoint_status(
            &self,
            model_id: Uuid,
            endpoint_status: Option<&str>,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE models SET endpoint_status = ?, updated_at = ? WHERE model_id = ?",
            )
            .bind(endpoint_status)
            .bind(updated_at)
            .bind(model_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "model {model_id} not found"
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PollJobRepo for SqliteStore {
        async fn create_poll_job(&self, job: &PollJobRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO poll_jobs (job_id, model_id, kind, handle, state, attempts, \
                 next_poll_at, last_error, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(job.job_id)
            .bind(job.model_id)
            .bind(&job.kind)
            .bind(&job.handle)
            .bind(&job.state)
            .bind(job.attempts)
            .bind(job.next_poll_at)
            .bind(&job.last_error)
            .bind(job.created_at)
            .bind(job.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn due_poll_jobs(
            &self,
            now: OffsetDateTime,
            limit: u32,
        ) -> MetadataResult<Vec<PollJobRow>> {
            let rows = sqlx::query_as::<_, PollJobRow>(
                "SELECT * FROM poll_jobs \
                 WHERE state IN ('pending', 'in_progress') AND next_poll_at <= ? \
                 ORDER BY next_poll_at ASC LIMIT ?",
            )
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn active_poll_job(
            &self,
            model_id: Uuid,
            kind: &str,
        ) -> MetadataResult<Option<PollJobRow>> {
            let row = sqlx::query_as::<_, PollJobRow>(
                "SELECT * FROM poll_jobs \
                 WHERE model_id = ? AND kind = ? AND state IN ('pending', 'in_progress')",
            )
            .bind(model_id)
            .bind(kind)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn update_poll_job(
            &self,
            job_id: Uuid,
            state: &str,
            attempts: i32,
            next_poll_at: OffsetDateTime,
            last_error: Option<&str>,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE poll_jobs SET state = ?, attempts = ?, next_poll_at = ?, \
                 last_error = ?, updated_at = ? WHERE job_id = ?",
            )
            .bind(state)
            .bind(attempts)
            .bind(next_poll_at)
            .bind(last_error)
            .bind(updated_at)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("poll job {job_id} not found")));
            }
            Ok(())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Users
CREATE TABLE IF NOT EXISTS users (
    user_id BLOB PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);

-- Folders. Sibling names are unique per user; the partial index covers
-- root-level folders, where parent_id IS NULL escapes the composite one.
CREATE TABLE IF NOT EXISTS folders (
    folder_id BLOB PRIMARY KEY,
    user_id BLOB NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    parent_id BLOB REFERENCES folders(folder_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_sibling_name
    ON folders(user_id, parent_id, name) WHERE parent_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_root_name
    ON folders(user_id, name) WHERE parent_id IS NULL;
CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id);

-- Images
CREATE TABLE IF NOT EXISTS images (
    image_id BLOB PRIMARY KEY,
    user_id BLOB NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    folder_id BLOB REFERENCES folders(folder_id) ON DELETE CASCADE,
    object_key TEXT NOT NULL UNIQUE,
    original_name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    permanent_url TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_images_user_folder ON images(user_id, folder_id);

-- Datasets
CREATE TABLE IF NOT EXISTS datasets (
    dataset_id BLOB PRIMARY KEY,
    user_id BLOB NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    object_key TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'uploading',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_datasets_user ON datasets(user_id);

-- Models. dataset_id has no cascade: deleting a dataset that a model
-- still references is a constraint violation surfaced to the caller.
CREATE TABLE IF NOT EXISTS models (
    model_id BLOB PRIMARY KEY,
    user_id BLOB NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    dataset_id BLOB NOT NULL REFERENCES datasets(dataset_id),
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'training',
    artifact_prefix TEXT,
    endpoint_name TEXT,
    endpoint_status TEXT,
    error_detail TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_models_user ON models(user_id, status);

-- Poll jobs: the durable poll queue for the training platform.
CREATE TABLE IF NOT EXISTS poll_jobs (
    job_id BLOB PRIMARY KEY,
    model_id BLOB NOT NULL REFERENCES models(model_id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    handle TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    next_poll_at TEXT NOT NULL,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_poll_jobs_due ON poll_jobs(state, next_poll_at);
"#;
