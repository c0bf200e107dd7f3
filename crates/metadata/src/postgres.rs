//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{DatasetRepo, FolderRepo, ImageRepo, ModelRepo, PollJobRepo, UserRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(url: &str, max_connections: u32) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url).map_err(MetadataError::Database)?;
        Self::connect(opts, max_connections).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// This allows credentials to be passed separately, enabling better
    /// secret management (e.g., passwords via environment variables).
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        max_connections: u32,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections).await
    }

    async fn connect(opts: PgConnectOptions, max_connections: u32) -> MetadataResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared
        // statement, so the schema is split and executed statement by statement.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepo for PostgresStore {
    async fn create_user(&self, user: &UserRow) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO users (user_id, username, password_hash, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5)",
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
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl FolderRepo for PostgresStore {
    async fn create_folder(&self, folder: &FolderRow) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO folders (folder_id, user_id, parent_id, name, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
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

    async fn get_folder(&self, user_id: Uuid, folder_id: Uuid) -> MetadataResult<Option<FolderRow>> {
        let row = sqlx::query_as::<_, FolderRow>(
            "SELECT * FROM folders WHERE user_id = $1 AND folder_id = $2",
        )
        .bind(user_id)
        .bind(folder_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_folders(&self, user_id: Uuid) -> MetadataResult<Vec<FolderRow>> {
        let rows =
            sqlx::query_as::<_, FolderRow>("SELECT * FROM folders WHERE user_id = $1 ORDER BY name")
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
            "UPDATE folders SET name = $1, updated_at = $2 WHERE user_id = $3 AND folder_id = $4",
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
            "UPDATE folders SET parent_id = $1, updated_at = $2 \
             WHERE user_id = $3 AND folder_id = $4",
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
        let result = sqlx::query("DELETE FROM folders WHERE user_id = $1 AND folder_id = $2")
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
impl ImageRepo for PostgresStore {
    async fn insert_images(&self, images: &[ImageRow]) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        for image in images {
            sqlx::query(
                "INSERT INTO images (image_id, user_id, folder_id, object_key, original_name, \
                 content_type, size_bytes, permanent_url, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
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

    async fn get_image(&self, user_id: Uuid, image_id: Uuid) -> MetadataResult<Option<ImageRow>> {
        let row = sqlx::query_as::<_, ImageRow>(
            "SELECT * FROM images WHERE user_id = $1 AND image_id = $2",
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
                    "SELECT * FROM images WHERE user_id = $1 AND folder_id = $2 \
                     ORDER BY created_at DESC",
                )
                .bind(user_id)
                .bind(folder_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ImageRow>(
                    "SELECT * FROM images WHERE user_id = $1 AND folder_id IS NULL \
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
            "SELECT * FROM images WHERE user_id = $1 ORDER BY created_at DESC",
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
        let rows = sqlx::query_as::<_, ImageRow>(
            "SELECT * FROM images WHERE user_id = $1 AND folder_id = ANY($2)",
        )
        .bind(user_id)
        .bind(folder_ids)
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
            sqlx::query("UPDATE images SET folder_id = $1 WHERE user_id = $2 AND image_id = $3")
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
        let result = sqlx::query("DELETE FROM images WHERE user_id = $1 AND image_id = $2")
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
impl DatasetRepo for PostgresStore {
    async fn create_dataset(&self, dataset: &DatasetRow) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO datasets (dataset_id, user_id, name, object_key, size_bytes, status, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
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
            "SELECT * FROM datasets WHERE user_id = $1 AND dataset_id = $2",
        )
        .bind(user_id)
        .bind(dataset_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_datasets(&self, user_id: Uuid) -> MetadataResult<Vec<DatasetRow>> {
        let rows = sqlx::query_as::<_, DatasetRow>(
            "SELECT * FROM datasets WHERE user_id = $1 ORDER BY created_at DESC",
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
            sqlx::query("UPDATE datasets SET status = $1, updated_at = $2 WHERE dataset_id = $3")
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
        let result = sqlx::query("DELETE FROM datasets WHERE user_id = $1 AND dataset_id = $2")
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
impl ModelRepo for PostgresStore {
    async fn create_model(&self, model: &ModelRow) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO models (model_id, user_id, dataset_id, name, status, artifact_prefix, \
             endpoint_name, endpoint_status, error_detail, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
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

    async fn get_model(&self, user_id: Uuid, model_id: Uuid) -> MetadataResult<Option<ModelRow>> {
        let row = sqlx::query_as::<_, ModelRow>(
            "SELECT * FROM models WHERE user_id = $1 AND model_id = $2",
        )
        .bind(user_id)
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_model_by_id(&self, model_id: Uuid) -> MetadataResult<Option<ModelRow>> {
        let row = sqlx::query_as::<_, ModelRow>("SELECT * FROM models WHERE model_id = $1")
            .bind(model_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_models(&self, user_id: Uuid) -> MetadataResult<Vec<ModelRow>> {
        let rows = sqlx::query_as::<_, ModelRow>(
            "SELECT * FROM models WHERE user_id = $1 AND status != 'deleted' \
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
            "UPDATE models SET status = $1, error_detail = $2, updated_at = $3 \
             WHERE model_id = $4",
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
        let result =
            sqlx::query("UPDATE models SET artifact_prefix = $1, updated_at = $2 WHERE model_id = $3")
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
        let result =
            sqlx::query("UPDATE models SET endpoint_name = $1, updated_at = $2 WHERE model_id = $3")
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
        let result =
            sqlx::query("UPDATE models SET endpoint_status = $1, updated_at = $2 WHERE model_id = $3")
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
impl PollJobRepo for PostgresStore {
    async fn create_poll_job(&self, job: &PollJobRow) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO poll_jobs (job_id, model_id, kind, handle, state, attempts, \
             next_poll_at, last_error, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
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
             WHERE state IN ('pending', 'in_progress') AND next_poll_at <= $1 \
             ORDER BY next_poll_at ASC LIMIT $2",
        )
        .bind(now)
        .bind(limit as i64)
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
             WHERE model_id = $1 AND kind = $2 AND state IN ('pending', 'in_progress')",
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
            "UPDATE poll_jobs SET state = $1, attempts = $2, next_poll_at = $3, \
             last_error = $4, updated_at = $5 WHERE job_id = $6",
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
            return Err(MetadataError::NotFound(format!(
                "poll job {job_id} not found"
            )));
        }
        Ok(())
    }
}
