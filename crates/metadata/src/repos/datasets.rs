//! Dataset repository.

use crate::error::MetadataResult;
use crate::models::DatasetRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for dataset archives.
#[async_trait]
pub trait DatasetRepo: Send + Sync {
    /// Create a dataset record.
    async fn create_dataset(&self, dataset: &DatasetRow) -> MetadataResult<()>;

    /// Get a dataset by ID.
    async fn get_dataset(
        &self,
        user_id: Uuid,
        dataset_id: Uuid,
    ) -> MetadataResult<Option<DatasetRow>>;

    /// List a user's datasets, newest first.
    async fn list_datasets(&self, user_id: Uuid) -> MetadataResult<Vec<DatasetRow>>;

    /// Update dataset status.
    async fn update_dataset_status(
        &self,
        dataset_id: Uuid,
        status: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Delete a dataset record. Fails with `Constraint` while a model
    /// still references it.
    async fn delete_dataset(&self, user_id: Uuid, dataset_id: Uuid) -> MetadataResult<()>;
}
