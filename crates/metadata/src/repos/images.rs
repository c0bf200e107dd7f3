//! Image repository.

use crate::error::MetadataResult;
use crate::models::ImageRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for image records.
#[async_trait]
pub trait ImageRepo: Send + Sync {
    /// Insert a batch of images in one transaction. All-or-nothing:
    /// a failure leaves no rows behind.
    async fn insert_images(&self, images: &[ImageRow]) -> MetadataResult<()>;

    /// Get an image by ID.
    async fn get_image(&self, user_id: Uuid, image_id: Uuid) -> MetadataResult<Option<ImageRow>>;

    /// List images in one folder (None = the root).
    async fn list_images(
        &self,
        user_id: Uuid,
        folder_id: Option<Uuid>,
    ) -> MetadataResult<Vec<ImageRow>>;

    /// List every image owned by a user, newest first.
    async fn list_all_images(&self, user_id: Uuid) -> MetadataResult<Vec<ImageRow>>;

    /// List images in any of the given folders. Used to collect blob
    /// keys before a folder-subtree delete.
    async fn list_images_in_folders(
        &self,
        user_id: Uuid,
        folder_ids: &[Uuid],
    ) -> MetadataResult<Vec<ImageRow>>;

    /// Move an image to another folder (None = the root).
    async fn move_image(
        &self,
        user_id: Uuid,
        image_id: Uuid,
        folder_id: Option<Uuid>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Delete an image record.
    async fn delete_image(&self, user_id: Uuid, image_id: Uuid) -> MetadataResult<()>;
}
