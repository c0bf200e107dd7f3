//! Folder repository.

use crate::error::MetadataResult;
use crate::models::FolderRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for the folder tree.
///
/// All operations are scoped to a user; a folder belonging to another
/// user behaves as if it did not exist.
#[async_trait]
pub trait FolderRepo: Send + Sync {
    /// Create a folder. Fails with `Constraint` on a sibling name clash.
    async fn create_folder(&self, folder: &FolderRow) -> MetadataResult<()>;

    /// Get a folder by ID.
    async fn get_folder(&self, user_id: Uuid, folder_id: Uuid) -> MetadataResult<Option<FolderRow>>;

    /// List every folder owned by a user.
    async fn list_folders(&self, user_id: Uuid) -> MetadataResult<Vec<FolderRow>>;

    /// Rename a folder in place.
    async fn rename_folder(
        &self,
        user_id: Uuid,
        folder_id: Uuid,
        name: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Re-parent a folder. `new_parent` of None moves it to the root.
    /// Cycle prevention is the caller's responsibility.
    async fn move_folder(
        &self,
        user_id: Uuid,
        folder_id: Uuid,
        new_parent: Option<Uuid>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Delete a folder. Child folders and contained images cascade.
    async fn delete_folder(&self, user_id: Uuid, folder_id: Uuid) -> MetadataResult<()>;
}
