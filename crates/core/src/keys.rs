//! Storage key layout for the blob store.
//!
//! Keys partition the bucket by concern:
//! - `users/<user_id>/images/<timestamp>-<rand><ext>` for image blobs
//! - `datasets/<dataset_id>.zip` for dataset archives
//! - `models/<model_id>/` as the output prefix for training artifacts
//! - `training-scripts/<model_id>.py` for per-model training entrypoints

use rand::Rng;
use time::OffsetDateTime;
use uuid::Uuid;

/// Generate a new image key for a user.
///
/// The original filename contributes only its extension; the rest is a
/// millisecond timestamp plus a random suffix so concurrent uploads of
/// identically-named files never collide.
pub fn image_key(user_id: Uuid, original_name: &str) -> String {
    let ts = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    let ext = extension_of(original_name);
    format!("users/{user_id}/images/{ts}-{suffix}{ext}")
}

/// Key of a dataset archive.
pub fn dataset_key(dataset_id: Uuid) -> String {
    format!("datasets/{dataset_id}.zip")
}

/// Output prefix for a model's training artifacts.
pub fn model_prefix(model_id: Uuid) -> String {
    format!("models/{model_id}/")
}

/// Key of the generated training script for a model.
pub fn training_script_key(model_id: Uuid) -> String {
    format!("training-scripts/{model_id}.py")
}

// Lowercased extension including the dot, or empty. Rejects extensions
// carrying path separators or other key-hostile characters.
fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext))
            if !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}

/// The basename of a key (final path segment).
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
