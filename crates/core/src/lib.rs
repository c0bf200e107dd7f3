//! Core domain types and shared logic for Shutter.
//!
//! This crate defines what every other crate agrees on:
//! - Application configuration
//! - The identity token service (issue/verify) and password handling
//! - Storage-key generation for the blob store key space
//! - Shared constants (URL/token lifetimes, poll cadence)

pub mod auth;
pub mod config;
pub mod keys;

pub use auth::{AuthError, Claims, PasswordCipher, TokenService};

/// Lifetime of an issued identity token: 24 hours.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Lifetime of a presigned image read URL: 2 hours.
pub const PRESIGNED_URL_TTL_SECS: u64 = 2 * 60 * 60;

/// Timeout for a single semantic-search call to the external service.
pub const SEARCH_TIMEOUT_SECS: u64 = 50;

/// Default minimum similarity score for search results.
pub const DEFAULT_MIN_SCORE: f64 = 0.155;

/// Delay between status polls for a managed training/deployment job.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Maximum polls for a single job before it is marked failed.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Per-file size cap for image uploads: 5 MiB.
pub const MAX_IMAGE_SIZE: u64 = 5 * 1024 * 1024;

/// Size cap for dataset archive uploads: 1 GiB.
pub const MAX_DATASET_SIZE: u64 = 1024 * 1024 * 1024;
