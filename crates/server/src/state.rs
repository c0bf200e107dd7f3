//! Application state shared across handlers.

use shutter_core::auth::{PasswordCipher, TokenService};
use shutter_core::config::AppConfig;
use shutter_metadata::MetadataStore;
use shutter_ml::{JobTracker, SemanticSearch, TrainingPlatform};
use shutter_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
///
/// Every dependency is injected: tests swap in a scripted platform and
/// search client without touching the handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Identity token service.
    pub tokens: TokenService,
    /// Password envelope cipher.
    pub passwords: PasswordCipher,
    /// Semantic search client.
    pub search: Arc<dyn SemanticSearch>,
    /// Training platform, absent when not configured. Training routes
    /// fail with `platform_error` while this is None.
    pub platform: Option<Arc<dyn TrainingPlatform>>,
    /// Job lifecycle tracker, present iff the platform is.
    pub tracker: Option<Arc<JobTracker>>,
}

impl AppState {
    /// Create application state from its parts.
    ///
    /// # Panics
    ///
    /// Panics if the auth configuration is invalid (wrong transport key
    /// length). Configuration is validated before this point in normal
    /// startup.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        search: Arc<dyn SemanticSearch>,
        platform: Option<Arc<dyn TrainingPlatform>>,
    ) -> Self {
        let tokens = TokenService::new(&config.auth);
        let passwords = match PasswordCipher::new(&config.auth) {
            Ok(cipher) => cipher,
            Err(e) => panic!("invalid auth configuration: {e}"),
        };
        let tracker = platform.as_ref().map(|platform| {
            Arc::new(JobTracker::new(
                metadata.clone(),
                platform.clone(),
                config.poller.clone(),
            ))
        });

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            tokens,
            passwords,
            search,
            platform,
            tracker,
        }
    }
}
