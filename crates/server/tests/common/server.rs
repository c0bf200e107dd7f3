//! Server test utilities.

use super::mocks::{MockPlatform, MockSearch};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use shutter_core::auth::PasswordCipher;
use shutter_core::config::{
    AppConfig, AuthConfig, MetadataConfig, PlatformConfig, PollerConfig, SearchConfig,
    ServerConfig, StorageConfig,
};
use shutter_metadata::{MetadataStore, SqliteStore};
use shutter_ml::{SemanticSearch, TrainingPlatform};
use shutter_server::{create_router, AppState};
use shutter_storage::{FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server with scripted platform and search doubles.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub platform: Arc<MockPlatform>,
    pub search: Arc<MockSearch>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, true).await
    }

    /// A server with no training platform configured.
    pub async fn without_platform() -> Self {
        Self::build(|_| {}, false).await
    }

    async fn build<F>(modifier: F, with_platform: bool) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let platform = Arc::new(MockPlatform::default());
        let search = Arc::new(MockSearch::default());

        let mut config = AppConfig {
            server: ServerConfig::default(),
            storage: StorageConfig::Filesystem { path: storage_path },
            metadata: MetadataConfig::Sqlite { path: db_path },
            auth: AuthConfig::for_testing(),
            search: SearchConfig::default(),
            platform: with_platform.then(PlatformConfig::for_testing),
            // Zero interval so submitted poll jobs come due immediately.
            poller: PollerConfig {
                interval_secs: 0,
                max_attempts: 60,
            },
        };
        modifier(&mut config);

        let state = AppState::new(
            config,
            storage,
            metadata,
            search.clone() as Arc<dyn SemanticSearch>,
            with_platform.then(|| platform.clone() as Arc<dyn TrainingPlatform>),
        );
        let router = create_router(state.clone());

        Self {
            router,
            state,
            platform,
            search,
            _temp_dir: temp_dir,
        }
    }

    /// Encrypt a password into the transport envelope clients send.
    pub fn envelope(&self, password: &str) -> String {
        let cipher = PasswordCipher::new(&AuthConfig::for_testing()).expect("cipher");
        cipher.encrypt(password).expect("envelope")
    }

    /// Register a user and return their session token.
    pub async fn register(&self, username: &str) -> String {
        let (status, body) = self
            .json_request(
                "POST",
                "/api/auth/register",
                Some(serde_json::json!({
                    "username": username,
                    "password": self.envelope("hunter2-pass"),
                })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body["token"].as_str().expect("token").to_string()
    }

    /// Make a JSON request and return status and parsed body.
    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Make a multipart request and return status and parsed body.
    pub async fn multipart_request(
        &self,
        uri: &str,
        token: &str,
        parts: &[MultipartPart<'_>],
    ) -> (StatusCode, Value) {
        let boundary = "shutter-test-boundary";
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match part {
                MultipartPart::Text { name, value } => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                MultipartPart::File {
                    name,
                    filename,
                    content_type,
                    data,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; \
                             filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", format!("Bearer {token}"))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Upload one image and return its id.
    pub async fn upload_image(&self, token: &str, filename: &str, folder_id: Option<&str>) -> String {
        let mut parts = Vec::new();
        if let Some(folder_id) = folder_id {
            parts.push(MultipartPart::Text {
                name: "folder_id",
                value: folder_id,
            });
        }
        parts.push(MultipartPart::File {
            name: "files",
            filename,
            content_type: "image/png",
            data: b"\x89PNG\r\n\x1a\nfakedata",
        });

        let (status, body) = self.multipart_request("/api/images/upload", token, &parts).await;
        assert_eq!(status, StatusCode::CREATED, "upload failed: {body}");
        body[0]["image_id"].as_str().expect("image_id").to_string()
    }

    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }
}

/// One part of a multipart body.
#[allow(dead_code)]
pub enum MultipartPart<'a> {
    Text {
        name: &'a str,
        value: &'a str,
    },
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}
