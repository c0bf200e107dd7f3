//! CLIP semantic search client.
//!
//! The search service scores local image files against a text query.
//! The client stages candidate blobs into a per-request scratch
//! directory, posts the file paths, and maps scored paths back to
//! object keys. The scratch directory is removed when the request
//! finishes, success or not.

use crate::error::{MlError, MlResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shutter_core::config::SearchConfig;
use shutter_storage::ObjectStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// A scored search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMatch {
    pub object_key: String,
    pub score: f64,
}

/// Text-to-image semantic search over a set of candidate blobs.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Score `candidates` (object keys) against `query` and return the
    /// matches at or above `min_score`, best first.
    async fn search(
        &self,
        query: &str,
        candidates: &[String],
        min_score: f64,
    ) -> MlResult<Vec<SearchMatch>>;
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    images: Vec<String>,
    min_score: f64,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    path: String,
    score: f64,
}

/// Client for the CLIP search sidecar.
pub struct ClipSearchClient {
    http: reqwest::Client,
    config: SearchConfig,
    store: Arc<dyn ObjectStore>,
}

impl ClipSearchClient {
    pub fn new(config: SearchConfig, store: Arc<dyn ObjectStore>) -> MlResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MlError::SearchService(e.to_string()))?;
        Ok(Self {
            http,
            config,
            store,
        })
    }

    /// Download candidates into `dir`, returning file-name -> key.
    /// Names are index-prefixed so equal basenames cannot collide.
    async fn stage_candidates(
        &self,
        dir: &Path,
        candidates: &[String],
    ) -> MlResult<HashMap<String, String>> {
        let mut staged = HashMap::with_capacity(candidates.len());
        for (i, key) in candidates.iter().enumerate() {
            let name = format!("{i}-{}", shutter_core::keys::basename(key));
            let bytes = self.store.get(key).await?;
            tokio::fs::write(dir.join(&name), &bytes).await?;
            staged.insert(name, key.clone());
        }
        Ok(staged)
    }
}

#[async_trait]
impl SemanticSearch for ClipSearchClient {
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    async fn search(
        &self,
        query: &str,
        candidates: &[String],
        min_score: f64,
    ) -> MlResult<Vec<SearchMatch>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let scratch = ScratchDir::create(&self.config.scratch_dir)?;
        let staged = self.stage_candidates(scratch.path(), candidates).await?;

        let images = staged
            .keys()
            .map(|name| scratch.path().join(name).to_string_lossy().into_owned())
            .collect();
        let request = SearchRequest {
            query,
            images,
            min_score,
        };

        let url = format!("{}/search", self.config.url.trim_end_matches('/'));
        let response = self.http.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            let detail = detail.trim();
            return Err(MlError::SearchService(if detail.is_empty() {
                format!("search service returned {status}")
            } else {
                format!("search service returned {status}: {detail}")
            }));
        }
        let body: SearchResponse = response.json().await?;

        let matches = resolve_hits(body.results, &staged, min_score);
        debug!(matches = matches.len(), "search complete");
        Ok(matches)
    }
}

/// Map scored paths back to object keys, enforce the score floor, and
/// order best first. Paths the service invented are dropped.
fn resolve_hits(
    hits: Vec<SearchHit>,
    staged: &HashMap<String, String>,
    min_score: f64,
) -> Vec<SearchMatch> {
    let mut matches: Vec<SearchMatch> = hits
        .into_iter()
        .filter(|hit| hit.score >= min_score)
        .filter_map(|hit| {
            let name = Path::new(&hit.path).file_name()?.to_str()?;
            let object_key = staged.get(name)?.clone();
            Some(SearchMatch {
                object_key,
                score: hit.score,
            })
        })
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches
}

/// A per-request scratch directory, removed on drop.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(root: &Path) -> MlResult<Self> {
        let path = root.join(Uuid::new_v4().simple().to_string());
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove scratch dir");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, key)| (name.to_string(), key.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_hits_maps_filters_and_sorts() {
        let staged = staged(&[
            ("0-a.png", "users/u/images/a.png"),
            ("1-b.png", "users/u/images/b.png"),
            ("2-c.png", "users/u/images/c.png"),
        ]);
        let hits = vec![
            SearchHit {
                path: "/tmp/x/1-b.png".to_string(),
                score: 0.4,
            },
            SearchHit {
                path: "/tmp/x/0-a.png".to_string(),
                score: 0.9,
            },
            SearchHit {
                path: "/tmp/x/2-c.png".to_string(),
                score: 0.05,
            },
        ];

        let matches = resolve_hits(hits, &staged, 0.155);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].object_key, "users/u/images/a.png");
        assert_eq!(matches[1].object_key, "users/u/images/b.png");
        assert!(matches[0].score > matches[1].score);
    }

    #[test]
    fn test_resolve_hits_drops_unknown_paths() {
        let staged = staged(&[("0-a.png", "users/u/images/a.png")]);
        let hits = vec![SearchHit {
            path: "/tmp/x/not-staged.png".to_string(),
            score: 0.9,
        }];
        assert!(resolve_hits(hits, &staged, 0.0).is_empty());
    }

    #[tokio::test]
    async fn test_search_error_carries_service_body() {
        use shutter_storage::FilesystemBackend;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(dir.path().join("blobs")).await.unwrap(),
        );
        store
            .put("users/u/images/a.png", bytes::Bytes::from_static(b"png"))
            .await
            .unwrap();

        // One-shot server that rejects the request with a plain-text body.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let body = "model exploded";
            let response = format!(
                "HTTP/1.1 503 Service Unavailable\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });

        let config = SearchConfig {
            url: format!("http://{addr}"),
            timeout_secs: 5,
            min_score: 0.0,
            scratch_dir: dir.path().join("scratch"),
        };
        let client = ClipSearchClient::new(config, store).unwrap();
        let err = client
            .search("a cat", &["users/u/images/a.png".to_string()], 0.1)
            .await
            .unwrap_err();
        match err {
            MlError::SearchService(msg) => {
                assert!(msg.contains("503"), "unexpected message: {msg}");
                assert!(msg.contains("model exploded"), "unexpected message: {msg}");
            }
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let inner;
        {
            let scratch = ScratchDir::create(root.path()).unwrap();
            inner = scratch.path().to_path_buf();
            std::fs::write(scratch.path().join("f.png"), b"x").unwrap();
            assert!(inner.exists());
        }
        assert!(!inner.exists());
    }
}
