//! Object storage trait, a filesystem backend, and an in-memory backend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::UploadError;

/// Location of an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
    /// Backend identifier, used to delete or replace the object later.
    pub storage_id: String,
}

/// Opaque image storage. May be slow and may fail.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, folder: &str) -> Result<StoredObject, UploadError>;
}

/// Keeps only plain path segments of `folder`.
fn clean_folder(folder: &str) -> String {
    folder
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect::<Vec<_>>()
        .join("/")
}

fn object_key(folder: &str) -> String {
    let folder = clean_folder(folder);
    let name = Uuid::new_v4().simple().to_string();
    if folder.is_empty() {
        name
    } else {
        format!("{folder}/{name}")
    }
}

/// Writes objects below a local directory and serves them under a base URL.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
    base_url: String,
}

impl FilesystemStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStorage for FilesystemStorage {
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, bytes: Vec<u8>, folder: &str) -> Result<StoredObject, UploadError> {
        let key = object_key(folder);
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(storage_id = %key, "object written");
        Ok(StoredObject {
            url: format!("{}/{}", self.base_url, key),
            storage_id: key,
        })
    }
}

#[derive(Debug, Default)]
struct InMemoryStorageState {
    objects: HashMap<String, Vec<u8>>,
    failing: bool,
}

/// In-memory object storage for testing.
///
/// Tracks how many uploads run at the same time so tests can assert the
/// throttler's bound.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<InMemoryStorageState>>,
    latency: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload sleeps for `latency` before completing.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every following upload fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).failing = failing;
    }

    pub fn object_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .objects
            .len()
    }

    pub fn object(&self, storage_id: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .objects
            .get(storage_id)
            .cloned()
    }

    /// Highest number of uploads observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn upload(&self, bytes: Vec<u8>, folder: &str) -> Result<StoredObject, UploadError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.failing {
                Err(UploadError::Storage("storage unavailable".to_string()))
            } else {
                let key = object_key(folder);
                state.objects.insert(key.clone(), bytes);
                Ok(StoredObject {
                    url: format!("memory://{key}"),
                    storage_id: key,
                })
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
