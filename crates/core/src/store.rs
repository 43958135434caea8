//! # Idempotency Store
//!
//! A single JSON file mapping dedup keys to the publish payloads already
//! delivered for them. The whole file is read on every lookup and rewritten
//! on every record; a missing or corrupt file reads as an empty store.
//!
//! Writes are serialized through an async mutex and land via a temp-file
//! rename, so a reader never observes a half-written store. Concurrent
//! processes sharing the file still race last-writer-wins; this service is
//! deployed as a single instance.

use crate::models::{DedupKey, PublishPayload};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

/// Persistent dedup-key -> payload map.
#[derive(Debug)]
pub struct ProcessedStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ProcessedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> HashMap<String, PublishPayload> {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!("Idempotency store is corrupt, treating as empty: {}", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        }
    }

    /// Payload previously recorded for this key, if any.
    pub async fn lookup(&self, key: &DedupKey) -> Option<PublishPayload> {
        self.load().await.get(key.as_str()).cloned()
    }

    /// Insert or overwrite the payload for this key and persist the store.
    pub async fn record(&self, key: &DedupKey, payload: &PublishPayload) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut map = self.load().await;
        map.insert(key.as_str().to_string(), payload.clone());

        let data = serde_json::to_vec_pretty(&map)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.ok();
        }

        // Write beside the store, then rename into place.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &data)
            .await
            .with_context(|| format!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {:?}", self.path))?;
        Ok(())
    }
}
