//! Short-lived staging of masked documents.
//!
//! A staged payload is served back at `/subscription/<key>` so the backend can
//! fetch it by URL. Response headers travel in a side entry under
//! `<key>_headers` as a JSON object.

use async_trait::async_trait;
use axum::http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::StagingError;

const HEADER_SUFFIX: &str = "_headers";
const DEFAULT_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// Raw key-value blob storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
  async fn put(&self, key: &str, value: Bytes) -> Result<(), StagingError>;

  async fn get(&self, key: &str) -> Result<Option<Bytes>, StagingError>;

  async fn delete(&self, key: &str) -> Result<(), StagingError>;
}

pub const DEFAULT_MAX_ENTRIES: usize = 4096;

/// Process-local blob store. Refuses new keys once `max_entries` are held.
#[derive(Debug)]
pub struct MemoryBlobStore {
  blobs: RwLock<HashMap<String, Bytes>>,
  max_entries: usize,
}

impl MemoryBlobStore {
  pub fn with_max_entries(max_entries: usize) -> Self {
    Self {
      blobs: RwLock::new(HashMap::new()),
      max_entries,
    }
  }

  #[cfg(test)]
  pub async fn len(&self) -> usize {
    self.blobs.read().await.len()
  }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
  async fn put(&self, key: &str, value: Bytes) -> Result<(), StagingError> {
    let mut blobs = self.blobs.write().await;
    if blobs.len() >= self.max_entries && !blobs.contains_key(key) {
      return Err(StagingError::Unavailable(format!(
        "memory store full ({} entries)",
        self.max_entries
      )));
    }
    blobs.insert(key.to_string(), value);
    Ok(())
  }

  async fn get(&self, key: &str) -> Result<Option<Bytes>, StagingError> {
    Ok(self.blobs.read().await.get(key).cloned())
  }

  async fn delete(&self, key: &str) -> Result<(), StagingError> {
    self.blobs.write().await.remove(key);
    Ok(())
  }
}

#[derive(Debug, Clone)]
pub struct StagedEntry {
  pub body: Bytes,
  pub headers: HeaderMap,
}

#[derive(Clone)]
pub struct StagingStore {
  blobs: Arc<dyn BlobStore>,
}

fn header_key(key: &str) -> String {
  format!("{key}{HEADER_SUFFIX}")
}

fn headers_to_json(headers: &HeaderMap) -> Vec<u8> {
  let mut out: BTreeMap<&str, String> = BTreeMap::new();
  for (name, value) in headers {
    let Ok(value) = value.to_str() else {
      continue;
    };
    out
      .entry(name.as_str())
      .and_modify(|v| {
        v.push_str(", ");
        v.push_str(value);
      })
      .or_insert_with(|| value.to_string());
  }
  serde_json::to_vec(&out).unwrap_or_else(|_| b"{}".to_vec())
}

fn headers_from_json(key: &str, raw: &[u8]) -> Result<HeaderMap, StagingError> {
  let parsed: BTreeMap<String, String> =
    serde_json::from_slice(raw).map_err(|source| StagingError::Headers {
      key: key.to_string(),
      source,
    })?;
  let mut headers = HeaderMap::new();
  for (name, value) in parsed {
    if let (Ok(name), Ok(value)) = (
      HeaderName::from_bytes(name.as_bytes()),
      HeaderValue::from_str(&value),
    ) {
      headers.insert(name, value);
    }
  }
  Ok(headers)
}

fn default_headers() -> HeaderMap {
  let mut headers = HeaderMap::new();
  headers.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
  headers
}

impl StagingStore {
  pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
    Self { blobs }
  }

  pub fn in_memory(max_entries: usize) -> Self {
    Self::new(Arc::new(MemoryBlobStore::with_max_entries(max_entries)))
  }

  pub async fn put(
    &self,
    key: &str,
    payload: impl Into<Bytes>,
    headers: Option<&HeaderMap>,
  ) -> Result<(), StagingError> {
    self.blobs.put(key, payload.into()).await?;
    if let Some(headers) = headers {
      let stored = self
        .blobs
        .put(&header_key(key), Bytes::from(headers_to_json(headers)))
        .await;
      if let Err(err) = stored {
        let _ = self.blobs.delete(key).await;
        return Err(err);
      }
    }
    Ok(())
  }

  /// Payload and headers for `key`; `text/plain` when no headers were staged.
  /// Header side entries are not addressable on their own.
  pub async fn get(&self, key: &str) -> Result<Option<StagedEntry>, StagingError> {
    if key.ends_with(HEADER_SUFFIX) {
      return Ok(None);
    }
    let Some(body) = self.blobs.get(key).await? else {
      return Ok(None);
    };
    let headers = match self.blobs.get(&header_key(key)).await? {
      Some(raw) => headers_from_json(key, &raw)?,
      None => default_headers(),
    };
    Ok(Some(StagedEntry { body, headers }))
  }

  /// Removes the payload and its header entry. Both deletions are attempted.
  pub async fn delete(&self, key: &str) -> Result<(), StagingError> {
    let body = self.blobs.delete(key).await;
    let headers = self.blobs.delete(&header_key(key)).await;
    body.and(headers)
  }
}
