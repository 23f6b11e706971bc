//! Observability hooks for the conversion pipeline.
//!
//! The orchestrator reports what happens through [`ConversionObserver`];
//! masking and recovery functions never log. Events carry kinds, counts and
//! staging keys only, never server addresses or secrets.

use crate::error::{ConvertError, StagingError};
use crate::recovery::RecoveryPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Ingesting,
  Masking,
  Dispatching,
  Recovering,
  Done,
}

impl Stage {
  pub fn as_str(self) -> &'static str {
    match self {
      Stage::Ingesting => "ingesting",
      Stage::Masking => "masking",
      Stage::Dispatching => "dispatching",
      Stage::Recovering => "recovering",
      Stage::Done => "done",
    }
  }
}

/// Why an input segment contributed nothing to the backend request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
  FetchFailed,
  HttpStatus(u16),
  Unparseable,
  NothingMasked,
}

pub trait ConversionObserver: Send + Sync {
  fn stage(&self, _stage: Stage) {}

  fn segment_masked(&self, _index: usize, _kind: &str, _placeholders: usize) {}

  fn segment_skipped(&self, _index: usize, _reason: &SkipReason) {}

  fn staged(&self, _key: &str, _bytes: usize) {}

  fn dispatched(&self, _backend: &str, _status: u16) {}

  fn recovered(&self, _path: RecoveryPath) {}

  fn cleanup_failed(&self, _key: &str, _error: &StagingError) {}

  fn failed(&self, _stage: Stage, _error: &ConvertError) {}
}

/// Emits every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ConversionObserver for TracingObserver {
  fn stage(&self, stage: Stage) {
    tracing::trace!(stage = stage.as_str(), "conversion stage");
  }

  fn segment_masked(&self, index: usize, kind: &str, placeholders: usize) {
    tracing::debug!(segment = index, kind, placeholders, "segment masked");
  }

  fn segment_skipped(&self, index: usize, reason: &SkipReason) {
    tracing::info!(segment = index, reason = ?reason, "segment skipped");
  }

  fn staged(&self, key: &str, bytes: usize) {
    tracing::debug!(key, bytes, "staged masked document");
  }

  fn dispatched(&self, backend: &str, status: u16) {
    tracing::info!(backend, status, "backend responded");
  }

  fn recovered(&self, path: RecoveryPath) {
    match path {
      RecoveryPath::Subscription { recovered, dropped } => {
        tracing::debug!(recovered, dropped, "recovered base64 subscription");
      }
      RecoveryPath::Text => tracing::debug!("recovered text body"),
    }
  }

  fn cleanup_failed(&self, key: &str, error: &StagingError) {
    tracing::warn!(key, error = %error, "failed to delete staged entry");
  }

  fn failed(&self, stage: Stage, error: &ConvertError) {
    tracing::warn!(stage = stage.as_str(), error = %error, "conversion failed");
  }
}
