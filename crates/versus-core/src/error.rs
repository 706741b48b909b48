//! Error types for `versus-core`.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("an item cannot be compared with itself")]
  SelfPairing,

  #[error("category {0} does not exist or has fewer than two items")]
  InvalidCategory(Uuid),

  #[error("category not found: {0}")]
  CategoryNotFound(Uuid),

  #[error("no category named {0:?}")]
  UnknownCategoryName(String),

  #[error("item not found: {0}")]
  ItemNotFound(Uuid),

  #[error("item {item} does not belong to category {category}")]
  ItemNotInCategory { item: Uuid, category: Uuid },

  #[error("invalid voter fingerprint: {0:?}")]
  InvalidFingerprint(String),

  #[error("a category named {0:?} already exists")]
  DuplicateCategory(String),

  #[error("pair {low}/{high} was already judged by this voter")]
  AlreadyJudged { low: Uuid, high: Uuid },

  #[error("anonymous vote limit reached; window resets at {resets_at}")]
  RateLimited {
    remaining: u32,
    resets_at: DateTime<Utc>,
  },

  #[error("no more pairs to vote on in category {0}")]
  NoPairsAvailable(Uuid),

  #[error("invalid engine settings: {0}")]
  InvalidSettings(String),

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse classification used by callers to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Bad input; rejected before any state was touched.
  Validation,
  NotFound,
  /// The voter already judged this pair; re-select instead of retrying.
  Conflict,
  /// A policy rejection (anonymous rate limit), not a data-integrity error.
  Policy,
  /// The voter has judged every pair in the category.
  Exhausted,
  /// The transaction did not commit and was rolled back in full.
  Storage,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::SelfPairing
      | Self::InvalidCategory(_)
      | Self::ItemNotInCategory { .. }
      | Self::InvalidFingerprint(_)
      | Self::InvalidSettings(_) => ErrorKind::Validation,
      Self::CategoryNotFound(_)
      | Self::UnknownCategoryName(_)
      | Self::ItemNotFound(_) => ErrorKind::NotFound,
      Self::AlreadyJudged { .. } | Self::DuplicateCategory(_) => {
        ErrorKind::Conflict
      }
      Self::RateLimited { .. } => ErrorKind::Policy,
      Self::NoPairsAvailable(_) => ErrorKind::Exhausted,
      Self::Storage(_) => ErrorKind::Storage,
    }
  }

  /// Whether replaying the same call unchanged may succeed. A replayed vote
  /// that did land the first time comes back as [`Error::AlreadyJudged`]
  /// rather than being double-counted.
  pub fn is_retryable(&self) -> bool { self.kind() == ErrorKind::Storage }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
