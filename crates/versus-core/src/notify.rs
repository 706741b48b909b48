//! The outbound "new pair ready" notification.

use serde::Serialize;
use thiserror::Error;

use crate::{engine::PairOffer, voter::Voter};

/// Emitted after a successful vote with the pair that voter should see next.
#[derive(Debug, Clone, Serialize)]
pub struct PairReady {
  pub voter: Voter,
  pub offer: PairOffer,
}

#[derive(Debug, Error)]
#[error("notification not delivered: {0}")]
pub struct SinkError(pub String);

/// Receiver of engine events. Delivery is best-effort: a failure is logged
/// by the engine and never undoes the vote that triggered it.
pub trait NotificationSink: Send + Sync {
  fn publish(&self, event: PairReady) -> Result<(), SinkError>;
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
  fn publish(&self, _event: PairReady) -> Result<(), SinkError> { Ok(()) }
}
