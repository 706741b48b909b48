//! Comparison records: the append-only vote history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Result,
  voter::{PairKey, Voter},
};

/// One voter's pairwise decision. Never updated or deleted once written; the
/// only permitted change is reassigning ownership during a voter merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
  pub record_id:   Uuid,
  pub voter:       Voter,
  pub category_id: Uuid,
  pub winner_id:   Uuid,
  pub loser_id:    Uuid,
  /// Server-assigned.
  pub recorded_at: DateTime<Utc>,
}

impl ComparisonRecord {
  pub fn pair(&self) -> PairKey { PairKey::of(self.winner_id, self.loser_id) }
}

/// A validated vote submission, not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
  pub voter:       Voter,
  pub category_id: Uuid,
  pub winner_id:   Uuid,
  pub loser_id:    Uuid,
}

impl Ballot {
  /// Rejects self-pairing up front so no unit of work is ever opened for it.
  pub fn new(
    voter: Voter,
    category_id: Uuid,
    winner_id: Uuid,
    loser_id: Uuid,
  ) -> Result<Self> {
    PairKey::new(winner_id, loser_id)?;
    Ok(Self { voter, category_id, winner_id, loser_id })
  }

  pub fn pair(&self) -> PairKey { PairKey::of(self.winner_id, self.loser_id) }

  /// The record this ballot produces when accepted at `now`.
  pub fn into_record(self, now: DateTime<Utc>) -> ComparisonRecord {
    ComparisonRecord {
      record_id:   Uuid::new_v4(),
      voter:       self.voter,
      category_id: self.category_id,
      winner_id:   self.winner_id,
      loser_id:    self.loser_id,
      recorded_at: now,
    }
  }
}
