//! Voting progress and the "important match" cadence.
//!
//! Everything here is a pure function of the voter's vote count and the
//! category size, so the engine can derive it from the same snapshot it used
//! to pick a pair.

use serde::{Deserialize, Serialize};

pub const DEFAULT_IMPORTANT_CADENCE: u32 = 20;

/// Where a voter stands within one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
  pub voted_count:           u64,
  pub total_possible_pairs:  u64,
  pub remaining_pairs:       u64,
  /// `0.0..=100.0`; exactly `100.0` once every pair has been judged.
  pub percentage:            f64,
  /// The pair about to be presented sits on an important position.
  pub is_important_now:      bool,
  /// Votes left before the next important position; `None` when the
  /// upcoming pair is itself important or nothing remains.
  pub votes_until_important: Option<u32>,
}

/// `n * (n - 1) / 2`, or 0 for fewer than two items.
pub fn total_pairs(item_count: usize) -> u64 {
  let n = item_count as u64;
  if n < 2 { 0 } else { n * (n - 1) / 2 }
}

/// Whether the 1-based vote `position` is flagged important. A cadence of 0
/// disables flagging.
pub fn is_important_position(position: u64, cadence: u32) -> bool {
  cadence != 0 && position != 0 && position % u64::from(cadence) == 0
}

pub fn compute(voted_count: u64, item_count: usize, cadence: u32) -> Progress {
  let total = total_pairs(item_count);
  let remaining = total.saturating_sub(voted_count);

  let percentage = if total == 0 {
    0.0
  } else if voted_count >= total {
    100.0
  } else {
    100.0 * voted_count as f64 / total as f64
  };

  let upcoming = voted_count + 1;
  let is_important_now = remaining > 0 && is_important_position(upcoming, cadence);
  let votes_until_important = if remaining == 0 || is_important_now || cadence == 0 {
    None
  } else {
    let into_cycle = (upcoming % u64::from(cadence)) as u32;
    Some(cadence - into_cycle)
  };

  Progress {
    voted_count,
    total_possible_pairs: total,
    remaining_pairs: remaining,
    percentage,
    is_important_now,
    votes_until_important,
  }
}
