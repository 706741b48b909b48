//! Elo rating update for a single pairwise outcome.

use serde::{Deserialize, Serialize};

use crate::item::Item;

pub const DEFAULT_K: f64 = 32.0;
pub const DEFAULT_BASELINE: f64 = 1200.0;

/// Probability that an item rated `rating` beats one rated `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
  1.0 / (1.0 + 10f64.powf((opponent - rating) / 400.0))
}

/// Before/after ratings for one applied outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingChange {
  pub winner_before: f64,
  pub loser_before:  f64,
  pub winner_after:  f64,
  pub loser_after:   f64,
  /// Points moved from loser to winner; never negative.
  pub delta:         f64,
}

/// Compute the symmetric update: the winner gains exactly what the loser
/// gives up.
pub fn apply(winner: f64, loser: f64, k: f64) -> RatingChange {
  let expected_winner = expected_score(winner, loser);
  let delta = k * (1.0 - expected_winner);
  RatingChange {
    winner_before: winner,
    loser_before:  loser,
    winner_after:  winner + delta,
    loser_after:   loser - delta,
    delta,
  }
}

/// Apply an outcome to both items in place, including the duel counters.
pub fn record_outcome(winner: &mut Item, loser: &mut Item, k: f64) -> RatingChange {
  let change = apply(winner.rating, loser.rating, k);
  winner.rating = change.winner_after;
  loser.rating = change.loser_after;
  winner.comparisons += 1;
  loser.comparisons += 1;
  winner.wins += 1;
  change
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;

  fn item(rating: f64) -> Item {
    Item {
      item_id: Uuid::new_v4(),
      category_id: Uuid::nil(),
      owner_id: Uuid::nil(),
      label: "photo.jpg".into(),
      rating,
      comparisons: 0,
      wins: 0,
      created_at: Utc::now(),
      retired_at: None,
    }
  }

  #[test]
  fn equal_ratings_move_half_of_k() {
    let change = apply(DEFAULT_BASELINE, DEFAULT_BASELINE, DEFAULT_K);
    assert_eq!(change.winner_after, 1216.0);
    assert_eq!(change.loser_after, 1184.0);
    assert_eq!(change.delta, 16.0);
  }

  #[test]
  fn underdog_win_moves_more_than_favourite_win() {
    let upset = apply(1100.0, 1300.0, DEFAULT_K);
    let expected = apply(1300.0, 1100.0, DEFAULT_K);
    assert!(upset.delta > expected.delta);
    assert!(upset.delta < DEFAULT_K);
  }

  #[test]
  fn update_is_directional() {
    let change = apply(1500.0, 1400.0, DEFAULT_K);
    assert!(change.winner_after > change.winner_before);
    assert!(change.loser_after < change.loser_before);
    let before = change.winner_before + change.loser_before;
    let after = change.winner_after + change.loser_after;
    assert!((before - after).abs() < 1e-9);
  }

  #[test]
  fn extreme_gap_yields_negligible_delta() {
    let change = apply(10_000.0, 0.0, DEFAULT_K);
    assert!(change.delta >= 0.0);
    assert!(change.delta < 1e-9);
  }

  #[test]
  fn record_outcome_updates_counters() {
    let mut a = item(DEFAULT_BASELINE);
    let mut b = item(DEFAULT_BASELINE);
    a.comparisons = 3;
    b.comparisons = 3;
    a.wins = 1;
    record_outcome(&mut a, &mut b, DEFAULT_K);
    assert_eq!(a.comparisons, 4);
    assert_eq!(b.comparisons, 4);
    assert_eq!(a.wins, 2);
    assert_eq!(b.wins, 0);
    assert_eq!(b.losses(), 4);
  }
}
