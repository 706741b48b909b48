//! Pair selection for one voter in one category.
//!
//! The selector never materialises all `C(n, 2)` pairs up front. It draws
//! candidate pairs at random and rejects those the voter already judged,
//! giving up after a fixed number of attempts. Only when few pairs remain (or
//! sampling keeps hitting judged pairs) does it enumerate the unjudged pairs
//! exhaustively, which guarantees an answer whenever one exists.
//!
//! Draws are biased toward close matchups near the top of the ranking: a
//! share of draws pick an item from the top tier and pair it with a rank
//! neighbour, and the exhaustive pass gives such pairs extra weight.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  item::Item,
  progress::total_pairs,
  ranking::{rank_order, top_tier_len},
  voter::PairKey,
};

/// Extra weight given to a top-tier pair in the exhaustive pass, divided by
/// the rank distance between the two items.
const PROXIMITY_WEIGHT: f64 = 4.0;

/// Tuning knobs for [`choose_pair`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairingParams {
  /// Random draws before falling back to enumeration.
  pub sample_attempts:      u32,
  /// Enumerate directly once this few pairs remain.
  pub exhaustive_threshold: u64,
  /// Share of the ranking treated as the top tier.
  pub top_tier_fraction:    f64,
  /// Probability that a draw targets a top-tier rank neighbour.
  pub top_tier_bias:        f64,
  /// How many ranks apart a proximity draw may reach.
  pub proximity_window:     usize,
}

impl Default for PairingParams {
  fn default() -> Self {
    Self {
      sample_attempts:      64,
      exhaustive_threshold: 256,
      top_tier_fraction:    0.1,
      top_tier_bias:        0.35,
      proximity_window:     3,
    }
  }
}

/// How a pair was found; reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
  Uniform,
  Proximity,
  Exhaustive,
}

/// A chosen pair, in presentation order.
#[derive(Debug, Clone, Copy)]
pub struct PairPick<'a> {
  pub first:    &'a Item,
  pub second:   &'a Item,
  pub strategy: Strategy,
}

impl PairPick<'_> {
  pub fn key(&self) -> PairKey { PairKey::of(self.first.item_id, self.second.item_id) }
}

/// Number of unjudged pairs among `items`. Judged pairs that involve an item
/// not in `items` (e.g. a retired one) are ignored.
pub fn remaining_pairs(items: &[Item], judged: &HashSet<PairKey>) -> u64 {
  let ids: HashSet<Uuid> = items.iter().map(|i| i.item_id).collect();
  let live_judged = judged
    .iter()
    .filter(|p| ids.contains(&p.low()) && ids.contains(&p.high()))
    .count() as u64;
  total_pairs(items.len()).saturating_sub(live_judged)
}

/// Choose an unjudged pair from `items`, or `None` when the voter has judged
/// every pair.
pub fn choose_pair<'a, R: Rng>(
  items: &'a [Item],
  judged: &HashSet<PairKey>,
  params: &PairingParams,
  rng: &mut R,
) -> Option<PairPick<'a>> {
  if items.len() < 2 {
    return None;
  }
  let remaining = remaining_pairs(items, judged);
  if remaining == 0 {
    return None;
  }

  let ranked = rank_order(items);
  let top_len = top_tier_len(ranked.len(), params.top_tier_fraction);

  let found = if remaining <= params.exhaustive_threshold {
    None
  } else {
    sample(&ranked, top_len, judged, params, rng)
  };
  let (i, j, strategy) = match found {
    Some(hit) => hit,
    None => exhaustive(&ranked, top_len, judged, rng)?,
  };

  let (first, second) = if rng.random_bool(0.5) {
    (ranked[i], ranked[j])
  } else {
    (ranked[j], ranked[i])
  };
  Some(PairPick { first, second, strategy })
}

fn sample<R: Rng>(
  ranked: &[&Item],
  top_len: usize,
  judged: &HashSet<PairKey>,
  params: &PairingParams,
  rng: &mut R,
) -> Option<(usize, usize, Strategy)> {
  let n = ranked.len();
  let bias = params.top_tier_bias.clamp(0.0, 1.0);
  let reach = params.proximity_window.max(1);

  for _ in 0..params.sample_attempts {
    let (i, j, strategy) = if top_len >= 2 && rng.random_bool(bias) {
      let i = rng.random_range(0..top_len);
      let lo = i.saturating_sub(reach);
      let hi = (i + reach).min(top_len - 1);
      // Pick from [lo, hi] minus i.
      let mut j = lo + rng.random_range(0..hi - lo);
      if j >= i {
        j += 1;
      }
      (i, j, Strategy::Proximity)
    } else {
      let i = rng.random_range(0..n);
      let mut j = rng.random_range(0..n - 1);
      if j >= i {
        j += 1;
      }
      (i, j, Strategy::Uniform)
    };

    let key = PairKey::of(ranked[i].item_id, ranked[j].item_id);
    if !judged.contains(&key) {
      return Some((i.min(j), i.max(j), strategy));
    }
  }
  None
}

fn exhaustive<R: Rng>(
  ranked: &[&Item],
  top_len: usize,
  judged: &HashSet<PairKey>,
  rng: &mut R,
) -> Option<(usize, usize, Strategy)> {
  let n = ranked.len();
  let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
  let mut total_weight = 0.0;

  for i in 0..n {
    for j in (i + 1)..n {
      if judged.contains(&PairKey::of(ranked[i].item_id, ranked[j].item_id)) {
        continue;
      }
      let weight = if j < top_len {
        1.0 + PROXIMITY_WEIGHT / (j - i) as f64
      } else {
        1.0
      };
      total_weight += weight;
      candidates.push((i, j, weight));
    }
  }

  let mut target = rng.random::<f64>() * total_weight;
  for &(i, j, weight) in &candidates {
    if target < weight {
      return Some((i, j, Strategy::Exhaustive));
    }
    target -= weight;
  }
  // Floating-point slack can leave `target` just past the last bucket.
  candidates.last().map(|&(i, j, _)| (i, j, Strategy::Exhaustive))
}
