//! Rank order within a category and the leaderboard built from it.

use std::cmp::Ordering;

use crate::item::{Item, LeaderboardEntry};

/// Hard ceiling on leaderboard length.
pub const MAX_LEADERBOARD: usize = 1000;

/// Rating descending; equal ratings put the lower id first.
pub fn rank_cmp(a: &Item, b: &Item) -> Ordering {
  b.rating
    .total_cmp(&a.rating)
    .then_with(|| a.item_id.cmp(&b.item_id))
}

/// Borrow `items` in rank order.
pub fn rank_order(items: &[Item]) -> Vec<&Item> {
  let mut ordered: Vec<&Item> = items.iter().collect();
  ordered.sort_by(|a, b| rank_cmp(a, b));
  ordered
}

/// 1-based position of `item` among `peers` under [`rank_cmp`]. `item` need
/// not be in `peers`.
pub fn rank_of(item: &Item, peers: &[Item]) -> u32 {
  let ahead = peers
    .iter()
    .filter(|other| other.item_id != item.item_id && rank_cmp(other, item) == Ordering::Less)
    .count();
  ahead as u32 + 1
}

/// Number of items in the top tier: `fraction` of the category, rounded up,
/// but never fewer than two (a tier of one cannot form a pair).
pub fn top_tier_len(item_count: usize, fraction: f64) -> usize {
  if item_count < 2 {
    return item_count;
  }
  let scaled = (item_count as f64 * fraction).ceil() as usize;
  scaled.clamp(2, item_count)
}

/// Live items with at least `min_comparisons` duels, in rank order.
///
/// A `limit` of 0 means "as many as allowed", capped at [`MAX_LEADERBOARD`].
pub fn leaderboard(
  mut items: Vec<Item>,
  min_comparisons: u32,
  limit: usize,
) -> Vec<LeaderboardEntry> {
  items.retain(|i| i.is_live() && i.comparisons >= min_comparisons);
  items.sort_by(rank_cmp);

  let cap = if limit == 0 { MAX_LEADERBOARD } else { limit.min(MAX_LEADERBOARD) };
  items
    .into_iter()
    .take(cap)
    .enumerate()
    .map(|(pos, item)| LeaderboardEntry { rank: pos as u32 + 1, item })
    .collect()
}
