//! Categories and the rankable items inside them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rating::DEFAULT_BASELINE;

/// An independent ranking pool. Pairing, progress and leaderboards are always
/// scoped to exactly one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
  pub category_id: Uuid,
  /// Unique, compared case-insensitively.
  pub name:        String,
  pub created_at:  DateTime<Utc>,
}

/// A rankable entity (a photo) and its rating state.
///
/// Only the vote unit of work changes `rating`, `comparisons` and `wins`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
  pub item_id:     Uuid,
  pub category_id: Uuid,
  /// Uploader, opaque to the engine.
  pub owner_id:    Uuid,
  /// Display label supplied by the item store (e.g. a file name).
  pub label:       String,
  pub rating:      f64,
  pub comparisons: u32,
  /// Always `<= comparisons`.
  pub wins:        u32,
  pub created_at:  DateTime<Utc>,
  /// Set once the item store removes the item; retired items are never paired
  /// again and their history becomes inert.
  pub retired_at:  Option<DateTime<Utc>>,
}

impl Item {
  pub fn is_live(&self) -> bool { self.retired_at.is_none() }

  pub fn losses(&self) -> u32 { self.comparisons - self.wins }
}

/// Input to [`crate::store::RankingStore::add_item`].
#[derive(Debug, Clone)]
pub struct NewItem {
  pub category_id:    Uuid,
  pub owner_id:       Uuid,
  pub label:          String,
  pub initial_rating: f64,
}

impl NewItem {
  /// An item starting at the default baseline rating.
  pub fn new(category_id: Uuid, owner_id: Uuid, label: impl Into<String>) -> Self {
    Self {
      category_id,
      owner_id,
      label: label.into(),
      initial_rating: DEFAULT_BASELINE,
    }
  }

  pub fn with_rating(mut self, rating: f64) -> Self {
    self.initial_rating = rating;
    self
  }
}

/// One row of a category leaderboard.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
  /// 1-based position.
  pub rank: u32,
  pub item: Item,
}

/// Aggregate figures for a category page.
#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
  pub category:    Category,
  pub item_count:  usize,
  /// Every vote that moved ratings between live items, including records
  /// made inert by a voter merge.
  pub total_votes: u64,
  pub leader:      Option<Item>,
}

/// One of an owner's items with its standing in its category.
#[derive(Debug, Clone, Serialize)]
pub struct OwnedItem {
  /// 1-based position among the category's live items, whether or not the
  /// item has enough duels to show on the leaderboard.
  pub rank:          u32,
  pub category_name: String,
  pub item:          Item,
}

/// An owner's live items, best first, plus the owner's own voting activity.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerStats {
  pub owner_id:    Uuid,
  pub total_items: usize,
  /// Votes cast by the owner as an authenticated voter.
  pub total_votes: u64,
  pub items:       Vec<OwnedItem>,
}
