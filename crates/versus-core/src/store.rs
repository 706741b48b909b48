//! The `RankingStore` trait and its read models.
//!
//! The trait is implemented by storage backends (e.g. `versus-store-sqlite`).
//! The [`Engine`](crate::engine::Engine) and the HTTP layer depend on this
//! abstraction, not on any concrete backend.

use std::{collections::HashSet, future::Future};

use serde::Serialize;
use uuid::Uuid;

use crate::{
  item::{Category, Item, NewItem},
  limiter::VotingWindow,
  pairing::remaining_pairs,
  progress::total_pairs,
  record::Ballot,
  transaction::{VoteApplied, VoteTerms},
  voter::{Fingerprint, PairKey, Voter},
};

// ─── Read models ─────────────────────────────────────────────────────────────

/// One consistent view of a category from a single voter's perspective.
///
/// Pair selection and progress are both derived from the same snapshot, so
/// the progress reported alongside a pair always matches the history that
/// pair was chosen against.
#[derive(Debug, Clone)]
pub struct VoterSnapshot {
  pub category: Category,
  /// Live items only.
  pub items:    Vec<Item>,
  /// Pairs this voter has judged where both items are still live.
  pub judged:   HashSet<PairKey>,
}

impl VoterSnapshot {
  /// Judged pairs among the snapshot's items.
  pub fn voted_count(&self) -> u64 {
    total_pairs(self.items.len()) - remaining_pairs(&self.items, &self.judged)
  }
}

/// Votes one voter has cast in one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryVotes {
  pub category_id: Uuid,
  pub votes:       u64,
}

/// A voter's activity across every category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoterStats {
  pub total_votes: u64,
  /// Only categories with at least one vote, ordered by category id.
  pub categories:  Vec<CategoryVotes>,
}

/// Outcome of folding an anonymous fingerprint into a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
  pub fingerprint:    Fingerprint,
  pub user_id:        Uuid,
  /// Records now owned by the user.
  pub reassigned:     u64,
  /// Records made inert because the user had already judged the same pair.
  /// Their rating effects stay.
  pub discarded:      u64,
  /// This (fingerprint, user) merge had already run and the fingerprint had
  /// no new history since; nothing changed.
  pub already_merged: bool,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Versus storage backend.
///
/// History is append-only. The only write paths are [`commit_vote`], which
/// runs [`apply_vote`](crate::transaction::apply_vote) inside one
/// transaction, [`merge_voter`], and the item-store collaborator methods.
///
/// Backend errors must convert into [`crate::Error`] so the engine can tell
/// domain rejections raised inside a transaction apart from storage faults.
///
/// [`commit_vote`]: RankingStore::commit_vote
/// [`merge_voter`]: RankingStore::merge_voter
pub trait RankingStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Categories (item-store collaborator) ──────────────────────────────

  /// Create a category. Fails with a duplicate error if the name is taken
  /// (case-insensitively).
  fn add_category(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Category, Self::Error>> + Send + '_;

  fn get_category(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Category>, Self::Error>> + Send + '_;

  fn find_category_by_name(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Option<Category>, Self::Error>> + Send + '_;

  fn list_categories(
    &self,
  ) -> impl Future<Output = Result<Vec<Category>, Self::Error>> + Send + '_;

  // ── Items (item-store collaborator) ───────────────────────────────────

  fn add_item(
    &self,
    input: NewItem,
  ) -> impl Future<Output = Result<Item, Self::Error>> + Send + '_;

  /// Retrieve an item, live or retired.
  fn get_item(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Item>, Self::Error>> + Send + '_;

  /// Remove an item from play. Its history stays but becomes inert. Returns
  /// `false` if the item was missing or already retired.
  fn retire_item(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Live items of a category.
  fn list_items(
    &self,
    category_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Item>, Self::Error>> + Send + '_;

  /// Live items owned by `owner_id`, across categories.
  fn list_owner_items(
    &self,
    owner_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Item>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Read a [`VoterSnapshot`] in one consistent read. `None` if the category
  /// does not exist.
  fn voter_snapshot(
    &self,
    voter: Voter,
    category_id: Uuid,
  ) -> impl Future<Output = Result<Option<VoterSnapshot>, Self::Error>> + Send + '_;

  /// Total accepted votes between live items of a category, across voters.
  /// Merge-discarded records count: they moved ratings.
  fn count_category_votes(
    &self,
    category_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Records currently owned by `voter`, per category, retired items
  /// included.
  fn voter_vote_counts(
    &self,
    voter: Voter,
  ) -> impl Future<Output = Result<Vec<CategoryVotes>, Self::Error>> + Send + '_;

  fn anonymous_window(
    &self,
    fingerprint: Fingerprint,
  ) -> impl Future<Output = Result<Option<VotingWindow>, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Apply one vote atomically: either the record, the window update and
  /// both rating updates all commit, or none do.
  fn commit_vote(
    &self,
    ballot: Ballot,
    terms: VoteTerms,
  ) -> impl Future<Output = Result<VoteApplied, Self::Error>> + Send + '_;

  /// Reassign every record owned by `fingerprint` to `user_id` and discard
  /// the fingerprint's window, atomically. Runs in full on every call, so
  /// guest votes cast after an earlier merge are folded in too; replaying a
  /// merge with nothing new is a no-op.
  fn merge_voter(
    &self,
    fingerprint: Fingerprint,
    user_id: Uuid,
  ) -> impl Future<Output = Result<MergeReport, Self::Error>> + Send + '_;
}
