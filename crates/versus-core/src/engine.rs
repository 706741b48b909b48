//! The ranking engine: pair selection, vote recording and progress.
//!
//! [`Engine`] is the only entry point the request-handling layer needs. It
//! holds no per-voter state; every call names its [`Voter`] explicitly.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use chrono::Utc;
use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  item::{Category, CategorySummary, Item, LeaderboardEntry, OwnedItem, OwnerStats},
  limiter::GuestStats,
  notify::{NotificationSink, NullSink, PairReady},
  pairing,
  progress::{self, Progress},
  ranking,
  rating::RatingChange,
  record::{Ballot, ComparisonRecord},
  settings::EngineSettings,
  store::{MergeReport, RankingStore, VoterSnapshot, VoterStats},
  transaction::VoteTerms,
  voter::{Fingerprint, Voter},
};

// ─── Results ─────────────────────────────────────────────────────────────────

/// A pair to present to a voter, with progress computed from the same
/// history the pair was chosen against.
#[derive(Debug, Clone, Serialize)]
pub struct PairOffer {
  pub category_id: Uuid,
  pub first:       Item,
  pub second:      Item,
  pub progress:    Progress,
}

/// What the caller gets back for an accepted vote.
#[derive(Debug, Clone, Serialize)]
pub struct VoteReceipt {
  pub record:                    ComparisonRecord,
  pub winner:                    Item,
  pub loser:                     Item,
  pub change:                    RatingChange,
  /// `None` only if the post-vote read failed; the vote itself stands.
  pub progress:                  Option<Progress>,
  /// Votes left in the anonymous window; `None` for authenticated voters.
  pub remaining_anonymous_votes: Option<u32>,
  /// The pair to serve next, or `None` once the category is exhausted.
  pub next:                      Option<PairOffer>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S, N = NullSink> {
  store:    Arc<S>,
  sink:     Arc<N>,
  settings: EngineSettings,
  rng:      Mutex<StdRng>,
}

fn storage<E: Into<Error>>(e: E) -> Error { e.into() }

impl<S, N> Engine<S, N>
where
  S: RankingStore,
  N: NotificationSink,
{
  pub fn new(store: Arc<S>, sink: Arc<N>, settings: EngineSettings) -> Result<Self> {
    settings.validate()?;
    let rng = match settings.seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_os_rng(),
    };
    Ok(Self { store, sink, settings, rng: Mutex::new(rng) })
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn settings(&self) -> &EngineSettings { &self.settings }

  pub fn sink(&self) -> &Arc<N> { &self.sink }

  // ── Pair selection ────────────────────────────────────────────────────

  /// Choose the next pair for `voter`. Read-only: the pair is not reserved.
  ///
  /// Fails with [`Error::InvalidCategory`] for a missing category or one with
  /// fewer than two live items, and [`Error::NoPairsAvailable`] once the
  /// voter has judged every pair.
  pub async fn select_pair(&self, voter: &Voter, category_id: Uuid) -> Result<PairOffer> {
    let snapshot = self
      .store
      .voter_snapshot(voter.clone(), category_id)
      .await
      .map_err(storage)?
      .filter(|s| s.items.len() >= 2)
      .ok_or(Error::InvalidCategory(category_id))?;

    self
      .offer(voter, &snapshot)
      .ok_or(Error::NoPairsAvailable(category_id))
  }

  fn offer(&self, voter: &Voter, snapshot: &VoterSnapshot) -> Option<PairOffer> {
    let progress = self.progress_of(snapshot);
    let params = self.settings.pairing();
    let pick = {
      let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
      pairing::choose_pair(&snapshot.items, &snapshot.judged, &params, &mut *rng)
    }?;

    debug!(
      voter = %voter,
      category = %snapshot.category.category_id,
      strategy = ?pick.strategy,
      remaining = progress.remaining_pairs,
      "selected pair"
    );
    Some(PairOffer {
      category_id: snapshot.category.category_id,
      first: pick.first.clone(),
      second: pick.second.clone(),
      progress,
    })
  }

  // ── Voting ────────────────────────────────────────────────────────────

  /// Record that `voter` preferred `winner_id` over `loser_id`.
  ///
  /// The anti-repeat check, the anonymous limit, the history insert and both
  /// rating updates commit as one unit. After commit the next pair for the
  /// voter is published to the notification sink; neither that lookup nor
  /// delivery can fail the vote.
  pub async fn record_vote(
    &self,
    voter: &Voter,
    category_id: Uuid,
    winner_id: Uuid,
    loser_id: Uuid,
  ) -> Result<VoteReceipt> {
    let ballot = Ballot::new(voter.clone(), category_id, winner_id, loser_id)?;
    if self.store.get_category(category_id).await.map_err(storage)?.is_none() {
      return Err(Error::InvalidCategory(category_id));
    }

    let terms = VoteTerms {
      k_factor: self.settings.k_factor,
      limiter:  self.settings.limiter(),
      now:      Utc::now(),
    };
    let applied = match self.store.commit_vote(ballot, terms).await.map_err(storage) {
      Ok(applied) => applied,
      Err(e) => {
        debug!(voter = %voter, category = %category_id, error = %e, "vote rejected");
        return Err(e);
      }
    };
    info!(
      voter = %voter,
      category = %category_id,
      winner = %winner_id,
      loser = %loser_id,
      delta = applied.change.delta,
      "vote recorded"
    );

    let remaining_anonymous_votes = applied
      .window
      .as_ref()
      .map(|w| terms.limiter.remaining(Some(w), terms.now));

    let (progress, next) = match self.store.voter_snapshot(voter.clone(), category_id).await {
      Ok(Some(snapshot)) => (Some(self.progress_of(&snapshot)), self.offer(voter, &snapshot)),
      Ok(None) => (None, None),
      Err(e) => {
        warn!(voter = %voter, category = %category_id, error = %e, "post-vote read failed");
        (None, None)
      }
    };

    if let Some(offer) = &next {
      let event = PairReady { voter: voter.clone(), offer: offer.clone() };
      if let Err(e) = self.sink.publish(event) {
        warn!(voter = %voter, error = %e, "pair-ready notification dropped");
      }
    }

    Ok(VoteReceipt {
      record: applied.record,
      winner: applied.winner,
      loser: applied.loser,
      change: applied.change,
      progress,
      remaining_anonymous_votes,
      next,
    })
  }

  // ── Progress ──────────────────────────────────────────────────────────

  pub async fn compute_progress(&self, voter: &Voter, category_id: Uuid) -> Result<Progress> {
    let snapshot = self
      .store
      .voter_snapshot(voter.clone(), category_id)
      .await
      .map_err(storage)?
      .ok_or(Error::CategoryNotFound(category_id))?;
    Ok(self.progress_of(&snapshot))
  }

  fn progress_of(&self, snapshot: &VoterSnapshot) -> Progress {
    progress::compute(
      snapshot.voted_count(),
      snapshot.items.len(),
      self.settings.important_cadence,
    )
  }

  // ── Anonymous voters ──────────────────────────────────────────────────

  pub async fn guest_stats(&self, fingerprint: &Fingerprint) -> Result<GuestStats> {
    let window = self
      .store
      .anonymous_window(fingerprint.clone())
      .await
      .map_err(storage)?;
    Ok(self.settings.limiter().stats(window.as_ref(), Utc::now()))
  }

  /// Fold an anonymous voter's history into a newly authenticated user.
  pub async fn merge_voter(
    &self,
    fingerprint: &Fingerprint,
    user_id: Uuid,
  ) -> Result<MergeReport> {
    let report = self
      .store
      .merge_voter(fingerprint.clone(), user_id)
      .await
      .map_err(storage)?;
    if report.already_merged {
      debug!(fingerprint = %fingerprint, user = %user_id, "merge already applied");
    } else {
      info!(
        fingerprint = %fingerprint,
        user = %user_id,
        reassigned = report.reassigned,
        discarded = report.discarded,
        "merged anonymous history"
      );
    }
    Ok(report)
  }

  // ── Per-voter statistics ──────────────────────────────────────────────

  /// How many votes `voter` has cast, overall and per category.
  pub async fn voter_stats(&self, voter: &Voter) -> Result<VoterStats> {
    let categories = self
      .store
      .voter_vote_counts(voter.clone())
      .await
      .map_err(storage)?;
    let total_votes = categories.iter().map(|c| c.votes).sum();
    Ok(VoterStats { total_votes, categories })
  }

  /// An owner's live items with their rank in their own category.
  pub async fn owner_items(&self, owner_id: Uuid) -> Result<OwnerStats> {
    let owned = self.store.list_owner_items(owner_id).await.map_err(storage)?;

    let mut peers: HashMap<Uuid, (String, Vec<Item>)> = HashMap::new();
    for item in &owned {
      if peers.contains_key(&item.category_id) {
        continue;
      }
      let category = self
        .store
        .get_category(item.category_id)
        .await
        .map_err(storage)?
        .ok_or(Error::CategoryNotFound(item.category_id))?;
      let live = self.store.list_items(item.category_id).await.map_err(storage)?;
      peers.insert(item.category_id, (category.name, live));
    }

    let mut items: Vec<OwnedItem> = owned
      .into_iter()
      .filter_map(|item| {
        let (name, live) = peers.get(&item.category_id)?;
        Some(OwnedItem {
          rank: ranking::rank_of(&item, live),
          category_name: name.clone(),
          item,
        })
      })
      .collect();
    items.sort_by(|a, b| ranking::rank_cmp(&a.item, &b.item));

    let total_votes = self.voter_stats(&Voter::User(owner_id)).await?.total_votes;
    Ok(OwnerStats { owner_id, total_items: items.len(), total_votes, items })
  }

  // ── Leaderboards ──────────────────────────────────────────────────────

  pub async fn leaderboard(&self, category_id: Uuid, limit: usize) -> Result<Vec<LeaderboardEntry>> {
    if self.store.get_category(category_id).await.map_err(storage)?.is_none() {
      return Err(Error::CategoryNotFound(category_id));
    }
    let items = self.store.list_items(category_id).await.map_err(storage)?;
    Ok(ranking::leaderboard(items, self.settings.leaderboard_min_comparisons, limit))
  }

  /// Case-insensitive category lookup.
  pub async fn find_category(&self, name: &str) -> Result<Category> {
    self
      .store
      .find_category_by_name(name.to_owned())
      .await
      .map_err(storage)?
      .ok_or_else(|| Error::UnknownCategoryName(name.to_owned()))
  }

  pub async fn leaderboard_by_name(&self, name: &str, limit: usize) -> Result<Vec<LeaderboardEntry>> {
    let category = self.find_category(name).await?;
    self.leaderboard(category.category_id, limit).await
  }

  pub async fn category_summary(&self, category_id: Uuid) -> Result<CategorySummary> {
    let category = self
      .store
      .get_category(category_id)
      .await
      .map_err(storage)?
      .ok_or(Error::CategoryNotFound(category_id))?;
    let items = self.store.list_items(category_id).await.map_err(storage)?;
    let total_votes = self
      .store
      .count_category_votes(category_id)
      .await
      .map_err(storage)?;

    let item_count = items.len();
    let leader = ranking::leaderboard(items, self.settings.leaderboard_min_comparisons, 1)
      .into_iter()
      .next()
      .map(|entry| entry.item);

    Ok(CategorySummary { category, item_count, total_votes, leader })
  }
}
