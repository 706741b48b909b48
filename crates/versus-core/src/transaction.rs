//! The vote unit of work.
//!
//! Accepting a vote touches four things: the anti-repeat check, the anonymous
//! window, the history log and two item ratings. [`apply_vote`] expresses the
//! whole procedure against [`VoteUnitOfWork`], a handle on one open storage
//! transaction. The backend commits only if `apply_vote` returns `Ok`; any
//! error leaves the transaction to roll back, so no partial state survives.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error,
  item::Item,
  limiter::{LimiterPolicy, VotingWindow},
  rating::{self, RatingChange},
  record::{Ballot, ComparisonRecord},
  voter::{Fingerprint, PairKey, Voter},
};

/// Reads and writes available inside one vote transaction.
///
/// Implementations must run every call against the same open transaction and
/// hold the store's write lock for its whole lifetime, so the judged-pair
/// check cannot race a concurrent insert.
pub trait VoteUnitOfWork {
  type Error: From<Error>;

  fn load_item(&mut self, item_id: Uuid) -> Result<Option<Item>, Self::Error>;

  fn has_judged(
    &mut self,
    voter: &Voter,
    category_id: Uuid,
    pair: PairKey,
  ) -> Result<bool, Self::Error>;

  fn load_window(
    &mut self,
    fingerprint: &Fingerprint,
  ) -> Result<Option<VotingWindow>, Self::Error>;

  fn save_window(&mut self, window: &VotingWindow) -> Result<(), Self::Error>;

  fn insert_record(&mut self, record: &ComparisonRecord) -> Result<(), Self::Error>;

  fn save_rating(&mut self, item: &Item) -> Result<(), Self::Error>;
}

/// Parameters a vote is applied under.
#[derive(Debug, Clone, Copy)]
pub struct VoteTerms {
  pub k_factor: f64,
  pub limiter:  LimiterPolicy,
  pub now:      DateTime<Utc>,
}

/// Everything written by one accepted vote.
#[derive(Debug, Clone)]
pub struct VoteApplied {
  pub record: ComparisonRecord,
  pub winner: Item,
  pub loser:  Item,
  pub change: RatingChange,
  /// The advanced window for anonymous voters.
  pub window: Option<VotingWindow>,
}

/// Run one vote inside `uow`. Every check happens before the first write.
pub fn apply_vote<U: VoteUnitOfWork>(
  uow: &mut U,
  ballot: &Ballot,
  terms: &VoteTerms,
) -> Result<VoteApplied, U::Error> {
  let pair = PairKey::new(ballot.winner_id, ballot.loser_id)?;
  let mut winner = load_member(uow, ballot.winner_id, ballot.category_id)?;
  let mut loser = load_member(uow, ballot.loser_id, ballot.category_id)?;

  if uow.has_judged(&ballot.voter, ballot.category_id, pair)? {
    return Err(
      Error::AlreadyJudged { low: pair.low(), high: pair.high() }.into(),
    );
  }

  let window = match ballot.voter.fingerprint() {
    Some(fp) => {
      let current = uow.load_window(fp)?;
      Some(terms.limiter.admit(fp, current.as_ref(), terms.now)?)
    }
    None => None,
  };

  // Writes start here.
  if let Some(w) = &window {
    uow.save_window(w)?;
  }
  let record = ballot.clone().into_record(terms.now);
  uow.insert_record(&record)?;

  let change = rating::record_outcome(&mut winner, &mut loser, terms.k_factor);
  uow.save_rating(&winner)?;
  uow.save_rating(&loser)?;

  Ok(VoteApplied { record, winner, loser, change, window })
}

fn load_member<U: VoteUnitOfWork>(
  uow: &mut U,
  item_id: Uuid,
  category_id: Uuid,
) -> Result<Item, U::Error> {
  let item = uow.load_item(item_id)?.ok_or(Error::ItemNotFound(item_id))?;
  if item.category_id != category_id || !item.is_live() {
    return Err(Error::ItemNotInCategory { item: item_id, category: category_id }.into());
  }
  Ok(item)
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use chrono::TimeZone;

  use super::*;
  use crate::Result;

  /// A map-backed unit of work that stages writes until `commit`.
  #[derive(Default)]
  struct Staged {
    items:   HashMap<Uuid, Item>,
    records: Vec<ComparisonRecord>,
    windows: HashMap<Fingerprint, VotingWindow>,
    writes:  usize,
  }

  impl VoteUnitOfWork for Staged {
    type Error = Error;

    fn load_item(&mut self, id: Uuid) -> Result<Option<Item>> {
      Ok(self.items.get(&id).cloned())
    }

    fn has_judged(&mut self, voter: &Voter, category_id: Uuid, pair: PairKey) -> Result<bool> {
      Ok(self.records.iter().any(|r| {
        &r.voter == voter && r.category_id == category_id && r.pair() == pair
      }))
    }

    fn load_window(&mut self, fp: &Fingerprint) -> Result<Option<VotingWindow>> {
      Ok(self.windows.get(fp).cloned())
    }

    fn save_window(&mut self, w: &VotingWindow) -> Result<()> {
      self.writes += 1;
      self.windows.insert(w.fingerprint.clone(), w.clone());
      Ok(())
    }

    fn insert_record(&mut self, r: &ComparisonRecord) -> Result<()> {
      self.writes += 1;
      self.records.push(r.clone());
      Ok(())
    }

    fn save_rating(&mut self, item: &Item) -> Result<()> {
      self.writes += 1;
      self.items.insert(item.item_id, item.clone());
      Ok(())
    }
  }

  fn item(category_id: Uuid) -> Item {
    Item {
      item_id: Uuid::new_v4(),
      category_id,
      owner_id: Uuid::nil(),
      label: "p.jpg".into(),
      rating: 1200.0,
      comparisons: 0,
      wins: 0,
      created_at: Utc::now(),
      retired_at: None,
    }
  }

  fn terms() -> VoteTerms {
    VoteTerms {
      k_factor: 32.0,
      limiter:  LimiterPolicy::default(),
      now:      Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
  }

  fn setup() -> (Staged, Uuid, Vec<Uuid>) {
    let category = Uuid::new_v4();
    let mut uow = Staged::default();
    let ids = (0..3)
      .map(|_| {
        let it = item(category);
        let id = it.item_id;
        uow.items.insert(id, it);
        id
      })
      .collect();
    (uow, category, ids)
  }

  #[test]
  fn accepted_vote_writes_record_and_ratings() {
    let (mut uow, cat, ids) = setup();
    let voter = Voter::User(Uuid::new_v4());
    let ballot = Ballot::new(voter, cat, ids[0], ids[1]).unwrap();

    let applied = apply_vote(&mut uow, &ballot, &terms()).unwrap();
    assert_eq!(applied.winner.rating, 1216.0);
    assert_eq!(applied.loser.rating, 1184.0);
    assert_eq!(applied.window, None);
    assert_eq!(uow.records.len(), 1);
    assert_eq!(uow.items[&ids[0]].wins, 1);
  }

  #[test]
  fn repeat_pair_is_rejected_without_writes() {
    let (mut uow, cat, ids) = setup();
    let voter = Voter::User(Uuid::new_v4());
    apply_vote(&mut uow, &Ballot::new(voter.clone(), cat, ids[0], ids[1]).unwrap(), &terms())
      .unwrap();
    let writes = uow.writes;

    // Reversed winner/loser is still the same unordered pair.
    let again = Ballot::new(voter, cat, ids[1], ids[0]).unwrap();
    let err = apply_vote(&mut uow, &again, &terms()).unwrap_err();
    assert!(matches!(err, Error::AlreadyJudged { .. }));
    assert_eq!(uow.writes, writes);
  }

  #[test]
  fn foreign_or_retired_items_are_rejected() {
    let (mut uow, cat, ids) = setup();
    let outsider = item(Uuid::new_v4());
    let outsider_id = outsider.item_id;
    uow.items.insert(outsider_id, outsider);
    uow.items.get_mut(&ids[2]).unwrap().retired_at = Some(Utc::now());

    let voter = Voter::User(Uuid::new_v4());
    for other in [outsider_id, ids[2]] {
      let ballot = Ballot::new(voter.clone(), cat, ids[0], other).unwrap();
      let err = apply_vote(&mut uow, &ballot, &terms()).unwrap_err();
      assert!(matches!(err, Error::ItemNotInCategory { .. }), "{err:?}");
    }
    let ballot = Ballot::new(voter, cat, ids[0], Uuid::new_v4()).unwrap();
    assert!(matches!(
      apply_vote(&mut uow, &ballot, &terms()),
      Err(Error::ItemNotFound(_))
    ));
    assert_eq!(uow.writes, 0);
  }

  #[test]
  fn anonymous_vote_at_cap_is_rejected_without_writes() {
    let (mut uow, cat, ids) = setup();
    let fp = Fingerprint::new("beef").unwrap();
    uow.windows.insert(fp.clone(), VotingWindow {
      fingerprint:  fp.clone(),
      count:        10,
      window_start: terms().now,
    });

    let ballot = Ballot::new(Voter::Anonymous(fp), cat, ids[0], ids[1]).unwrap();
    let err = apply_vote(&mut uow, &ballot, &terms()).unwrap_err();
    assert!(matches!(err, Error::RateLimited { remaining: 0, .. }));
    assert_eq!(uow.writes, 0);
    assert!(uow.records.is_empty());
  }

  #[test]
  fn anonymous_vote_advances_window() {
    let (mut uow, cat, ids) = setup();
    let fp = Fingerprint::new("beef").unwrap();
    let ballot = Ballot::new(Voter::Anonymous(fp.clone()), cat, ids[0], ids[1]).unwrap();

    let applied = apply_vote(&mut uow, &ballot, &terms()).unwrap();
    assert_eq!(applied.window.as_ref().map(|w| w.count), Some(1));
    assert_eq!(uow.windows[&fp].count, 1);
  }
}
