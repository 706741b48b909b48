//! [`SqliteStore`], the SQLite implementation of [`RankingStore`].

use std::{collections::HashSet, path::Path};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tracing::debug;
use uuid::Uuid;

use versus_core::{
  item::{Category, Item, NewItem},
  limiter::VotingWindow,
  record::{Ballot, ComparisonRecord},
  store::{CategoryVotes, MergeReport, RankingStore, VoterSnapshot},
  transaction::{VoteApplied, VoteTerms, VoteUnitOfWork, apply_vote},
  voter::{Fingerprint, PairKey, Voter},
};

use crate::{
  Error, Result,
  encode::{
    CATEGORY_COLUMNS, ITEM_COLUMNS, RawCategory, RawItem, RawWindow, decode_uuid, encode_dt,
    encode_uuid,
  },
  schema::SCHEMA,
};

fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
  )
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Versus ranking store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_owned();
    let conn = tokio_rusqlite::Connection::open(&path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    debug!(path = %path.display(), "opened ranking store");
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Vote unit of work ───────────────────────────────────────────────────────

/// [`VoteUnitOfWork`] over one open `BEGIN IMMEDIATE` transaction.
struct SqliteVote<'t> {
  tx: &'t rusqlite::Transaction<'t>,
}

impl VoteUnitOfWork for SqliteVote<'_> {
  type Error = Error;

  fn load_item(&mut self, item_id: Uuid) -> Result<Option<Item>> {
    let raw = self
      .tx
      .query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM items WHERE item_id = ?1"),
        rusqlite::params![encode_uuid(item_id)],
        RawItem::from_row,
      )
      .optional()?;
    raw.map(RawItem::into_item).transpose()
  }

  fn has_judged(&mut self, voter: &Voter, category_id: Uuid, pair: PairKey) -> Result<bool> {
    let found = self
      .tx
      .query_row(
        "SELECT 1 FROM comparisons
         WHERE voter_kind = ?1 AND voter_key = ?2 AND category_id = ?3
           AND pair_low = ?4 AND pair_high = ?5",
        rusqlite::params![
          voter.kind(),
          voter.key(),
          encode_uuid(category_id),
          encode_uuid(pair.low()),
          encode_uuid(pair.high()),
        ],
        |_| Ok(()),
      )
      .optional()?;
    Ok(found.is_some())
  }

  fn load_window(&mut self, fingerprint: &Fingerprint) -> Result<Option<VotingWindow>> {
    read_window(self.tx, fingerprint.as_str())
  }

  fn save_window(&mut self, window: &VotingWindow) -> Result<()> {
    self.tx.execute(
      "INSERT INTO anonymous_windows (fingerprint, count, window_start)
       VALUES (?1, ?2, ?3)
       ON CONFLICT (fingerprint) DO UPDATE
         SET count = excluded.count, window_start = excluded.window_start",
      rusqlite::params![
        window.fingerprint.as_str(),
        window.count,
        encode_dt(window.window_start),
      ],
    )?;
    Ok(())
  }

  fn insert_record(&mut self, record: &ComparisonRecord) -> Result<()> {
    let pair = record.pair();
    let inserted = self.tx.execute(
      "INSERT INTO comparisons (
         record_id, voter_kind, voter_key, category_id,
         winner_id, loser_id, pair_low, pair_high, recorded_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      rusqlite::params![
        encode_uuid(record.record_id),
        record.voter.kind(),
        record.voter.key(),
        encode_uuid(record.category_id),
        encode_uuid(record.winner_id),
        encode_uuid(record.loser_id),
        encode_uuid(pair.low()),
        encode_uuid(pair.high()),
        encode_dt(record.recorded_at),
      ],
    );
    match inserted {
      Ok(_) => Ok(()),
      Err(e) if is_unique_violation(&e) => {
        debug!(voter = %record.voter, "unique constraint caught a repeat vote");
        Err(versus_core::Error::AlreadyJudged { low: pair.low(), high: pair.high() }.into())
      }
      Err(e) => Err(e.into()),
    }
  }

  fn save_rating(&mut self, item: &Item) -> Result<()> {
    self.tx.execute(
      "UPDATE items SET rating = ?1, comparisons = ?2, wins = ?3 WHERE item_id = ?4",
      rusqlite::params![item.rating, item.comparisons, item.wins, encode_uuid(item.item_id)],
    )?;
    Ok(())
  }
}

fn read_window(conn: &rusqlite::Connection, fingerprint: &str) -> Result<Option<VotingWindow>> {
  let raw = conn
    .query_row(
      "SELECT fingerprint, count, window_start FROM anonymous_windows WHERE fingerprint = ?1",
      rusqlite::params![fingerprint],
      |row| {
        Ok(RawWindow {
          fingerprint:  row.get(0)?,
          count:        row.get(1)?,
          window_start: row.get(2)?,
        })
      },
    )
    .optional()?;
  raw.map(RawWindow::into_window).transpose()
}

// ─── RankingStore impl ───────────────────────────────────────────────────────

impl RankingStore for SqliteStore {
  type Error = Error;

  // ── Categories ────────────────────────────────────────────────────────────

  async fn add_category(&self, name: String) -> Result<Category> {
    let category = Category {
      category_id: Uuid::new_v4(),
      name:        name.trim().to_owned(),
      created_at:  Utc::now(),
    };

    let id_str   = encode_uuid(category.category_id);
    let name_str = category.name.clone();
    let at_str   = encode_dt(category.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        match conn.execute(
          "INSERT INTO categories (category_id, name, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, name_str, at_str],
        ) {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if !inserted {
      return Err(versus_core::Error::DuplicateCategory(category.name).into());
    }
    Ok(category)
  }

  async fn get_category(&self, id: Uuid) -> Result<Option<Category>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE category_id = ?1"),
            rusqlite::params![id_str],
            RawCategory::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawCategory::into_category).transpose()
  }

  async fn find_category_by_name(&self, name: String) -> Result<Option<Category>> {
    let raw = self
      .conn
      .call(move |conn| {
        // `name` is declared COLLATE NOCASE, so this match is case-insensitive.
        Ok(conn
          .query_row(
            &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE name = ?1"),
            rusqlite::params![name.trim()],
            RawCategory::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawCategory::into_category).transpose()
  }

  async fn list_categories(&self) -> Result<Vec<Category>> {
    let raws = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name"))?;
        let rows = stmt
          .query_map([], RawCategory::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawCategory::into_category).collect()
  }

  // ── Items ─────────────────────────────────────────────────────────────────

  async fn add_item(&self, input: NewItem) -> Result<Item> {
    let item = Item {
      item_id:     Uuid::new_v4(),
      category_id: input.category_id,
      owner_id:    input.owner_id,
      label:       input.label,
      rating:      input.initial_rating,
      comparisons: 0,
      wins:        0,
      created_at:  Utc::now(),
      retired_at:  None,
    };

    let id_str    = encode_uuid(item.item_id);
    let cat_str   = encode_uuid(item.category_id);
    let owner_str = encode_uuid(item.owner_id);
    let label     = item.label.clone();
    let rating    = item.rating;
    let at_str    = encode_dt(item.created_at);

    let category_exists = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row(
            "SELECT 1 FROM categories WHERE category_id = ?1",
            rusqlite::params![cat_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if exists {
          conn.execute(
            "INSERT INTO items (item_id, category_id, owner_id, label, rating, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![id_str, cat_str, owner_str, label, rating, at_str],
          )?;
        }
        Ok(exists)
      })
      .await?;

    if !category_exists {
      return Err(versus_core::Error::CategoryNotFound(item.category_id).into());
    }
    Ok(item)
  }

  async fn get_item(&self, id: Uuid) -> Result<Option<Item>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE item_id = ?1"),
            rusqlite::params![id_str],
            RawItem::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawItem::into_item).transpose()
  }

  async fn retire_item(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(Utc::now());
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE items SET retired_at = ?1 WHERE item_id = ?2 AND retired_at IS NULL",
          rusqlite::params![at_str, id_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn list_items(&self, category_id: Uuid) -> Result<Vec<Item>> {
    let cat_str = encode_uuid(category_id);
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ITEM_COLUMNS} FROM items
           WHERE category_id = ?1 AND retired_at IS NULL
           ORDER BY item_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![cat_str], RawItem::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawItem::into_item).collect()
  }

  async fn list_owner_items(&self, owner_id: Uuid) -> Result<Vec<Item>> {
    let owner_str = encode_uuid(owner_id);
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ITEM_COLUMNS} FROM items
           WHERE owner_id = ?1 AND retired_at IS NULL
           ORDER BY category_id, item_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![owner_str], RawItem::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawItem::into_item).collect()
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn voter_snapshot(&self, voter: Voter, category_id: Uuid) -> Result<Option<VoterSnapshot>> {
    let cat_str = encode_uuid(category_id);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let Some(category) = tx
          .query_row(
            &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE category_id = ?1"),
            rusqlite::params![cat_str],
            RawCategory::from_row,
          )
          .optional()?
        else {
          return Ok(None);
        };

        let items = {
          let mut stmt = tx.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE category_id = ?1 AND retired_at IS NULL
             ORDER BY item_id"
          ))?;
          stmt
            .query_map(rusqlite::params![cat_str], RawItem::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        // Pairs touching a retired item are inert and left out.
        let judged = {
          let mut stmt = tx.prepare(
            "SELECT c.pair_low, c.pair_high
             FROM comparisons c
             JOIN items a ON a.item_id = c.pair_low  AND a.retired_at IS NULL
             JOIN items b ON b.item_id = c.pair_high AND b.retired_at IS NULL
             WHERE c.voter_kind = ?1 AND c.voter_key = ?2 AND c.category_id = ?3",
          )?;
          stmt
            .query_map(rusqlite::params![voter.kind(), voter.key(), cat_str], |row| {
              Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(Some((category, items, judged)))
      })
      .await?;

    let Some((category, items, judged)) = raw else {
      return Ok(None);
    };

    let judged = judged
      .into_iter()
      .map(|(low, high)| Ok(PairKey::of(decode_uuid(&low)?, decode_uuid(&high)?)))
      .collect::<Result<HashSet<_>>>()?;

    Ok(Some(VoterSnapshot {
      category: category.into_category()?,
      items: items.into_iter().map(RawItem::into_item).collect::<Result<_>>()?,
      judged,
    }))
  }

  async fn count_category_votes(&self, category_id: Uuid) -> Result<u64> {
    let cat_str = encode_uuid(category_id);
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*)
           FROM comparisons c
           JOIN items w ON w.item_id = c.winner_id AND w.retired_at IS NULL
           JOIN items l ON l.item_id = c.loser_id  AND l.retired_at IS NULL
           WHERE c.category_id = ?1",
          rusqlite::params![cat_str],
          |row| row.get(0),
        )?)
      })
      .await?;
    u64::try_from(count).map_err(|_| Error::Corrupt(format!("vote count {count}")))
  }

  async fn voter_vote_counts(&self, voter: Voter) -> Result<Vec<CategoryVotes>> {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT category_id, COUNT(*) FROM comparisons
           WHERE voter_kind = ?1 AND voter_key = ?2
           GROUP BY category_id
           ORDER BY category_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![voter.kind(), voter.key()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(category, votes)| {
        Ok(CategoryVotes {
          category_id: decode_uuid(&category)?,
          votes:       u64::try_from(votes)
            .map_err(|_| Error::Corrupt(format!("vote count {votes}")))?,
        })
      })
      .collect()
  }

  async fn anonymous_window(&self, fingerprint: Fingerprint) -> Result<Option<VotingWindow>> {
    self
      .conn
      .call(move |conn| Ok(read_window(conn, fingerprint.as_str())))
      .await?
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn commit_vote(&self, ballot: Ballot, terms: VoteTerms) -> Result<VoteApplied> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let applied = apply_vote(&mut SqliteVote { tx: &tx }, &ballot, &terms);
        // Any Err leaves `tx` to roll back on drop.
        if applied.is_ok() {
          tx.commit()?;
        }
        Ok(applied)
      })
      .await?
  }

  async fn merge_voter(&self, fingerprint: Fingerprint, user_id: Uuid) -> Result<MergeReport> {
    let fp_str   = fingerprint.as_str().to_owned();
    let user_str = encode_uuid(user_id);
    let at_str   = encode_dt(Utc::now());

    let (reassigned, discarded, merged_before) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let merged_before = tx
          .query_row(
            "SELECT 1 FROM voter_merges WHERE fingerprint = ?1 AND user_id = ?2",
            rusqlite::params![fp_str, user_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();

        // The user's own judgement of a pair wins over the anonymous one. The
        // losing record already moved ratings, so it stays as an inert row
        // keyed by its own id.
        let discarded = tx.execute(
          "UPDATE comparisons SET voter_kind = 'discarded', voter_key = record_id
           WHERE voter_kind = 'anonymous' AND voter_key = ?1
             AND EXISTS (
               SELECT 1 FROM comparisons u
               WHERE u.voter_kind  = 'user' AND u.voter_key = ?2
                 AND u.category_id = comparisons.category_id
                 AND u.pair_low    = comparisons.pair_low
                 AND u.pair_high   = comparisons.pair_high
             )",
          rusqlite::params![fp_str, user_str],
        )?;
        let reassigned = tx.execute(
          "UPDATE comparisons SET voter_kind = 'user', voter_key = ?2
           WHERE voter_kind = 'anonymous' AND voter_key = ?1",
          rusqlite::params![fp_str, user_str],
        )?;
        tx.execute(
          "DELETE FROM anonymous_windows WHERE fingerprint = ?1",
          rusqlite::params![fp_str],
        )?;
        tx.execute(
          "INSERT INTO voter_merges (fingerprint, user_id, merged_at, reassigned, discarded)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (fingerprint, user_id) DO UPDATE SET
             merged_at  = excluded.merged_at,
             reassigned = reassigned + excluded.reassigned,
             discarded  = discarded + excluded.discarded",
          rusqlite::params![fp_str, user_str, at_str, reassigned, discarded],
        )?;

        tx.commit()?;
        Ok((reassigned as u64, discarded as u64, merged_before))
      })
      .await?;

    let already_merged = merged_before && reassigned == 0 && discarded == 0;
    Ok(MergeReport { fingerprint, user_id, reassigned, discarded, already_merged })
  }
}
