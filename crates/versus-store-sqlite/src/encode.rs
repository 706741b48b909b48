//! Conversions between domain types and the plain-text columns stored in
//! SQLite.
//!
//! Timestamps are RFC 3339 strings and UUIDs are hyphenated lowercase, so
//! string order on `pair_low`/`pair_high` matches [`Uuid`] order.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use versus_core::{
  item::{Category, Item},
  limiter::VotingWindow,
  voter::Fingerprint,
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_count(n: i64, column: &str) -> Result<u32> {
  u32::try_from(n).map_err(|_| Error::Corrupt(format!("{column} out of range: {n}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const CATEGORY_COLUMNS: &str = "category_id, name, created_at";

pub struct RawCategory {
  pub category_id: String,
  pub name:        String,
  pub created_at:  String,
}

impl RawCategory {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      category_id: row.get(0)?,
      name:        row.get(1)?,
      created_at:  row.get(2)?,
    })
  }

  pub fn into_category(self) -> Result<Category> {
    Ok(Category {
      category_id: decode_uuid(&self.category_id)?,
      name:        self.name,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const ITEM_COLUMNS: &str = "item_id, category_id, owner_id, label, rating, \
                                comparisons, wins, created_at, retired_at";

pub struct RawItem {
  pub item_id:     String,
  pub category_id: String,
  pub owner_id:    String,
  pub label:       String,
  pub rating:      f64,
  pub comparisons: i64,
  pub wins:        i64,
  pub created_at:  String,
  pub retired_at:  Option<String>,
}

impl RawItem {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      item_id:     row.get(0)?,
      category_id: row.get(1)?,
      owner_id:    row.get(2)?,
      label:       row.get(3)?,
      rating:      row.get(4)?,
      comparisons: row.get(5)?,
      wins:        row.get(6)?,
      created_at:  row.get(7)?,
      retired_at:  row.get(8)?,
    })
  }

  pub fn into_item(self) -> Result<Item> {
    Ok(Item {
      item_id:     decode_uuid(&self.item_id)?,
      category_id: decode_uuid(&self.category_id)?,
      owner_id:    decode_uuid(&self.owner_id)?,
      label:       self.label,
      rating:      self.rating,
      comparisons: decode_count(self.comparisons, "comparisons")?,
      wins:        decode_count(self.wins, "wins")?,
      created_at:  decode_dt(&self.created_at)?,
      retired_at:  self.retired_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

pub struct RawWindow {
  pub fingerprint:  String,
  pub count:        i64,
  pub window_start: String,
}

impl RawWindow {
  pub fn into_window(self) -> Result<VotingWindow> {
    Ok(VotingWindow {
      fingerprint:  Fingerprint::new(self.fingerprint)?,
      count:        decode_count(self.count, "count")?,
      window_start: decode_dt(&self.window_start)?,
    })
  }
}
