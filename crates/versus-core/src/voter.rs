//! Voter identity and the unordered pair key behind the anti-repeat rule.
//!
//! Every core operation takes an explicit [`Voter`]; there is no ambient
//! session. Authenticated and anonymous voters share the same history tables
//! and differ only in whether the rate limiter applies.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Fingerprint ─────────────────────────────────────────────────────────────

/// An opaque, privacy-preserving identifier for an unauthenticated voter.
///
/// The engine never interprets the contents; it only requires a short,
/// printable ASCII token so it can be stored and compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
  pub const MAX_LEN: usize = 128;

  pub fn new(raw: impl Into<String>) -> Result<Self> {
    let raw = raw.into();
    let well_formed = !raw.is_empty()
      && raw.len() <= Self::MAX_LEN
      && raw.bytes().all(|b| b.is_ascii_graphic());
    if !well_formed {
      return Err(Error::InvalidFingerprint(raw));
    }
    Ok(Self(raw))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Fingerprint {
  type Error = Error;

  fn try_from(raw: String) -> Result<Self> { Self::new(raw) }
}

impl From<Fingerprint> for String {
  fn from(fp: Fingerprint) -> Self { fp.0 }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Voter ───────────────────────────────────────────────────────────────────

/// Who is casting a vote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Voter {
  /// An identity vouched for by the identity service.
  User(Uuid),
  /// An unauthenticated client, subject to the anonymous vote cap.
  Anonymous(Fingerprint),
}

impl Voter {
  pub fn is_anonymous(&self) -> bool { matches!(self, Self::Anonymous(_)) }

  pub fn fingerprint(&self) -> Option<&Fingerprint> {
    match self {
      Self::Anonymous(fp) => Some(fp),
      Self::User(_) => None,
    }
  }

  /// The discriminant stored in the `voter_kind` column.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::User(_) => "user",
      Self::Anonymous(_) => "anonymous",
    }
  }

  /// The identifier stored in the `voter_key` column.
  pub fn key(&self) -> String {
    match self {
      Self::User(id) => id.hyphenated().to_string(),
      Self::Anonymous(fp) => fp.as_str().to_owned(),
    }
  }

  /// Rebuild a voter from its stored `(kind, key)` columns.
  pub fn from_parts(kind: &str, key: &str) -> Option<Self> {
    match kind {
      "user" => Uuid::parse_str(key).ok().map(Self::User),
      "anonymous" => Fingerprint::new(key).ok().map(Self::Anonymous),
      _ => None,
    }
  }
}

impl fmt::Display for Voter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind(), self.key())
  }
}

// ─── PairKey ─────────────────────────────────────────────────────────────────

/// An unordered pair of item ids, normalised so `low < high`.
///
/// `{a, b}` and `{b, a}` produce the same key, which is what the anti-repeat
/// invariant is defined over.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PairKey {
  low:  Uuid,
  high: Uuid,
}

impl PairKey {
  /// Build a key for two distinct items.
  pub fn new(a: Uuid, b: Uuid) -> Result<Self> {
    if a == b {
      return Err(Error::SelfPairing);
    }
    Ok(Self::of(a, b))
  }

  /// Normalise without checking distinctness. Callers that already hold a
  /// validated ballot or a stored record use this.
  pub fn of(a: Uuid, b: Uuid) -> Self {
    if a <= b { Self { low: a, high: b } } else { Self { low: b, high: a } }
  }

  pub fn low(&self) -> Uuid { self.low }

  pub fn high(&self) -> Uuid { self.high }

  pub fn contains(&self, id: Uuid) -> bool { self.low == id || self.high == id }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pair_key_is_order_independent() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    assert_eq!(PairKey::new(a, b).unwrap(), PairKey::new(b, a).unwrap());
    let key = PairKey::of(a, b);
    assert!(key.low() < key.high());
    assert!(key.contains(a) && key.contains(b));
  }

  #[test]
  fn pair_key_rejects_self_pairing() {
    let a = Uuid::new_v4();
    assert!(matches!(PairKey::new(a, a), Err(Error::SelfPairing)));
  }

  #[test]
  fn fingerprint_validation() {
    assert!(Fingerprint::new("3f2a9c").is_ok());
    assert!(Fingerprint::new("").is_err());
    assert!(Fingerprint::new("has space").is_err());
    assert!(Fingerprint::new("x".repeat(Fingerprint::MAX_LEN + 1)).is_err());
  }

  #[test]
  fn fingerprint_deserialisation_is_validated() {
    let ok: Result<Fingerprint, _> = serde_json::from_str("\"abc123\"");
    assert!(ok.is_ok());
    let bad: Result<Fingerprint, _> = serde_json::from_str("\"\"");
    assert!(bad.is_err());
  }

  #[test]
  fn voter_parts_roundtrip() {
    let user = Voter::User(Uuid::new_v4());
    let anon = Voter::Anonymous(Fingerprint::new("f00d").unwrap());
    for voter in [user, anon] {
      let back = Voter::from_parts(voter.kind(), &voter.key()).unwrap();
      assert_eq!(back, voter);
    }
    assert!(Voter::from_parts("robot", "x").is_none());
  }
}
