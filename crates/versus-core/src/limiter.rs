//! Fixed-window vote cap for anonymous voters.
//!
//! Per fingerprint the window moves through three states:
//!
//! - **Idle** (no stored window): the first vote opens `Active(1, now)`.
//! - **Active** and unexpired: a vote is admitted while `count < cap`;
//!   at the cap it is rejected and the window is left untouched.
//! - **Active** and expired (`now - start >= window`): the next vote opens a
//!   fresh `Active(1, now)` regardless of the old count.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, voter::Fingerprint};

pub const DEFAULT_CAP: u32 = 10;
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Persisted limiter state for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingWindow {
  pub fingerprint:  Fingerprint,
  pub count:        u32,
  pub window_start: DateTime<Utc>,
}

/// What an anonymous voter is told about their allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestStats {
  pub used:      u32,
  pub remaining: u32,
  pub cap:       u32,
  /// End of the current window; `None` when no window is active.
  pub resets_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterPolicy {
  pub cap:    u32,
  pub window: TimeDelta,
}

impl Default for LimiterPolicy {
  fn default() -> Self {
    Self {
      cap:    DEFAULT_CAP,
      window: TimeDelta::hours(DEFAULT_WINDOW_HOURS),
    }
  }
}

impl LimiterPolicy {
  pub fn new(cap: u32, window: TimeDelta) -> Self { Self { cap, window } }

  /// Whether `window` still governs votes cast at `now`.
  pub fn is_active(&self, window: &VotingWindow, now: DateTime<Utc>) -> bool {
    now - window.window_start < self.window
  }

  /// Admit one vote, returning the window to persist, or reject with
  /// [`Error::RateLimited`] leaving the stored window as it was.
  pub fn admit(
    &self,
    fingerprint: &Fingerprint,
    current: Option<&VotingWindow>,
    now: DateTime<Utc>,
  ) -> Result<VotingWindow> {
    match current {
      Some(w) if self.is_active(w, now) => {
        if w.count >= self.cap {
          return Err(Error::RateLimited {
            remaining: 0,
            resets_at: w.window_start + self.window,
          });
        }
        Ok(VotingWindow { count: w.count + 1, ..w.clone() })
      }
      _ if self.cap == 0 => Err(Error::RateLimited {
        remaining: 0,
        resets_at: now + self.window,
      }),
      _ => Ok(VotingWindow {
        fingerprint:  fingerprint.clone(),
        count:        1,
        window_start: now,
      }),
    }
  }

  pub fn remaining(&self, current: Option<&VotingWindow>, now: DateTime<Utc>) -> u32 {
    match current {
      Some(w) if self.is_active(w, now) => self.cap.saturating_sub(w.count),
      _ => self.cap,
    }
  }

  pub fn resets_at(
    &self,
    current: Option<&VotingWindow>,
    now: DateTime<Utc>,
  ) -> Option<DateTime<Utc>> {
    current
      .filter(|w| self.is_active(w, now))
      .map(|w| w.window_start + self.window)
  }

  pub fn stats(&self, current: Option<&VotingWindow>, now: DateTime<Utc>) -> GuestStats {
    let remaining = self.remaining(current, now);
    GuestStats {
      used: self.cap - remaining,
      remaining,
      cap: self.cap,
      resets_at: self.resets_at(current, now),
    }
  }
}
