//! Engine tuning, deserialised from the server's `[engine]` config table.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  limiter::{DEFAULT_CAP, DEFAULT_WINDOW_HOURS, LimiterPolicy},
  pairing::PairingParams,
  progress::DEFAULT_IMPORTANT_CADENCE,
  rating::{DEFAULT_BASELINE, DEFAULT_K},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
  /// Elo K constant.
  pub k_factor:                    f64,
  /// Rating given to newly added items.
  pub baseline_rating:             f64,
  /// Every n-th vote position is flagged important; 0 turns flagging off.
  pub important_cadence:           u32,
  pub anonymous_cap:               u32,
  pub anonymous_window_hours:      i64,
  pub sample_attempts:             u32,
  pub exhaustive_threshold:        u64,
  pub top_tier_fraction:           f64,
  pub top_tier_bias:               f64,
  pub proximity_window:            usize,
  /// Items need this many duels to appear on the leaderboard.
  pub leaderboard_min_comparisons: u32,
  /// Fixed RNG seed; `None` seeds from the OS.
  pub seed:                        Option<u64>,
}

impl Default for EngineSettings {
  fn default() -> Self {
    let pairing = PairingParams::default();
    Self {
      k_factor:                    DEFAULT_K,
      baseline_rating:             DEFAULT_BASELINE,
      important_cadence:           DEFAULT_IMPORTANT_CADENCE,
      anonymous_cap:               DEFAULT_CAP,
      anonymous_window_hours:      DEFAULT_WINDOW_HOURS,
      sample_attempts:             pairing.sample_attempts,
      exhaustive_threshold:        pairing.exhaustive_threshold,
      top_tier_fraction:           pairing.top_tier_fraction,
      top_tier_bias:               pairing.top_tier_bias,
      proximity_window:            pairing.proximity_window,
      leaderboard_min_comparisons: 1,
      seed:                        None,
    }
  }
}

impl EngineSettings {
  pub fn validate(&self) -> Result<()> {
    let fail = |msg: &str| Err(Error::InvalidSettings(msg.to_owned()));

    if !(self.k_factor.is_finite() && self.k_factor > 0.0) {
      return fail("k_factor must be a positive number");
    }
    if !self.baseline_rating.is_finite() {
      return fail("baseline_rating must be finite");
    }
    // Capped at a year so the TimeDelta conversion cannot overflow.
    if !(1..=24 * 7 * 52).contains(&self.anonymous_window_hours) {
      return fail("anonymous_window_hours must be between 1 and 8736");
    }
    if !(self.top_tier_fraction > 0.0 && self.top_tier_fraction <= 1.0) {
      return fail("top_tier_fraction must be in (0, 1]");
    }
    if !(0.0..=1.0).contains(&self.top_tier_bias) {
      return fail("top_tier_bias must be in [0, 1]");
    }
    Ok(())
  }

  pub fn limiter(&self) -> LimiterPolicy {
    LimiterPolicy::new(
      self.anonymous_cap,
      TimeDelta::hours(self.anonymous_window_hours),
    )
  }

  pub fn pairing(&self) -> PairingParams {
    PairingParams {
      sample_attempts:      self.sample_attempts,
      exhaustive_threshold: self.exhaustive_threshold,
      top_tier_fraction:    self.top_tier_fraction,
      top_tier_bias:        self.top_tier_bias,
      proximity_window:     self.proximity_window,
    }
  }
}
