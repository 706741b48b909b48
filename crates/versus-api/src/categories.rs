//! Handlers for per-category reads.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/categories/{id}` | Summary with the current leader |
//! | `GET`  | `/categories/{id}/progress` | The caller's progress |
//! | `GET`  | `/categories/{id}/leaderboard` | Optional `?limit=` (0 = all, max 1000) |
//! | `GET`  | `/categories/by-name/{name}/leaderboard` | Name is case-insensitive |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;
use versus_core::{
  item::{CategorySummary, LeaderboardEntry},
  notify::NotificationSink,
  progress::Progress,
  store::RankingStore,
};

use crate::{AppState, error::ApiError, session::VoterContext};

/// `GET /categories/{id}`
pub async fn summary<S, N>(
  State(state): State<AppState<S, N>>,
  Path(category_id): Path<Uuid>,
) -> Result<Json<CategorySummary>, ApiError>
where
  S: RankingStore + 'static,
  N: NotificationSink + 'static,
{
  Ok(Json(state.engine.category_summary(category_id).await?))
}

/// `GET /categories/{id}/progress`
pub async fn progress<S, N>(
  State(state): State<AppState<S, N>>,
  Path(category_id): Path<Uuid>,
  ctx: VoterContext,
) -> Result<Json<Progress>, ApiError>
where
  S: RankingStore + 'static,
  N: NotificationSink + 'static,
{
  Ok(Json(state.engine.compute_progress(&ctx.voter, category_id).await?))
}

// ─── Leaderboards ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardParams {
  #[serde(default)]
  pub limit: usize,
}

/// `GET /categories/{id}/leaderboard[?limit=<n>]`
pub async fn leaderboard<S, N>(
  State(state): State<AppState<S, N>>,
  Path(category_id): Path<Uuid>,
  Query(params): Query<LeaderboardParams>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError>
where
  S: RankingStore + 'static,
  N: NotificationSink + 'static,
{
  Ok(Json(state.engine.leaderboard(category_id, params.limit).await?))
}

/// `GET /categories/by-name/{name}/leaderboard[?limit=<n>]`
pub async fn leaderboard_by_name<S, N>(
  State(state): State<AppState<S, N>>,
  Path(name): Path<String>,
  Query(params): Query<LeaderboardParams>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError>
where
  S: RankingStore + 'static,
  N: NotificationSink + 'static,
{
  Ok(Json(state.engine.leaderboard_by_name(&name, params.limit).await?))
}
