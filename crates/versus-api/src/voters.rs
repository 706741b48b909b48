//! Handlers for the caller's own voter state.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/guest/stats` | Anonymous allowance for this client |
//! | `POST` | `/voters/merge` | 401 without the identity header |
//! | `GET`  | `/voters/me/stats` | Votes cast, for users and guests alike |
//! | `GET`  | `/voters/me/items` | The caller's own items; 401 without the identity header |

use axum::{Json, extract::State};
use versus_core::{
  item::OwnerStats,
  limiter::GuestStats,
  notify::NotificationSink,
  store::{MergeReport, RankingStore, VoterStats},
};

use crate::{AppState, error::ApiError, session::VoterContext};

/// `GET /guest/stats`
pub async fn guest_stats<S, N>(
  State(state): State<AppState<S, N>>,
  ctx: VoterContext,
) -> Result<Json<GuestStats>, ApiError>
where
  S: RankingStore + 'static,
  N: NotificationSink + 'static,
{
  Ok(Json(state.engine.guest_stats(&ctx.fingerprint).await?))
}

/// `POST /voters/merge`
///
/// Folds this client's anonymous history into the authenticated user. Safe
/// to call on every login; repeats report `already_merged`.
pub async fn merge<S, N>(
  State(state): State<AppState<S, N>>,
  ctx: VoterContext,
) -> Result<Json<MergeReport>, ApiError>
where
  S: RankingStore + 'static,
  N: NotificationSink + 'static,
{
  let user_id = ctx
    .user_id
    .ok_or_else(|| ApiError::Unauthorized("merge requires an authenticated user".into()))?;
  Ok(Json(state.engine.merge_voter(&ctx.fingerprint, user_id).await?))
}

/// `GET /voters/me/stats`
pub async fn stats<S, N>(
  State(state): State<AppState<S, N>>,
  ctx: VoterContext,
) -> Result<Json<VoterStats>, ApiError>
where
  S: RankingStore + 'static,
  N: NotificationSink + 'static,
{
  Ok(Json(state.engine.voter_stats(&ctx.voter).await?))
}

/// `GET /voters/me/items`
pub async fn owned_items<S, N>(
  State(state): State<AppState<S, N>>,
  ctx: VoterContext,
) -> Result<Json<OwnerStats>, ApiError>
where
  S: RankingStore + 'static,
  N: NotificationSink + 'static,
{
  let owner_id = ctx
    .user_id
    .ok_or_else(|| ApiError::Unauthorized("owned items require an authenticated user".into()))?;
  Ok(Json(state.engine.owner_items(owner_id).await?))
}
