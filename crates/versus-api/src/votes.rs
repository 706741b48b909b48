//! Handlers for pair selection and voting.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/categories/{id}/pair`  | 410 once every pair is judged |
//! | `POST` | `/categories/{id}/votes` | Body: `{"winner_id":…,"loser_id":…}` |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use versus_core::{engine::PairOffer, notify::NotificationSink, store::RankingStore};

use crate::{AppState, error::ApiError, session::VoterContext};

// ─── Pair ─────────────────────────────────────────────────────────────────────

/// `GET /categories/{id}/pair`
pub async fn next_pair<S, N>(
  State(state): State<AppState<S, N>>,
  Path(category_id): Path<Uuid>,
  ctx: VoterContext,
) -> Result<Json<PairOffer>, ApiError>
where
  S: RankingStore + 'static,
  N: NotificationSink + 'static,
{
  let offer = state.engine.select_pair(&ctx.voter, category_id).await?;
  Ok(Json(offer))
}

// ─── Vote ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VoteBody {
  pub winner_id: Uuid,
  pub loser_id:  Uuid,
}

/// `POST /categories/{id}/votes`
pub async fn cast<S, N>(
  State(state): State<AppState<S, N>>,
  Path(category_id): Path<Uuid>,
  ctx: VoterContext,
  Json(body): Json<VoteBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RankingStore + 'static,
  N: NotificationSink + 'static,
{
  let receipt = state
    .engine
    .record_vote(&ctx.voter, category_id, body.winner_id, body.loser_id)
    .await?;
  Ok((StatusCode::CREATED, Json(receipt)))
}
