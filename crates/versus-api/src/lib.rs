//! JSON REST API for Versus.
//!
//! Exposes an axum [`Router`] backed by an [`Engine`] over any
//! [`RankingStore`]. Authentication itself is upstream's job; this layer only
//! reads the identity header it sets. TLS and transport are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .merge(versus_api::api_router(engine.clone(), IdentityConfig::default()))
//! ```

pub mod categories;
pub mod error;
pub mod session;
pub mod voters;
pub mod votes;

use std::sync::Arc;

use axum::{
  Router, middleware,
  routing::{get, post},
};
use versus_core::{engine::Engine, notify::NotificationSink, store::RankingStore};

pub use error::ApiError;
pub use session::{IdentityConfig, VoterContext};

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S, N> {
  pub engine:   Arc<Engine<S, N>>,
  pub identity: Arc<IdentityConfig>,
}

impl<S, N> Clone for AppState<S, N> {
  fn clone(&self) -> Self {
    Self { engine: self.engine.clone(), identity: self.identity.clone() }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `engine`.
///
/// The returned `Router<()>` can be merged into any parent router regardless
/// of its own state type.
pub fn api_router<S, N>(engine: Arc<Engine<S, N>>, identity: IdentityConfig) -> Router<()>
where
  S: RankingStore + 'static,
  N: NotificationSink + 'static,
{
  let identity = Arc::new(identity);
  let state = AppState { engine, identity: identity.clone() };

  Router::new()
    // Categories
    .route("/categories/{id}", get(categories::summary::<S, N>))
    .route("/categories/{id}/progress", get(categories::progress::<S, N>))
    .route("/categories/{id}/leaderboard", get(categories::leaderboard::<S, N>))
    .route(
      "/categories/by-name/{name}/leaderboard",
      get(categories::leaderboard_by_name::<S, N>),
    )
    // Voting
    .route("/categories/{id}/pair", get(votes::next_pair::<S, N>))
    .route("/categories/{id}/votes", post(votes::cast::<S, N>))
    // Voters
    .route("/guest/stats", get(voters::guest_stats::<S, N>))
    .route("/voters/merge", post(voters::merge::<S, N>))
    .route("/voters/me/stats", get(voters::stats::<S, N>))
    .route("/voters/me/items", get(voters::owned_items::<S, N>))
    .layer(middleware::from_fn_with_state(identity, session::ensure_session))
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;
  use versus_core::{
    item::{Item, NewItem},
    notify::NullSink,
    settings::EngineSettings,
  };
  use versus_store_sqlite::SqliteStore;

  use super::*;

  const COOKIE: &str = "versus_session=test-salt";

  struct Fixture {
    router:      Router,
    category_id: Uuid,
    items:       Vec<Item>,
  }

  async fn fixture(item_count: usize) -> Fixture {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let category = store.add_category("cats".into()).await.unwrap();
    let mut items = Vec::new();
    for i in 0..item_count {
      let input = NewItem::new(category.category_id, Uuid::new_v4(), format!("{i}.jpg"));
      items.push(store.add_item(input).await.unwrap());
    }
    let settings = EngineSettings { seed: Some(1), ..Default::default() };
    let engine = Arc::new(Engine::new(store, Arc::new(NullSink), settings).unwrap());
    Fixture {
      router: api_router(engine, IdentityConfig::default()),
      category_id: category.category_id,
      items,
    }
  }

  async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
  ) -> axum::response::Response {
    let mut builder = Request::builder()
      .method(method)
      .uri(uri)
      .header(header::USER_AGENT, "test-agent");
    for (k, v) in headers {
      builder = builder.header(*k, *v);
    }
    let req = match body {
      Some(json) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    router.clone().oneshot(req).await.unwrap()
  }

  async fn json_body(res: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  fn vote(winner: &Item, loser: &Item) -> Option<Value> {
    Some(json!({ "winner_id": winner.item_id, "loser_id": loser.item_id }))
  }

  // ── Session ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn first_contact_issues_session_cookie() {
    let f = fixture(2).await;
    let res = send(&f.router, "GET", "/guest/stats", &[], None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("versus_session="), "{cookie}");

    let res = send(&f.router, "GET", "/guest/stats", &[("cookie", COOKIE)], None).await;
    assert!(res.headers().get(header::SET_COOKIE).is_none());
    let stats = json_body(res).await;
    assert_eq!(stats["remaining"], 10);
    assert_eq!(stats["cap"], 10);
  }

  #[tokio::test]
  async fn malformed_identity_header_is_unauthorized() {
    let f = fixture(2).await;
    let uri = format!("/categories/{}/pair", f.category_id);
    let res = send(&f.router, "GET", &uri, &[("x-authenticated-user", "bob")], None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
  }

  // ── Voting ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn vote_then_exhausted_category_is_gone() {
    let f = fixture(2).await;
    let pair_uri = format!("/categories/{}/pair", f.category_id);
    let vote_uri = format!("/categories/{}/votes", f.category_id);
    let h = [("cookie", COOKIE)];

    let res = send(&f.router, "GET", &pair_uri, &h, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let offer = json_body(res).await;
    assert_eq!(offer["progress"]["total_possible_pairs"], 1);

    let res = send(&f.router, "POST", &vote_uri, &h, vote(&f.items[0], &f.items[1])).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let receipt = json_body(res).await;
    assert_eq!(receipt["winner"]["rating"], 1216.0);
    assert_eq!(receipt["remaining_anonymous_votes"], 9);
    assert!(receipt["next"].is_null());

    let res = send(&f.router, "GET", &pair_uri, &h, None).await;
    assert_eq!(res.status(), StatusCode::GONE);

    let res = send(&f.router, "POST", &vote_uri, &h, vote(&f.items[1], &f.items[0])).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let progress_uri = format!("/categories/{}/progress", f.category_id);
    let progress = json_body(send(&f.router, "GET", &progress_uri, &h, None).await).await;
    assert_eq!(progress["percentage"], 100.0);
  }

  #[tokio::test]
  async fn bad_votes_are_client_errors() {
    let f = fixture(3).await;
    let vote_uri = format!("/categories/{}/votes", f.category_id);
    let h = [("cookie", COOKIE)];

    let res = send(&f.router, "POST", &vote_uri, &h, vote(&f.items[0], &f.items[0])).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(res).await["error"].is_string());

    let missing = format!("/categories/{}/pair", Uuid::new_v4());
    let res = send(&f.router, "GET", &missing, &h, None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let missing = format!("/categories/{}/progress", Uuid::new_v4());
    let res = send(&f.router, "GET", &missing, &h, None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn eleventh_guest_vote_is_too_many() {
    let f = fixture(6).await;
    let pair_uri = format!("/categories/{}/pair", f.category_id);
    let vote_uri = format!("/categories/{}/votes", f.category_id);
    let h = [("cookie", COOKIE)];

    for _ in 0..10 {
      let offer = json_body(send(&f.router, "GET", &pair_uri, &h, None).await).await;
      let body = json!({ "winner_id": offer["first"]["item_id"], "loser_id": offer["second"]["item_id"] });
      let res = send(&f.router, "POST", &vote_uri, &h, Some(body)).await;
      assert_eq!(res.status(), StatusCode::CREATED);
    }

    let offer = json_body(send(&f.router, "GET", &pair_uri, &h, None).await).await;
    let body = json!({ "winner_id": offer["first"]["item_id"], "loser_id": offer["second"]["item_id"] });
    let res = send(&f.router, "POST", &vote_uri, &h, Some(body)).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().contains_key(header::RETRY_AFTER));
    let err = json_body(res).await;
    assert_eq!(err["remaining_votes"], 0);
    assert!(err["resets_at"].is_string());

    // A different session is a different guest.
    let other = [("cookie", "versus_session=someone-else")];
    let res = send(&f.router, "POST", &vote_uri, &other, vote(&f.items[0], &f.items[1])).await;
    assert_eq!(res.status(), StatusCode::CREATED);
  }

  // ── Merge ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn merge_needs_identity_and_is_idempotent() {
    let f = fixture(3).await;
    let vote_uri = format!("/categories/{}/votes", f.category_id);
    let user = Uuid::new_v4().to_string();

    let res = send(&f.router, "POST", &vote_uri, &[("cookie", COOKIE)], vote(&f.items[0], &f.items[1])).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = send(&f.router, "POST", "/voters/merge", &[("cookie", COOKIE)], None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let authed = [("cookie", COOKIE), ("x-authenticated-user", user.as_str())];
    let report = json_body(send(&f.router, "POST", "/voters/merge", &authed, None).await).await;
    assert_eq!(report["reassigned"], 1);
    assert_eq!(report["already_merged"], false);

    let report = json_body(send(&f.router, "POST", "/voters/merge", &authed, None).await).await;
    assert_eq!(report["already_merged"], true);

    // The user inherited the guest's judgement.
    let res = send(&f.router, "POST", &vote_uri, &authed, vote(&f.items[1], &f.items[0])).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn merge_picks_up_guest_votes_cast_after_an_earlier_merge() {
    let f = fixture(3).await;
    let vote_uri = format!("/categories/{}/votes", f.category_id);
    let user = Uuid::new_v4().to_string();
    let guest = [("cookie", COOKIE)];
    let authed = [("cookie", COOKIE), ("x-authenticated-user", user.as_str())];

    send(&f.router, "POST", &vote_uri, &guest, vote(&f.items[0], &f.items[1])).await;
    send(&f.router, "POST", "/voters/merge", &authed, None).await;

    let res = send(&f.router, "POST", &vote_uri, &guest, vote(&f.items[0], &f.items[2])).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let report = json_body(send(&f.router, "POST", "/voters/merge", &authed, None).await).await;
    assert_eq!(report["reassigned"], 1);
    assert_eq!(report["already_merged"], false);

    let res = send(&f.router, "POST", &vote_uri, &authed, vote(&f.items[2], &f.items[0])).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
  }

  // ── Voter statistics ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn own_stats_for_guests_and_owners() {
    let f = fixture(3).await;
    let vote_uri = format!("/categories/{}/votes", f.category_id);
    let owner = f.items[1].owner_id.to_string();
    let authed = [("cookie", COOKIE), ("x-authenticated-user", owner.as_str())];

    send(&f.router, "POST", &vote_uri, &[("cookie", COOKIE)], vote(&f.items[0], &f.items[1])).await;
    let stats = json_body(send(&f.router, "GET", "/voters/me/stats", &[("cookie", COOKIE)], None).await).await;
    assert_eq!(stats["total_votes"], 1);
    assert_eq!(stats["categories"][0]["category_id"], json!(f.category_id));

    let res = send(&f.router, "GET", "/voters/me/items", &[("cookie", COOKIE)], None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    send(&f.router, "POST", &vote_uri, &authed, vote(&f.items[2], &f.items[0])).await;
    let mine = json_body(send(&f.router, "GET", "/voters/me/items", &authed, None).await).await;
    assert_eq!(mine["total_items"], 1);
    assert_eq!(mine["total_votes"], 1);
    assert_eq!(mine["items"][0]["item"]["item_id"], json!(f.items[1].item_id));
    assert_eq!(mine["items"][0]["category_name"], "cats");
    assert_eq!(mine["items"][0]["rank"], 3);
  }

  // ── Leaderboards ────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn leaderboards_and_summary() {
    let f = fixture(3).await;
    let vote_uri = format!("/categories/{}/votes", f.category_id);
    let h = [("cookie", COOKIE)];
    send(&f.router, "POST", &vote_uri, &h, vote(&f.items[2], &f.items[0])).await;

    let uri = format!("/categories/{}/leaderboard?limit=1", f.category_id);
    let board = json_body(send(&f.router, "GET", &uri, &h, None).await).await;
    assert_eq!(board.as_array().unwrap().len(), 1);
    assert_eq!(board[0]["rank"], 1);
    assert_eq!(board[0]["item"]["item_id"], json!(f.items[2].item_id));

    let board = json_body(send(&f.router, "GET", "/categories/by-name/CATS/leaderboard", &h, None).await).await;
    assert_eq!(board.as_array().unwrap().len(), 2);

    let res = send(&f.router, "GET", "/categories/by-name/dogs/leaderboard", &h, None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let uri = format!("/categories/{}", f.category_id);
    let summary = json_body(send(&f.router, "GET", &uri, &h, None).await).await;
    assert_eq!(summary["item_count"], 3);
    assert_eq!(summary["total_votes"], 1);
  }
}
