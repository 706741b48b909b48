//! The Versus HTTP server: the JSON API, the `/events` websocket and request
//! tracing, assembled over one [`Engine`].

pub mod config;
pub mod events;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;
use versus_api::{AppState, IdentityConfig};
use versus_core::{engine::Engine, store::RankingStore};

pub use config::ServerConfig;
pub use events::BroadcastSink;

/// Build the full application router.
pub fn app<S>(engine: Arc<Engine<S, BroadcastSink>>, identity: IdentityConfig) -> Router
where
  S: RankingStore + 'static,
{
  let events = Router::new()
    .route("/events", get(events::stream::<S>))
    .with_state(AppState { engine: engine.clone(), identity: Arc::new(identity.clone()) });

  versus_api::api_router(engine, identity)
    .merge(events)
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use tower::ServiceExt as _;
  use uuid::Uuid;
  use versus_core::{item::NewItem, settings::EngineSettings, voter::Voter};
  use versus_store_sqlite::SqliteStore;

  use super::*;

  async fn engine() -> Arc<Engine<SqliteStore, BroadcastSink>> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let settings = EngineSettings { seed: Some(11), ..Default::default() };
    Arc::new(Engine::new(store, Arc::new(BroadcastSink::new(16)), settings).unwrap())
  }

  #[tokio::test]
  async fn api_routes_are_mounted() {
    let app = app(engine().await, IdentityConfig::default());
    let req = Request::builder()
      .uri(format!("/categories/{}/progress", Uuid::new_v4()))
      .body(Body::empty())
      .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn events_requires_websocket_upgrade() {
    let app = app(engine().await, IdentityConfig::default());
    let req = Request::builder().uri("/events").body(Body::empty()).unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert!(res.status().is_client_error(), "{}", res.status());
  }

  #[tokio::test]
  async fn votes_are_broadcast_to_subscribers() {
    let engine = engine().await;
    let store = engine.store().clone();
    let category = store.add_category("dogs".into()).await.unwrap();
    let mut ids = Vec::new();
    for label in ["a.jpg", "b.jpg", "c.jpg"] {
      let item = store
        .add_item(NewItem::new(category.category_id, Uuid::new_v4(), label))
        .await
        .unwrap();
      ids.push(item.item_id);
    }

    let mut rx = engine.sink().subscribe();
    let voter = Voter::User(Uuid::new_v4());
    let receipt = engine
      .record_vote(&voter, category.category_id, ids[0], ids[1])
      .await
      .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.voter, voter);
    assert_eq!(Some(event.offer.first.item_id), receipt.next.map(|n| n.first.item_id));
  }

  #[tokio::test]
  async fn publishing_without_subscribers_is_not_an_error() {
    use versus_core::notify::{NotificationSink as _, PairReady};

    let engine = engine().await;
    let store = engine.store().clone();
    let category = store.add_category("birds".into()).await.unwrap();
    for label in ["a.jpg", "b.jpg"] {
      store
        .add_item(NewItem::new(category.category_id, Uuid::new_v4(), label))
        .await
        .unwrap();
    }
    let voter = Voter::User(Uuid::new_v4());
    let offer = engine.select_pair(&voter, category.category_id).await.unwrap();

    let sink = BroadcastSink::new(4);
    assert!(sink.publish(PairReady { voter, offer }).is_ok());
  }
}
