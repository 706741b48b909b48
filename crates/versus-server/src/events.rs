//! Live "next pair" delivery over a websocket.
//!
//! The engine publishes a [`PairReady`] after every accepted vote. The
//! [`BroadcastSink`] fans those out on a `tokio::sync::broadcast` channel and
//! each `/events` socket forwards only the events addressed to its voter.
//! Slow sockets skip what they missed rather than stall the engine.

use axum::{
  extract::{
    State,
    ws::{Message, WebSocket, WebSocketUpgrade},
  },
  response::Response,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace};
use versus_api::{AppState, VoterContext};
use versus_core::{
  notify::{NotificationSink, PairReady, SinkError},
  store::RankingStore,
  voter::Voter,
};

pub struct BroadcastSink {
  tx: broadcast::Sender<PairReady>,
}

impl BroadcastSink {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity.max(1));
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<PairReady> { self.tx.subscribe() }
}

impl NotificationSink for BroadcastSink {
  fn publish(&self, event: PairReady) -> Result<(), SinkError> {
    // No open sockets is the normal idle state, not a delivery failure.
    if self.tx.send(event).is_err() {
      trace!("no event subscribers");
    }
    Ok(())
  }
}

/// `GET /events` (websocket upgrade)
pub async fn stream<S>(
  State(state): State<AppState<S, BroadcastSink>>,
  ctx: VoterContext,
  ws: WebSocketUpgrade,
) -> Response
where
  S: RankingStore + 'static,
{
  let rx = state.engine.sink().subscribe();
  ws.on_upgrade(move |socket| forward(socket, rx, ctx.voter))
}

async fn forward(mut socket: WebSocket, mut rx: broadcast::Receiver<PairReady>, voter: Voter) {
  debug!(voter = %voter, "event stream opened");
  loop {
    tokio::select! {
      event = rx.recv() => match event {
        Ok(event) if event.voter == voter => {
          let text = match serde_json::to_string(&event.offer) {
            Ok(text) => text,
            Err(e) => {
              debug!(error = %e, "could not encode pair event");
              continue;
            }
          };
          if socket.send(Message::Text(text.into())).await.is_err() {
            break;
          }
        }
        Ok(_) => {}
        Err(RecvError::Lagged(skipped)) => debug!(voter = %voter, skipped, "event stream lagged"),
        Err(RecvError::Closed) => break,
      },
      incoming = socket.recv() => match incoming {
        None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
        Some(Ok(_)) => {}
      },
    }
  }
  debug!(voter = %voter, "event stream closed");
}
