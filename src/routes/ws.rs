//! WebSocket upgrade + the per-connection game session loop.
//!
//! Each connection owns one `GameLoop`; the presentation layer drives it with
//! discrete control messages and receives one server message per game event,
//! plus a state snapshot after every tick. Game state never outlives or
//! crosses the connection.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::domain::Difficulty;
use crate::game::{GameEvent, GameLoop, LaneDirection};
use crate::protocol::{
  snapshot_of, to_server_message, validate_quiz_request, ClientWsMessage, ServerWsMessage,
  WsLaneDirection,
};
use crate::state::AppState;
use crate::util::trunc_for_log;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "portalrun_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "portalrun_backend", "WebSocket connected; game session opened");
  let mut game = GameLoop::new();

  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        debug!(target: "game", msg = %trunc_for_log(&txt, 200), "WS received");
        let replies = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => handle_client_ws(incoming, &mut game, &state),
          Err(e) => vec![ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }],
        };

        // Flush the immediate replies (including the loading notice) before
        // any question fetch runs, so the client sees `loading` right away.
        let fetch_params = pending_fetch(&replies);
        if send_replies(&mut socket, replies).await.is_err() {
          return;
        }
        if let Some((topic, difficulty, count)) = fetch_params {
          let followup = fetch_and_feed(&mut game, &state, &topic, difficulty, count).await;
          if send_replies(&mut socket, followup).await.is_err() {
            return;
          }
        }
      }
      Message::Ping(payload) => {
        let _ = socket.send(Message::Pong(payload)).await;
      }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "portalrun_backend", "WebSocket disconnected; game session dropped");
}

async fn send_replies(socket: &mut WebSocket, replies: Vec<ServerWsMessage>) -> Result<(), ()> {
  for reply in replies {
    let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) })
        .to_string()
    });
    if let Err(e) = socket.send(Message::Text(out)).await {
      error!(target: "portalrun_backend", error = %e, "WS send error");
      return Err(());
    }
  }
  Ok(())
}

/// Dispatch one client message against the connection's game loop, turning
/// game events into wire messages (one per transition, in order). Requests
/// with invalid parameters are rejected here and never touch the loop.
fn handle_client_ws(
  msg: ClientWsMessage,
  game: &mut GameLoop,
  state: &AppState,
) -> Vec<ServerWsMessage> {
  match msg {
    ClientWsMessage::Ping => vec![ServerWsMessage::Pong],

    ClientWsMessage::StartGame { topic, difficulty, count } => {
      if let Err(e) = validate_quiz_request(&topic, count) {
        return vec![ServerWsMessage::Error { message: e }];
      }
      forward_events(game.start_loading(topic, difficulty, count), state)
    }

    ClientWsMessage::Tick { dt } => {
      let events = game.tick(dt);
      let mut replies = forward_events(events, state);
      replies.push(ServerWsMessage::Snapshot { snapshot: snapshot_of(game) });
      replies
    }

    ClientWsMessage::LaneChange { direction } => {
      game.change_lane(match direction {
        WsLaneDirection::Left => LaneDirection::Left,
        WsLaneDirection::Right => LaneDirection::Right,
      });
      vec![ServerWsMessage::Snapshot { snapshot: snapshot_of(game) }]
    }

    ClientWsMessage::PauseToggle => forward_events(game.pause_toggle(), state),

    ClientWsMessage::SetSpeed { speed } => {
      game.set_speed(speed);
      vec![ServerWsMessage::Snapshot { snapshot: snapshot_of(game) }]
    }

    ClientWsMessage::PlayAgain => forward_events(game.play_again(), state),

    ClientWsMessage::BackToMenu => forward_events(game.back_to_menu(), state),
  }
}

/// A loading notice among the replies means the loop is waiting on questions;
/// its parameters tell the caller what to fetch after flushing.
fn pending_fetch(replies: &[ServerWsMessage]) -> Option<(String, Difficulty, usize)> {
  replies.iter().find_map(|r| match r {
    ServerWsMessage::Loading { topic, difficulty, count } => {
      Some((topic.clone(), *difficulty, *count))
    }
    _ => None,
  })
}

/// Fetch questions and feed the outcome back into the loop. The connection
/// stays in `loading` for the duration; no tick can mutate game state
/// meanwhile.
async fn fetch_and_feed(
  game: &mut GameLoop,
  state: &AppState,
  topic: &str,
  difficulty: Difficulty,
  count: usize,
) -> Vec<ServerWsMessage> {
  let events = match state.question_source.fetch(topic, difficulty, count).await {
    Ok((questions, origin)) => {
      info!(target: "game", count = questions.len(), origin = origin.as_str(), "WS session questions ready");
      game.questions_ready(questions)
    }
    Err(e) => {
      error!(target: "game", error = %e, "WS session load failed");
      game.load_failed(e)
    }
  };
  forward_events(events, state)
}

/// Map events to wire messages, persisting completed sessions on the way.
fn forward_events(events: Vec<GameEvent>, state: &AppState) -> Vec<ServerWsMessage> {
  events
    .into_iter()
    .map(|event| {
      if let GameEvent::SessionComplete { record } = &event {
        // Best-effort: a storage failure is logged inside and never
        // interrupts the session.
        state.history.save(record.clone());
      }
      to_server_message(event)
    })
    .collect()
}
