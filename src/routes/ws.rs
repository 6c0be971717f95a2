//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to the engine. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::error::VivaError;
use crate::protocol::{ClientWsMessage, ResponseOut, ServerWsMessage, SessionOut, StartSessionOut};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "viva_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "viva_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "viva_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { code: "validation".into(), message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "code": "internal", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "viva_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "viva_backend", "WebSocket disconnected");
}

fn error_msg(e: VivaError) -> ServerWsMessage {
  ServerWsMessage::Error { code: e.code().into(), message: e.to_string() }
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  let engine = &state.engine;
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::StartSession { assignment_id, student_id } => {
      match engine.start_session(&assignment_id, &student_id).await {
        Ok((session, question)) => ServerWsMessage::SessionStarted(StartSessionOut::new(&session, question)),
        Err(e) => error_msg(e),
      }
    }

    ClientWsMessage::SubmitResponse { session_id, transcript, similarity } => {
      match engine.submit_response(&session_id, &transcript, similarity).await {
        Ok(outcome) => ServerWsMessage::ResponseResult(ResponseOut::from(&outcome)),
        Err(e) => error_msg(e),
      }
    }

    ClientWsMessage::EndSession { session_id, reason, abandoned } => {
      match engine.end_session(&session_id, reason, abandoned).await {
        Ok(session) => ServerWsMessage::Session { session: SessionOut::from(&session) },
        Err(e) => error_msg(e),
      }
    }

    ClientWsMessage::GetSession { session_id } => match engine.get_session(&session_id).await {
      Ok(session) => ServerWsMessage::Session { session: SessionOut::from(&session) },
      Err(e) => error_msg(e),
    },
  }
}
