//! Websocket subscriptions
//!
//! A client upgrades `GET /pubsub`, sends a signed envelope per subscription
//! and receives a single reply once the target state is reached (or an error
//! reply on timeout). The socket stays open for further subscriptions.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use rookery_contracts::{msgs, Envelope, Reply};
use rookery_core::ProcessState;
use tracing::debug;

use crate::error::ApiError;
use crate::AppState;

pub async fn handle(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| session(socket, state))
}

async fn session(mut socket: WebSocket, state: AppState) {
    while let Some(Ok(message)) = socket.recv().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let reply = match subscribe_once(&state, &text).await {
            Ok(reply) => reply,
            Err(e) => e.reply(),
        };
        let Ok(json) = serde_json::to_string(&reply) else {
            break;
        };
        if socket.send(Message::Text(json)).await.is_err() {
            debug!("subscriber went away");
            break;
        }
    }
}

async fn subscribe_once(state: &AppState, text: &str) -> Result<Reply, ApiError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| ApiError::InvalidPayload(e.to_string()))?;
    let caller = state
        .recovery
        .recover(&envelope.payload, &envelope.signature)?;

    match envelope.payload_type.as_str() {
        msgs::SUBSCRIBE_PROCESS => {
            let msg: msgs::SubscribeProcessMsg = envelope.decode(msgs::SUBSCRIBE_PROCESS)?;
            state
                .validator
                .require_executor_membership(&caller, &msg.colony_id, true)
                .await?;
            let target_state =
                ProcessState::try_from(msg.state).map_err(ApiError::InvalidPayload)?;
            let process = state
                .controller
                .subscribe_process(&msg.process_id, target_state, msg.timeout)
                .await?;
            Ok(Reply::ok(msgs::SUBSCRIBE_PROCESS, &process)?)
        }
        msgs::SUBSCRIBE_PROCESSES => {
            let msg: msgs::SubscribeProcessesMsg = envelope.decode(msgs::SUBSCRIBE_PROCESSES)?;
            state
                .validator
                .require_executor_membership(&caller, &msg.colony_id, true)
                .await?;
            let target_state =
                ProcessState::try_from(msg.state).map_err(ApiError::InvalidPayload)?;
            let process = state
                .controller
                .subscribe_processes(&msg.colony_id, &msg.executor_type, target_state, msg.timeout)
                .await?;
            Ok(Reply::ok(msgs::SUBSCRIBE_PROCESSES, &process)?)
        }
        other => Err(ApiError::InvalidPayload(format!(
            "unknown subscription type: {other}"
        ))),
    }
}
