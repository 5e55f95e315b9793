//! WebSocket feed of tool record changes.
//!
//! Each connection streams the caller's [`ChangeEvent`]s as JSON text
//! frames until either side closes.
//!
//! [`ChangeEvent`]: crate::models::ChangeEvent

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};

use super::{AppState, AuthUser, ServerError};
use crate::backend::{Subscription, ToolStore};
use crate::models::UserId;

pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<Response, ServerError> {
    // Subscribed before the upgrade completes so no change is missed
    // between the handshake and the first poll.
    let topic = format!("realtime-{}", user.id);
    let subscription = state.backend.subscribe(&user.id, &topic).await?;
    tracing::info!("Realtime connection for {}", user.id);

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, subscription, user.id)))
}

async fn handle_socket(socket: WebSocket, mut subscription: Subscription, owner: UserId) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(event) = event else {
                    tracing::debug!("[realtime] feed for {} ended", owner);
                    break;
                };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("Failed to serialize change event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(json.into())).await {
                    tracing::warn!("[realtime] send to {} failed: {}", owner, e);
                    break;
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!("[realtime] {} closed the channel", owner);
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("[realtime] receive error from {}: {}", owner, e);
                        break;
                    }
                    // Client frames other than close carry nothing
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    subscription.close();
    tracing::info!("Realtime connection for {} closed", owner);
}
