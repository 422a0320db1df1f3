use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::AppState;
use crate::relay;

/// Upgrade into a signaling session. Authentication happens in-band with an
/// `auth` message, so the upgrade itself is open.
pub async fn relay_websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let ctx = state.relay.clone();
    ws.max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| relay::handle_connection(socket, ctx))
}
