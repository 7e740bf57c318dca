//! Websocket endpoints for viewers and agents.
//!
//! Each connection gets a hub channel. A writer task drains the channel into
//! the socket while the reader loop feeds inbound frames to the dispatcher.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

use super::dispatch::{dispatch, Flow};
use crate::controller::Controller;
use crate::hub::ChannelGroup;
use crate::protocol::Frame;

pub async fn viewer_socket(
    ws: WebSocketUpgrade,
    State(ctl): State<Arc<Controller>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(ctl, socket, ChannelGroup::Viewer))
}

pub async fn agent_socket(
    ws: WebSocketUpgrade,
    State(ctl): State<Arc<Controller>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(ctl, socket, ChannelGroup::Agent))
}

async fn handle_socket(ctl: Arc<Controller>, socket: WebSocket, group: ChannelGroup) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (channel, mut outbound) = ctl.hub().open(group);
    tracing::debug!("{} channel {} opened", group, channel);

    let write_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let text = match frame.to_text() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Dropping unencodable '{}' frame: {}", frame.event, e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    if group == ChannelGroup::Viewer {
        ctl.viewer_connected(channel);
    }

    while let Some(result) = ws_receiver.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("Read error on {}: {}", channel, e);
                break;
            }
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        let frame = match Frame::parse(&text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Malformed frame on {}: {}", channel, e);
                continue;
            }
        };
        if dispatch(&ctl, channel, group, frame) == Flow::Close {
            break;
        }
    }

    ctl.channel_closed(channel);
    let _ = write_task.await;
    tracing::debug!("{} channel {} closed", group, channel);
}
