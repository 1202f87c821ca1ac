//! Persistent event channel to the sound-tools server.
//!
//! One channel carries the events of exactly one job. The session cookie
//! from the credential handshake is forwarded on the upgrade request, since
//! the server ties the event stream to it.

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::models::ChannelState;

use super::dto::{ClientEvent, EventEnvelope, ServerEvent};
use super::session::{JobChannel, SessionError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket-backed job event channel.
pub struct EventChannel {
    ws: WsStream,
    state: ChannelState,
}

impl EventChannel {
    /// Open the channel. `cookie` is the session cookie established by the
    /// credential handshake, if one is set.
    pub async fn connect(url: &Url, cookie: Option<String>) -> Result<Self, SessionError> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        if let Some(cookie) = cookie {
            let value = cookie
                .parse()
                .map_err(|_| SessionError::Connect("Invalid session cookie".to_string()))?;
            request.headers_mut().insert(header::COOKIE, value);
        }

        tracing::debug!("Opening event channel to {}", url);
        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        Ok(Self {
            ws,
            state: ChannelState::Open,
        })
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }
}

impl JobChannel for EventChannel {
    async fn next_event(&mut self) -> Option<Result<ServerEvent, SessionError>> {
        loop {
            match self.ws.next().await {
                None => {
                    self.state = ChannelState::Closed;
                    return None;
                }
                Some(Err(e)) => {
                    self.state = ChannelState::Closed;
                    return Some(Err(SessionError::Protocol(e.to_string())));
                }
                Some(Ok(Message::Text(text))) => {
                    let parsed = serde_json::from_str::<EventEnvelope>(&text)
                        .and_then(EventEnvelope::into_event)
                        .map_err(|e| SessionError::Protocol(e.to_string()));
                    return Some(parsed);
                }
                Some(Ok(Message::Close(_))) => {
                    self.state = ChannelState::Closed;
                    return None;
                }
                // Ping/pong and binary frames are not protocol events.
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn send_stop(&mut self) -> Result<(), SessionError> {
        let payload = serde_json::to_string(&ClientEvent::stop())
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        self.ws
            .send(Message::Text(payload))
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))
    }

    async fn close(&mut self) {
        if self.state != ChannelState::Closed {
            let _ = self.ws.close(None).await;
            self.state = ChannelState::Closed;
        }
    }
}
