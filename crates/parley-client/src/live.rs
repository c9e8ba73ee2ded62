use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use parley_types::ChatError;
use parley_types::events::{FeedEvent, GatewayCommand};
use parley_types::models::FeedScope;

/// Live event stream from the server's `/gateway` WebSocket.
pub struct LiveFeed {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

fn gateway_url(base_url: &str, token: &str) -> String {
    format!(
        "{}/gateway?token={}",
        base_url
            .trim_end_matches('/')
            .replace("http://", "ws://")
            .replace("https://", "wss://"),
        token
    )
}

impl LiveFeed {
    pub async fn connect(base_url: &str, token: &str) -> Result<Self, ChatError> {
        let (ws, _) = connect_async(gateway_url(base_url, token))
            .await
            .map_err(|e| ChatError::UpstreamIo(format!("gateway connect failed: {}", e)))?;
        Ok(Self { ws })
    }

    /// Replace the set of feeds events are delivered for.
    pub async fn subscribe(&mut self, scopes: Vec<FeedScope>) -> Result<(), ChatError> {
        let json = serde_json::to_string(&GatewayCommand::Subscribe { scopes }).map_err(ChatError::internal)?;
        self.ws
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(ChatError::upstream)
    }

    /// The next event, or `None` once the server closes the connection.
    pub async fn next_event(&mut self) -> Result<Option<FeedEvent>, ChatError> {
        while let Some(frame) = self.ws.next().await {
            match frame.map_err(ChatError::upstream)? {
                WsMessage::Text(text) => match serde_json::from_str::<FeedEvent>(text.as_str()) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => warn!("gateway: unparseable event: {}", e),
                },
                WsMessage::Close(_) => break,
                other => debug!("gateway: skipping {} byte frame", other.len()),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_url_swaps_scheme() {
        assert_eq!(
            gateway_url("https://chat.example.com/", "abc"),
            "wss://chat.example.com/gateway?token=abc"
        );
        assert_eq!(gateway_url("http://localhost:3000", "t"), "ws://localhost:3000/gateway?token=t");
    }
}
