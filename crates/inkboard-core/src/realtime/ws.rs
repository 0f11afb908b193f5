//! Change feed over the relay server's WebSocket (native only).
//!
//! Each subscription owns a background thread holding one socket. The
//! thread forwards `object_changed` messages into the subscription's channel.

use super::protocol::{ClientMessage, ServerMessage};
use super::{ChangeFeed, ChangeNotification, FeedError, Subscription};
use crate::storage::{BoardId, UserId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, channel};
use std::thread;
use std::time::Duration;
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::{Message, connect};
use url::Url;

/// Header the relay reads the subscriber's identity from.
pub const USER_HEADER: &str = "x-user-id";

/// Connects to `ws://host/ws` style endpoints.
#[derive(Debug, Clone)]
pub struct WsChangeFeed {
    url: Url,
    user_id: Option<UserId>,
}

impl WsChangeFeed {
    pub fn new(url: &str) -> Result<Self, FeedError> {
        let url = Url::parse(url).map_err(|e| FeedError::InvalidUrl(e.to_string()))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(FeedError::InvalidUrl(format!(
                "invalid WebSocket URL scheme: {}",
                url.scheme()
            )));
        }
        Ok(Self { url, user_id: None })
    }

    /// Identify as `user_id`. The relay only lets collaborators subscribe.
    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

impl ChangeFeed for WsChangeFeed {
    fn subscribe(&self, board_id: BoardId) -> Result<Subscription, FeedError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| FeedError::InvalidUrl(e.to_string()))?;
        if let Some(user_id) = self.user_id {
            let value = HeaderValue::from_str(&user_id.to_string())
                .map_err(|e| FeedError::Connect(e.to_string()))?;
            request.headers_mut().insert(USER_HEADER, value);
        }
        let (mut socket, response) =
            connect(request).map_err(|e| FeedError::Connect(e.to_string()))?;
        log::info!("Change feed connected, status: {}", response.status());

        // Short read timeout so the loop can notice cancellation
        if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }

        let hello = serde_json::to_string(&ClientMessage::Subscribe { board_id })
            .map_err(|e| FeedError::Connect(e.to_string()))?;
        socket
            .send(Message::Text(hello))
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        let (tx, rx) = channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        thread::spawn(move || run(socket, board_id, tx, stop_flag));

        Ok(Subscription::new(board_id, rx, move || {
            stop.store(true, Ordering::SeqCst);
        }))
    }
}

type Socket = tungstenite::WebSocket<tungstenite::stream::MaybeTlsStream<std::net::TcpStream>>;

fn run(mut socket: Socket, board_id: BoardId, tx: Sender<ChangeNotification>, stop: Arc<AtomicBool>) {
    loop {
        if stop.load(Ordering::SeqCst) {
            if let Ok(bye) = serde_json::to_string(&ClientMessage::Unsubscribe) {
                let _ = socket.send(Message::Text(bye));
            }
            let _ = socket.close(None);
            break;
        }
        match socket.read() {
            Ok(Message::Text(txt)) => match serde_json::from_str::<ServerMessage>(&txt) {
                Ok(ServerMessage::ObjectChanged(change)) => {
                    if tx.send(change).is_err() {
                        break;
                    }
                }
                Ok(ServerMessage::Subscribed { .. }) => {
                    log::info!("Subscribed to changes of board {}", board_id);
                }
                Ok(ServerMessage::Error { message }) => {
                    log::warn!("Change feed error: {}", message);
                }
                Err(e) => log::warn!("Failed to parse server message: {}", e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("Change feed received close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("Change feed read error: {}", e);
                break;
            }
        }
    }
    log::info!("Change feed thread for board {} exiting", board_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_ws_urls() {
        assert!(matches!(
            WsChangeFeed::new("http://localhost:3030/ws"),
            Err(FeedError::InvalidUrl(_))
        ));
        assert!(matches!(WsChangeFeed::new("not a url"), Err(FeedError::InvalidUrl(_))));
        assert!(WsChangeFeed::new("ws://localhost:3030/ws").is_ok());
    }
}
