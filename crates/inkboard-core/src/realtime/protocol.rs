//! JSON messages exchanged with the change relay over WebSocket.
//!
//! ```json
//! { "type": "subscribe", "board_id": "..." }
//! { "type": "object_changed", "board_id": "...", "kind": "update", "object_id": "..." }
//! ```

use super::ChangeNotification;
use crate::storage::BoardId;
use serde::{Deserialize, Serialize};

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving changes for a board
    Subscribe { board_id: BoardId },
    /// Stop receiving changes
    Unsubscribe,
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed { board_id: BoardId },
    ObjectChanged(ChangeNotification),
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ChangeKind;
    use uuid::Uuid;

    #[test]
    fn test_wire_format() {
        let board_id = Uuid::nil();
        let json = serde_json::to_value(ClientMessage::Subscribe { board_id }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "subscribe", "board_id": board_id})
        );

        let msg = ServerMessage::ObjectChanged(ChangeNotification {
            board_id,
            kind: ChangeKind::Delete,
            object_id: board_id,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "object_changed");
        assert_eq!(json["kind"], "delete");
        let back: ServerMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
