use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events delivered over the relay WebSocket.
///
/// The relay never carries message content: `MessageAdded` is a
/// "something changed, go re-fetch" signal and nothing more.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RelayEvent {
    /// Server confirms successful authentication of the connection
    Ready { user_id: Uuid, display_name: String },

    /// Another client persisted a message; recipients should re-pull the log
    MessageAdded { sender: String },
}

/// Commands sent FROM client TO relay over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RelayCommand {
    /// Authenticate the connection with a previously-issued token
    Identify { token: String },

    /// Announce that this client persisted a message.
    /// The relay fans this out to every OTHER connection as `MessageAdded`.
    Notify { sender: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_format_is_tagged() {
        let event = RelayEvent::MessageAdded {
            sender: "alice".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"MessageAdded","data":{"sender":"alice"}}"#);
    }

    #[test]
    fn command_round_trips() {
        let cmd = RelayCommand::Notify {
            sender: "bob".into(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: RelayCommand = serde_json::from_str(&json).unwrap();
        match back {
            RelayCommand::Notify { sender } => assert_eq!(sender, "bob"),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
