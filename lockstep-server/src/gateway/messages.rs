use lockstep_collab::{PrimaryKey, StateSync};
use serde::{Deserialize, Serialize};

use crate::serialized::{PlaybackState, QueueItem};

/// A command sent by a client over the gateway socket.
///
/// The wire format is `{"event": "...", "data": {...}}` with dotted event
/// names, so web clients can route on the event string.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientCommand {
    #[serde(rename = "join", rename_all = "camelCase")]
    Join {
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    },
    #[serde(rename = "playback.load", rename_all = "camelCase")]
    PlaybackLoad {
        room_id: PrimaryKey,
        video_id: String,
    },
    #[serde(rename = "playback.play", rename_all = "camelCase")]
    PlaybackPlay {
        room_id: PrimaryKey,
        video_id: Option<String>,
        position_ms: i64,
        playback_rate: Option<f64>,
    },
    #[serde(rename = "playback.pause", rename_all = "camelCase")]
    PlaybackPause {
        room_id: PrimaryKey,
        video_id: Option<String>,
        position_ms: i64,
        playback_rate: Option<f64>,
    },
    #[serde(rename = "playback.seek", rename_all = "camelCase")]
    PlaybackSeek {
        room_id: PrimaryKey,
        video_id: Option<String>,
        position_ms: i64,
        playback_rate: Option<f64>,
    },
    #[serde(rename = "queue.add", rename_all = "camelCase")]
    QueueAdd {
        room_id: PrimaryKey,
        video_id: String,
        title: String,
        duration_seconds: Option<i32>,
    },
    #[serde(rename = "queue.remove", rename_all = "camelCase")]
    QueueRemove {
        room_id: PrimaryKey,
        item_id: PrimaryKey,
    },
    #[serde(rename = "queue.next", rename_all = "camelCase")]
    QueueNext { room_id: PrimaryKey },
}

impl ClientCommand {
    /// The room a command targets
    pub fn room_id(&self) -> PrimaryKey {
        match self {
            Self::Join { room_id, .. }
            | Self::PlaybackLoad { room_id, .. }
            | Self::PlaybackPlay { room_id, .. }
            | Self::PlaybackPause { room_id, .. }
            | Self::PlaybackSeek { room_id, .. }
            | Self::QueueAdd { room_id, .. }
            | Self::QueueRemove { room_id, .. }
            | Self::QueueNext { room_id } => *room_id,
        }
    }
}

/// A message pushed to clients over the gateway socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// The full queue, sent privately after a join
    #[serde(rename = "queue.sync")]
    QueueSync(Vec<QueueItem>),
    /// The playback snapshot, sent privately after a join
    #[serde(rename = "playback.state")]
    PlaybackState(PlaybackState),
    /// The full queue, broadcast after any queue change
    #[serde(rename = "queue.updated")]
    QueueUpdated(Vec<QueueItem>),
    /// The clock-synchronized playback target, broadcast on control changes
    /// and on the periodic resync tick
    #[serde(rename = "state.sync")]
    StateSync(StateSync),
    #[serde(rename = "settings.updated", rename_all = "camelCase")]
    SettingsUpdated {
        room_id: PrimaryKey,
        allow_guest_enqueue: bool,
    },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_client_commands_parse_from_dotted_events() {
        let json = r#"{"event": "playback.play", "data": {"roomId": 1, "positionMs": 5000}}"#;
        let command: ClientCommand = serde_json::from_str(json).unwrap();

        match command {
            ClientCommand::PlaybackPlay {
                room_id,
                position_ms,
                video_id,
                playback_rate,
            } => {
                assert_eq!(room_id, 1);
                assert_eq!(position_ms, 5000);
                assert_eq!(video_id, None);
                assert_eq!(playback_rate, None);
            }
            other => panic!("parsed the wrong command: {:?}", other),
        }
    }

    #[test]
    fn test_join_command_parses() {
        let json = r#"{"event": "join", "data": {"roomId": 3, "userId": 7}}"#;
        let command: ClientCommand = serde_json::from_str(json).unwrap();

        assert!(matches!(
            command,
            ClientCommand::Join {
                room_id: 3,
                user_id: 7
            }
        ));
    }

    #[test]
    fn test_server_messages_carry_dotted_events() {
        let message = ServerMessage::SettingsUpdated {
            room_id: 2,
            allow_guest_enqueue: false,
        };

        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["event"], "settings.updated");
        assert_eq!(json["data"]["roomId"], 2);
        assert_eq!(json["data"]["allowGuestEnqueue"], false);
    }

    #[test]
    fn test_unknown_events_are_rejected() {
        let json = r#"{"event": "admin.shutdown", "data": {}}"#;
        let result: Result<ClientCommand, _> = serde_json::from_str(json);

        assert!(result.is_err());
    }
}
