use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// The role a user has within a room. There is no hierarchy beyond this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomRole {
    Host,
    Guest,
}

impl RoomRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "HOST",
            Self::Guest => "GUEST",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "HOST" => Some(Self::Host),
            "GUEST" => Some(Self::Guest),
            _ => None,
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }
}

/// An anonymous lockstep user
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// A lockstep room
#[derive(Debug, Clone)]
pub struct RoomData {
    pub id: PrimaryKey,
    /// The 6-character code used to join the room
    pub code: String,
    pub host_user_id: PrimaryKey,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub members: Vec<RoomMemberData>,
    pub settings: RoomSettingsData,
}

/// A member of a room
#[derive(Debug, Clone)]
pub struct RoomMemberData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub role: RoomRole,
    pub joined_at: DateTime<Utc>,
    pub user: UserData,
}

/// Per-room flags controlling guest capabilities
#[derive(Debug, Clone)]
pub struct RoomSettingsData {
    pub allow_guest_enqueue: bool,
    /// Stored and serialized, but not consulted by any enforcement path.
    /// Kept for forward compatibility with a voting feature.
    pub allow_guest_skip_vote: bool,
}

impl Default for RoomSettingsData {
    fn default() -> Self {
        Self {
            allow_guest_enqueue: true,
            allow_guest_skip_vote: false,
        }
    }
}

/// A pending or played media item in a room's queue
#[derive(Debug, Clone)]
pub struct QueueItemData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub video_id: String,
    pub title: String,
    pub duration_seconds: Option<i32>,
    pub added_by: PrimaryKey,
    pub added_by_display_name: String,
    /// Zero-based, unique within the room, assigned as max + 1 and never reused
    pub position: i32,
    pub played: bool,
}

/// The authoritative playback snapshot of a room.
///
/// `position_ms` is a point-in-time sample taken at `updated_at`. It is only
/// meaningful together with that timestamp; receivers must extrapolate with
/// elapsed wall time before treating it as "current".
#[derive(Debug, Clone)]
pub struct PlaybackStateData {
    pub room_id: PrimaryKey,
    pub video_id: Option<String>,
    pub is_playing: bool,
    pub position_ms: i64,
    pub playback_rate: f64,
    pub updated_at: DateTime<Utc>,
}

impl PlaybackStateData {
    /// The snapshot of a room that never had anything loaded.
    /// Callers treat this identically to "explicitly loaded nothing".
    pub fn zeroed(room_id: PrimaryKey) -> Self {
        Self {
            room_id,
            video_id: None,
            is_playing: false,
            position_ms: 0,
            playback_rate: 1.0,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}
