//! All schemas that are exposed from endpoints are defined here
//! along with the [ToSerialized] impls

use serde::{Deserialize, Serialize};

use lockstep_collab::{
    PlaybackStateData, QueueItemData, RoomData, RoomMemberData, RoomRole, RoomSettingsData,
    UserData,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    user_id: i32,
    display_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    room_id: i32,
    code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedRoom {
    room_id: i32,
    role: RoomRole,
    settings: Settings,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetail {
    room_id: i32,
    code: String,
    host_user_id: i32,
    members: Vec<RoomMember>,
    settings: Settings,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    user_id: i32,
    display_name: String,
    role: RoomRole,
    joined_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub allow_guest_enqueue: bool,
    pub allow_guest_skip_vote: bool,
}

// QueueItem and PlaybackState travel through the fanout, so they need to
// deserialize as well

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    id: i32,
    room_id: i32,
    video_id: String,
    title: String,
    duration_seconds: Option<i32>,
    added_by_id: i32,
    added_by_display_name: String,
    position: i32,
    played: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    room_id: i32,
    video_id: Option<String>,
    is_playing: bool,
    position_ms: i64,
    playback_rate: f64,
    updated_at: String,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<SessionUser> for UserData {
    fn to_serialized(&self) -> SessionUser {
        SessionUser {
            user_id: self.id,
            display_name: self.display_name.clone(),
        }
    }
}

impl ToSerialized<RoomCreated> for RoomData {
    fn to_serialized(&self) -> RoomCreated {
        RoomCreated {
            room_id: self.id,
            code: self.code.clone(),
        }
    }
}

impl ToSerialized<RoomDetail> for RoomData {
    fn to_serialized(&self) -> RoomDetail {
        RoomDetail {
            room_id: self.id,
            code: self.code.clone(),
            host_user_id: self.host_user_id,
            members: self.members.to_serialized(),
            settings: self.settings.to_serialized(),
        }
    }
}

impl ToSerialized<RoomMember> for RoomMemberData {
    fn to_serialized(&self) -> RoomMember {
        RoomMember {
            user_id: self.user.id,
            display_name: self.user.display_name.clone(),
            role: self.role,
            joined_at: self.joined_at.to_rfc3339(),
        }
    }
}

impl ToSerialized<Settings> for RoomSettingsData {
    fn to_serialized(&self) -> Settings {
        Settings {
            allow_guest_enqueue: self.allow_guest_enqueue,
            allow_guest_skip_vote: self.allow_guest_skip_vote,
        }
    }
}

impl ToSerialized<QueueItem> for QueueItemData {
    fn to_serialized(&self) -> QueueItem {
        QueueItem {
            id: self.id,
            room_id: self.room_id,
            video_id: self.video_id.clone(),
            title: self.title.clone(),
            duration_seconds: self.duration_seconds,
            added_by_id: self.added_by,
            added_by_display_name: self.added_by_display_name.clone(),
            position: self.position,
            played: self.played,
        }
    }
}

impl ToSerialized<PlaybackState> for PlaybackStateData {
    fn to_serialized(&self) -> PlaybackState {
        PlaybackState {
            room_id: self.room_id,
            video_id: self.video_id.clone(),
            is_playing: self.is_playing,
            position_ms: self.position_ms,
            playback_rate: self.playback_rate,
            updated_at: self.updated_at.to_rfc3339(),
        }
    }
}

/// Builds the response for a completed join
pub fn joined_room(room: &RoomData, member: &RoomMemberData) -> JoinedRoom {
    JoinedRoom {
        room_id: room.id,
        role: member.role,
        settings: room.settings.to_serialized(),
    }
}
