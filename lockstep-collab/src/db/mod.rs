use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type ArcedDatabase = Arc<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that can fetch and store lockstep data
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData>;
    async fn room_by_code(&self, code: &str) -> Result<RoomData>;
    /// Creates a room along with its host membership and default settings, atomically.
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    async fn member_by_room_and_user(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomMemberData>;
    async fn create_room_member(&self, new_member: NewRoomMember) -> Result<RoomMemberData>;

    async fn settings_by_room_id(&self, room_id: PrimaryKey) -> Result<RoomSettingsData>;
    async fn update_settings(&self, updated: UpdatedSettings) -> Result<RoomSettingsData>;

    async fn queue_items(&self, room_id: PrimaryKey) -> Result<Vec<QueueItemData>>;
    async fn queue_item_by_id(&self, item_id: PrimaryKey) -> Result<QueueItemData>;
    async fn max_queue_position(&self, room_id: PrimaryKey) -> Result<Option<i32>>;
    async fn create_queue_item(&self, new_item: NewQueueItem) -> Result<QueueItemData>;
    async fn delete_queue_item(&self, item_id: PrimaryKey) -> Result<()>;
    async fn first_unplayed_item(&self, room_id: PrimaryKey) -> Result<Option<QueueItemData>>;
    async fn mark_item_played(&self, item_id: PrimaryKey) -> Result<()>;

    async fn playback_by_room_id(&self, room_id: PrimaryKey) -> Result<Option<PlaybackStateData>>;
    /// Replaces the playback snapshot wholesale and stamps `updated_at`.
    /// No history is retained.
    async fn upsert_playback(
        &self,
        room_id: PrimaryKey,
        update: PlaybackUpdate,
    ) -> Result<PlaybackStateData>;
}

#[derive(Debug)]
pub struct NewUser {
    pub display_name: String,
}

#[derive(Debug)]
pub struct NewRoom {
    pub code: String,
    /// The host of the new room
    pub host_user_id: PrimaryKey,
}

#[derive(Debug)]
pub struct NewRoomMember {
    pub room_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub role: RoomRole,
}

#[derive(Debug)]
pub struct UpdatedSettings {
    pub room_id: PrimaryKey,
    pub allow_guest_enqueue: bool,
}

#[derive(Debug)]
pub struct NewQueueItem {
    pub room_id: PrimaryKey,
    pub video_id: String,
    pub title: String,
    pub duration_seconds: Option<i32>,
    pub added_by: PrimaryKey,
    pub position: i32,
}

#[derive(Debug, Clone)]
pub struct PlaybackUpdate {
    pub video_id: Option<String>,
    pub is_playing: bool,
    pub position_ms: i64,
    pub playback_rate: f64,
}
