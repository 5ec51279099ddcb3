use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    Database, DatabaseError, NewQueueItem, NewRoom, NewRoomMember, NewUser, PlaybackStateData,
    PlaybackUpdate, PrimaryKey, QueueItemData, Result, RoomData, RoomMemberData, RoomRole,
    RoomSettingsData, UpdatedSettings, UserData,
};

/// An in-memory database, used when no postgres connection is configured.
/// Everything is lost on restart, which is acceptable for the ephemeral
/// nature of anonymous rooms.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: PrimaryKey,
    users: HashMap<PrimaryKey, UserData>,
    rooms: HashMap<PrimaryKey, StoredRoom>,
    members: Vec<StoredMember>,
    settings: HashMap<PrimaryKey, RoomSettingsData>,
    queue_items: Vec<StoredQueueItem>,
    playback: HashMap<PrimaryKey, PlaybackStateData>,
    force_code_conflicts: bool,
}

#[derive(Clone)]
struct StoredRoom {
    id: PrimaryKey,
    code: String,
    host_user_id: PrimaryKey,
    is_active: bool,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
struct StoredMember {
    id: PrimaryKey,
    room_id: PrimaryKey,
    user_id: PrimaryKey,
    role: RoomRole,
    joined_at: DateTime<Utc>,
}

#[derive(Clone)]
struct StoredQueueItem {
    id: PrimaryKey,
    room_id: PrimaryKey,
    video_id: String,
    title: String,
    duration_seconds: Option<i32>,
    added_by: PrimaryKey,
    position: i32,
    played: bool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryState {
    fn next_id(&mut self) -> PrimaryKey {
        self.next_id += 1;
        self.next_id
    }

    fn assemble_member(&self, member: &StoredMember) -> Result<RoomMemberData> {
        let user = self
            .users
            .get(&member.user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })?;

        Ok(RoomMemberData {
            id: member.id,
            room_id: member.room_id,
            role: member.role,
            joined_at: member.joined_at,
            user,
        })
    }

    fn assemble_room(&self, room: &StoredRoom) -> Result<RoomData> {
        let mut members: Vec<_> = self
            .members
            .iter()
            .filter(|m| m.room_id == room.id)
            .collect();

        members.sort_by_key(|m| m.joined_at);

        let members: Result<Vec<_>> = members
            .into_iter()
            .map(|m| self.assemble_member(m))
            .collect();

        let settings = self.settings.get(&room.id).cloned().unwrap_or_default();

        Ok(RoomData {
            id: room.id,
            code: room.code.clone(),
            host_user_id: room.host_user_id,
            is_active: room.is_active,
            created_at: room.created_at,
            members: members?,
            settings,
        })
    }

    fn assemble_queue_item(&self, item: &StoredQueueItem) -> QueueItemData {
        let added_by_display_name = self
            .users
            .get(&item.added_by)
            .map(|u| u.display_name.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        QueueItemData {
            id: item.id,
            room_id: item.room_id,
            video_id: item.video_id.clone(),
            title: item.title.clone(),
            duration_seconds: item.duration_seconds,
            added_by: item.added_by,
            added_by_display_name,
            position: item.position,
            played: item.played,
        }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.state
            .lock()
            .users
            .get(&user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut state = self.state.lock();
        let id = state.next_id();

        let user = UserData {
            id,
            display_name: new_user.display_name,
            created_at: Utc::now(),
        };

        state.users.insert(id, user.clone());

        Ok(user)
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        let state = self.state.lock();

        let room = state.rooms.get(&room_id).ok_or(DatabaseError::NotFound {
            resource: "room",
            identifier: "id",
        })?;

        state.assemble_room(room)
    }

    async fn room_by_code(&self, code: &str) -> Result<RoomData> {
        let state = self.state.lock();

        let room = state
            .rooms
            .values()
            .find(|r| r.code == code)
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "code",
            })?;

        state.assemble_room(room)
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let mut state = self.state.lock();

        let collides = state.force_code_conflicts
            || state.rooms.values().any(|r| r.code == new_room.code);

        if collides {
            return Err(DatabaseError::Conflict {
                resource: "room",
                field: "code",
                value: new_room.code,
            });
        }

        if !state.users.contains_key(&new_room.host_user_id) {
            return Err(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            });
        }

        let room_id = state.next_id();
        let member_id = state.next_id();

        let room = StoredRoom {
            id: room_id,
            code: new_room.code,
            host_user_id: new_room.host_user_id,
            is_active: true,
            created_at: Utc::now(),
        };

        state.rooms.insert(room_id, room.clone());

        state.members.push(StoredMember {
            id: member_id,
            room_id,
            user_id: new_room.host_user_id,
            role: RoomRole::Host,
            joined_at: Utc::now(),
        });

        state.settings.insert(room_id, RoomSettingsData::default());

        state.assemble_room(&room)
    }

    async fn member_by_room_and_user(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomMemberData> {
        let state = self.state.lock();

        let member = state
            .members
            .iter()
            .find(|m| m.room_id == room_id && m.user_id == user_id)
            .ok_or(DatabaseError::NotFound {
                resource: "room member",
                identifier: "room_id:user_id",
            })?;

        state.assemble_member(member)
    }

    async fn create_room_member(&self, new_member: NewRoomMember) -> Result<RoomMemberData> {
        let mut state = self.state.lock();

        let exists = state
            .members
            .iter()
            .any(|m| m.room_id == new_member.room_id && m.user_id == new_member.user_id);

        if exists {
            return Err(DatabaseError::Conflict {
                resource: "room member",
                field: "room:user",
                value: format!("{}:{}", new_member.room_id, new_member.user_id),
            });
        }

        let id = state.next_id();

        let member = StoredMember {
            id,
            room_id: new_member.room_id,
            user_id: new_member.user_id,
            role: new_member.role,
            joined_at: Utc::now(),
        };

        state.members.push(member.clone());
        state.assemble_member(&member)
    }

    async fn settings_by_room_id(&self, room_id: PrimaryKey) -> Result<RoomSettingsData> {
        self.state
            .lock()
            .settings
            .get(&room_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "room settings",
                identifier: "room_id",
            })
    }

    async fn update_settings(&self, updated: UpdatedSettings) -> Result<RoomSettingsData> {
        let mut state = self.state.lock();

        let settings = state.settings.entry(updated.room_id).or_default();
        settings.allow_guest_enqueue = updated.allow_guest_enqueue;

        Ok(settings.clone())
    }

    async fn queue_items(&self, room_id: PrimaryKey) -> Result<Vec<QueueItemData>> {
        let state = self.state.lock();

        let mut items: Vec<_> = state
            .queue_items
            .iter()
            .filter(|i| i.room_id == room_id)
            .map(|i| state.assemble_queue_item(i))
            .collect();

        items.sort_by_key(|i| i.position);

        Ok(items)
    }

    async fn queue_item_by_id(&self, item_id: PrimaryKey) -> Result<QueueItemData> {
        let state = self.state.lock();

        state
            .queue_items
            .iter()
            .find(|i| i.id == item_id)
            .map(|i| state.assemble_queue_item(i))
            .ok_or(DatabaseError::NotFound {
                resource: "queue item",
                identifier: "id",
            })
    }

    async fn max_queue_position(&self, room_id: PrimaryKey) -> Result<Option<i32>> {
        let state = self.state.lock();

        Ok(state
            .queue_items
            .iter()
            .filter(|i| i.room_id == room_id)
            .map(|i| i.position)
            .max())
    }

    async fn create_queue_item(&self, new_item: NewQueueItem) -> Result<QueueItemData> {
        let mut state = self.state.lock();
        let id = state.next_id();

        let item = StoredQueueItem {
            id,
            room_id: new_item.room_id,
            video_id: new_item.video_id,
            title: new_item.title,
            duration_seconds: new_item.duration_seconds,
            added_by: new_item.added_by,
            position: new_item.position,
            played: false,
        };

        state.queue_items.push(item.clone());

        Ok(state.assemble_queue_item(&item))
    }

    async fn delete_queue_item(&self, item_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        let index = state
            .queue_items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(DatabaseError::NotFound {
                resource: "queue item",
                identifier: "id",
            })?;

        state.queue_items.remove(index);

        Ok(())
    }

    async fn first_unplayed_item(&self, room_id: PrimaryKey) -> Result<Option<QueueItemData>> {
        let state = self.state.lock();

        Ok(state
            .queue_items
            .iter()
            .filter(|i| i.room_id == room_id && !i.played)
            .min_by_key(|i| i.position)
            .map(|i| state.assemble_queue_item(i)))
    }

    async fn mark_item_played(&self, item_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        let item = state
            .queue_items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(DatabaseError::NotFound {
                resource: "queue item",
                identifier: "id",
            })?;

        item.played = true;

        Ok(())
    }

    async fn playback_by_room_id(&self, room_id: PrimaryKey) -> Result<Option<PlaybackStateData>> {
        Ok(self.state.lock().playback.get(&room_id).cloned())
    }

    async fn upsert_playback(
        &self,
        room_id: PrimaryKey,
        update: PlaybackUpdate,
    ) -> Result<PlaybackStateData> {
        let mut state = self.state.lock();

        let snapshot = PlaybackStateData {
            room_id,
            video_id: update.video_id,
            is_playing: update.is_playing,
            position_ms: update.position_ms,
            playback_rate: update.playback_rate,
            updated_at: Utc::now(),
        };

        state.playback.insert(room_id, snapshot.clone());

        Ok(snapshot)
    }
}

#[cfg(test)]
impl MemoryDatabase {
    /// Makes every room creation collide, to exercise code retry behavior
    pub(crate) fn force_code_conflicts(&self, enabled: bool) {
        self.state.lock().force_code_conflicts = enabled;
    }

    pub(crate) fn set_room_active(&self, room_id: PrimaryKey, is_active: bool) {
        if let Some(room) = self.state.lock().rooms.get_mut(&room_id) {
            room.is_active = is_active;
        }
    }
}
