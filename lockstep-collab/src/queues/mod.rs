use thiserror::Error;

use crate::{
    CollabContext, CollabEvent, DatabaseError, NewQueueItem, PlaybackStateData, PlaybackUpdate,
    PrimaryKey, QueueItemData, RoomError, RoomRole,
};

/// Coordinates the shared queue of a room.
///
/// Positions are append-only. An item gets max + 1 at insertion and keeps it
/// forever, so removals leave gaps and the visible order stays stable.
pub struct QueueCoordinator {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// A guest tried to enqueue while the room disallows it
    #[error("Guests cannot enqueue in this room")]
    GuestEnqueueDisabled,
    /// Guests can only remove their own items
    #[error("User cannot remove this item")]
    CannotRemoveItem,
    #[error("Queue item not found")]
    ItemNotFound,
    #[error(transparent)]
    Room(RoomError),
    #[error(transparent)]
    Database(DatabaseError),
}

/// What to enqueue, as provided by a client
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub video_id: String,
    pub title: String,
    pub duration_seconds: Option<i32>,
}

impl QueueCoordinator {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// All items of a room's queue, played and pending, in position order
    pub async fn items(&self, room_id: PrimaryKey) -> Result<Vec<QueueItemData>, QueueError> {
        self.context
            .database
            .queue_items(room_id)
            .await
            .map_err(QueueError::Database)
    }

    /// Appends an entry to the queue on behalf of a member.
    ///
    /// Guests are rejected when the room has guest enqueueing turned off.
    /// The membership and the setting are both read fresh, so flipping the
    /// setting takes effect for the very next add.
    pub async fn add(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
        entry: NewQueueEntry,
    ) -> Result<QueueItemData, QueueError> {
        let member = self
            .assert_member(room_id, user_id)
            .await
            .map_err(QueueError::Room)?;

        let settings = self
            .context
            .database
            .settings_by_room_id(room_id)
            .await
            .map_err(QueueError::Database)?;

        if member.role == RoomRole::Guest && !settings.allow_guest_enqueue {
            return Err(QueueError::GuestEnqueueDisabled);
        }

        let max_position = self
            .context
            .database
            .max_queue_position(room_id)
            .await
            .map_err(QueueError::Database)?;

        let new_item = NewQueueItem {
            room_id,
            video_id: entry.video_id,
            title: entry.title.trim().to_string(),
            duration_seconds: entry.duration_seconds,
            added_by: user_id,
            position: max_position.unwrap_or(-1) + 1,
        };

        let item = self
            .context
            .database
            .create_queue_item(new_item)
            .await
            .map_err(QueueError::Database)?;

        self.emit_updated(room_id).await?;

        Ok(item)
    }

    /// Removes an item from the queue. The host can remove anything, guests
    /// only what they added themselves.
    pub async fn remove(
        &self,
        room_id: PrimaryKey,
        item_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<(), QueueError> {
        let member = self
            .assert_member(room_id, user_id)
            .await
            .map_err(QueueError::Room)?;

        let item = match self.context.database.queue_item_by_id(item_id).await {
            Ok(item) if item.room_id == room_id => item,
            Ok(_) => return Err(QueueError::ItemNotFound),
            Err(e) if e.is_not_found() => return Err(QueueError::ItemNotFound),
            Err(e) => return Err(QueueError::Database(e)),
        };

        if !member.role.is_host() && item.added_by != user_id {
            return Err(QueueError::CannotRemoveItem);
        }

        self.context
            .database
            .delete_queue_item(item.id)
            .await
            .map_err(QueueError::Database)?;

        self.emit_updated(room_id).await?;

        Ok(())
    }

    /// Advances the queue. The first unplayed item is marked played and loaded
    /// into playback, paused at the start. When the queue is exhausted nothing
    /// changes and `None` is returned.
    pub async fn take_next(
        &self,
        room_id: PrimaryKey,
    ) -> Result<Option<(QueueItemData, PlaybackStateData)>, QueueError> {
        let item = match self
            .context
            .database
            .first_unplayed_item(room_id)
            .await
            .map_err(QueueError::Database)?
        {
            Some(item) => item,
            None => return Ok(None),
        };

        self.context
            .database
            .mark_item_played(item.id)
            .await
            .map_err(QueueError::Database)?;

        let state = self
            .context
            .database
            .upsert_playback(room_id, PlaybackUpdate::loaded(item.video_id.clone()))
            .await
            .map_err(QueueError::Database)?;

        self.emit_updated(room_id).await?;

        Ok(Some((item, state)))
    }

    async fn assert_member(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<crate::RoomMemberData, RoomError> {
        self.context
            .database
            .member_by_room_and_user(room_id, user_id)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    RoomError::NotAMember
                } else {
                    RoomError::Database(e)
                }
            })
    }

    async fn emit_updated(&self, room_id: PrimaryKey) -> Result<(), QueueError> {
        let items = self.items(room_id).await?;

        self.context.emit(CollabEvent::QueueUpdated { room_id, items });

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{Collab, MemoryDatabase};

    fn entry(video_id: &str) -> NewQueueEntry {
        NewQueueEntry {
            video_id: video_id.to_string(),
            title: format!("Title of {}", video_id),
            duration_seconds: Some(240),
        }
    }

    async fn room_with_guest() -> (Collab, PrimaryKey, PrimaryKey, PrimaryKey) {
        let collab = Collab::new(Arc::new(MemoryDatabase::new()), None);

        let host = collab
            .auth
            .get_or_create_user(None)
            .await
            .expect("host is created");

        let room = collab
            .rooms
            .create_room(host.id)
            .await
            .expect("room is created");

        let guest = collab
            .auth
            .get_or_create_user(None)
            .await
            .expect("guest is created");

        collab
            .rooms
            .join_room(&room.code, guest.id)
            .await
            .expect("guest joins");

        (collab, room.id, host.id, guest.id)
    }

    #[tokio::test]
    async fn test_positions_are_append_only() {
        let (collab, room_id, host_id, _) = room_with_guest().await;

        for video in ["a", "b", "c"] {
            collab
                .queues
                .add(room_id, host_id, entry(video))
                .await
                .expect("item is added");
        }

        let items = collab.queues.items(room_id).await.expect("items listed");
        let positions: Vec<_> = items.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);

        // Removing the middle item leaves a gap, and the next add goes after
        // the highest position ever used
        collab
            .queues
            .remove(room_id, items[1].id, host_id)
            .await
            .expect("item is removed");

        collab
            .queues
            .add(room_id, host_id, entry("d"))
            .await
            .expect("item is added");

        let items = collab.queues.items(room_id).await.expect("items listed");
        let positions: Vec<_> = items.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 2, 3]);
    }

    #[tokio::test]
    async fn test_guest_enqueue_respects_room_setting() {
        let (collab, room_id, host_id, guest_id) = room_with_guest().await;

        collab
            .queues
            .add(room_id, guest_id, entry("allowed"))
            .await
            .expect("guests can enqueue by default");

        collab
            .settings
            .update(room_id, host_id, false)
            .await
            .expect("host updates settings");

        let result = collab.queues.add(room_id, guest_id, entry("denied")).await;
        assert!(matches!(result, Err(QueueError::GuestEnqueueDisabled)));

        // The host is unaffected
        collab
            .queues
            .add(room_id, host_id, entry("host"))
            .await
            .expect("host can always enqueue");

        // Flipping the setting back takes effect immediately
        collab
            .settings
            .update(room_id, host_id, true)
            .await
            .expect("host updates settings");

        collab
            .queues
            .add(room_id, guest_id, entry("allowed-again"))
            .await
            .expect("guests can enqueue again");
    }

    #[tokio::test]
    async fn test_remove_permissions() {
        let (collab, room_id, host_id, guest_id) = room_with_guest().await;

        let host_item = collab
            .queues
            .add(room_id, host_id, entry("host-item"))
            .await
            .expect("item is added");

        let guest_item = collab
            .queues
            .add(room_id, guest_id, entry("guest-item"))
            .await
            .expect("item is added");

        let result = collab.queues.remove(room_id, host_item.id, guest_id).await;
        assert!(matches!(result, Err(QueueError::CannotRemoveItem)));

        collab
            .queues
            .remove(room_id, guest_item.id, guest_id)
            .await
            .expect("guests can remove their own items");

        collab
            .queues
            .remove(room_id, host_item.id, host_id)
            .await
            .expect("the host can remove anything");
    }

    #[tokio::test]
    async fn test_take_next_loads_paused_at_start() {
        let (collab, room_id, host_id, _) = room_with_guest().await;

        collab
            .queues
            .add(room_id, host_id, entry("first"))
            .await
            .expect("item is added");

        collab
            .queues
            .add(room_id, host_id, entry("second"))
            .await
            .expect("item is added");

        let (item, state) = collab
            .queues
            .take_next(room_id)
            .await
            .expect("advancing works")
            .expect("there is a next item");

        assert_eq!(item.video_id, "first");
        assert_eq!(state.video_id.as_deref(), Some("first"));
        assert!(!state.is_playing);
        assert_eq!(state.position_ms, 0);
        assert_eq!(state.playback_rate, 1.0);

        // The played item is skipped on the next advance
        let (item, _) = collab
            .queues
            .take_next(room_id)
            .await
            .expect("advancing works")
            .expect("there is a next item");

        assert_eq!(item.video_id, "second");

        let exhausted = collab
            .queues
            .take_next(room_id)
            .await
            .expect("advancing works");

        assert!(exhausted.is_none());
    }

    #[tokio::test]
    async fn test_queue_changes_emit_events() {
        let (collab, room_id, host_id, _) = room_with_guest().await;
        let events = collab.events();

        collab
            .queues
            .add(room_id, host_id, entry("a"))
            .await
            .expect("item is added");

        let event = events.try_recv().expect("an event was emitted");

        match event {
            CollabEvent::QueueUpdated {
                room_id: event_room,
                items,
            } => {
                assert_eq!(event_room, room_id);
                assert_eq!(items.len(), 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nonmember_cannot_touch_the_queue() {
        let (collab, room_id, _, _) = room_with_guest().await;

        let outsider = collab
            .auth
            .get_or_create_user(None)
            .await
            .expect("outsider is created");

        let result = collab.queues.add(room_id, outsider.id, entry("x")).await;
        assert!(matches!(
            result,
            Err(QueueError::Room(RoomError::NotAMember))
        ));
    }
}
