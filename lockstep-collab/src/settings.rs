use thiserror::Error;

use crate::{
    CollabContext, CollabEvent, DatabaseError, PrimaryKey, RoomError, RoomSettingsData,
    UpdatedSettings,
};

/// Manages per-room settings. Only the host may change them, and every change
/// is announced to the room through the event channel.
pub struct SettingsManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    /// A guest tried to change settings
    #[error("Only the host can update settings")]
    OnlyHost,
    #[error(transparent)]
    Room(RoomError),
    #[error(transparent)]
    Database(DatabaseError),
}

impl SettingsManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// The current settings of a room
    pub async fn settings(&self, room_id: PrimaryKey) -> Result<RoomSettingsData, SettingsError> {
        self.context
            .database
            .settings_by_room_id(room_id)
            .await
            .map_err(SettingsError::Database)
    }

    /// Updates whether guests may enqueue. The acting user's role is read
    /// fresh from the database, so a stale idea of "I am the host" carried by
    /// a client cannot get past this.
    pub async fn update(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
        allow_guest_enqueue: bool,
    ) -> Result<RoomSettingsData, SettingsError> {
        let member = self
            .context
            .database
            .member_by_room_and_user(room_id, user_id)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    SettingsError::Room(RoomError::NotAMember)
                } else {
                    SettingsError::Database(e)
                }
            })?;

        if !member.role.is_host() {
            return Err(SettingsError::OnlyHost);
        }

        let settings = self
            .context
            .database
            .update_settings(UpdatedSettings {
                room_id,
                allow_guest_enqueue,
            })
            .await
            .map_err(SettingsError::Database)?;

        self.context.emit(CollabEvent::SettingsUpdated {
            room_id,
            allow_guest_enqueue: settings.allow_guest_enqueue,
        });

        Ok(settings)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{Collab, MemoryDatabase};

    #[tokio::test]
    async fn test_only_the_host_can_update_settings() {
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

        let result = collab.settings.update(room.id, guest.id, false).await;
        assert!(matches!(result, Err(SettingsError::OnlyHost)));

        // The guest's attempt changed nothing
        let settings = collab
            .settings
            .settings(room.id)
            .await
            .expect("settings are returned");
        assert!(settings.allow_guest_enqueue);

        let settings = collab
            .settings
            .update(room.id, host.id, false)
            .await
            .expect("host updates settings");
        assert!(!settings.allow_guest_enqueue);
    }

    #[tokio::test]
    async fn test_updates_are_announced() {
        let collab = Collab::new(Arc::new(MemoryDatabase::new()), None);
        let events = collab.events();

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

        collab
            .settings
            .update(room.id, host.id, false)
            .await
            .expect("host updates settings");

        let event = events.try_recv().expect("an event was emitted");

        assert!(matches!(
            event,
            CollabEvent::SettingsUpdated {
                allow_guest_enqueue: false,
                ..
            }
        ));
    }
}
