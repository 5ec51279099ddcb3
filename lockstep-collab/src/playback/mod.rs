use thiserror::Error;

use crate::{CollabContext, DatabaseError, PlaybackStateData, PlaybackUpdate, PrimaryKey};

mod sync;
pub use sync::*;

/// Owns the authoritative playback snapshot of every room.
///
/// All mutations replace the snapshot wholesale. Controls that omit a field
/// carry the current value forward, so a play command without a rate does not
/// silently reset the rate to 1.
pub struct PlaybackManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Database(DatabaseError),
}

impl PlaybackManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// The current snapshot of a room. A room that never had anything loaded
    /// yields the zeroed snapshot instead of an error.
    pub async fn state(&self, room_id: PrimaryKey) -> Result<PlaybackStateData, PlaybackError> {
        let existing = self
            .context
            .database
            .playback_by_room_id(room_id)
            .await
            .map_err(PlaybackError::Database)?;

        Ok(existing.unwrap_or_else(|| PlaybackStateData::zeroed(room_id)))
    }

    /// Loads a video into the room, paused at the start with a normal rate
    pub async fn load(
        &self,
        room_id: PrimaryKey,
        video_id: String,
    ) -> Result<PlaybackStateData, PlaybackError> {
        self.apply(room_id, PlaybackUpdate::loaded(video_id)).await
    }

    /// Starts or resumes playback at the given position
    pub async fn play(
        &self,
        room_id: PrimaryKey,
        control: PlaybackControl,
    ) -> Result<PlaybackStateData, PlaybackError> {
        let current = self.state(room_id).await?;
        self.apply(room_id, control.merge_into(&current, true)).await
    }

    /// Pauses playback at the given position
    pub async fn pause(
        &self,
        room_id: PrimaryKey,
        control: PlaybackControl,
    ) -> Result<PlaybackStateData, PlaybackError> {
        let current = self.state(room_id).await?;
        self.apply(room_id, control.merge_into(&current, false))
            .await
    }

    /// Jumps to a position. Seeking always resumes playback, matching what
    /// players expect from scrubbing the timeline.
    pub async fn seek(
        &self,
        room_id: PrimaryKey,
        control: PlaybackControl,
    ) -> Result<PlaybackStateData, PlaybackError> {
        self.play(room_id, control).await
    }

    async fn apply(
        &self,
        room_id: PrimaryKey,
        update: PlaybackUpdate,
    ) -> Result<PlaybackStateData, PlaybackError> {
        self.context
            .database
            .upsert_playback(room_id, update)
            .await
            .map_err(PlaybackError::Database)
    }
}

/// A playback mutation as issued by a client. Optional fields fall back to
/// the room's current snapshot.
#[derive(Debug, Clone)]
pub struct PlaybackControl {
    pub video_id: Option<String>,
    pub position_ms: i64,
    pub playback_rate: Option<f64>,
}

impl PlaybackControl {
    fn merge_into(self, current: &PlaybackStateData, is_playing: bool) -> PlaybackUpdate {
        PlaybackUpdate {
            video_id: self.video_id.or_else(|| current.video_id.clone()),
            is_playing,
            position_ms: self.position_ms,
            playback_rate: self.playback_rate.unwrap_or(current.playback_rate),
        }
    }
}

impl PlaybackUpdate {
    /// The snapshot written when a video is first loaded or advanced to
    pub fn loaded(video_id: String) -> Self {
        Self {
            video_id: Some(video_id),
            is_playing: false,
            position_ms: 0,
            playback_rate: 1.0,
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{Collab, MemoryDatabase};

    fn control(position_ms: i64) -> PlaybackControl {
        PlaybackControl {
            video_id: None,
            position_ms,
            playback_rate: None,
        }
    }

    async fn collab_with_room() -> (Collab, crate::PrimaryKey) {
        let collab = Collab::new(Arc::new(MemoryDatabase::new()), None);

        let user = collab
            .auth
            .get_or_create_user(None)
            .await
            .expect("user is created");

        let room = collab
            .rooms
            .create_room(user.id)
            .await
            .expect("room is created");

        (collab, room.id)
    }

    #[tokio::test]
    async fn test_untouched_room_has_zeroed_state() {
        let (collab, room_id) = collab_with_room().await;

        let state = collab
            .playback
            .state(room_id)
            .await
            .expect("state is returned");

        assert_eq!(state.video_id, None);
        assert!(!state.is_playing);
        assert_eq!(state.position_ms, 0);
        assert_eq!(state.playback_rate, 1.0);
    }

    #[tokio::test]
    async fn test_load_resets_to_paused_start() {
        let (collab, room_id) = collab_with_room().await;

        collab
            .playback
            .play(
                room_id,
                PlaybackControl {
                    video_id: Some("first".to_string()),
                    position_ms: 90_000,
                    playback_rate: Some(1.5),
                },
            )
            .await
            .expect("play succeeds");

        let state = collab
            .playback
            .load(room_id, "second".to_string())
            .await
            .expect("load succeeds");

        assert_eq!(state.video_id.as_deref(), Some("second"));
        assert!(!state.is_playing);
        assert_eq!(state.position_ms, 0);
        assert_eq!(state.playback_rate, 1.0);
    }

    #[tokio::test]
    async fn test_controls_merge_missing_fields() {
        let (collab, room_id) = collab_with_room().await;

        collab
            .playback
            .load(room_id, "video".to_string())
            .await
            .expect("load succeeds");

        collab
            .playback
            .play(
                room_id,
                PlaybackControl {
                    video_id: None,
                    position_ms: 1_000,
                    playback_rate: Some(2.0),
                },
            )
            .await
            .expect("play succeeds");

        // A pause without a rate keeps the doubled rate and the video
        let state = collab
            .playback
            .pause(room_id, control(5_000))
            .await
            .expect("pause succeeds");

        assert_eq!(state.video_id.as_deref(), Some("video"));
        assert!(!state.is_playing);
        assert_eq!(state.position_ms, 5_000);
        assert_eq!(state.playback_rate, 2.0);
    }

    #[tokio::test]
    async fn test_seek_resumes_playback() {
        let (collab, room_id) = collab_with_room().await;

        collab
            .playback
            .load(room_id, "video".to_string())
            .await
            .expect("load succeeds");

        let state = collab
            .playback
            .seek(room_id, control(30_000))
            .await
            .expect("seek succeeds");

        assert!(state.is_playing);
        assert_eq!(state.position_ms, 30_000);
    }
}
