use serde::{Deserialize, Serialize};

use crate::{PlaybackStateData, PrimaryKey};

/// How far a client may drift from the authoritative position before it
/// should hard-correct. Matches the tolerance the reference player uses.
pub const DRIFT_TOLERANCE_MS: i64 = 250;

/// A clock-synchronized snapshot of a room's playback, as sent over the wire.
///
/// Instead of telling clients "you should be at position X", which is stale
/// the moment it is serialized, this carries the position at emit time plus
/// the server timestamp of that emit. Any receiver can then compute the
/// current target position from its own estimate of server time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSync {
    pub room_id: PrimaryKey,
    pub video_id: Option<String>,
    pub is_playing: bool,
    pub position_at_emit_ms: i64,
    pub started_at_server_ms: i64,
    pub playback_rate: f64,
}

impl StateSync {
    /// Builds a sync event from a freshly written snapshot. The snapshot's
    /// own timestamp is ignored on purpose, it comes from the storage clock
    /// and would leak any skew between that clock and ours into the position.
    pub fn from_state(state: &PlaybackStateData, now_ms: i64) -> Self {
        Self {
            room_id: state.room_id,
            video_id: state.video_id.clone(),
            is_playing: state.is_playing,
            position_at_emit_ms: state.position_ms,
            started_at_server_ms: now_ms,
            playback_rate: state.playback_rate,
        }
    }

    /// Re-emits this sync as of a later server time, carrying the position
    /// forward when playback is running. Used for the periodic resync so it
    /// never has to consult any clock but the one it was emitted against.
    pub fn advanced_to(&self, now_ms: i64) -> Self {
        Self {
            position_at_emit_ms: self.target_position_ms(now_ms),
            started_at_server_ms: now_ms,
            ..self.clone()
        }
    }

    /// Where playback should be at the given server time
    pub fn target_position_ms(&self, now_ms: i64) -> i64 {
        if !self.is_playing {
            return self.position_at_emit_ms;
        }

        let elapsed = (now_ms - self.started_at_server_ms).max(0);
        self.position_at_emit_ms + (elapsed as f64 * self.playback_rate) as i64
    }

    /// Whether a locally reported position has drifted far enough from the
    /// target that the player should seek to correct it
    pub fn needs_correction(&self, local_position_ms: i64, now_ms: i64) -> bool {
        let drift = (self.target_position_ms(now_ms) - local_position_ms).abs();
        drift > DRIFT_TOLERANCE_MS
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn snapshot(is_playing: bool, position_ms: i64, rate: f64, at_ms: i64) -> PlaybackStateData {
        PlaybackStateData {
            room_id: 1,
            video_id: Some("dQw4w9WgXcQ".to_string()),
            is_playing,
            position_ms,
            playback_rate: rate,
            updated_at: stamp(at_ms),
        }
    }

    fn stamp(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_paused_position_is_frozen() {
        let sync = StateSync::from_state(&snapshot(false, 42_000, 1.0, 1_000), 9_000);

        assert_eq!(sync.position_at_emit_ms, 42_000);
        assert_eq!(sync.target_position_ms(100_000), 42_000);
    }

    #[test]
    fn test_playing_position_advances_with_wall_time() {
        let sync = StateSync::from_state(&snapshot(true, 5_000, 1.0, 1_000), 3_000);
        assert_eq!(sync.position_at_emit_ms, 5_000);

        // 4 seconds after the emit the target has advanced by 4 seconds
        assert_eq!(sync.target_position_ms(7_000), 9_000);
    }

    #[test]
    fn test_resync_carries_the_position_forward() {
        let sync = StateSync::from_state(&snapshot(true, 5_000, 1.0, 0), 3_000);

        let resync = sync.advanced_to(10_000);
        assert_eq!(resync.position_at_emit_ms, 12_000);
        assert_eq!(resync.started_at_server_ms, 10_000);

        // The advanced sync predicts the same timeline as the original
        assert_eq!(resync.target_position_ms(14_000), sync.target_position_ms(14_000));

        // A paused sync stays frozen no matter how much later it is re-emitted
        let paused = StateSync::from_state(&snapshot(false, 5_000, 1.0, 0), 3_000);
        assert_eq!(paused.advanced_to(60_000).position_at_emit_ms, 5_000);
    }

    #[test]
    fn test_playback_rate_scales_advancement() {
        let sync = StateSync::from_state(&snapshot(true, 0, 2.0, 0), 0);

        assert_eq!(sync.target_position_ms(1_000), 2_000);
        assert_eq!(sync.target_position_ms(10_000), 20_000);
    }

    #[test]
    fn test_storage_clock_does_not_leak_into_the_emit() {
        // A snapshot whose timestamp lags 5 seconds behind the server clock
        // must still be emitted at the position that was written
        let sync = StateSync::from_state(&snapshot(true, 0, 1.0, 0), 5_000);
        assert_eq!(sync.position_at_emit_ms, 0);

        // And one timestamped in the future must not rewind either
        let sync = StateSync::from_state(&snapshot(true, 5_000, 1.0, 10_000), 2_000);
        assert_eq!(sync.position_at_emit_ms, 5_000);
    }

    #[test]
    fn test_receiver_clock_behind_the_emit_does_not_rewind() {
        let sync = StateSync::from_state(&snapshot(true, 5_000, 1.0, 0), 10_000);
        assert_eq!(sync.target_position_ms(2_000), 5_000);
    }

    #[test]
    fn test_needs_correction_respects_tolerance() {
        let sync = StateSync::from_state(&snapshot(true, 0, 1.0, 0), 0);

        // Target at t=1000 is 1000ms
        assert!(!sync.needs_correction(1_000, 1_000));
        assert!(!sync.needs_correction(1_000 + DRIFT_TOLERANCE_MS, 1_000));
        assert!(sync.needs_correction(1_000 + DRIFT_TOLERANCE_MS + 1, 1_000));
        assert!(sync.needs_correction(1_000 - DRIFT_TOLERANCE_MS - 1, 1_000));
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let sync = StateSync::from_state(&snapshot(false, 0, 1.0, 0), 0);
        let json = serde_json::to_value(&sync).unwrap();

        assert!(json.get("positionAtEmitMs").is_some());
        assert!(json.get("startedAtServerMs").is_some());
        assert!(json.get("playbackRate").is_some());
    }
}
