use axum::{
    extract::Path,
    routing::{delete, get, post},
    Json,
};
use lockstep_collab::{NewQueueEntry, PrimaryKey};
use serde_json::{json, Value};

use crate::{
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::{
        CreateQueueItemSchema, CreateRoomSchema, JoinRoomSchema, RemoveQueueItemSchema,
        UpdateSettingsSchema, ValidatedJson,
    },
    serialized::{
        joined_room, JoinedRoom, PlaybackState, QueueItem, RoomCreated, RoomDetail, Settings,
        ToSerialized,
    },
    session::Session,
    Router,
};

async fn create_room(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<CreateRoomSchema>,
) -> ServerResult<Json<RoomCreated>> {
    let room = context.collab.rooms.create_room(body.host_user_id).await?;

    Ok(Json(ToSerialized::<RoomCreated>::to_serialized(&room)))
}

async fn join_room(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<JoinRoomSchema>,
) -> ServerResult<Json<JoinedRoom>> {
    let (room, member) = context
        .collab
        .rooms
        .join_room(&body.code, body.user_id)
        .await?;

    Ok(Json(joined_room(&room, &member)))
}

async fn room_detail(
    context: ServerContext,
    Path(room_id): Path<PrimaryKey>,
) -> ServerResult<Json<RoomDetail>> {
    let room = context.collab.rooms.room(room_id).await?;

    Ok(Json(ToSerialized::<RoomDetail>::to_serialized(&room)))
}

async fn list_queue(
    context: ServerContext,
    Path(room_id): Path<PrimaryKey>,
) -> ServerResult<Json<Vec<QueueItem>>> {
    let items = context.collab.queues.items(room_id).await?;

    Ok(Json(items.to_serialized()))
}

async fn add_to_queue(
    context: ServerContext,
    Path(room_id): Path<PrimaryKey>,
    session: Option<Session>,
    ValidatedJson(body): ValidatedJson<CreateQueueItemSchema>,
) -> ServerResult<Json<QueueItem>> {
    let user_id = identity(session, body.user_id)?;

    let item = context
        .collab
        .queues
        .add(
            room_id,
            user_id,
            NewQueueEntry {
                video_id: body.video_id,
                title: body.title,
                duration_seconds: body.duration_seconds,
            },
        )
        .await?;

    Ok(Json(item.to_serialized()))
}

async fn remove_from_queue(
    context: ServerContext,
    Path((room_id, item_id)): Path<(PrimaryKey, PrimaryKey)>,
    session: Option<Session>,
    body: Option<ValidatedJson<RemoveQueueItemSchema>>,
) -> ServerResult<Json<Value>> {
    let user_id = identity(session, body.and_then(|ValidatedJson(b)| b.user_id))?;

    context
        .collab
        .queues
        .remove(room_id, item_id, user_id)
        .await?;

    Ok(Json(json!({ "ok": true })))
}

async fn playback_state(
    context: ServerContext,
    Path(room_id): Path<PrimaryKey>,
) -> ServerResult<Json<PlaybackState>> {
    let state = context.collab.playback.state(room_id).await?;

    Ok(Json(state.to_serialized()))
}

async fn update_settings(
    context: ServerContext,
    Path(room_id): Path<PrimaryKey>,
    session: Option<Session>,
    ValidatedJson(body): ValidatedJson<UpdateSettingsSchema>,
) -> ServerResult<Json<Settings>> {
    let user_id = identity(session, body.user_id)?;

    let settings = context
        .collab
        .settings
        .update(room_id, user_id, body.allow_guest_enqueue)
        .await?;

    Ok(Json(settings.to_serialized()))
}

/// Resolves the acting user from the session cookie, falling back to an
/// explicitly provided id for clients that can't carry cookies
fn identity(session: Option<Session>, fallback: Option<PrimaryKey>) -> ServerResult<PrimaryKey> {
    session
        .map(|s| s.user_id)
        .or(fallback)
        .ok_or(ServerError::SessionRequired)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_identity_prefers_the_session_cookie() {
        let session = Some(Session { user_id: 1 });

        assert_eq!(identity(session, Some(2)).unwrap(), 1);
        assert_eq!(identity(None, Some(2)).unwrap(), 2);
        assert!(matches!(
            identity(None, None),
            Err(ServerError::SessionRequired)
        ));
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/join", post(join_room))
        .route("/rooms/:room_id", get(room_detail))
        .route("/rooms/:room_id/queue", get(list_queue).post(add_to_queue))
        .route("/rooms/:room_id/queue/:item_id", delete(remove_from_queue))
        .route("/rooms/:room_id/playback", get(playback_state))
        .route("/rooms/:room_id/settings", post(update_settings))
}
