use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, prelude::FromRow, query, query_as, Error as SqlxError, PgPool};

use crate::{
    Database, DatabaseError, DatabaseResult, IntoDatabaseError, NewQueueItem, NewRoom,
    NewRoomMember, NewUser, PlaybackStateData, PlaybackUpdate, PrimaryKey, QueueItemData, Result,
    RoomData, RoomMemberData, RoomRole, RoomSettingsData, UpdatedSettings, UserData,
};

/// A postgres database implementation for lockstep
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct UserRow {
    id: PrimaryKey,
    display_name: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct RoomRow {
    id: PrimaryKey,
    code: String,
    host_user_id: PrimaryKey,
    is_active: bool,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct MemberRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    user_id: PrimaryKey,
    role: String,
    joined_at: DateTime<Utc>,
    display_name: String,
    user_created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SettingsRow {
    allow_guest_enqueue: bool,
    allow_guest_skip_vote: bool,
}

#[derive(FromRow)]
struct QueueItemRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    video_id: String,
    title: String,
    duration_seconds: Option<i32>,
    added_by: PrimaryKey,
    added_by_display_name: String,
    position: i32,
    played: bool,
}

#[derive(FromRow)]
struct PlaybackRow {
    room_id: PrimaryKey,
    video_id: Option<String>,
    is_playing: bool,
    position_ms: i64,
    playback_rate: f64,
    updated_at: DateTime<Utc>,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    async fn room_members(&self, room_id: PrimaryKey) -> Result<Vec<RoomMemberData>> {
        let member_rows: Vec<MemberRow> = query_as(
            "
            SELECT
                room_members.*,
                users.display_name,
                users.created_at AS user_created_at
            FROM room_members
                INNER JOIN users ON room_members.user_id = users.id
            WHERE room_id = $1
            ORDER BY room_members.joined_at ASC",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        member_rows.into_iter().map(member_from_row).collect()
    }

    async fn room_settings(&self, room_id: PrimaryKey) -> Result<RoomSettingsData> {
        let row: SettingsRow = query_as(
            "SELECT allow_guest_enqueue, allow_guest_skip_vote FROM room_settings WHERE room_id = $1",
        )
        .bind(room_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("room settings", "room_id"))?;

        Ok(RoomSettingsData {
            allow_guest_enqueue: row.allow_guest_enqueue,
            allow_guest_skip_vote: row.allow_guest_skip_vote,
        })
    }

    async fn assemble_room(&self, row: RoomRow) -> Result<RoomData> {
        let members = self.room_members(row.id).await?;
        let settings = self.room_settings(row.id).await?;

        Ok(RoomData {
            id: row.id,
            code: row.code,
            host_user_id: row.host_user_id,
            is_active: row.is_active,
            created_at: row.created_at,
            members,
            settings,
        })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        let row: UserRow = query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))?;

        Ok(user_from_row(row))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let row: UserRow = query_as("INSERT INTO users (display_name) VALUES ($1) RETURNING *")
            .bind(&new_user.display_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(user_from_row(row))
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        let row: RoomRow = query_as("SELECT * FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "id"))?;

        self.assemble_room(row).await
    }

    async fn room_by_code(&self, code: &str) -> Result<RoomData> {
        let row: RoomRow = query_as("SELECT * FROM rooms WHERE code = $1")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "code"))?;

        self.assemble_room(row).await
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        self.room_by_code(&new_room.code)
            .await
            .conflict_or_ok("room", "code", &new_room.code)?;

        let host = self.user_by_id(new_room.host_user_id).await?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let room: RoomRow =
            query_as("INSERT INTO rooms (code, host_user_id) VALUES ($1, $2) RETURNING *")
                .bind(&new_room.code)
                .bind(host.id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| e.any())?;

        query("INSERT INTO room_members (room_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(room.id)
            .bind(host.id)
            .bind(RoomRole::Host.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        query(
            "INSERT INTO room_settings (room_id, allow_guest_enqueue, allow_guest_skip_vote)
             VALUES ($1, true, false)",
        )
        .bind(room.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        self.room_by_id(room.id).await
    }

    async fn member_by_room_and_user(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomMemberData> {
        let row: MemberRow = query_as(
            "
            SELECT
                room_members.*,
                users.display_name,
                users.created_at AS user_created_at
            FROM room_members
                INNER JOIN users ON room_members.user_id = users.id
            WHERE room_id = $1 AND user_id = $2",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("room member", "room_id:user_id"))?;

        member_from_row(row)
    }

    async fn create_room_member(&self, new_member: NewRoomMember) -> Result<RoomMemberData> {
        self.member_by_room_and_user(new_member.room_id, new_member.user_id)
            .await
            .conflict_or_ok(
                "room member",
                "room:user",
                format!("{}:{}", new_member.room_id, new_member.user_id).as_str(),
            )?;

        query("INSERT INTO room_members (room_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(new_member.room_id)
            .bind(new_member.user_id)
            .bind(new_member.role.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.member_by_room_and_user(new_member.room_id, new_member.user_id)
            .await
    }

    async fn settings_by_room_id(&self, room_id: PrimaryKey) -> Result<RoomSettingsData> {
        self.room_settings(room_id).await
    }

    async fn update_settings(&self, updated: UpdatedSettings) -> Result<RoomSettingsData> {
        let row: SettingsRow = query_as(
            "
            INSERT INTO room_settings (room_id, allow_guest_enqueue, allow_guest_skip_vote)
            VALUES ($1, $2, false)
            ON CONFLICT (room_id) DO UPDATE SET allow_guest_enqueue = $2
            RETURNING allow_guest_enqueue, allow_guest_skip_vote",
        )
        .bind(updated.room_id)
        .bind(updated.allow_guest_enqueue)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(RoomSettingsData {
            allow_guest_enqueue: row.allow_guest_enqueue,
            allow_guest_skip_vote: row.allow_guest_skip_vote,
        })
    }

    async fn queue_items(&self, room_id: PrimaryKey) -> Result<Vec<QueueItemData>> {
        let rows: Vec<QueueItemRow> = query_as(
            "
            SELECT
                queue_items.*,
                users.display_name AS added_by_display_name
            FROM queue_items
                INNER JOIN users ON queue_items.added_by = users.id
            WHERE room_id = $1
            ORDER BY \"position\" ASC",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(queue_item_from_row).collect())
    }

    async fn queue_item_by_id(&self, item_id: PrimaryKey) -> Result<QueueItemData> {
        let row: QueueItemRow = query_as(
            "
            SELECT
                queue_items.*,
                users.display_name AS added_by_display_name
            FROM queue_items
                INNER JOIN users ON queue_items.added_by = users.id
            WHERE queue_items.id = $1",
        )
        .bind(item_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("queue item", "id"))?;

        Ok(queue_item_from_row(row))
    }

    async fn max_queue_position(&self, room_id: PrimaryKey) -> Result<Option<i32>> {
        let row: (Option<i32>,) =
            query_as("SELECT MAX(\"position\") FROM queue_items WHERE room_id = $1")
                .bind(room_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| e.any())?;

        Ok(row.0)
    }

    async fn create_queue_item(&self, new_item: NewQueueItem) -> Result<QueueItemData> {
        let row: (PrimaryKey,) = query_as(
            "
            INSERT INTO queue_items (room_id, video_id, title, duration_seconds, added_by, \"position\")
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id",
        )
        .bind(new_item.room_id)
        .bind(&new_item.video_id)
        .bind(&new_item.title)
        .bind(new_item.duration_seconds)
        .bind(new_item.added_by)
        .bind(new_item.position)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.queue_item_by_id(row.0).await
    }

    async fn delete_queue_item(&self, item_id: PrimaryKey) -> Result<()> {
        // Ensure the item exists
        let _ = self.queue_item_by_id(item_id).await?;

        query("DELETE FROM queue_items WHERE id = $1")
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn first_unplayed_item(&self, room_id: PrimaryKey) -> Result<Option<QueueItemData>> {
        let row: Option<QueueItemRow> = query_as(
            "
            SELECT
                queue_items.*,
                users.display_name AS added_by_display_name
            FROM queue_items
                INNER JOIN users ON queue_items.added_by = users.id
            WHERE room_id = $1 AND played = false
            ORDER BY \"position\" ASC
            LIMIT 1",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(row.map(queue_item_from_row))
    }

    async fn mark_item_played(&self, item_id: PrimaryKey) -> Result<()> {
        query("UPDATE queue_items SET played = true WHERE id = $1")
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn playback_by_room_id(&self, room_id: PrimaryKey) -> Result<Option<PlaybackStateData>> {
        let row: Option<PlaybackRow> =
            query_as("SELECT * FROM playback_states WHERE room_id = $1")
                .bind(room_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| e.any())?;

        Ok(row.map(playback_from_row))
    }

    async fn upsert_playback(
        &self,
        room_id: PrimaryKey,
        update: PlaybackUpdate,
    ) -> Result<PlaybackStateData> {
        let row: PlaybackRow = query_as(
            "
            INSERT INTO playback_states (room_id, video_id, is_playing, position_ms, playback_rate, updated_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (room_id) DO UPDATE SET
                video_id = $2,
                is_playing = $3,
                position_ms = $4,
                playback_rate = $5,
                updated_at = now()
            RETURNING *",
        )
        .bind(room_id)
        .bind(&update.video_id)
        .bind(update.is_playing)
        .bind(update.position_ms)
        .bind(update.playback_rate)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(playback_from_row(row))
    }
}

fn user_from_row(row: UserRow) -> UserData {
    UserData {
        id: row.id,
        display_name: row.display_name,
        created_at: row.created_at,
    }
}

fn member_from_row(row: MemberRow) -> Result<RoomMemberData> {
    let role = RoomRole::parse(&row.role).ok_or_else(|| {
        DatabaseError::Internal(format!("unknown room role: {}", row.role).into())
    })?;

    Ok(RoomMemberData {
        id: row.id,
        room_id: row.room_id,
        role,
        joined_at: row.joined_at,
        user: UserData {
            id: row.user_id,
            display_name: row.display_name,
            created_at: row.user_created_at,
        },
    })
}

fn queue_item_from_row(row: QueueItemRow) -> QueueItemData {
    QueueItemData {
        id: row.id,
        room_id: row.room_id,
        video_id: row.video_id,
        title: row.title,
        duration_seconds: row.duration_seconds,
        added_by: row.added_by,
        added_by_display_name: row.added_by_display_name,
        position: row.position,
        played: row.played,
    }
}

fn playback_from_row(row: PlaybackRow) -> PlaybackStateData {
    PlaybackStateData {
        room_id: row.room_id,
        video_id: row.video_id,
        is_playing: row.is_playing,
        position_ms: row.position_ms,
        playback_rate: row.playback_rate,
        updated_at: row.updated_at,
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
