use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lockstep_collab::{
    AuthError, DatabaseError, PlaybackError, QueueError, RoomError, SettingsError,
};
use serde_json::json;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

/// Errors as exposed to clients. Every response body carries a stable `code`
/// that clients branch on, and a human readable `message`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Room not found.")]
    RoomNotFound,
    #[error("Host user does not exist.")]
    HostNotFound,
    #[error("User is not part of this room.")]
    NotAMember,
    #[error("Only the host can do this.")]
    OnlyHost,
    #[error("Guests cannot enqueue tracks in this room.")]
    GuestEnqueueDisabled,
    #[error("User cannot remove this item.")]
    CannotRemoveItem,
    #[error("Queue item not found.")]
    QueueItemNotFound,
    #[error("A session is required.")]
    SessionRequired,
    #[error("Could not allocate a unique room code.")]
    RoomCodesExhausted,
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::RoomNotFound | Self::HostNotFound | Self::QueueItemNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::NotAMember
            | Self::OnlyHost
            | Self::GuestEnqueueDisabled
            | Self::CannotRemoveItem
            | Self::SessionRequired => StatusCode::FORBIDDEN,
            Self::RoomCodesExhausted => StatusCode::CONFLICT,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The machine readable code clients use to tell errors apart
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::HostNotFound => "HOST_NOT_FOUND",
            Self::NotAMember => "NOT_A_MEMBER",
            Self::OnlyHost => "ONLY_HOST",
            Self::GuestEnqueueDisabled => "GUEST_ENQUEUE_DISABLED",
            Self::CannotRemoveItem => "CANNOT_REMOVE_ITEM",
            Self::QueueItemNotFound => "QUEUE_ITEM_NOT_FOUND",
            Self::SessionRequired => "SESSION_REQUIRED",
            Self::RoomCodesExhausted => "ROOM_CODES_EXHAUSTED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::Unknown(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });

        (self.as_status_code(), Json(body)).into_response()
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::RoomNotFound => Self::RoomNotFound,
            RoomError::HostNotFound => Self::HostNotFound,
            RoomError::NotAMember => Self::NotAMember,
            RoomError::NotHost => Self::OnlyHost,
            RoomError::CodeSpaceExhausted(_) => Self::RoomCodesExhausted,
            RoomError::Database(e) => e.into(),
        }
    }
}

impl From<QueueError> for ServerError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::GuestEnqueueDisabled => Self::GuestEnqueueDisabled,
            QueueError::CannotRemoveItem => Self::CannotRemoveItem,
            QueueError::ItemNotFound => Self::QueueItemNotFound,
            QueueError::Room(e) => e.into(),
            QueueError::Database(e) => e.into(),
        }
    }
}

impl From<SettingsError> for ServerError {
    fn from(value: SettingsError) -> Self {
        match value {
            SettingsError::OnlyHost => Self::OnlyHost,
            SettingsError::Room(e) => e.into(),
            SettingsError::Database(e) => e.into(),
        }
    }
}

impl From<PlaybackError> for ServerError {
    fn from(value: PlaybackError) -> Self {
        match value {
            PlaybackError::Database(e) => e.into(),
        }
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::UnknownUser => Self::SessionRequired,
            AuthError::Db(e) => e.into(),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}
