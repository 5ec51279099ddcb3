use log::info;
use thiserror::Error;

use crate::{
    CollabContext, DatabaseError, NewRoom, NewRoomMember, PrimaryKey, RoomData, RoomMemberData,
    RoomRole,
};

mod code;
pub use code::*;

/// How many random codes are tried before room creation gives up
pub const CODE_ATTEMPTS: usize = 5;

/// Manages the lifecycle and membership of rooms.
///
/// Membership is always derived from the database at the moment it is needed,
/// never cached, so a decision like "is this user the host" cannot go stale.
pub struct RoomManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Host user not found")]
    HostNotFound,
    #[error("User is not a member of this room")]
    NotAMember,
    #[error("Only the host can do this")]
    NotHost,
    #[error("Failed to generate a unique room code after {0} attempts")]
    CodeSpaceExhausted(usize),
    #[error(transparent)]
    Database(DatabaseError),
}

impl RoomManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a room with a freshly generated code, owned by the given user.
    ///
    /// Code collisions are retried a bounded number of times. When every
    /// attempt collides the error is surfaced instead of looping forever.
    pub async fn create_room(&self, host_user_id: PrimaryKey) -> Result<RoomData, RoomError> {
        for _ in 0..CODE_ATTEMPTS {
            let new_room = NewRoom {
                code: generate_room_code(),
                host_user_id,
            };

            match self.context.database.create_room(new_room).await {
                Ok(room) => {
                    info!("Room {} created by user {}", room.code, host_user_id);
                    return Ok(room);
                }
                Err(DatabaseError::Conflict { field: "code", .. }) => continue,
                Err(e) if e.is_not_found() => return Err(RoomError::HostNotFound),
                Err(e) => return Err(RoomError::Database(e)),
            }
        }

        Err(RoomError::CodeSpaceExhausted(CODE_ATTEMPTS))
    }

    /// Joins a room by its code. Joining a room the user is already in is a
    /// no-op that returns the existing membership, keeping the original role.
    pub async fn join_room(
        &self,
        code: &str,
        user_id: PrimaryKey,
    ) -> Result<(RoomData, RoomMemberData), RoomError> {
        let code = normalize_code(code);

        let room = self
            .context
            .database
            .room_by_code(&code)
            .await
            .map_err(not_found_as(RoomError::RoomNotFound))?;

        // Inactive rooms are indistinguishable from missing ones to joiners
        if !room.is_active {
            return Err(RoomError::RoomNotFound);
        }

        let member = match self
            .context
            .database
            .member_by_room_and_user(room.id, user_id)
            .await
        {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => {
                let new_member = NewRoomMember {
                    room_id: room.id,
                    user_id,
                    role: RoomRole::Guest,
                };

                self.context
                    .database
                    .create_room_member(new_member)
                    .await
                    .map_err(RoomError::Database)?
            }
            Err(e) => return Err(RoomError::Database(e)),
        };

        // Refetch so the member list includes the join that just happened
        let room = self
            .context
            .database
            .room_by_id(room.id)
            .await
            .map_err(RoomError::Database)?;

        Ok((room, member))
    }

    /// Returns the full detail of a room by its id
    pub async fn room(&self, room_id: PrimaryKey) -> Result<RoomData, RoomError> {
        self.context
            .database
            .room_by_id(room_id)
            .await
            .map_err(not_found_as(RoomError::RoomNotFound))
    }

    /// Asserts that a user is a member of a room, returning the membership.
    /// The check always goes to the database.
    pub async fn assert_member(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomMemberData, RoomError> {
        self.context
            .database
            .member_by_room_and_user(room_id, user_id)
            .await
            .map_err(not_found_as(RoomError::NotAMember))
    }

    /// Like [`Self::assert_member`], but additionally requires the host role
    pub async fn assert_host(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomMemberData, RoomError> {
        let member = self.assert_member(room_id, user_id).await?;

        if !member.role.is_host() {
            return Err(RoomError::NotHost);
        }

        Ok(member)
    }
}

fn not_found_as(error: RoomError) -> impl FnOnce(DatabaseError) -> RoomError {
    move |e| {
        if e.is_not_found() {
            error
        } else {
            RoomError::Database(e)
        }
    }
}
