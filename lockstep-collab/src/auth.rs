use thiserror::Error;

use crate::{
    names::generate_display_name, CollabContext, DatabaseError, NewUser, PrimaryKey, UserData,
};

/// Handles the anonymous identity model. There are no credentials, a user is
/// just a generated display name the first time they show up.
pub struct Auth {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// The referenced user doesn't exist
    #[error("Unknown user")]
    UnknownUser,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

impl Auth {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Returns the user for an existing session, or mints a fresh anonymous
    /// user when there is none. A stale id from a wiped database also gets a
    /// fresh user rather than an error.
    pub async fn get_or_create_user(
        &self,
        existing: Option<PrimaryKey>,
    ) -> Result<UserData, AuthError> {
        if let Some(user_id) = existing {
            match self.context.database.user_by_id(user_id).await {
                Ok(user) => return Ok(user),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(AuthError::Db(e)),
            }
        }

        self.context
            .database
            .create_user(NewUser {
                display_name: generate_display_name(),
            })
            .await
            .map_err(AuthError::Db)
    }

    /// Looks up a user by id, failing when it doesn't exist
    pub async fn user(&self, user_id: PrimaryKey) -> Result<UserData, AuthError> {
        self.context
            .database
            .user_by_id(user_id)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    AuthError::UnknownUser
                } else {
                    AuthError::Db(e)
                }
            })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{Collab, MemoryDatabase};

    #[tokio::test]
    async fn test_get_or_create_user() {
        let collab = Collab::new(Arc::new(MemoryDatabase::new()), None);

        let first = collab
            .auth
            .get_or_create_user(None)
            .await
            .expect("user is created");

        assert!(!first.display_name.is_empty());

        let same = collab
            .auth
            .get_or_create_user(Some(first.id))
            .await
            .expect("existing user is returned");

        assert_eq!(first.id, same.id);
        assert_eq!(first.display_name, same.display_name);
    }

    #[tokio::test]
    async fn test_stale_session_gets_new_user() {
        let collab = Collab::new(Arc::new(MemoryDatabase::new()), None);

        let user = collab
            .auth
            .get_or_create_user(Some(999))
            .await
            .expect("stale id falls back to a new user");

        assert_ne!(user.id, 999);
    }
}
