use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    routing::post,
    Json,
};
use axum_extra::extract::{
    cookie::{Cookie, Key, SameSite},
    SignedCookieJar,
};
use lockstep_collab::PrimaryKey;
use time::Duration;

use crate::{
    context::ServerContext,
    errors::{ServerError, ServerResult},
    serialized::{SessionUser, ToSerialized},
    Router,
};

/// Name of the signed cookie carrying the user id
pub const SESSION_COOKIE: &str = "ls_session";

const SESSION_DURATION_IN_DAYS: i64 = 30;

/// The identity of a request, taken from the signed session cookie.
///
/// This only proves the cookie was minted by this server. Authorization
/// decisions like "is this user the host" are made against the database.
pub struct Session {
    pub user_id: PrimaryKey,
}

#[async_trait]
impl FromRequestParts<ServerContext> for Session {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let jar = SignedCookieJar::<Key>::from_request_parts(parts, state)
            .await
            .map_err(|_| ServerError::SessionRequired)?;

        let user_id = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| cookie.value().parse().ok())
            .ok_or(ServerError::SessionRequired)?;

        Ok(Self { user_id })
    }
}

/// POST /v1/session
///
/// Returns the user behind the current session cookie, minting a fresh
/// anonymous user (and cookie) when there is none.
async fn create_session(
    context: ServerContext,
    jar: SignedCookieJar,
) -> ServerResult<(SignedCookieJar, Json<SessionUser>)> {
    let existing = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| cookie.value().parse().ok());

    let user = context.collab.auth.get_or_create_user(existing).await?;

    let cookie = Cookie::build((SESSION_COOKIE, user.id.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::days(SESSION_DURATION_IN_DAYS))
        .build();

    Ok((jar.add(cookie), Json(user.to_serialized())))
}

pub fn router() -> Router {
    Router::new().route("/session", post(create_session))
}
