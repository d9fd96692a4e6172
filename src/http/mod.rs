//! Thin JSON surface over [`crate::Chat`]. Callers are identified by the
//! `x-user-id` header set by whatever authenticates them upstream.

mod conversations;
mod messages;
mod users;
mod ws;

use axum::{Router, extract::FromRequestParts, http::request::Parts};

use crate::{AppError, AppState, Unauthenticated, model::UserId};

pub const USER_HEADER: &str = "x-user-id";

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/u", users::router())
        .nest("/c", conversations::router())
        .nest("/m", messages::router())
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(USER_HEADER) else {
            return Err(Unauthenticated("missing x-user-id header").into());
        };
        let Ok(raw) = raw.to_str() else {
            return Err(Unauthenticated("x-user-id is not valid text").into());
        };
        let Ok(user) = raw.trim().parse::<UserId>() else {
            return Err(Unauthenticated("x-user-id is not a user id").into());
        };
        Ok(Caller(user))
    }
}
