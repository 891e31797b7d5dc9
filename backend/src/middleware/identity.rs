//! Actor identity
//!
//! Identity is asserted by the fronting identity provider through headers;
//! this server records whoever is named and does not authenticate.

use axum::http::{request::Parts, HeaderMap};
use shared::Actor;

use crate::error::AppError;

pub const ACTOR_UID_HEADER: &str = "x-actor-uid";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Extractor for the acting user
#[derive(Clone, Debug)]
pub struct CurrentActor(pub Actor);

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Read the actor from request headers
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, AppError> {
    let uid = header(headers, ACTOR_UID_HEADER)
        .ok_or_else(|| AppError::unauthorized("Missing x-actor-uid header"))?;
    let name = header(headers, ACTOR_NAME_HEADER)
        .ok_or_else(|| AppError::unauthorized("Missing x-actor-name header"))?;

    let actor = Actor::new(uid, name);
    Ok(match header(headers, ACTOR_ROLE_HEADER) {
        Some(role) => actor.with_role(role),
        None => actor,
    })
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers).map(CurrentActor)
    }
}
