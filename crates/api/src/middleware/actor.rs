//! Caller identity taken from request headers.
//!
//! Authentication happens upstream; the adapter only needs the opaque actor
//! id that is written to every ledger row.

use axum::{extract::FromRequestParts, http::request::Parts};
use kardex_core::inventory::Actor;
use kardex_shared::types::ActorId;

use crate::error::ApiError;

/// Header carrying the acting user id.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Header carrying the id of whoever authorized the operation.
pub const AUTHORIZED_BY_HEADER: &str = "x-authorized-by";

/// Extractor for the acting user.
///
/// ```ignore
/// async fn handler(ActorHeader(actor): ActorHeader) -> impl IntoResponse {
///     let id = actor.id;
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ActorHeader(pub Actor);

fn parse_id(parts: &Parts, name: &str) -> Result<Option<ActorId>, ApiError> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.parse::<ActorId>().ok())
        .map(Some)
        .ok_or_else(|| ApiError::validation(format!("{name} must be an integer id")))
}

impl<S> FromRequestParts<S> for ActorHeader
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parse_id(parts, ACTOR_HEADER)?
            .ok_or_else(|| ApiError::validation(format!("{ACTOR_HEADER} header is required")))?;

        let mut actor = Actor::new(id);
        if let Some(authorizer) = parse_id(parts, AUTHORIZED_BY_HEADER)? {
            actor = actor.authorized_by(authorizer);
        }
        Ok(Self(actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<ActorHeader, ApiError> {
        let (mut parts, ()) = request.into_parts();
        ActorHeader::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_actor_and_authorizer() {
        let request = Request::builder()
            .header(ACTOR_HEADER, "12")
            .header(AUTHORIZED_BY_HEADER, " 3 ")
            .body(())
            .unwrap();

        let ActorHeader(actor) = extract(request).await.unwrap();
        assert_eq!(actor.id, ActorId::new(12));
        assert_eq!(actor.authorized_by, Some(ActorId::new(3)));
    }

    #[tokio::test]
    async fn test_missing_actor_is_rejected() {
        let request = Request::builder().body(()).unwrap();
        let err = extract(request).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_malformed_actor_is_rejected() {
        let request = Request::builder()
            .header(ACTOR_HEADER, "alice")
            .body(())
            .unwrap();
        assert!(extract(request).await.is_err());
    }
}
