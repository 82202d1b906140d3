use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use parley_db::ChatError;
use parley_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Verified identity of the request, if any. Always present as an extension
/// behind either middleware.
#[derive(Debug, Clone, Default)]
pub struct Caller(pub Option<Claims>);

impl Caller {
    pub fn subject(&self) -> Option<&str> {
        self.0.as_ref().map(|c| c.sub.as_str())
    }
}

/// Reject requests without a valid bearer token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = bearer_claims(req.headers(), &state.jwt_secret)
        .ok_or(ApiError::Chat(ChatError::NotAuthenticated))?;

    req.extensions_mut().insert(Caller(Some(claims)));
    Ok(next.run(req).await)
}

/// Attach the identity when a valid token is present; otherwise continue
/// anonymously so reads can degrade to empty results.
pub async fn optional_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let claims = bearer_claims(req.headers(), &state.jwt_secret);
    req.extensions_mut().insert(Caller(claims));
    next.run(req).await
}

/// Extract and validate JWT from Authorization header.
fn bearer_claims(headers: &HeaderMap, secret: &str) -> Option<Claims> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
