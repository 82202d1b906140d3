use axum::{
    Extension, Json,
    extract::State,
};
use serde::Deserialize;
use uuid::Uuid;

use parley_db::ChatError;
use parley_types::api::{UpsertUserRequest, UpsertUserResponse};
use parley_types::models::UserProfile;

use crate::auth::{AppState, now_ms};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::Caller;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search: String,
}

/// POST /users/me: create or refresh the caller's profile. Body fields win
/// over token claims.
pub async fn upsert_me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<UpsertUserRequest>,
) -> ApiResult<Json<UpsertUserResponse>> {
    let claims = caller.0.ok_or(ChatError::NotAuthenticated)?;

    let name = req
        .name
        .or(claims.name)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ChatError::invalid("name is required"))?;
    let email = req.email.or(claims.email).unwrap_or_default();
    let image_url = req.image_url.or(claims.picture).unwrap_or_default();
    let subject = claims.sub;
    let now = now_ms();

    let id = state
        .run(move |db| db.upsert_user(&subject, &name, &email, &image_url, now))
        .await?;

    Ok(Json(UpsertUserResponse {
        user_id: parley_db::models::parse_id(&id, "user"),
    }))
}

/// GET /users/me: null until the caller has synced their profile.
pub async fn get_me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Option<UserProfile>>> {
    let subject = caller.subject().map(str::to_owned);
    let me = state.run(move |db| db.get_me(subject.as_deref())).await?;
    Ok(Json(me.map(|u| u.profile())))
}

/// GET /users?search=: other users matching the name filter.
pub async fn search_users(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    let subject = caller.subject().map(str::to_owned);
    let users = state
        .run(move |db| db.search_users(subject.as_deref(), &query.search))
        .await?;
    Ok(Json(users.iter().map(|u| u.profile()).collect()))
}

/// GET /users/{user_id}
pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> ApiResult<Json<Option<UserProfile>>> {
    let user = state.run(move |db| db.get_user(&user_id.to_string())).await?;
    Ok(Json(user.map(|u| u.profile())))
}
