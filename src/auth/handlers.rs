use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, PublicUser, RegisterRequest, UpdateUserRequest},
        extractors::AuthUser,
    },
    error::AuthResult,
    state::AppState,
};

/// Registration and login. Not behind the gate.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Profile and account routes. Every handler takes [`AuthUser`].
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:id", get(get_user).put(update_user))
        .route(
            "/profile",
            get(get_profile).put(update_profile).delete(deactivate_profile),
        )
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AuthResult<(StatusCode, Json<PublicUser>)> {
    let Json(payload) = payload?;
    let user = state.auth.register(payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AuthResult<Json<LoginResponse>> {
    let Json(payload) = payload?;
    let (token, user) = state.auth.login(payload).await?;
    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}

// Any authenticated caller may read or update any id; there is no ownership check.
#[instrument(skip(state, caller, id), fields(caller = %caller.user_id))]
pub async fn get_user(
    State(state): State<AppState>,
    caller: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AuthResult<Json<PublicUser>> {
    let Path(id) = id?;
    let user = state.auth.get_user(id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, caller, id, payload), fields(caller = %caller.user_id))]
pub async fn update_user(
    State(state): State<AppState>,
    caller: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> AuthResult<Json<PublicUser>> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    if caller.user_id != id {
        debug!(target_user = %id, "updating another user's profile");
    }
    state.auth.update_profile(id, payload).await?;
    let user = state.auth.get_user(id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, caller), fields(caller = %caller.user_id))]
pub async fn get_profile(
    State(state): State<AppState>,
    caller: AuthUser,
) -> AuthResult<Json<PublicUser>> {
    let user = state.auth.get_user(caller.user_id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, caller, payload), fields(caller = %caller.user_id))]
pub async fn update_profile(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> AuthResult<Json<PublicUser>> {
    let Json(payload) = payload?;
    state.auth.update_profile(caller.user_id, payload).await?;
    let user = state.auth.get_user(caller.user_id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, caller), fields(caller = %caller.user_id))]
pub async fn deactivate_profile(
    State(state): State<AppState>,
    caller: AuthUser,
) -> AuthResult<StatusCode> {
    state.auth.deactivate(caller.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
