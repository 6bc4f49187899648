//! Account and supervision-graph handlers.

use super::{AppState, AuthUser};
use crate::auth::{Credentials, SignUp, hash_password, verify_password};
use crate::error::{ApiError, ApiResult};
use crate::types::{NewUser, User, UserRole, UserWithChildren, UserWithParents};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const BAD_CREDENTIALS: &str = "Please check your login credentials";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub username: String,
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
    pub roles: Vec<UserRole>,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub role: UserRole,
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUp>,
) -> ApiResult<StatusCode> {
    let username = request.validate()?;
    let role = state.policy().signup_role(request.role);
    if request.role.is_some_and(|requested| requested != role) {
        warn!(email = %request.email, requested = ?request.role, "Ignoring requested signup role");
    }
    let password_hash = hash_password(&request.password)?;

    state.db().create_user(NewUser {
        username,
        email: request.email,
        password_hash,
        role,
    })?;

    Ok(StatusCode::CREATED)
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<Credentials>,
) -> ApiResult<Json<SignInResponse>> {
    let (user, hash) = state
        .db()
        .find_user_by_email(&request.email)?
        .ok_or_else(|| ApiError::unauthorized(BAD_CREDENTIALS))?;

    if !verify_password(&request.password, &hash)? {
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    }

    let access_token = state.tokens().issue(&user)?;
    debug!(user_id = %user.id, "User signed in");

    Ok(Json(SignInResponse {
        username: user.username,
        access_token,
    }))
}

pub async fn get_users(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> ApiResult<Json<UsersResponse>> {
    debug!(principal = %principal.username, "Retrieving all users and roles");
    let users = state.db().list_users()?;
    Ok(Json(UsersResponse {
        users,
        roles: UserRole::ALL.to_vec(),
    }))
}

pub async fn add_child_to_parent(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path((parent_id, child_id)): Path<(String, String)>,
) -> ApiResult<Json<UserWithChildren>> {
    state
        .policy()
        .authorize_relation_change(&principal, &parent_id, &child_id)?;
    info!(
        principal = %principal.id,
        parent_id = %parent_id,
        child_id = %child_id,
        "Adding child to parent"
    );
    let parent = state.db().add_edge(&parent_id, &child_id)?;
    Ok(Json(parent))
}

pub async fn remove_child_from_parent(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path((parent_id, child_id)): Path<(String, String)>,
) -> ApiResult<Json<UserWithChildren>> {
    state
        .policy()
        .authorize_relation_change(&principal, &parent_id, &child_id)?;
    info!(
        principal = %principal.id,
        parent_id = %parent_id,
        child_id = %child_id,
        "Removing child from parent"
    );
    let parent = state.db().remove_edge(&parent_id, &child_id)?;
    Ok(Json(parent))
}

pub async fn remove_parent_from_child(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path((child_id, parent_id)): Path<(String, String)>,
) -> ApiResult<Json<UserWithParents>> {
    state
        .policy()
        .authorize_relation_change(&principal, &parent_id, &child_id)?;
    info!(
        principal = %principal.id,
        parent_id = %parent_id,
        child_id = %child_id,
        "Removing parent from child"
    );
    let child = state.db().remove_parent_from_child(&child_id, &parent_id)?;
    Ok(Json(child))
}

pub async fn get_parents(
    State(state): State<AppState>,
    AuthUser(_principal): AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.db().list_parents(&user_id)?))
}

pub async fn get_children(
    State(state): State<AppState>,
    AuthUser(_principal): AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.db().list_children(&user_id)?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.policy().authorize_user_delete(&principal, &user_id)?;
    info!(principal = %principal.id, user_id = %user_id, "Deleting user");
    state.db().delete_user(&user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_user_role(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<String>,
    Json(update): Json<RoleUpdate>,
) -> ApiResult<Json<User>> {
    state.policy().authorize_role_change(&principal)?;
    info!(
        principal = %principal.id,
        user_id = %user_id,
        role = %update.role,
        "Changing user role"
    );
    Ok(Json(state.db().update_user_role(&user_id, update.role)?))
}
