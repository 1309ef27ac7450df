use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use wayfare_core::accounts::{AccountUpdate, NewAccount};
use wayfare_core::{CoreResult, Identity, IdentityStatus, Role};
use wayfare_shared::Masked;

use crate::error::{ApiJson, AppError};
use crate::middleware::{superadmin_api_auth, ClientOrigin, Principal};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateAccountRequest {
    pub name: String,
    pub email: String,
    pub password: Masked<String>,
    pub role: Option<String>,
    pub permissions: BTreeSet<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateAccountRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<Masked<String>>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub permissions: Option<BTreeSet<String>>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct PermissionsRequest {
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeleteAdminRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub message: &'static str,
    pub user: Identity,
}

fn parse_role(role: Option<&str>, fallback: Role) -> CoreResult<Role> {
    role.filter(|r| !r.trim().is_empty())
        .map_or(Ok(fallback), str::parse)
}

// ============================================================================
// Routes
// ============================================================================

/// Identity administration. Bearer transport with a live superadmin check.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", put(update_user).delete(delete_user))
        .route("/users/{id}/role", put(set_role))
        .route("/admins", get(list_admins).post(create_admin).delete(delete_admin))
        .route("/admins/{id}/status", put(toggle_admin_status))
        .route("/admins/{id}/permissions", put(set_admin_permissions))
        .route_layer(from_fn_with_state(state, superadmin_api_auth))
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<Identity>>, AppError> {
    Ok(Json(state.accounts.list_users().await?))
}

async fn create_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
    ApiJson(req): ApiJson<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    let account = NewAccount {
        role: parse_role(req.role.as_deref(), Role::User)?,
        name: req.name,
        email: req.email,
        password: req.password,
        permissions: req.permissions,
    };
    let user = state.accounts.create_user(&principal.actor(origin), account).await?;

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse { message: "User created successfully", user }),
    ))
}

async fn update_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<UpdateAccountRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let role = req.role.as_deref().map(str::parse::<Role>).transpose()?;
    let status = req.status.as_deref().map(str::parse::<IdentityStatus>).transpose()?;

    let update = AccountUpdate {
        name: req.name,
        email: req.email,
        password: req.password,
        role,
        status,
        permissions: req.permissions,
    };
    let user = state.accounts.update_user(&principal.actor(origin), id, update).await?;

    Ok(Json(AccountResponse { message: "User updated successfully", user }))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state.accounts.delete_user(&principal.actor(origin), id).await?;
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

async fn set_role(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<RoleRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let role: Role = req.role.parse()?;
    let user = state.accounts.set_role(&principal.actor(origin), id, role).await?;
    Ok(Json(AccountResponse { message: "User role updated successfully", user }))
}

async fn list_admins(State(state): State<AppState>) -> Result<Json<Vec<Identity>>, AppError> {
    Ok(Json(state.accounts.list_admins().await?))
}

async fn create_admin(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
    ApiJson(req): ApiJson<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    let account = NewAccount {
        name: req.name,
        email: req.email,
        password: req.password,
        role: Role::Admin,
        permissions: req.permissions,
    };
    let user = state.accounts.create_admin(&principal.actor(origin), account).await?;

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse { message: "Admin created successfully", user }),
    ))
}

async fn toggle_admin_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
    Path(id): Path<i64>,
) -> Result<Json<AccountResponse>, AppError> {
    let user = state.accounts.toggle_admin_status(&principal.actor(origin), id).await?;
    Ok(Json(AccountResponse { message: "Admin status updated successfully", user }))
}

async fn set_admin_permissions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<PermissionsRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let user = state
        .accounts
        .set_admin_permissions(&principal.actor(origin), id, req.permissions)
        .await?;
    Ok(Json(AccountResponse { message: "Admin permissions updated successfully", user }))
}

async fn delete_admin(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
    ApiJson(req): ApiJson<DeleteAdminRequest>,
) -> Result<Json<Value>, AppError> {
    state.accounts.delete_admin(&principal.actor(origin), &req.email).await?;
    Ok(Json(json!({ "message": "Admin deleted successfully" })))
}
