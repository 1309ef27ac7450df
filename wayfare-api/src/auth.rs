use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use wayfare_core::accounts::Signup;
use wayfare_core::Identity;
use wayfare_shared::Masked;

use crate::error::{ApiJson, AppError};
use crate::middleware::{session_auth, ClientOrigin, Principal, Requirement};
use crate::session::{CookiePolicy, TokenFlavor};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: Masked<String>,
    pub confirm_password: Masked<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: Masked<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub message: &'static str,
    pub access_token: String,
    pub user: Identity,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let session = Router::new()
        .route("/me", get(me))
        .route_layer(from_fn_with_state(state, session_auth));

    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .merge(session)
}

/// Issues both tokens for `identity` and sets them as session cookies.
fn open_session(
    state: &AppState,
    headers: &HeaderMap,
    jar: CookieJar,
    identity: &Identity,
) -> Result<(CookieJar, String), AppError> {
    let access = state.tokens.issue_access(&identity.email, identity.role)?;
    let refresh = state.tokens.issue_refresh(&identity.email, identity.role)?;

    let jar = state.transport.attach(
        jar,
        &[(TokenFlavor::Access, access.clone()), (TokenFlavor::Refresh, refresh)],
        CookiePolicy::from_headers(headers),
    );
    Ok((jar, access))
}

async fn signup(
    State(state): State<AppState>,
    origin: ClientOrigin,
    headers: HeaderMap,
    jar: CookieJar,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<SessionResponse>), AppError> {
    let identity = state
        .accounts
        .signup(
            Signup {
                first_name: req.first_name,
                last_name: req.last_name,
                email: req.email,
                password: req.password,
                confirm_password: req.confirm_password,
            },
            origin.0,
        )
        .await?;

    let (jar, access_token) = open_session(&state, &headers, jar, &identity)?;

    Ok((
        StatusCode::CREATED,
        jar,
        Json(SessionResponse {
            message: "Signup successful",
            access_token,
            user: identity,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    origin: ClientOrigin,
    headers: HeaderMap,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let identity = state.accounts.login(&req.email, &req.password, origin.0).await?;
    let (jar, access_token) = open_session(&state, &headers, jar, &identity)?;

    info!("Session opened for {} ({})", identity.email, identity.role);

    Ok((
        jar,
        Json(SessionResponse {
            message: "Login successful",
            access_token,
            user: identity,
        }),
    ))
}

/// Trades a valid refresh cookie for a new access cookie.
async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let principal = state.gate.authorize(&headers, &Requirement::REFRESH).await?;
    let access = state.tokens.issue_access(&principal.email, principal.role)?;

    let jar = state.transport.attach(
        jar,
        &[(TokenFlavor::Access, access)],
        CookiePolicy::from_headers(&headers),
    );
    Ok((jar, Json(json!({ "message": "Token refreshed" }))))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap, jar: CookieJar) -> (CookieJar, Json<Value>) {
    let jar = state.transport.clear(jar, CookiePolicy::from_headers(&headers));
    (jar, Json(json!({ "message": "Logged out" })))
}

async fn me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Identity>, AppError> {
    Ok(Json(state.accounts.profile(&principal.email).await?))
}
