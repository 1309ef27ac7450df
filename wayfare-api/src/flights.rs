use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use wayfare_core::flight::{Flight, FlightStatus, NewFlight};
use wayfare_core::repository::emit;
use wayfare_core::{Actor, CoreError, CoreResult};
use wayfare_shared::AuditEvent;

use crate::error::{ApiJson, AppError};
use crate::middleware::{staff_auth, ClientOrigin, Principal};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct FlightResponse {
    pub message: &'static str,
    pub flight: Flight,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let staff = Router::new()
        .route("/admin/flights", get(list_flights).post(create_flight))
        .route("/admin/flights/{flight_id}/status", put(update_status))
        .route_layer(from_fn_with_state(state, staff_auth));

    Router::new().route("/flights", get(list_flights)).merge(staff)
}

async fn list_flights(State(state): State<AppState>) -> Result<Json<Vec<Flight>>, AppError> {
    Ok(Json(state.flights.list_flights().await?))
}

/// Logs and audits a staff flight operation, passing the result through.
async fn audited<T>(state: &AppState, actor: &Actor, action: &str, flight_id: &str, result: CoreResult<T>) -> CoreResult<T> {
    let event = match &result {
        Ok(_) => {
            info!("{} on flight {} by {}", action, flight_id, actor.email);
            AuditEvent::success(&actor.email, action, format!("{} {}", action, flight_id))
        }
        Err(e) => AuditEvent::failed(&actor.email, action, format!("{} {} failed: {}", action, flight_id, e)),
    };
    emit(
        state.audit.as_ref(),
        event.resource("FLIGHT", flight_id).origin(actor.origin.clone()),
    )
    .await;
    result
}

async fn create_flight(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
    ApiJson(req): ApiJson<NewFlight>,
) -> Result<(StatusCode, Json<FlightResponse>), AppError> {
    let actor = principal.actor(origin);
    let flight_id = req.flight_id.trim().to_string();

    let result = match req.validate() {
        Ok(()) => state.flights.create_flight(req).await,
        Err(e) => Err(e),
    };
    let flight = audited(&state, &actor, "CREATE_FLIGHT", &flight_id, result).await?;

    Ok((
        StatusCode::CREATED,
        Json(FlightResponse {
            message: "Flight created successfully",
            flight,
        }),
    ))
}

async fn update_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
    Path(flight_id): Path<String>,
    ApiJson(req): ApiJson<StatusUpdate>,
) -> Result<Json<FlightResponse>, AppError> {
    let actor = principal.actor(origin);

    let result = async {
        let status: FlightStatus = req.status.parse()?;
        state
            .flights
            .update_status(&flight_id, status)
            .await?
            .ok_or_else(|| CoreError::NotFound("Flight".to_string()))
    }
    .await;
    let flight = audited(&state, &actor, "UPDATE_FLIGHT_STATUS", &flight_id, result).await?;

    Ok(Json(FlightResponse {
        message: "Flight status updated successfully",
        flight,
    }))
}
