use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use wayfare_core::booking::{Booking, BookingRecord, Reservation};
use wayfare_core::ReservationRequest;

use crate::error::{ApiJson, AppError};
use crate::middleware::{session_auth, staff_auth, ClientOrigin, Principal};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BookFlightRequest {
    #[serde(default)]
    pub flight_id: String,
    #[serde(default = "one_seat")]
    pub num_seats: u32,
    #[serde(default)]
    pub payment_method: String,
    /// Amount charged, in minor currency units.
    #[serde(default)]
    pub payment_amount: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

fn one_seat() -> u32 {
    1
}

impl BookFlightRequest {
    fn traveller_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub booking_id: i64,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub reservation: Reservation,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: &'static str,
    pub booking: Booking,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let session = Router::new()
        .route("/bookflight", post(book_flight))
        .route("/mybookings", get(my_bookings))
        .route("/cancelbooking", post(cancel_booking))
        .route_layer(from_fn_with_state(state.clone(), session_auth));

    let staff = Router::new()
        .route("/admin/bookings", get(all_bookings))
        .route_layer(from_fn_with_state(state, staff_auth));

    session.merge(staff)
}

async fn book_flight(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
    ApiJson(req): ApiJson<BookFlightRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let actor = principal.actor(origin);
    let request = ReservationRequest {
        traveller_name: req.traveller_name(),
        flight_id: req.flight_id,
        seats: req.num_seats,
        payment_method: req.payment_method,
        amount_cents: req.payment_amount,
    };

    let reservation = state.reservations.reserve(&actor, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(BookingResponse {
            message: "Flight booked successfully",
            reservation,
        }),
    ))
}

async fn my_bookings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = state.reservations.bookings_for(&principal.actor(origin)).await?;
    Ok(Json(bookings))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: ClientOrigin,
    ApiJson(req): ApiJson<CancelBookingRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    let booking = state
        .reservations
        .cancel(req.booking_id, &principal.actor(origin))
        .await?;

    Ok(Json(CancelResponse {
        message: "Booking cancelled successfully",
        booking,
    }))
}

async fn all_bookings(State(state): State<AppState>) -> Result<Json<Vec<BookingRecord>>, AppError> {
    Ok(Json(state.reservations.all_bookings().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_and_name() {
        let req: BookFlightRequest = serde_json::from_value(serde_json::json!({
            "flight_id": "F1",
            "payment_method": "card",
            "payment_amount": 15000,
            "first_name": "Ada",
            "last_name": " "
        }))
        .unwrap();

        assert_eq!(req.num_seats, 1);
        assert_eq!(req.traveller_name().as_deref(), Some("Ada"));
    }
}
