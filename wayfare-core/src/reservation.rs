use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use wayfare_shared::AuditEvent;

use crate::booking::{Booking, BookingRecord, BookingStatus, Reservation, ReservationDraft};
use crate::identity::Actor;
use crate::repository::{emit, AuditSink, ReservationStore};
use crate::{CoreError, CoreResult};

pub const DEFAULT_RESERVATION_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub flight_id: String,
    pub seats: u32,
    pub payment_method: String,
    pub amount_cents: i64,
    pub traveller_name: Option<String>,
}

impl ReservationRequest {
    fn validate(&self) -> CoreResult<()> {
        let mut missing = Vec::new();
        if self.flight_id.trim().is_empty() {
            missing.push("flight_id");
        }
        if self.payment_method.trim().is_empty() {
            missing.push("payment_method");
        }
        if self.amount_cents <= 0 {
            missing.push("payment_amount");
        }
        if !missing.is_empty() {
            return Err(CoreError::validation(format!(
                "Required fields missing: {}",
                missing.join(", ")
            )));
        }
        if self.seats == 0 || i32::try_from(self.seats).is_err() {
            return Err(CoreError::validation("num_seats must be a positive number"));
        }
        Ok(())
    }
}

/// Reserves seats and manages the booking lifecycle.
///
/// The store performs the booking, payment and inventory writes as one
/// unit within the engine's deadline. The engine enforces who may cancel
/// what and writes the audit trail for every outcome.
pub struct ReservationEngine {
    store: Arc<dyn ReservationStore>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl ReservationEngine {
    pub fn new(store: Arc<dyn ReservationStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            timeout: DEFAULT_RESERVATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn reserve(&self, actor: &Actor, req: ReservationRequest) -> CoreResult<Reservation> {
        let result = self.try_reserve(actor, &req).await;

        match &result {
            Ok(reservation) => {
                info!(
                    "Booking {} confirmed: {} seat(s) on {} for {}",
                    reservation.booking.id, req.seats, req.flight_id, actor.email
                );
                let detail = format!(
                    "Booked flight {} ({} seat(s)) with payment {}",
                    req.flight_id, req.seats, req.payment_method
                );
                let event = AuditEvent::success(&actor.email, "CREATE_BOOKING", detail)
                    .resource("BOOKING", reservation.booking.id)
                    .origin(actor.origin.clone());
                emit(self.audit.as_ref(), event).await;
            }
            Err(e) => {
                warn!("Booking on {} for {} failed: {}", req.flight_id, actor.email, e);
                let event = AuditEvent::failed(
                    &actor.email,
                    "CREATE_BOOKING",
                    format!("Failed to book flight: {}", e),
                )
                .resource("BOOKING", &req.flight_id)
                .origin(actor.origin.clone());
                emit(self.audit.as_ref(), event).await;
            }
        }

        result
    }

    async fn try_reserve(&self, actor: &Actor, req: &ReservationRequest) -> CoreResult<Reservation> {
        req.validate()?;

        let draft = ReservationDraft {
            flight_id: req.flight_id.trim().to_string(),
            seats: req.seats,
            user_email: actor.email.clone(),
            user_name: req.traveller_name.clone(),
            payment_method: req.payment_method.trim().to_string(),
            amount_cents: req.amount_cents,
        };

        self.store.commit_reservation(&draft, self.timeout).await
    }

    /// Owners may cancel their own bookings; admin and superadmin may cancel
    /// any. Seats are not returned to the flight.
    pub async fn cancel(&self, booking_id: i64, actor: &Actor) -> CoreResult<Booking> {
        let result = self.try_cancel(booking_id, actor).await;

        let event = match &result {
            Ok(_) => {
                info!("Booking {} cancelled by {}", booking_id, actor.email);
                AuditEvent::success(&actor.email, "CANCEL_BOOKING", format!("Cancelled booking {}", booking_id))
            }
            Err(e) => {
                warn!("Cancel of booking {} by {} refused: {}", booking_id, actor.email, e);
                AuditEvent::failed(
                    &actor.email,
                    "CANCEL_BOOKING",
                    format!("Failed to cancel booking: {}", e),
                )
            }
        };
        emit(
            self.audit.as_ref(),
            event.resource("BOOKING", booking_id).origin(actor.origin.clone()),
        )
        .await;

        result
    }

    async fn try_cancel(&self, booking_id: i64, actor: &Actor) -> CoreResult<Booking> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Booking".to_string()))?;

        if !booking.is_owned_by(&actor.email) && !actor.role.is_staff() {
            return Err(CoreError::Forbidden(
                "Forbidden: you may only cancel your own bookings".to_string(),
            ));
        }

        if booking.status == BookingStatus::Cancelled {
            return Err(CoreError::Conflict("Booking already cancelled".to_string()));
        }

        self.store
            .cancel_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::Conflict("Booking already cancelled".to_string()))
    }

    pub async fn bookings_for(&self, actor: &Actor) -> CoreResult<Vec<Booking>> {
        self.store.bookings_for(&actor.email).await
    }

    pub async fn all_bookings(&self) -> CoreResult<Vec<BookingRecord>> {
        self.store.all_bookings().await
    }
}
