use std::time::Duration;

use async_trait::async_trait;
use wayfare_shared::AuditEvent;

use crate::booking::{Booking, BookingRecord, Reservation, ReservationDraft};
use crate::flight::{Flight, FlightStatus, NewFlight};
use crate::identity::{Identity, IdentityPatch, NewIdentity, Role};
use crate::CoreResult;

/// Repository trait for the identity store
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> CoreResult<Option<Identity>>;

    async fn find_by_id(&self, id: i64) -> CoreResult<Option<Identity>>;

    /// Fails with `Conflict` when the email is taken.
    async fn insert(&self, identity: NewIdentity) -> CoreResult<Identity>;

    /// Returns `None` when no identity has this id. Fails with `Conflict`
    /// when the patch moves the email onto one that is taken.
    async fn update(&self, id: i64, patch: &IdentityPatch) -> CoreResult<Option<Identity>>;

    async fn delete(&self, id: i64) -> CoreResult<bool>;

    async fn list(&self, role: Option<Role>) -> CoreResult<Vec<Identity>>;

    async fn touch_last_login(&self, email: &str) -> CoreResult<()>;

    async fn ping(&self) -> CoreResult<()>;
}

/// Repository trait for flight inventory
#[async_trait]
pub trait FlightRepository: Send + Sync {
    /// Fails with `Conflict` when the flight id exists.
    async fn create_flight(&self, flight: NewFlight) -> CoreResult<Flight>;

    async fn list_flights(&self) -> CoreResult<Vec<Flight>>;

    async fn update_status(&self, flight_id: &str, status: FlightStatus) -> CoreResult<Option<Flight>>;
}

/// Transactional store behind the reservation engine.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Looks up the flight, writes booking and payment, then decrements
    /// `seats_available` only if enough seats remain, all in one unit.
    /// Absent flight → `NotFound`; short inventory → `InsufficientInventory`
    /// with nothing durable.
    ///
    /// `deadline` bounds the work before the commit is issued. Running out
    /// of it rolls back and fails with `Persistence`. Once the commit is
    /// sent it is awaited to completion, so the returned outcome always
    /// matches what is durable.
    async fn commit_reservation(&self, draft: &ReservationDraft, deadline: Duration) -> CoreResult<Reservation>;

    async fn find_booking(&self, booking_id: i64) -> CoreResult<Option<Booking>>;

    /// Moves a confirmed booking to cancelled. Returns `None` if the
    /// booking was not in `confirmed` state at the time of the write.
    async fn cancel_booking(&self, booking_id: i64) -> CoreResult<Option<Booking>>;

    async fn bookings_for(&self, email: &str) -> CoreResult<Vec<Booking>>;

    async fn all_bookings(&self) -> CoreResult<Vec<BookingRecord>>;
}

/// Append-only sink for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> CoreResult<()>;
}

/// Best-effort audit write: a failing sink is logged and never turns a
/// completed operation into a failed one.
pub async fn emit(sink: &dyn AuditSink, event: AuditEvent) {
    let action = event.action.clone();
    if let Err(e) = sink.record(event).await {
        tracing::warn!("Failed to write audit event {}: {}", action, e);
    }
}
