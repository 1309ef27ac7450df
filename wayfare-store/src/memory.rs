use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::warn;
use wayfare_core::booking::{
    Booking, BookingRecord, BookingStatus, Payment, PaymentStatus, Reservation, ReservationDraft,
};
use wayfare_core::flight::{Flight, FlightStatus, NewFlight};
use wayfare_core::identity::{Identity, IdentityPatch, NewIdentity, Role};
use wayfare_core::repository::{AuditSink, FlightRepository, IdentityRepository, ReservationStore};
use wayfare_core::{CoreError, CoreResult};
use wayfare_shared::AuditEvent;

#[derive(Default)]
struct State {
    identities: BTreeMap<i64, Identity>,
    flights: BTreeMap<String, Flight>,
    bookings: BTreeMap<i64, Booking>,
    payments: BTreeMap<i64, Payment>,
    audit: Vec<AuditEvent>,
    next_identity_id: i64,
    next_booking_id: i64,
    next_payment_id: i64,
}

impl State {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.identities
            .values()
            .any(|identity| identity.email == email && Some(identity.id) != except)
    }
}

/// Process-local store implementing every repository trait.
///
/// A single lock guards all tables, so a reservation's check, booking,
/// payment and decrement happen as one step with no interleaving.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit events recorded so far, oldest first.
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.state.lock().audit.clone()
    }

    pub fn seats_available(&self, flight_id: &str) -> Option<i32> {
        self.state.lock().flights.get(flight_id).map(|f| f.seats_available)
    }

    pub fn payment_count(&self) -> usize {
        self.state.lock().payments.len()
    }
}

#[async_trait]
impl IdentityRepository for MemoryStore {
    async fn find_by_email(&self, email: &str) -> CoreResult<Option<Identity>> {
        let state = self.state.lock();
        Ok(state.identities.values().find(|i| i.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> CoreResult<Option<Identity>> {
        Ok(self.state.lock().identities.get(&id).cloned())
    }

    async fn insert(&self, identity: NewIdentity) -> CoreResult<Identity> {
        let mut state = self.state.lock();
        if state.email_taken(&identity.email, None) {
            return Err(CoreError::Conflict(format!("email {} exists", identity.email)));
        }

        state.next_identity_id += 1;
        let stored = Identity {
            id: state.next_identity_id,
            first_name: identity.first_name,
            last_name: identity.last_name,
            email: identity.email,
            password_hash: identity.password_hash,
            role: identity.role,
            status: identity.status,
            permissions: identity.permissions,
            last_login: None,
            created_at: Utc::now(),
        };
        state.identities.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: i64, patch: &IdentityPatch) -> CoreResult<Option<Identity>> {
        let mut state = self.state.lock();
        if let Some(email) = &patch.email {
            if state.email_taken(email, Some(id)) {
                return Err(CoreError::Conflict(format!("email {} exists", email)));
            }
        }

        Ok(state.identities.get_mut(&id).map(|identity| {
            patch.apply_to(identity);
            identity.clone()
        }))
    }

    async fn delete(&self, id: i64) -> CoreResult<bool> {
        Ok(self.state.lock().identities.remove(&id).is_some())
    }

    async fn list(&self, role: Option<Role>) -> CoreResult<Vec<Identity>> {
        let state = self.state.lock();
        let mut found: Vec<Identity> = state
            .identities
            .values()
            .filter(|i| role.map_or(true, |r| i.role == r))
            .cloned()
            .collect();
        // Superadmins first, then admins, then users; newest first within a role.
        found.sort_by(|a, b| b.role.cmp(&a.role).then(b.created_at.cmp(&a.created_at)));
        Ok(found)
    }

    async fn touch_last_login(&self, email: &str) -> CoreResult<()> {
        let mut state = self.state.lock();
        if let Some(identity) = state.identities.values_mut().find(|i| i.email == email) {
            identity.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn ping(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl FlightRepository for MemoryStore {
    async fn create_flight(&self, flight: NewFlight) -> CoreResult<Flight> {
        let mut state = self.state.lock();
        if state.flights.contains_key(&flight.flight_id) {
            return Err(CoreError::Conflict("Flight with this ID already exists".to_string()));
        }
        let flight = flight.into_flight();
        state.flights.insert(flight.flight_id.clone(), flight.clone());
        Ok(flight)
    }

    async fn list_flights(&self) -> CoreResult<Vec<Flight>> {
        let mut flights: Vec<Flight> = self.state.lock().flights.values().cloned().collect();
        flights.sort_by_key(|f| f.departure_at);
        Ok(flights)
    }

    async fn update_status(&self, flight_id: &str, status: FlightStatus) -> CoreResult<Option<Flight>> {
        let mut state = self.state.lock();
        Ok(state.flights.get_mut(flight_id).map(|flight| {
            flight.status = status;
            flight.clone()
        }))
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    /// The whole write happens under one lock with no await point, so there
    /// is nothing for the deadline to cut short.
    async fn commit_reservation(&self, draft: &ReservationDraft, _deadline: Duration) -> CoreResult<Reservation> {
        let mut state = self.state.lock();

        let Some(flight) = state.flights.get(&draft.flight_id) else {
            return Err(CoreError::NotFound("Flight".to_string()));
        };
        let seats = i32::try_from(draft.seats)
            .map_err(|_| CoreError::validation("num_seats must be a positive number"))?;
        if flight.seats_available < seats {
            warn!(
                "Reservation of {} seat(s) on {} refused: {} left",
                draft.seats, draft.flight_id, flight.seats_available
            );
            return Err(CoreError::InsufficientInventory {
                flight_id: draft.flight_id.clone(),
                requested: draft.seats,
            });
        }

        let now = Utc::now();
        let booking = Booking {
            id: state.next_booking_id + 1,
            user_email: draft.user_email.clone(),
            user_name: draft.user_name.clone(),
            flight_id: draft.flight_id.clone(),
            origin: flight.origin.clone(),
            destination: flight.destination.clone(),
            seats,
            price_cents: draft.amount_cents,
            status: BookingStatus::Confirmed,
            created_at: now,
        };
        let payment = Payment {
            id: state.next_payment_id + 1,
            booking_id: booking.id,
            amount_cents: draft.amount_cents,
            method: draft.payment_method.clone(),
            status: PaymentStatus::Completed,
            created_at: now,
        };

        // Everything was checked above; from here the writes cannot fail.
        state.next_booking_id = booking.id;
        state.next_payment_id = payment.id;
        if let Some(flight) = state.flights.get_mut(&draft.flight_id) {
            flight.seats_available -= seats;
        }
        state.bookings.insert(booking.id, booking.clone());
        state.payments.insert(booking.id, payment.clone());

        Ok(Reservation { booking, payment })
    }

    async fn find_booking(&self, booking_id: i64) -> CoreResult<Option<Booking>> {
        Ok(self.state.lock().bookings.get(&booking_id).cloned())
    }

    async fn cancel_booking(&self, booking_id: i64) -> CoreResult<Option<Booking>> {
        let mut state = self.state.lock();
        Ok(state
            .bookings
            .get_mut(&booking_id)
            .filter(|b| b.status == BookingStatus::Confirmed)
            .map(|booking| {
                booking.status = BookingStatus::Cancelled;
                booking.clone()
            }))
    }

    async fn bookings_for(&self, email: &str) -> CoreResult<Vec<Booking>> {
        let state = self.state.lock();
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.user_email == email)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bookings)
    }

    async fn all_bookings(&self) -> CoreResult<Vec<BookingRecord>> {
        let state = self.state.lock();
        let mut records: Vec<BookingRecord> = state
            .bookings
            .values()
            .map(|booking| BookingRecord {
                booking: booking.clone(),
                payment: state.payments.get(&booking.id).cloned(),
            })
            .collect();
        records.sort_by(|a, b| {
            b.booking
                .created_at
                .cmp(&a.booking.created_at)
                .then(b.booking.id.cmp(&a.booking.id))
        });
        Ok(records)
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, event: AuditEvent) -> CoreResult<()> {
        self.state.lock().audit.push(event);
        Ok(())
    }
}
