use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use wayfare_core::flight::{FlightStatus, NewFlight};
use wayfare_core::repository::{FlightRepository, ReservationStore};
use wayfare_core::{Actor, CoreError, ReservationEngine, ReservationRequest, Role};
use wayfare_shared::AuditOutcome;
use wayfare_store::MemoryStore;

fn flight(flight_id: &str, seats: i32) -> NewFlight {
    NewFlight {
        flight_id: flight_id.into(),
        trip_type: "one-way".into(),
        airline: "Kenya Airways".into(),
        origin: "Nairobi".into(),
        destination: "Mombasa".into(),
        departure_at: Utc::now(),
        return_at: None,
        price_cents: 15_000,
        cabin_class: "economy".into(),
        seats_available: seats,
        status: FlightStatus::Scheduled,
        gate: Some("A4".into()),
        terminal: None,
        baggage_allowance: None,
        description: None,
    }
}

fn request(flight_id: &str, seats: u32) -> ReservationRequest {
    ReservationRequest {
        flight_id: flight_id.into(),
        seats,
        payment_method: "card".into(),
        amount_cents: 15_000,
        traveller_name: None,
    }
}

async fn setup(seats: i32) -> (Arc<ReservationEngine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store.create_flight(flight("F1", seats)).await.unwrap();
    let engine = ReservationEngine::new(store.clone(), store.clone());
    (Arc::new(engine), store)
}

#[tokio::test]
async fn test_booking_snapshots_route_and_payment() {
    let (engine, store) = setup(3).await;
    let actor = Actor::new("a@x.com", Role::User);

    let reservation = engine.reserve(&actor, request("F1", 2)).await.unwrap();

    assert_eq!(reservation.booking.origin, "Nairobi");
    assert_eq!(reservation.booking.destination, "Mombasa");
    assert_eq!(reservation.booking.price_cents, 15_000);
    assert_eq!(reservation.payment.booking_id, reservation.booking.id);
    assert_eq!(store.seats_available("F1"), Some(1));
}

#[tokio::test]
async fn test_last_seats_then_exhausted() {
    let (engine, store) = setup(3).await;
    let actor = Actor::new("a@x.com", Role::User);

    engine.reserve(&actor, request("F1", 3)).await.unwrap();
    let err = engine.reserve(&actor, request("F1", 1)).await.unwrap_err();

    assert_eq!(
        err,
        CoreError::InsufficientInventory { flight_id: "F1".into(), requested: 1 }
    );
    assert_eq!(store.seats_available("F1"), Some(0));
    assert_eq!(store.bookings_for("a@x.com").await.unwrap().len(), 1);
    assert_eq!(store.payment_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_never_oversell() {
    const SEATS: i32 = 5;
    const CALLERS: usize = 16;

    let (engine, store) = setup(SEATS).await;
    let mut tasks = JoinSet::new();
    for n in 0..CALLERS {
        let engine = engine.clone();
        tasks.spawn(async move {
            let actor = Actor::new(format!("traveller{}@x.com", n), Role::User);
            engine.reserve(&actor, request("F1", 1)).await
        });
    }

    let mut confirmed = 0;
    let mut refused = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => confirmed += 1,
            Err(CoreError::InsufficientInventory { .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(confirmed, SEATS as usize);
    assert_eq!(refused, CALLERS - SEATS as usize);
    assert_eq!(store.seats_available("F1"), Some(0));
    assert_eq!(store.all_bookings().await.unwrap().len(), SEATS as usize);
    assert_eq!(store.payment_count(), SEATS as usize);
    assert!(store
        .all_bookings()
        .await
        .unwrap()
        .iter()
        .all(|record| record.payment.is_some()));
}

#[tokio::test]
async fn test_cancel_keeps_inventory_and_audits() {
    let (engine, store) = setup(3).await;
    let owner = Actor::new("a@x.com", Role::User);

    let booking = engine.reserve(&owner, request("F1", 2)).await.unwrap().booking;
    engine.cancel(booking.id, &owner).await.unwrap();

    assert_eq!(store.seats_available("F1"), Some(1));
    assert_eq!(
        engine.cancel(booking.id, &owner).await.unwrap_err(),
        CoreError::Conflict("Booking already cancelled".into())
    );

    let cancels: Vec<_> = store
        .audit_events()
        .into_iter()
        .filter(|e| e.action == "CANCEL_BOOKING")
        .collect();
    assert_eq!(cancels.len(), 2);
    assert_eq!(cancels[0].outcome, AuditOutcome::Success);
    assert_eq!(cancels[1].outcome, AuditOutcome::Failed);
}

#[tokio::test]
async fn test_staff_sees_every_booking_with_payment() {
    let (engine, _store) = setup(4).await;
    engine
        .reserve(&Actor::new("a@x.com", Role::User), request("F1", 1))
        .await
        .unwrap();
    engine
        .reserve(&Actor::new("b@x.com", Role::User), request("F1", 1))
        .await
        .unwrap();

    let records = engine.all_bookings().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.payment.as_ref().map(|p| p.method.as_str()) == Some("card")));

    let mine = engine.bookings_for(&Actor::new("a@x.com", Role::User)).await.unwrap();
    assert_eq!(mine.len(), 1);
}
