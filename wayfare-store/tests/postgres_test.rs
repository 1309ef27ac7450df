//! Runs against a real database only when `WAYFARE_TEST_DATABASE_URL`
//! points at a disposable Postgres; otherwise each test returns early.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use wayfare_core::flight::{FlightStatus, NewFlight};
use sqlx::PgPool;
use wayfare_core::flight::Flight;
use wayfare_core::repository::{AuditSink, FlightRepository, ReservationStore};
use wayfare_core::{Actor, CoreError, ReservationEngine, ReservationRequest, Role};
use wayfare_shared::AuditEvent;
use wayfare_store::app_config::DatabaseConfig;
use wayfare_store::{DbClient, PgAuditSink, PgFlightRepository, PgReservationStore};

async fn connect() -> Option<DbClient> {
    let url = std::env::var("WAYFARE_TEST_DATABASE_URL").ok()?;
    let settings = DatabaseConfig {
        max_connections: 10,
        ..Default::default()
    };
    let db = DbClient::new(&url, &settings).await.expect("connect to test database");
    db.migrate().await.expect("migrate test database");
    Some(db)
}

fn unique_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

async fn find_flight(flights: &PgFlightRepository, flight_id: &str) -> Flight {
    flights
        .list_flights()
        .await
        .unwrap()
        .into_iter()
        .find(|f| f.flight_id == flight_id)
        .unwrap()
}

async fn bookings_on(pool: &PgPool, flight_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE flight_id = $1")
        .bind(flight_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn one_seat(flight_id: &str) -> ReservationRequest {
    ReservationRequest {
        flight_id: flight_id.into(),
        seats: 1,
        payment_method: "card".into(),
        amount_cents: 9_900,
        traveller_name: None,
    }
}

fn flight(flight_id: &str, seats: i32) -> NewFlight {
    NewFlight {
        flight_id: flight_id.into(),
        trip_type: "one-way".into(),
        airline: "Kenya Airways".into(),
        origin: "Nairobi".into(),
        destination: "Kisumu".into(),
        departure_at: Utc::now(),
        return_at: None,
        price_cents: 9_900,
        cabin_class: "economy".into(),
        seats_available: seats,
        status: FlightStatus::Scheduled,
        gate: None,
        terminal: None,
        baggage_allowance: None,
        description: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_postgres_reservations_never_oversell() {
    let Some(db) = connect().await else {
        return;
    };
    let flight_id = unique_id("PG");

    let flights = PgFlightRepository::new(db.pool.clone());
    flights.create_flight(flight(&flight_id, 3)).await.unwrap();
    assert!(matches!(
        flights.create_flight(flight(&flight_id, 3)).await,
        Err(CoreError::Conflict(_))
    ));

    let store = Arc::new(PgReservationStore::new(db.pool.clone()));
    let engine = Arc::new(ReservationEngine::new(
        store.clone(),
        Arc::new(PgAuditSink::new(db.pool.clone())),
    ));

    let mut tasks = JoinSet::new();
    for n in 0..8 {
        let engine = engine.clone();
        let flight_id = flight_id.clone();
        tasks.spawn(async move {
            let actor = Actor::new(format!("pg{}@x.com", n), Role::User);
            engine.reserve(&actor, one_seat(&flight_id)).await
        });
    }

    let mut confirmed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => confirmed += 1,
            Err(CoreError::InsufficientInventory { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(confirmed, 3);

    assert_eq!(find_flight(&flights, &flight_id).await.seats_available, 0);

    let records: Vec<_> = store
        .all_bookings()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.booking.flight_id == flight_id)
        .collect();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.payment.is_some()));
}

/// Sleeps one second inside the seat decrement of `SLOWSTAGE-*` flights and
/// at COMMIT time for `SLOWCOMMIT-*` flights.
async fn install_slow_triggers(pool: &PgPool) {
    for statement in [
        r#"CREATE OR REPLACE FUNCTION wayfare_test_sleep() RETURNS trigger AS $$
           BEGIN PERFORM pg_sleep(1); RETURN NEW; END $$ LANGUAGE plpgsql"#,
        "DROP TRIGGER IF EXISTS wayfare_test_slow_stage ON flights",
        r#"CREATE TRIGGER wayfare_test_slow_stage BEFORE UPDATE ON flights
           FOR EACH ROW WHEN (NEW.flight_id LIKE 'SLOWSTAGE-%')
           EXECUTE FUNCTION wayfare_test_sleep()"#,
        "DROP TRIGGER IF EXISTS wayfare_test_slow_commit ON flights",
        r#"CREATE CONSTRAINT TRIGGER wayfare_test_slow_commit AFTER UPDATE ON flights
           DEFERRABLE INITIALLY DEFERRED
           FOR EACH ROW WHEN (NEW.flight_id LIKE 'SLOWCOMMIT-%')
           EXECUTE FUNCTION wayfare_test_sleep()"#,
    ] {
        sqlx::raw_sql(statement).execute(pool).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_postgres_deadline_covers_staging_not_commit() {
    let Some(db) = connect().await else {
        return;
    };
    install_slow_triggers(&db.pool).await;

    let flights = PgFlightRepository::new(db.pool.clone());
    let engine = ReservationEngine::new(
        Arc::new(PgReservationStore::new(db.pool.clone())),
        Arc::new(PgAuditSink::new(db.pool.clone())),
    )
    .with_timeout(Duration::from_millis(300));
    let actor = Actor::new("deadline@x.com", Role::User);

    // Slow before the commit: refused, and nothing becomes durable.
    let slow_stage = unique_id("SLOWSTAGE");
    flights.create_flight(flight(&slow_stage, 2)).await.unwrap();
    let err = engine.reserve(&actor, one_seat(&slow_stage)).await.unwrap_err();
    assert!(matches!(err, CoreError::Persistence(_)), "{err:?}");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(find_flight(&flights, &slow_stage).await.seats_available, 2);
    assert_eq!(bookings_on(&db.pool, &slow_stage).await, 0);

    // Slow at COMMIT: the commit is waited out and reported as it landed.
    let slow_commit = unique_id("SLOWCOMMIT");
    flights.create_flight(flight(&slow_commit, 2)).await.unwrap();
    let reservation = engine.reserve(&actor, one_seat(&slow_commit)).await.unwrap();
    assert_eq!(reservation.booking.flight_id, slow_commit);
    assert_eq!(find_flight(&flights, &slow_commit).await.seats_available, 1);
    assert_eq!(bookings_on(&db.pool, &slow_commit).await, 1);
}

#[tokio::test]
async fn test_postgres_audit_accepts_oversized_origin() {
    let Some(db) = connect().await else {
        return;
    };
    let sink = PgAuditSink::new(db.pool.clone());
    let actor = format!("{}@x.com", unique_id("audit"));

    for event in [
        AuditEvent::success(&actor, "LOGIN", "Login successful"),
        AuditEvent::failed(&actor, "LOGIN", "Login attempt - incorrect password"),
    ] {
        sink.record(event.origin(Some("9".repeat(60)))).await.unwrap();
    }

    let written: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE user_email = $1")
        .bind(&actor)
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(written, 2);
}
