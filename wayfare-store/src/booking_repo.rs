use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use wayfare_core::booking::{
    Booking, BookingRecord, Payment, PaymentStatus, Reservation, ReservationDraft,
};
use wayfare_core::repository::ReservationStore;
use wayfare_core::{CoreError, CoreResult};

use crate::database::db_err;

const BOOKING_COLUMNS: &str =
    "booking_id, user_email, user_name, flight_id, city_origin, city_destination, seats, price_cents, status, booking_date";

pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    booking_id: i64,
    user_email: String,
    user_name: Option<String>,
    flight_id: String,
    city_origin: String,
    city_destination: String,
    seats: i32,
    price_cents: i64,
    status: String,
    booking_date: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.booking_id,
            user_email: row.user_email,
            user_name: row.user_name,
            flight_id: row.flight_id,
            origin: row.city_origin,
            destination: row.city_destination,
            seats: row.seats,
            price_cents: row.price_cents,
            status: row.status.parse()?,
            created_at: row.booking_date,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    payment_id: i64,
    booking_id: i64,
    amount_cents: i64,
    payment_method: String,
    payment_date: DateTime<Utc>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Payment {
            id: row.payment_id,
            booking_id: row.booking_id,
            amount_cents: row.amount_cents,
            method: row.payment_method,
            status: PaymentStatus::Completed,
            created_at: row.payment_date,
        }
    }
}

/// Staff listing row: a booking and, when present, its payment.
#[derive(sqlx::FromRow)]
struct BookingWithPaymentRow {
    #[sqlx(flatten)]
    booking: BookingRow,
    payment_id: Option<i64>,
    amount_cents: Option<i64>,
    payment_method: Option<String>,
    payment_date: Option<DateTime<Utc>>,
}

impl TryFrom<BookingWithPaymentRow> for BookingRecord {
    type Error = CoreError;

    fn try_from(row: BookingWithPaymentRow) -> Result<Self, Self::Error> {
        let booking = Booking::try_from(row.booking)?;
        let payment = match (row.payment_id, row.amount_cents, row.payment_method, row.payment_date) {
            (Some(id), Some(amount_cents), Some(method), Some(created_at)) => Some(Payment {
                id,
                booking_id: booking.id,
                amount_cents,
                method,
                status: PaymentStatus::Completed,
                created_at,
            }),
            _ => None,
        };
        Ok(BookingRecord { booking, payment })
    }
}

/// Endpoints of the flight a booking snapshots.
#[derive(sqlx::FromRow)]
struct RouteRow {
    departure_city_code: String,
    arrival_city_code: String,
}

impl PgReservationStore {
    async fn find_route(
        tx: &mut Transaction<'_, Postgres>,
        flight_id: &str,
    ) -> Result<Option<RouteRow>, sqlx::Error> {
        sqlx::query_as::<_, RouteRow>(
            "SELECT departure_city_code, arrival_city_code FROM flights WHERE flight_id = $1",
        )
        .bind(flight_id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn insert_booking(
        tx: &mut Transaction<'_, Postgres>,
        draft: &ReservationDraft,
        route: &RouteRow,
    ) -> Result<BookingRow, sqlx::Error> {
        sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            INSERT INTO bookings (user_name, user_email, flight_id, city_origin, city_destination, seats, price_cents, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'confirmed')
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(&draft.user_name)
        .bind(&draft.user_email)
        .bind(&draft.flight_id)
        .bind(&route.departure_city_code)
        .bind(&route.arrival_city_code)
        .bind(draft.seats as i32)
        .bind(draft.amount_cents)
        .fetch_one(&mut **tx)
        .await
    }

    async fn insert_payment(
        tx: &mut Transaction<'_, Postgres>,
        booking_id: i64,
        draft: &ReservationDraft,
    ) -> Result<PaymentRow, sqlx::Error> {
        sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO flight_payments (booking_id, user_email, amount_cents, payment_method, payment_status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING payment_id, booking_id, amount_cents, payment_method, payment_date
            "#,
        )
        .bind(booking_id)
        .bind(&draft.user_email)
        .bind(draft.amount_cents)
        .bind(&draft.payment_method)
        .bind(PaymentStatus::Completed.as_str())
        .fetch_one(&mut **tx)
        .await
    }

    /// The decrement only matches while enough seats remain, so two
    /// concurrent reservations can never both take the last seats.
    async fn take_seats(
        tx: &mut Transaction<'_, Postgres>,
        flight_id: &str,
        seats: u32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE flights
            SET seats_available = seats_available - $1
            WHERE flight_id = $2 AND seats_available >= $1
            "#,
        )
        .bind(seats as i32)
        .bind(flight_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

/// Outcome of the writes that precede the commit.
enum Staged {
    Ready(BookingRow, PaymentRow),
    NoFlight,
    SoldOut,
}

impl PgReservationStore {
    async fn stage(tx: &mut Transaction<'_, Postgres>, draft: &ReservationDraft) -> Result<Staged, sqlx::Error> {
        let Some(route) = Self::find_route(tx, &draft.flight_id).await? else {
            return Ok(Staged::NoFlight);
        };

        let booking = Self::insert_booking(tx, draft, &route).await?;
        let payment = Self::insert_payment(tx, booking.booking_id, draft).await?;

        if !Self::take_seats(tx, &draft.flight_id, draft.seats).await? {
            return Ok(Staged::SoldOut);
        }
        Ok(Staged::Ready(booking, payment))
    }
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn commit_reservation(&self, draft: &ReservationDraft, deadline: Duration) -> CoreResult<Reservation> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Dropping a transaction that was cut off mid-statement rolls it back
        // when the connection goes back to the pool.
        let staged = match tokio::time::timeout(deadline, Self::stage(&mut tx, draft)).await {
            Ok(staged) => staged.map_err(db_err)?,
            Err(_) => {
                warn!("Reservation on {} abandoned before commit after {:?}", draft.flight_id, deadline);
                return Err(CoreError::timed_out(format!("reservation on {}", draft.flight_id), deadline));
            }
        };

        let (booking, payment) = match staged {
            Staged::Ready(booking, payment) => (booking, payment),
            Staged::NoFlight => {
                tx.rollback().await.map_err(db_err)?;
                return Err(CoreError::NotFound("Flight".to_string()));
            }
            Staged::SoldOut => {
                tx.rollback().await.map_err(db_err)?;
                warn!(
                    "Reservation of {} seat(s) on {} rolled back: inventory exhausted",
                    draft.seats, draft.flight_id
                );
                return Err(CoreError::InsufficientInventory {
                    flight_id: draft.flight_id.clone(),
                    requested: draft.seats,
                });
            }
        };

        // No deadline from here on: the caller must learn what the commit did.
        tx.commit().await.map_err(db_err)?;
        info!("Booking {} committed for {}", booking.booking_id, draft.user_email);

        Ok(Reservation {
            booking: Booking::try_from(booking)?,
            payment: Payment::from(payment),
        })
    }

    async fn find_booking(&self, booking_id: i64) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE booking_id = $1",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Booking::try_from).transpose()
    }

    async fn cancel_booking(&self, booking_id: i64) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            UPDATE bookings SET status = 'cancelled'
            WHERE booking_id = $1 AND status = 'confirmed'
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Booking::try_from).transpose()
    }

    async fn bookings_for(&self, email: &str) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE user_email = $1 ORDER BY booking_date DESC",
            BOOKING_COLUMNS
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn all_bookings(&self) -> CoreResult<Vec<BookingRecord>> {
        let rows = sqlx::query_as::<_, BookingWithPaymentRow>(
            r#"
            SELECT b.booking_id, b.user_email, b.user_name, b.flight_id, b.city_origin,
                   b.city_destination, b.seats, b.price_cents, b.status, b.booking_date,
                   p.payment_id, p.amount_cents, p.payment_method, p.payment_date
            FROM bookings b
            LEFT JOIN flight_payments p ON p.booking_id = b.booking_id
            ORDER BY b.booking_date DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(BookingRecord::try_from).collect()
    }
}
