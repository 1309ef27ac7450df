use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use wayfare_core::flight::{Flight, FlightStatus, NewFlight};
use wayfare_core::repository::FlightRepository;
use wayfare_core::{CoreError, CoreResult};

use crate::database::db_err;

const FLIGHT_COLUMNS: &str = "flight_id, trip_type, airline, departure_city_code, arrival_city_code, \
    departure_datetime, return_datetime, price_cents, cabin_class, seats_available, flight_status, \
    flight_distance, flight_duration, gate, terminal, baggage_allowance, flight_description";

pub struct PgFlightRepository {
    pool: PgPool,
}

impl PgFlightRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct FlightRow {
    flight_id: String,
    trip_type: String,
    airline: String,
    departure_city_code: String,
    arrival_city_code: String,
    departure_datetime: DateTime<Utc>,
    return_datetime: Option<DateTime<Utc>>,
    price_cents: i64,
    cabin_class: String,
    seats_available: i32,
    flight_status: String,
    flight_distance: f64,
    flight_duration: f64,
    gate: Option<String>,
    terminal: Option<String>,
    baggage_allowance: Option<String>,
    flight_description: Option<String>,
}

impl TryFrom<FlightRow> for Flight {
    type Error = CoreError;

    fn try_from(row: FlightRow) -> Result<Self, Self::Error> {
        let status = row
            .flight_status
            .parse()
            .map_err(|_| CoreError::persistence(format!("flight {} has status {}", row.flight_id, row.flight_status)))?;

        Ok(Flight {
            flight_id: row.flight_id,
            trip_type: row.trip_type,
            airline: row.airline,
            origin: row.departure_city_code,
            destination: row.arrival_city_code,
            departure_at: row.departure_datetime,
            return_at: row.return_datetime,
            price_cents: row.price_cents,
            cabin_class: row.cabin_class,
            seats_available: row.seats_available,
            status,
            distance_km: row.flight_distance,
            duration_hours: row.flight_duration,
            gate: row.gate,
            terminal: row.terminal,
            baggage_allowance: row.baggage_allowance,
            description: row.flight_description,
        })
    }
}

#[async_trait]
impl FlightRepository for PgFlightRepository {
    async fn create_flight(&self, flight: NewFlight) -> CoreResult<Flight> {
        let flight = flight.into_flight();

        let row = sqlx::query_as::<_, FlightRow>(&format!(
            r#"
            INSERT INTO flights ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {cols}
            "#,
            cols = FLIGHT_COLUMNS
        ))
        .bind(&flight.flight_id)
        .bind(&flight.trip_type)
        .bind(&flight.airline)
        .bind(&flight.origin)
        .bind(&flight.destination)
        .bind(flight.departure_at)
        .bind(flight.return_at)
        .bind(flight.price_cents)
        .bind(&flight.cabin_class)
        .bind(flight.seats_available)
        .bind(flight.status.as_str())
        .bind(flight.distance_km)
        .bind(flight.duration_hours)
        .bind(&flight.gate)
        .bind(&flight.terminal)
        .bind(&flight.baggage_allowance)
        .bind(&flight.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match db_err(e) {
            CoreError::Conflict(_) => CoreError::Conflict("Flight with this ID already exists".to_string()),
            other => other,
        })?;

        Flight::try_from(row)
    }

    async fn list_flights(&self) -> CoreResult<Vec<Flight>> {
        let rows = sqlx::query_as::<_, FlightRow>(&format!(
            "SELECT {} FROM flights ORDER BY departure_datetime",
            FLIGHT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Flight::try_from).collect()
    }

    async fn update_status(&self, flight_id: &str, status: FlightStatus) -> CoreResult<Option<Flight>> {
        let row = sqlx::query_as::<_, FlightRow>(&format!(
            "UPDATE flights SET flight_status = $1 WHERE flight_id = $2 RETURNING {}",
            FLIGHT_COLUMNS
        ))
        .bind(status.as_str())
        .bind(flight_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Flight::try_from).transpose()
    }
}
