use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// Route metrics recorded when no routing service is consulted.
pub const FALLBACK_DISTANCE_KM: f64 = 1000.0;
pub const FALLBACK_DURATION_HOURS: f64 = 2.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlightStatus {
    Scheduled,
    Active,
    Cancelled,
    Completed,
}

impl FlightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Scheduled => "scheduled",
            FlightStatus::Active => "active",
            FlightStatus::Cancelled => "cancelled",
            FlightStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "scheduled" => Ok(FlightStatus::Scheduled),
            "active" => Ok(FlightStatus::Active),
            "cancelled" => Ok(FlightStatus::Cancelled),
            "completed" => Ok(FlightStatus::Completed),
            _ => Err(CoreError::validation("Invalid status")),
        }
    }
}

/// Inventory record. `seats_available` only moves through the conditional
/// decrement performed by a reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    pub flight_id: String,
    pub trip_type: String,
    pub airline: String,
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    pub return_at: Option<DateTime<Utc>>,
    pub price_cents: i64,
    pub cabin_class: String,
    pub seats_available: i32,
    pub status: FlightStatus,
    pub distance_km: f64,
    pub duration_hours: f64,
    pub gate: Option<String>,
    pub terminal: Option<String>,
    pub baggage_allowance: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFlight {
    pub flight_id: String,
    pub trip_type: String,
    pub airline: String,
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    pub return_at: Option<DateTime<Utc>>,
    pub price_cents: i64,
    pub cabin_class: String,
    pub seats_available: i32,
    pub status: FlightStatus,
    pub gate: Option<String>,
    pub terminal: Option<String>,
    pub baggage_allowance: Option<String>,
    pub description: Option<String>,
}

impl NewFlight {
    pub fn validate(&self) -> CoreResult<()> {
        let mut missing = Vec::new();
        for (name, value) in [
            ("flight_id", &self.flight_id),
            ("trip_type", &self.trip_type),
            ("airline", &self.airline),
            ("departure_city", &self.origin),
            ("arrival_city", &self.destination),
            ("cabin_class", &self.cabin_class),
        ] {
            if value.trim().is_empty() {
                missing.push(name);
            }
        }
        if !missing.is_empty() {
            return Err(CoreError::validation(format!(
                "Missing required field(s): {}",
                missing.join(", ")
            )));
        }
        if self.price_cents < 0 {
            return Err(CoreError::validation("price must not be negative"));
        }
        if self.seats_available < 0 {
            return Err(CoreError::validation("seats_available must not be negative"));
        }
        Ok(())
    }

    pub fn into_flight(self) -> Flight {
        Flight {
            flight_id: self.flight_id,
            trip_type: self.trip_type,
            airline: self.airline,
            origin: self.origin,
            destination: self.destination,
            departure_at: self.departure_at,
            return_at: self.return_at,
            price_cents: self.price_cents,
            cabin_class: self.cabin_class,
            seats_available: self.seats_available,
            status: self.status,
            distance_km: FALLBACK_DISTANCE_KM,
            duration_hours: FALLBACK_DURATION_HOURS,
            gate: self.gate,
            terminal: self.terminal,
            baggage_allowance: self.baggage_allowance,
            description: self.description,
        }
    }
}
