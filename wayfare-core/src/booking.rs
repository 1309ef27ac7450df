use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// `Confirmed` → `Cancelled` is the only transition; nothing restores
/// `Confirmed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(CoreError::persistence(format!("unknown booking status {other}"))),
        }
    }
}

/// Payments are recorded, not processed: the only modelled state is
/// `Completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: i64,
    pub user_email: String,
    pub user_name: Option<String>,
    pub flight_id: String,
    pub origin: String,
    pub destination: String,
    pub seats: i32,
    pub price_cents: i64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_owned_by(&self, email: &str) -> bool {
        self.user_email == email
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: i64,
    pub booking_id: i64,
    pub amount_cents: i64,
    pub method: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// The durable outcome of a successful reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub booking: Booking,
    pub payment: Payment,
}

/// Booking with its payment, as listed to staff. A payment is absent only
/// for rows written outside the reservation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRecord {
    #[serde(flatten)]
    pub booking: Booking,
    pub payment: Option<Payment>,
}

/// Everything the store needs to perform the all-or-nothing write.
#[derive(Debug, Clone)]
pub struct ReservationDraft {
    pub flight_id: String,
    pub seats: u32,
    pub user_email: String,
    pub user_name: Option<String>,
    pub payment_method: String,
    pub amount_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_record_flattens_booking() {
        let record = BookingRecord {
            booking: Booking {
                id: 7,
                user_email: "a@x.com".into(),
                user_name: None,
                flight_id: "F1".into(),
                origin: "NBO".into(),
                destination: "MBA".into(),
                seats: 1,
                price_cents: 5000,
                status: BookingStatus::Confirmed,
                created_at: Utc::now(),
            },
            payment: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["status"], "confirmed");
        assert!(json["payment"].is_null());
    }

    #[test]
    fn test_status_round_trips_through_text() {
        assert_eq!("cancelled".parse::<BookingStatus>().unwrap(), BookingStatus::Cancelled);
        assert!(matches!("pending".parse::<BookingStatus>(), Err(CoreError::Persistence(_))));
    }
}
