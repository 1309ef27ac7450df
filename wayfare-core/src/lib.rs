pub mod accounts;
pub mod booking;
pub mod flight;
pub mod identity;
pub mod password;
pub mod repository;
pub mod reservation;

pub use accounts::AccountService;
pub use identity::{Actor, Identity, IdentityPatch, IdentityStatus, Role};
pub use reservation::{ReservationEngine, ReservationRequest};

/// Failure kinds every core operation resolves to before returning.
/// Nothing below this enum (driver errors, hashing errors) crosses a
/// component boundary except as the text of `Persistence`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Not enough seats available on flight {flight_id}: requested {requested}")]
    InsufficientInventory {
        flight_id: String,
        requested: u32,
    },
    #[error("{0}")]
    Validation(String),
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn persistence(msg: impl ToString) -> Self {
        CoreError::Persistence(msg.to_string())
    }

    pub fn timed_out(what: impl std::fmt::Display, after: std::time::Duration) -> Self {
        CoreError::Persistence(format!("{} timed out after {:?}", what, after))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
