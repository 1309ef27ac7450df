pub mod models;
pub mod pii;

pub use models::events::{AuditEvent, AuditOutcome};
pub use pii::Masked;
