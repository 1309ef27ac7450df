pub mod app_config;
pub mod audit_repo;
pub mod booking_repo;
pub mod database;
pub mod flight_repo;
pub mod identity_repo;
pub mod memory;

pub use audit_repo::PgAuditSink;
pub use booking_repo::PgReservationStore;
pub use database::DbClient;
pub use flight_repo::PgFlightRepository;
pub use identity_repo::PgIdentityRepository;
pub use memory::MemoryStore;
