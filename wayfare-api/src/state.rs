use std::sync::Arc;
use std::time::Duration;

use wayfare_core::repository::{AuditSink, FlightRepository, IdentityRepository, ReservationStore};
use wayfare_core::{AccountService, ReservationEngine};
use wayfare_store::app_config::Config;
use wayfare_store::{DbClient, MemoryStore, PgAuditSink, PgFlightRepository, PgIdentityRepository, PgReservationStore};

use crate::middleware::AuthorizationGate;
use crate::session::{SessionTransport, TokenService};

/// The stores every handler reaches, behind their repository traits.
#[derive(Clone)]
pub struct Backends {
    pub identities: Arc<dyn IdentityRepository>,
    pub flights: Arc<dyn FlightRepository>,
    pub reservations: Arc<dyn ReservationStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl Backends {
    pub fn postgres(db: &DbClient) -> Self {
        Self {
            identities: Arc::new(PgIdentityRepository::new(db.pool.clone())),
            flights: Arc::new(PgFlightRepository::new(db.pool.clone())),
            reservations: Arc::new(PgReservationStore::new(db.pool.clone())),
            audit: Arc::new(PgAuditSink::new(db.pool.clone())),
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            identities: store.clone(),
            flights: store.clone(),
            reservations: store.clone(),
            audit: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub reservations: Arc<ReservationEngine>,
    pub flights: Arc<dyn FlightRepository>,
    pub identities: Arc<dyn IdentityRepository>,
    pub audit: Arc<dyn AuditSink>,
    pub tokens: Arc<TokenService>,
    pub transport: SessionTransport,
    pub gate: Arc<AuthorizationGate>,
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(backends: Backends, config: &Config) -> Self {
        let tokens = Arc::new(TokenService::from_config(&config.auth));
        let transport = SessionTransport::new(config.auth.access_ttl_seconds, config.auth.refresh_ttl_seconds);
        let gate = AuthorizationGate::new(tokens.clone(), transport, backends.identities.clone());
        let reservations = ReservationEngine::new(backends.reservations.clone(), backends.audit.clone())
            .with_timeout(Duration::from_millis(config.reservation.timeout_ms));

        Self {
            accounts: Arc::new(AccountService::new(backends.identities.clone(), backends.audit.clone())),
            reservations: Arc::new(reservations),
            flights: backends.flights,
            identities: backends.identities,
            audit: backends.audit,
            tokens,
            transport,
            gate: Arc::new(gate),
            trust_forwarded_for: config.server.trust_forwarded_for,
        }
    }
}
