use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use wayfare_core::repository::IdentityRepository;
use wayfare_core::{Actor, CoreError, CoreResult, Role};

use crate::error::AppError;
use crate::session::{SessionTransport, TokenFlavor, TokenService, Transport};
use crate::state::AppState;

// ============================================================================
// Requirements
// ============================================================================

/// What an operation demands of its caller.
#[derive(Debug, Clone, Copy)]
pub struct Requirement {
    pub roles: &'static [Role],
    pub transport: Transport,
    pub flavor: TokenFlavor,
    /// Re-read the caller's role from the identity store instead of
    /// trusting the claims alone.
    pub live_check: bool,
}

impl Requirement {
    /// Any signed-in browser session.
    pub const SESSION: Requirement = Requirement {
        roles: &Role::ALL,
        transport: Transport::Cookie,
        flavor: TokenFlavor::Access,
        live_check: false,
    };

    /// Browser session of an admin or superadmin.
    pub const STAFF: Requirement = Requirement {
        roles: &[Role::Admin, Role::Superadmin],
        transport: Transport::Cookie,
        flavor: TokenFlavor::Access,
        live_check: false,
    };

    /// Identity administration API: bearer token plus a live role check.
    pub const SUPERADMIN_API: Requirement = Requirement {
        roles: &[Role::Superadmin],
        transport: Transport::Bearer,
        flavor: TokenFlavor::Access,
        live_check: true,
    };

    /// The refresh operation, which accepts only refresh tokens.
    pub const REFRESH: Requirement = Requirement {
        roles: &Role::ALL,
        transport: Transport::Cookie,
        flavor: TokenFlavor::Refresh,
        live_check: false,
    };

    fn admits(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    fn describe_roles(&self) -> String {
        self.roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
    }
}

// ============================================================================
// Principal
// ============================================================================

/// The verified caller, placed in request extensions by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn actor(&self, origin: ClientOrigin) -> Actor {
        Actor::new(&self.email, self.role).with_origin(origin.0)
    }
}

// ============================================================================
// Gate
// ============================================================================

/// Fail-closed authorization: a request is admitted only when every step
/// succeeds; any missing token, failed verification, role mismatch or
/// store fault is a denial.
pub struct AuthorizationGate {
    tokens: Arc<TokenService>,
    transport: SessionTransport,
    identities: Arc<dyn IdentityRepository>,
}

impl AuthorizationGate {
    pub fn new(tokens: Arc<TokenService>, transport: SessionTransport, identities: Arc<dyn IdentityRepository>) -> Self {
        Self { tokens, transport, identities }
    }

    pub async fn authorize(&self, headers: &HeaderMap, requirement: &Requirement) -> CoreResult<Principal> {
        let token = self
            .transport
            .extract(headers, requirement.transport, requirement.flavor)
            .ok_or_else(|| CoreError::Unauthenticated("Authentication required".to_string()))?;

        let claims = self
            .tokens
            .verify(&token, requirement.flavor)
            .map_err(|e| CoreError::Unauthenticated(e.to_string()))?;

        if !requirement.admits(claims.role) {
            warn!("{} ({}) denied: requires {}", claims.sub, claims.role, requirement.describe_roles());
            return Err(CoreError::Forbidden(format!(
                "Forbidden: role '{}' is not permitted (requires {})",
                claims.role,
                requirement.describe_roles()
            )));
        }

        if requirement.live_check {
            self.confirm_role(&claims.sub, requirement).await?;
        }

        Ok(Principal {
            email: claims.sub,
            role: claims.role,
        })
    }

    /// Claims are not revocable, so privileged operations confirm the
    /// stored identity still holds an admitted role and is active.
    async fn confirm_role(&self, email: &str, requirement: &Requirement) -> CoreResult<()> {
        let identity = self.identities.find_by_email(email).await.map_err(|e| {
            warn!("Live role check for {} could not complete: {}", email, e);
            e
        })?;

        match identity {
            Some(identity) if requirement.admits(identity.role) && identity.is_active() => Ok(()),
            Some(identity) => {
                warn!("{} holds stale claims: stored role {}, status {}", email, identity.role, identity.status.as_str());
                Err(CoreError::Forbidden(format!(
                    "Forbidden: role '{}' is not permitted (requires {})",
                    identity.role,
                    requirement.describe_roles()
                )))
            }
            None => {
                warn!("{} holds claims for an identity that no longer exists", email);
                Err(CoreError::Forbidden("Forbidden: identity no longer exists".to_string()))
            }
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

async fn guard(state: &AppState, requirement: &Requirement, mut req: Request, next: Next) -> Result<Response, AppError> {
    let principal = state.gate.authorize(req.headers(), requirement).await?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

pub async fn session_auth(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    guard(&state, &Requirement::SESSION, req, next).await
}

pub async fn staff_auth(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    guard(&state, &Requirement::STAFF, req, next).await
}

pub async fn superadmin_api_auth(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    guard(&state, &Requirement::SUPERADMIN_API, req, next).await
}

// ============================================================================
// Client origin
// ============================================================================

/// Client address recorded in the audit trail: the peer address when the
/// server runs with connect info, or the first `X-Forwarded-For` hop when
/// `server.trust_forwarded_for` is set and that hop is a valid IP address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOrigin(pub Option<String>);

impl ClientOrigin {
    pub fn from_parts(parts: &Parts, trust_forwarded_for: bool) -> Self {
        let forwarded = trust_forwarded_for
            .then(|| parts.headers.get("x-forwarded-for"))
            .flatten()
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok());

        let peer = || {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        };

        ClientOrigin(forwarded.or_else(peer).map(|ip| ip.to_string()))
    }
}

impl FromRequestParts<AppState> for ClientOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(ClientOrigin::from_parts(parts, state.trust_forwarded_for))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};
    use chrono::Duration;
    use wayfare_core::identity::{IdentityPatch, IdentityStatus, NewIdentity};
    use wayfare_store::MemoryStore;

    fn tokens() -> Arc<TokenService> {
        Arc::new(TokenService::new(b"access", b"refresh", Duration::minutes(15), Duration::days(7)))
    }

    async fn gate_with(identity: Option<(&str, Role)>) -> (AuthorizationGate, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        if let Some((email, role)) = identity {
            store
                .insert(NewIdentity {
                    first_name: "Root".into(),
                    last_name: String::new(),
                    email: email.into(),
                    password_hash: "hash".into(),
                    role,
                    status: IdentityStatus::Active,
                    permissions: Default::default(),
                })
                .await
                .unwrap();
        }
        let gate = AuthorizationGate::new(tokens(), SessionTransport::new(900, 604_800), store.clone());
        (gate, store)
    }

    fn cookie_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&format!("access_token={token}")).unwrap());
        headers
    }

    fn bearer_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthenticated() {
        let (gate, _) = gate_with(None).await;
        let err = gate.authorize(&HeaderMap::new(), &Requirement::SESSION).await.unwrap_err();
        assert!(matches!(err, CoreError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_staff_requirement() {
        let (gate, _) = gate_with(None).await;
        let issuer = tokens();

        let admin = issuer.issue_access("boss@x.com", Role::Admin).unwrap();
        let principal = gate.authorize(&cookie_headers(&admin), &Requirement::STAFF).await.unwrap();
        assert_eq!(principal.role, Role::Admin);

        let user = issuer.issue_access("a@x.com", Role::User).unwrap();
        let err = gate.authorize(&cookie_headers(&user), &Requirement::STAFF).await.unwrap_err();
        match err {
            CoreError::Forbidden(msg) => assert!(msg.contains("'user'"), "{msg}"),
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_token_refused_on_access_path() {
        let (gate, _) = gate_with(None).await;
        let refresh = tokens().issue_refresh("a@x.com", Role::User).unwrap();
        let err = gate.authorize(&cookie_headers(&refresh), &Requirement::SESSION).await.unwrap_err();
        assert!(matches!(err, CoreError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_bearer_requirement_ignores_cookie() {
        let (gate, _) = gate_with(Some(("root@x.com", Role::Superadmin))).await;
        let token = tokens().issue_access("root@x.com", Role::Superadmin).unwrap();

        let err = gate.authorize(&cookie_headers(&token), &Requirement::SUPERADMIN_API).await.unwrap_err();
        assert!(matches!(err, CoreError::Unauthenticated(_)));

        let principal = gate.authorize(&bearer_headers(&token), &Requirement::SUPERADMIN_API).await.unwrap();
        assert_eq!(principal.email, "root@x.com");
    }

    #[tokio::test]
    async fn test_live_check_catches_demotion() {
        let (gate, store) = gate_with(Some(("root@x.com", Role::Superadmin))).await;
        let token = tokens().issue_access("root@x.com", Role::Superadmin).unwrap();

        let id = store.find_by_email("root@x.com").await.unwrap().unwrap().id;
        let demote = IdentityPatch { role: Some(Role::Admin), ..Default::default() };
        store.update(id, &demote).await.unwrap();

        let err = gate.authorize(&bearer_headers(&token), &Requirement::SUPERADMIN_API).await.unwrap_err();
        match err {
            CoreError::Forbidden(msg) => assert!(msg.contains("'admin'"), "{msg}"),
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    fn parts_with(forwarded: &str, peer: Option<&str>) -> Parts {
        let mut req = axum::http::Request::builder()
            .header("x-forwarded-for", forwarded)
            .body(())
            .unwrap();
        if let Some(peer) = peer {
            req.extensions_mut().insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        }
        req.into_parts().0
    }

    #[test]
    fn test_origin_ignores_forwarded_header_by_default() {
        let parts = parts_with("203.0.113.7", Some("10.0.0.2:41000"));
        assert_eq!(ClientOrigin::from_parts(&parts, false).0.as_deref(), Some("10.0.0.2"));

        let parts = parts_with("203.0.113.7", None);
        assert_eq!(ClientOrigin::from_parts(&parts, false), ClientOrigin(None));
    }

    #[test]
    fn test_origin_from_trusted_proxy() {
        let parts = parts_with(" 203.0.113.7 , 10.0.0.1", Some("10.0.0.2:41000"));
        assert_eq!(ClientOrigin::from_parts(&parts, true).0.as_deref(), Some("203.0.113.7"));

        let parts = parts_with("2001:db8::1", None);
        assert_eq!(ClientOrigin::from_parts(&parts, true).0.as_deref(), Some("2001:db8::1"));
    }

    #[test]
    fn test_origin_rejects_garbage_hop() {
        let garbage = "x".repeat(60);
        let parts = parts_with(&garbage, Some("10.0.0.2:41000"));
        assert_eq!(ClientOrigin::from_parts(&parts, true).0.as_deref(), Some("10.0.0.2"));

        let parts = parts_with("not-an-ip", None);
        assert_eq!(ClientOrigin::from_parts(&parts, true), ClientOrigin(None));
    }

    #[tokio::test]
    async fn test_live_check_refuses_unknown_identity() {
        let (gate, _) = gate_with(None).await;
        let token = tokens().issue_access("ghost@x.com", Role::Superadmin).unwrap();
        let err = gate.authorize(&bearer_headers(&token), &Requirement::SUPERADMIN_API).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }
}
