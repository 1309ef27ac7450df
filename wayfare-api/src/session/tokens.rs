use chrono::{Duration, Utc};
use tracing::debug;
use wayfare_core::Role;
use wayfare_store::app_config::AuthConfig;

use super::codec::{ClaimsCodec, SessionClaims};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFlavor {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Bad signature, malformed input and expiry all land here.
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Token could not be issued: {0}")]
    Issue(String),
}

/// Issues and verifies access and refresh tokens. Each flavor signs with
/// its own secret, so one flavor never verifies as the other.
pub struct TokenService {
    access: ClaimsCodec,
    refresh: ClaimsCodec,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(access_secret: &[u8], refresh_secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            access: ClaimsCodec::new(access_secret),
            refresh: ClaimsCodec::new(refresh_secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(
            auth.access_secret.expose().as_bytes(),
            auth.refresh_secret.expose().as_bytes(),
            Duration::seconds(auth.access_ttl_seconds),
            Duration::seconds(auth.refresh_ttl_seconds),
        )
    }

    pub fn ttl(&self, flavor: TokenFlavor) -> Duration {
        match flavor {
            TokenFlavor::Access => self.access_ttl,
            TokenFlavor::Refresh => self.refresh_ttl,
        }
    }

    fn codec(&self, flavor: TokenFlavor) -> &ClaimsCodec {
        match flavor {
            TokenFlavor::Access => &self.access,
            TokenFlavor::Refresh => &self.refresh,
        }
    }

    pub fn issue(&self, flavor: TokenFlavor, email: &str, role: Role) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: email.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl(flavor)).timestamp(),
        };
        self.codec(flavor)
            .encode(&claims)
            .map_err(|e| TokenError::Issue(e.to_string()))
    }

    pub fn issue_access(&self, email: &str, role: Role) -> Result<String, TokenError> {
        self.issue(TokenFlavor::Access, email, role)
    }

    pub fn issue_refresh(&self, email: &str, role: Role) -> Result<String, TokenError> {
        self.issue(TokenFlavor::Refresh, email, role)
    }

    pub fn verify(&self, token: &str, flavor: TokenFlavor) -> Result<SessionClaims, TokenError> {
        self.codec(flavor).decode(token).map_err(|reason| {
            debug!("{:?} token rejected: {}", flavor, reason);
            TokenError::InvalidToken
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(
            b"access-secret",
            b"refresh-secret",
            Duration::minutes(15),
            Duration::days(7),
        )
    }

    #[test]
    fn test_access_round_trip() {
        let tokens = service();
        for role in Role::ALL {
            let token = tokens.issue_access("a@x.com", role).unwrap();
            let claims = tokens.verify(&token, TokenFlavor::Access).unwrap();
            assert_eq!(claims.sub, "a@x.com");
            assert_eq!(claims.role, role);
            assert_eq!(claims.exp - claims.iat, 15 * 60);
        }
    }

    #[test]
    fn test_flavors_do_not_cross() {
        let tokens = service();
        let access = tokens.issue_access("a@x.com", Role::User).unwrap();
        let refresh = tokens.issue_refresh("a@x.com", Role::User).unwrap();

        assert_eq!(tokens.verify(&access, TokenFlavor::Refresh), Err(TokenError::InvalidToken));
        assert_eq!(tokens.verify(&refresh, TokenFlavor::Access), Err(TokenError::InvalidToken));
        assert!(tokens.verify(&refresh, TokenFlavor::Refresh).is_ok());
    }

    #[test]
    fn test_refresh_lifetime() {
        let tokens = service();
        let refresh = tokens.issue_refresh("a@x.com", Role::Admin).unwrap();
        let claims = tokens.verify(&refresh, TokenFlavor::Refresh).unwrap();
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_expired_collapses_to_invalid_token() {
        let tokens = TokenService::new(b"a", b"r", Duration::seconds(-10), Duration::days(1));
        let token = tokens.issue_access("a@x.com", Role::User).unwrap();
        assert_eq!(tokens.verify(&token, TokenFlavor::Access), Err(TokenError::InvalidToken));
    }
}
