use std::net::IpAddr;

use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use cookie::time::Duration as CookieDuration;

use super::tokens::TokenFlavor;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// How a token reaches the server for a given class of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Cookie,
    Bearer,
}

/// Cookie attributes derived from the request host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
}

impl CookiePolicy {
    /// Local hosts get `Lax` over plain HTTP; everything else is served
    /// `Secure` with `SameSite=None` so cross-origin credentialed requests
    /// keep working. A missing host is treated as non-local.
    pub fn for_host(host: Option<&str>) -> Self {
        if host.is_some_and(is_local_host) {
            Self { secure: false, same_site: SameSite::Lax }
        } else {
            Self { secure: true, same_site: SameSite::None }
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::for_host(headers.get(header::HOST).and_then(|h| h.to_str().ok()))
    }
}

/// `localhost` or a loopback address, with or without a port.
pub fn is_local_host(host: &str) -> bool {
    let host = host.trim();
    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback();
    }

    let name = match host.strip_prefix('[') {
        Some(rest) => rest.split(']').next().unwrap_or_default(),
        None => host.rsplit_once(':').map_or(host, |(name, _)| name),
    };

    name.eq_ignore_ascii_case("localhost")
        || name.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Builds session cookies and pulls raw tokens back out of requests.
#[derive(Debug, Clone, Copy)]
pub struct SessionTransport {
    access_max_age: i64,
    refresh_max_age: i64,
}

impl SessionTransport {
    /// Cookie lifetimes mirror token lifetimes, in seconds.
    pub fn new(access_max_age: i64, refresh_max_age: i64) -> Self {
        Self { access_max_age, refresh_max_age }
    }

    pub fn cookie_name(flavor: TokenFlavor) -> &'static str {
        match flavor {
            TokenFlavor::Access => ACCESS_COOKIE,
            TokenFlavor::Refresh => REFRESH_COOKIE,
        }
    }

    fn max_age(&self, flavor: TokenFlavor) -> i64 {
        match flavor {
            TokenFlavor::Access => self.access_max_age,
            TokenFlavor::Refresh => self.refresh_max_age,
        }
    }

    fn base_cookie(name: &'static str, value: String, policy: CookiePolicy) -> Cookie<'static> {
        Cookie::build((name, value))
            .http_only(true)
            .secure(policy.secure)
            .same_site(policy.same_site)
            .path("/")
            .build()
    }

    pub fn session_cookie(&self, flavor: TokenFlavor, token: String, policy: CookiePolicy) -> Cookie<'static> {
        let mut cookie = Self::base_cookie(Self::cookie_name(flavor), token, policy);
        cookie.set_max_age(CookieDuration::seconds(self.max_age(flavor)));
        cookie
    }

    /// Adds the cookie for each issued token to the jar.
    pub fn attach(&self, jar: CookieJar, tokens: &[(TokenFlavor, String)], policy: CookiePolicy) -> CookieJar {
        tokens.iter().fold(jar, |jar, (flavor, token)| {
            jar.add(self.session_cookie(*flavor, token.clone(), policy))
        })
    }

    /// Expires both session cookies with the attributes they were set with,
    /// whether or not the request carried them.
    pub fn clear(&self, jar: CookieJar, policy: CookiePolicy) -> CookieJar {
        [ACCESS_COOKIE, REFRESH_COOKIE].into_iter().fold(jar, |jar, name| {
            let mut cookie = Self::base_cookie(name, String::new(), policy);
            cookie.make_removal();
            jar.add(cookie)
        })
    }

    /// The raw token for `flavor` carried by `transport`, if any.
    pub fn extract(&self, headers: &HeaderMap, transport: Transport, flavor: TokenFlavor) -> Option<String> {
        let token = match transport {
            Transport::Cookie => CookieJar::from_headers(headers)
                .get(Self::cookie_name(flavor))
                .map(|c| c.value().to_string()),
            Transport::Bearer => headers
                .typed_get::<Authorization<Bearer>>()
                .map(|Authorization(bearer)| bearer.token().to_string()),
        };
        token.filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_local_hosts() {
        for host in ["localhost", "localhost:5000", "LOCALHOST:3000", "127.0.0.1", "127.0.0.1:5000", "[::1]:5000", "::1"] {
            assert!(is_local_host(host), "{host} should be local");
        }
        for host in ["api.wayfare.example", "api.wayfare.example:443", "10.0.0.5:5000", "localhost.evil.com"] {
            assert!(!is_local_host(host), "{host} should not be local");
        }
    }

    #[test]
    fn test_policy_by_host() {
        assert_eq!(
            CookiePolicy::for_host(Some("localhost:5000")),
            CookiePolicy { secure: false, same_site: SameSite::Lax }
        );
        assert_eq!(
            CookiePolicy::for_host(Some("api.wayfare.example")),
            CookiePolicy { secure: true, same_site: SameSite::None }
        );
        assert!(CookiePolicy::for_host(None).secure);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let transport = SessionTransport::new(900, 604_800);
        let policy = CookiePolicy::for_host(Some("api.wayfare.example"));

        let cookie = transport.session_cookie(TokenFlavor::Refresh, "tok".into(), policy);
        assert_eq!(cookie.name(), "refresh_token");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::None));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), None);
        assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(604_800)));
    }

    #[test]
    fn test_extract_by_transport() {
        let transport = SessionTransport::new(900, 604_800);
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token=abc; refresh_token=def"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));

        assert_eq!(transport.extract(&headers, Transport::Cookie, TokenFlavor::Access).as_deref(), Some("abc"));
        assert_eq!(transport.extract(&headers, Transport::Cookie, TokenFlavor::Refresh).as_deref(), Some("def"));
        assert_eq!(transport.extract(&headers, Transport::Bearer, TokenFlavor::Access).as_deref(), Some("xyz"));
        assert_eq!(transport.extract(&HeaderMap::new(), Transport::Bearer, TokenFlavor::Access), None);
    }
}
