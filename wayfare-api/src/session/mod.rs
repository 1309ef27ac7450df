//! Session tokens: signing, issuing and carrying them between client and
//! server.

pub mod codec;
pub mod tokens;
pub mod transport;

pub use codec::{ClaimsCodec, CodecError, SessionClaims};
pub use tokens::{TokenError, TokenFlavor, TokenService};
pub use transport::{CookiePolicy, SessionTransport, Transport, ACCESS_COOKIE, REFRESH_COOKIE};
