use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use wayfare_core::Role;

/// Signed session payload. `iat` and `exp` are seconds since the epoch and
/// are covered by the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
    #[error("token could not be encoded: {0}")]
    Encoding(String),
}

/// HMAC-SHA256 codec bound to one secret.
///
/// Only HS256 is accepted on decode, so a token whose header names another
/// algorithm fails as `InvalidSignature` even if it would verify under it.
/// Expiry is checked against the clock at decode time with no leeway.
pub struct ClaimsCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl ClaimsCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn encode(&self, claims: &SessionClaims) -> Result<String, CodecError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| CodecError::Encoding(e.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<SessionClaims, CodecError> {
        decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => CodecError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => CodecError::InvalidSignature,
                _ => CodecError::Malformed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn claims(exp_offset: i64) -> SessionClaims {
        let now = Utc::now().timestamp();
        SessionClaims {
            sub: "a@x.com".into(),
            role: Role::Admin,
            iat: now,
            exp: now + exp_offset,
        }
    }

    #[test]
    fn test_decode_returns_signed_claims() {
        let codec = ClaimsCodec::new(b"first-secret");
        let original = claims(60);
        let token = codec.encode(&original).unwrap();
        assert_eq!(codec.decode(&token).unwrap(), original);
    }

    #[test]
    fn test_other_key_is_invalid_signature() {
        let token = ClaimsCodec::new(b"first-secret").encode(&claims(60)).unwrap();
        let err = ClaimsCodec::new(b"second-secret").decode(&token).unwrap_err();
        assert_eq!(err, CodecError::InvalidSignature);
    }

    #[test]
    fn test_past_expiry_rejected_with_valid_signature() {
        let codec = ClaimsCodec::new(b"first-secret");
        let token = codec.encode(&claims(-5)).unwrap();
        assert_eq!(codec.decode(&token).unwrap_err(), CodecError::Expired);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let codec = ClaimsCodec::new(b"first-secret");
        let token = codec.encode(&claims(60)).unwrap();
        let forged = codec.encode(&SessionClaims { role: Role::Superadmin, ..claims(60) }).unwrap();

        // Keep the genuine header and signature, swap in the forged payload.
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = forged.split('.').nth(1).unwrap();
        let spliced = parts.join(".");

        assert_eq!(codec.decode(&spliced).unwrap_err(), CodecError::InvalidSignature);
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let secret = b"first-secret";
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims(60),
            &EncodingKey::from_secret(secret),
        )
        .unwrap();
        assert_eq!(
            ClaimsCodec::new(secret).decode(&token).unwrap_err(),
            CodecError::InvalidSignature
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let codec = ClaimsCodec::new(b"first-secret");
        assert_eq!(codec.decode("not-a-token").unwrap_err(), CodecError::Malformed);
        assert_eq!(codec.decode("").unwrap_err(), CodecError::Malformed);
    }
}
