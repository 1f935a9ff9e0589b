use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_ISSUER: &str = "auth-service";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token signature is invalid")]
    SignatureInvalid,
    #[error("Token has expired")]
    Expired,
    #[error("Token kind does not match")]
    KindMismatch,
    #[error("Token issuer does not match")]
    IssuerMismatch,
    #[error("Token is malformed")]
    Malformed,
    #[error("Token encoding error: {0}")]
    Encoding(String),
}

/// Purpose of a token. Each kind is signed with its own key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token, so two tokens minted in the same second differ.
    pub jti: String,
}

/// Lifetimes and issuer applied to every token the codec mints.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
}

impl TokenSettings {
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(30),
            refresh_ttl: Duration::days(7),
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }
}

/// Issues and validates signed, typed, expiring tokens.
pub trait TokenCodec: Send + Sync {
    fn issue(&self, user_id: &Uuid, kind: TokenKind) -> Result<String, TokenError>;

    /// Returns the subject of `token` if it is a valid token of `expected` kind.
    fn validate(&self, token: &str, expected: TokenKind) -> Result<Uuid, TokenError>;
}

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// HS256 JWT codec holding one key per token kind.
///
/// The key used to verify a token is chosen from the kind the caller expects,
/// never from anything inside the token. A refresh token presented where an
/// access token is required is therefore checked against the access key and
/// fails signature verification before its `type` claim is even read.
pub struct JwtTokenCodec {
    access: SigningKey,
    refresh: SigningKey,
    settings: TokenSettings,
    validation: Validation,
}

impl JwtTokenCodec {
    pub fn new(access_secret: &str, refresh_secret: &str, settings: TokenSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            access: SigningKey::from_secret(access_secret.as_bytes()),
            refresh: SigningKey::from_secret(refresh_secret.as_bytes()),
            settings,
            validation,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Mint a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        user_id: &Uuid,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let exp = now
            .checked_add_signed(self.settings.ttl(kind))
            .ok_or_else(|| TokenError::Encoding("token expiry out of range".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            kind,
            iss: self.settings.issuer.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.key(kind).encoding,
        )
        .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    fn key(&self, kind: TokenKind) -> &SigningKey {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }
}

impl TokenCodec for JwtTokenCodec {
    fn issue(&self, user_id: &Uuid, kind: TokenKind) -> Result<String, TokenError> {
        self.issue_at(user_id, kind, Utc::now())
    }

    fn validate(&self, token: &str, expected: TokenKind) -> Result<Uuid, TokenError> {
        let token_data = decode::<Claims>(token, &self.key(expected).decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::SignatureInvalid
                }
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?;

        let claims = token_data.claims;

        if claims.kind != expected {
            return Err(TokenError::KindMismatch);
        }

        if claims.iss != self.settings.issuer {
            return Err(TokenError::IssuerMismatch);
        }

        Uuid::parse_str(&claims.sub).map_err(|_| TokenError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> JwtTokenCodec {
        JwtTokenCodec::new("access-secret", "refresh-secret", TokenSettings::default())
    }

    #[test]
    fn test_issue_and_validate_both_kinds() {
        let codec = codec();
        let user_id = Uuid::new_v4();

        for kind in [TokenKind::Access, TokenKind::Refresh] {
            let token = codec.issue(&user_id, kind).unwrap();
            assert_eq!(codec.validate(&token, kind).unwrap(), user_id);
        }
    }

    #[test]
    fn test_claims_carry_kind_issuer_and_ttl() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let token = codec.issue_at(&user_id, TokenKind::Refresh, now).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let claims = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"refresh-secret"),
            &validation,
        )
        .unwrap()
        .claims;

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.kind, TokenKind::Refresh);
        assert_eq!(claims.iss, DEFAULT_ISSUER);
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.exp - claims.iat, Duration::days(7).num_seconds());
    }

    #[test]
    fn test_tokens_issued_together_differ() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let first = codec.issue_at(&user_id, TokenKind::Refresh, now).unwrap();
        let second = codec.issue_at(&user_id, TokenKind::Refresh, now).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_cross_kind_rejected_by_key() {
        let codec = codec();
        let user_id = Uuid::new_v4();

        let access = codec.issue(&user_id, TokenKind::Access).unwrap();
        let refresh = codec.issue(&user_id, TokenKind::Refresh).unwrap();

        assert_eq!(
            codec.validate(&access, TokenKind::Refresh),
            Err(TokenError::SignatureInvalid)
        );
        assert_eq!(
            codec.validate(&refresh, TokenKind::Access),
            Err(TokenError::SignatureInvalid)
        );
    }

    #[test]
    fn test_cross_kind_rejected_by_claim_when_keys_collide() {
        let codec = JwtTokenCodec::new("same-secret", "same-secret", TokenSettings::default());
        let user_id = Uuid::new_v4();

        let access = codec.issue(&user_id, TokenKind::Access).unwrap();
        assert_eq!(
            codec.validate(&access, TokenKind::Refresh),
            Err(TokenError::KindMismatch)
        );
    }

    #[test]
    fn test_wrong_signing_key() {
        let user_id = Uuid::new_v4();
        let foreign = JwtTokenCodec::new("other-access", "other-refresh", TokenSettings::default());
        let token = foreign.issue(&user_id, TokenKind::Access).unwrap();

        assert_eq!(
            codec().validate(&token, TokenKind::Access),
            Err(TokenError::SignatureInvalid)
        );
    }

    #[test]
    fn test_forged_kind_rejected() {
        // Refresh-kind claims signed with the access key must not pass as a refresh token.
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            kind: TokenKind::Refresh,
            iss: DEFAULT_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(7)).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"access-secret"),
        )
        .unwrap();

        assert_eq!(
            codec().validate(&forged, TokenKind::Refresh),
            Err(TokenError::SignatureInvalid)
        );
    }

    #[test]
    fn test_expired_token() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let issued = Utc::now() - Duration::minutes(31);

        let token = codec.issue_at(&user_id, TokenKind::Access, issued).unwrap();

        assert_eq!(
            codec.validate(&token, TokenKind::Access),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_refresh_token_outlives_access_ttl() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let issued = Utc::now() - Duration::hours(2);

        let token = codec.issue_at(&user_id, TokenKind::Refresh, issued).unwrap();

        assert_eq!(codec.validate(&token, TokenKind::Refresh), Ok(user_id));
    }

    #[test]
    fn test_issuer_mismatch() {
        let user_id = Uuid::new_v4();
        let other_issuer = JwtTokenCodec::new(
            "access-secret",
            "refresh-secret",
            TokenSettings {
                issuer: "someone-else".to_string(),
                ..TokenSettings::default()
            },
        );
        let token = other_issuer.issue(&user_id, TokenKind::Access).unwrap();

        assert_eq!(
            codec().validate(&token, TokenKind::Access),
            Err(TokenError::IssuerMismatch)
        );
    }

    #[test]
    fn test_malformed_token() {
        let codec = codec();

        assert_eq!(
            codec.validate("not.a.token", TokenKind::Access),
            Err(TokenError::Malformed)
        );
        assert_eq!(codec.validate("", TokenKind::Refresh), Err(TokenError::Malformed));
    }

    #[test]
    fn test_out_of_range_ttl_is_an_error() {
        let codec = JwtTokenCodec::new(
            "access-secret",
            "refresh-secret",
            TokenSettings {
                refresh_ttl: Duration::days(100_000_000),
                ..TokenSettings::default()
            },
        );

        assert!(matches!(
            codec.issue(&Uuid::new_v4(), TokenKind::Refresh),
            Err(TokenError::Encoding(_))
        ));
        assert!(codec.issue(&Uuid::new_v4(), TokenKind::Access).is_ok());
    }
}
