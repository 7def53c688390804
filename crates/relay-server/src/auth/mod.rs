//! JWT verification for the WebSocket handshake.
//!
//! The relay's only credential is a compact HS256 JWT with `sub` and `exp`
//! claims, shared-secret signed. Verification runs before the engine ever
//! sees a connection; a rejected handshake creates no state.

use std::time::Duration;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use relay_core::{AuthError, Identity, IdentityVerifier};

/// Claims carried by a relay token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier, becomes the connection's `userId`
    pub sub: String,
    /// Expiry as seconds since the Unix epoch
    pub exp: i64,
}

/// HS256 token verifier and (for development) minter.
pub struct TokenVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    allow_anonymous: bool,
}

impl TokenVerifier {
    pub fn new(secret: &str, allow_anonymous: bool) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            allow_anonymous,
        }
    }

    /// Mint a token for `sub`, expiring after `ttl`.
    ///
    /// Serves the dev token endpoint and the CLI; production deployments
    /// issue tokens from their own identity provider.
    pub fn issue_token(&self, sub: &str, ttl: Duration) -> Result<String, AuthError> {
        let claims = Claims {
            sub: sub.to_string(),
            exp: chrono::Utc::now().timestamp() + ttl.as_secs() as i64,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::InvalidCredential(e.to_string()))
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::default();
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(jwt_error)?;
        Ok(data.claims)
    }
}

impl IdentityVerifier for TokenVerifier {
    fn verify(
        &self,
        credential: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Option<Identity>, AuthError>> + Send {
        async move {
            match credential {
                None if self.allow_anonymous => {
                    debug!("No credential presented, admitting anonymously");
                    Ok(None)
                }
                None => Err(AuthError::MissingCredential),
                // A presented credential must verify even when anonymous
                // connections are allowed.
                Some(token) => {
                    let claims = self.decode_claims(token)?;
                    debug!(sub = %claims.sub, "Credential verified");
                    Ok(Some(Identity::new(claims.sub)))
                }
            }
        }
    }
}

fn jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredCredential,
        _ => AuthError::InvalidCredential(err.to_string()),
    }
}

/// Parse a human-readable lifetime like `90s`, `10m`, `1h` or `7d`.
///
/// A bare number is taken as seconds.
pub fn parse_ttl(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (value, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: u64 = value.parse().ok()?;
    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(allow_anonymous: bool) -> TokenVerifier {
        TokenVerifier::new("test-secret", allow_anonymous)
    }

    #[tokio::test]
    async fn test_valid_token_yields_identity() {
        let v = verifier(true);
        let token = v.issue_token("alice", Duration::from_secs(3600)).unwrap();

        let identity = v.verify(Some(&token)).await.unwrap();
        assert_eq!(identity, Some(Identity::new("alice")));
    }

    #[tokio::test]
    async fn test_missing_credential_policy() {
        assert_eq!(verifier(true).verify(None).await.unwrap(), None);
        assert!(matches!(
            verifier(false).verify(None).await,
            Err(AuthError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn test_invalid_token_rejected_even_when_anonymous_allowed() {
        let v = verifier(true);
        assert!(matches!(
            v.verify(Some("not-a-jwt")).await,
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let other = TokenVerifier::new("different-secret", true);
        let token = other
            .issue_token("alice", Duration::from_secs(3600))
            .unwrap();

        assert!(matches!(
            verifier(true).verify(Some(&token)).await,
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let v = verifier(true);
        // Expired well past the default validation leeway.
        let claims = Claims {
            sub: "alice".to_string(),
            exp: chrono::Utc::now().timestamp() - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(matches!(
            v.verify(Some(&token)).await,
            Err(AuthError::ExpiredCredential)
        ));
    }

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_ttl("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_ttl("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_ttl("7d"), Some(Duration::from_secs(604_800)));
        assert_eq!(parse_ttl("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_ttl(""), None);
        assert_eq!(parse_ttl("1w"), None);
        assert_eq!(parse_ttl("h"), None);
    }
}
