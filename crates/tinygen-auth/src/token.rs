//! Signed, time-limited bearer tokens.
//!
//! Tokens are HMAC-signed JWTs carrying a subject and expiry claim. Validity is
//! stateless: a token remains valid until natural expiry regardless of
//! subsequent account changes. There is no refresh or revocation mechanism.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::store::{Credential, CredentialStore};

/// Claims embedded in every issued token.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject -- the account's username.
    sub: String,
    /// Expiration time (UTC Unix timestamp), always issued-at + configured TTL.
    exp: i64,
}

/// Configuration for token signing and verification.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Process-wide secret used to sign and verify tokens.
    pub secret: String,
    /// Symmetric signing algorithm (HMAC-SHA-256 class).
    pub algorithm: Algorithm,
    /// Token lifetime in minutes.
    pub expire_minutes: i64,
}

/// Issue a signed token for the given subject.
pub fn issue_token(subject: &str, config: &TokenConfig) -> Result<String, AuthError> {
    let exp = Utc::now().timestamp() + config.expire_minutes * 60;
    let claims = Claims {
        sub: subject.to_string(),
        exp,
    };

    encode(
        &Header::new(config.algorithm),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AuthError::Signing(e.to_string()))
}

/// Verify a token's signature and expiry, returning the subject.
pub fn verify_token(token: &str, config: &TokenConfig) -> Result<String, AuthError> {
    let mut validation = Validation::new(config.algorithm);
    validation.set_required_spec_claims(&["exp", "sub"]);
    // Expiry is exact; jsonwebtoken's default grants 60 seconds of leeway.
    validation.leeway = 0;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AuthError::InvalidToken)?;

    Ok(token_data.claims.sub)
}

/// Resolve a bearer token to the account it was issued for.
///
/// Fails with [`AuthError::InvalidToken`] if the signature is invalid, the
/// token has expired, the subject is not present in the store, or the account
/// is inactive.
pub fn authorize(
    store: &dyn CredentialStore,
    token: &str,
    config: &TokenConfig,
) -> Result<Credential, AuthError> {
    let subject = verify_token(token, config)?;

    let credential = store.find(&subject).ok_or(AuthError::InvalidToken)?;
    if !credential.is_active {
        return Err(AuthError::InvalidToken);
    }

    Ok(credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;

    fn test_config() -> TokenConfig {
        TokenConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            algorithm: Algorithm::HS256,
            expire_minutes: 30,
        }
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let config = test_config();
        let token = issue_token("johndoe", &config).expect("token issuance");

        let subject = verify_token(&token, &config).expect("token verification");
        assert_eq!(subject, "johndoe");
    }

    /// Manually create a token that expired `seconds_ago` seconds ago.
    fn expired_token(config: &TokenConfig, seconds_ago: i64) -> String {
        let claims = Claims {
            sub: "johndoe".to_string(),
            exp: Utc::now().timestamp() - seconds_ago,
        };
        encode(
            &Header::new(config.algorithm),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .expect("encoding")
    }

    #[test]
    fn test_expired_token_fails() {
        let config = test_config();

        let token = expired_token(&config, 300);
        let result = verify_token(&token, &config);
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_expiry_has_no_leeway() {
        let config = test_config();

        // 30 seconds past expiry is within jsonwebtoken's default leeway;
        // verification must still reject it.
        let token = expired_token(&config, 30);
        let result = verify_token(&token, &config);
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_different_secret_fails() {
        let config_a = test_config();
        let config_b = TokenConfig {
            secret: "a-completely-different-secret".to_string(),
            ..test_config()
        };

        let token = issue_token("johndoe", &config_a).expect("token issuance");
        let result = verify_token(&token, &config_b);
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_garbage_token_fails() {
        let config = test_config();
        let result = verify_token("not-a-token", &config);
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_authorize_known_subject() {
        let config = test_config();
        let store = MemoryCredentialStore::new();
        store
            .insert(Credential {
                username: "johndoe".to_string(),
                password_hash: "unused".to_string(),
                is_active: true,
            })
            .expect("insert");

        let token = issue_token("johndoe", &config).expect("token issuance");
        let credential = authorize(&store, &token, &config).expect("authorization");
        assert_eq!(credential.username, "johndoe");
    }

    #[test]
    fn test_authorize_unknown_subject_fails() {
        let config = test_config();
        let store = MemoryCredentialStore::new();

        let token = issue_token("ghost", &config).expect("token issuance");
        let result = authorize(&store, &token, &config);
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_authorize_inactive_account_fails() {
        let config = test_config();
        let store = MemoryCredentialStore::new();
        store
            .insert(Credential {
                username: "johndoe".to_string(),
                password_hash: "unused".to_string(),
                is_active: false,
            })
            .expect("insert");

        let token = issue_token("johndoe", &config).expect("token issuance");
        let result = authorize(&store, &token, &config);
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }
}
