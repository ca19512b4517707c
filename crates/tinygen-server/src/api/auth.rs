//! Login, registration, and the bearer-token guard for protected routes.

use anyhow::{Context as _, Error};
use salvo::http::header;
use salvo::{handler, writing::Json, Depot, FlowCtrl, Request, Response, Writer as _};
use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use tinygen_auth::{authenticate, authorize, issue_token, register, AuthError, Credential};

use crate::api::{credential_store, token_config};
use crate::error::ApiError;

#[derive(Deserialize, Debug)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize, Debug)]
struct RegisterRequest {
    username: String,
    password: String,
}

#[derive(Serialize, Debug)]
struct TokenResponse {
    access_token: String,
    token_type: String,
}

#[derive(Serialize, Debug)]
struct UserInfo {
    username: String,
    is_active: bool,
}

/// POST /token
///
/// Exchange form-encoded credentials for a bearer token, or 401.
#[handler]
pub async fn handle_token(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), ApiError> {
    let store = credential_store(depot)?;
    let config = token_config(depot)?;

    let form: LoginForm = req
        .parse_form()
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let Some(credential) = authenticate(store.as_ref(), &form.username, &form.password) else {
        event!(Level::WARN, username = form.username, "failed login attempt");
        return Err(ApiError::InvalidCredentials);
    };

    let access_token = issue_token(&credential.username, &config)?;
    event!(Level::INFO, username = credential.username, "user logged in");

    res.render(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }));

    Ok(())
}

/// POST /register
///
/// Create a new account; 400 on a duplicate username or a policy-rejected
/// password.
#[handler]
pub async fn handle_register(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), ApiError> {
    let store = credential_store(depot)?;

    let request: RegisterRequest = req
        .parse_json()
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let username_chars = request.username.chars().count();
    if !(3..=50).contains(&username_chars) {
        return Err(ApiError::Validation(
            "username must be between 3 and 50 characters".to_string(),
        ));
    }
    if request.password.chars().count() > 100 {
        return Err(ApiError::Validation(
            "password must be at most 100 characters".to_string(),
        ));
    }

    let credential = register(store.as_ref(), &request.username, &request.password)?;

    res.render(Json(UserInfo {
        username: credential.username,
        is_active: credential.is_active,
    }));

    Ok(())
}

/// GET /users/me
///
/// Echo the identity resolved by the bearer-token guard.
#[handler]
pub async fn handle_users_me(depot: &mut Depot, res: &mut Response) -> Result<(), ApiError> {
    let credential = current_user(depot)?;

    res.render(Json(UserInfo {
        username: credential.username,
        is_active: credential.is_active,
    }));

    Ok(())
}

/// Bearer-token guard for protected routes.
///
/// Resolves the `Authorization: Bearer` header to an account and stashes it in
/// the depot; rejects the request with 401 otherwise.
#[handler]
pub async fn require_auth(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
    ctrl: &mut FlowCtrl,
) {
    match resolve_bearer(req, depot) {
        Ok(credential) => {
            depot.inject(credential);
        }
        Err(err) => {
            event!(Level::DEBUG, error = %err, "rejected bearer token");
            err.write(req, depot, res).await;
            ctrl.skip_rest();
        }
    }
}

fn resolve_bearer(req: &Request, depot: &Depot) -> Result<Credential, ApiError> {
    let store = credential_store(depot)?;
    let config = token_config(depot)?;

    let token = bearer_token(
        req.headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    )?;

    let credential = authorize(store.as_ref(), token, &config)?;
    Ok(credential)
}

/// Extract the token from an `Authorization: Bearer <token>` header value, if
/// one was sent with that exact scheme.
fn bearer_token(auth_header: Option<&str>) -> Result<&str, ApiError> {
    auth_header
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Auth(AuthError::InvalidToken))
}

pub fn current_user(depot: &Depot) -> Result<Credential, Error> {
    depot
        .obtain::<Credential>()
        .ok()
        .cloned()
        .context("failed to get current user")
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::Algorithm;
    use salvo::http::StatusCode;

    use tinygen_auth::{MemoryCredentialStore, TokenConfig};

    use super::*;

    fn test_config() -> TokenConfig {
        TokenConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            algorithm: Algorithm::HS256,
            expire_minutes: 30,
        }
    }

    #[test]
    fn test_missing_authorization_header_rejected() {
        let err = bearer_token(None).expect_err("no header");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_non_bearer_scheme_rejected() {
        let err = bearer_token(Some("Basic dXNlcjpwYXNz")).expect_err("wrong scheme");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        // The scheme is case-sensitive.
        let err = bearer_token(Some("bearer abc.def.ghi")).expect_err("lowercase scheme");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_bearer_scheme_extracts_token() {
        let token = bearer_token(Some("Bearer abc.def.ghi")).expect("token");
        assert_eq!(token, "abc.def.ghi");
    }

    #[test]
    fn test_seeded_admin_token_passes_the_guard() {
        let store = MemoryCredentialStore::seeded().expect("seeded store");
        let config = test_config();

        // Login as the bootstrap account, then replay the token the way a
        // client would send it.
        let credential =
            authenticate(&store, "admin", "admin").expect("seeded credentials accepted");
        let access_token = issue_token(&credential.username, &config).expect("token issuance");
        let header_value = format!("Bearer {access_token}");

        let token = bearer_token(Some(&header_value)).expect("token");
        let resolved = authorize(&store, token, &config).expect("authorization");
        assert_eq!(resolved.username, "admin");
        assert!(resolved.is_active);
    }

    #[test]
    fn test_tampered_bearer_value_rejected() {
        let store = MemoryCredentialStore::seeded().expect("seeded store");
        let config = test_config();

        let token = bearer_token(Some("Bearer not-a-real-token")).expect("token");
        let err = ApiError::from(authorize(&store, token, &config).expect_err("rejected"));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
