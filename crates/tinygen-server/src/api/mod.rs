mod auth;
mod completions;

use std::sync::Arc;

use anyhow::{Context as _, Error};
use salvo::{Depot, Router};

use tinygen_auth::{CredentialStore, TokenConfig};

pub fn create_router() -> Result<Router, Error> {
    let router = Router::new()
        .push(Router::with_path("token").post(auth::handle_token))
        .push(Router::with_path("register").post(auth::handle_register))
        .push(
            Router::with_path("users")
                .hoop(auth::require_auth)
                .push(Router::with_path("me").get(auth::handle_users_me)),
        )
        .push(Router::with_path("health").get(completions::handle_health))
        .push(
            Router::with_path("v1")
                .hoop(auth::require_auth)
                .push(Router::with_path("completions").post(completions::handle_completions))
                .push(Router::with_path("models").get(completions::handle_models)),
        );

    Ok(router)
}

pub fn credential_store(depot: &Depot) -> Result<Arc<dyn CredentialStore>, Error> {
    depot
        .obtain::<Arc<dyn CredentialStore>>()
        .ok()
        .cloned()
        .context("failed to get credential store")
}

pub fn token_config(depot: &Depot) -> Result<TokenConfig, Error> {
    depot
        .obtain::<TokenConfig>()
        .ok()
        .cloned()
        .context("failed to get token config")
}
