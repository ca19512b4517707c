mod api;
mod config;
mod error;

use std::sync::Arc;

use anyhow::Error;
use salvo::{affix::AffixList, conn::TcpListener, logging::Logger, Listener, Server, Service};
use tracing::{event, Level};

use tinygen_auth::{CredentialStore, MemoryCredentialStore};
use tinygen_engine::CompletionService;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    // Load configuration; a missing signing secret aborts startup
    let config = ServerConfig::from_env()?;

    // Create services
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::seeded()?);
    let completions = Arc::new(CompletionService::new(config.engine.clone()));

    // Load the model; startup fails if the engine can't be constructed
    completions.initialize().await?;

    // Configure routes
    let router = api::create_router()?;

    // Configure the service
    let affix = AffixList::new()
        .inject(store)
        .inject(Arc::clone(&completions))
        .inject(config.token.clone());
    let service = Service::new(router).hoop(Logger::new()).hoop(affix);

    // Start the server
    let address = format!("{}:{}", config.host, config.port);
    event!(Level::INFO, address, "starting text generation server");
    let acceptor = TcpListener::new(address).bind().await;
    let server = Server::new(acceptor);
    server.serve(service).await;

    completions.shutdown().await;

    Ok(())
}
