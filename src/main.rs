use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use warden::api::{self, AppState};
use warden::auth::credentials;
use warden::lifecycle::{AccountEvent, AccountStateMachine};
use warden::storage::memory::InMemoryStore;
use warden::storage::postgres::PostgresStorage;
use warden::storage::Storage;
use warden::types::Agent;
use warden::Config;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Agent account directory service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        #[arg(long, help = "Port to listen on (overrides WARDEN_PORT)")]
        port: Option<u16>,
    },
    /// Create the first active agent directly against storage
    Init {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => serve(port).await?,
        Commands::Init {
            username,
            email,
            password,
        } => init(&username, &email, &password).await?,
    }

    Ok(())
}

async fn open_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    match &config.database_url {
        Some(url) => {
            let storage = PostgresStorage::new(url).await?;
            storage.run_migrations().await?;
            Ok(Arc::new(storage))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, falling back to in-memory storage");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

async fn serve(port: Option<u16>) -> Result<()> {
    let config = Config::from_env();
    let storage = open_storage(&config).await?;

    bootstrap(&config, storage.as_ref()).await?;

    let state = AppState::new(
        storage,
        config.access_token_ttl_secs,
        config.refresh_token_ttl_secs,
    );
    api::serve(state, port.unwrap_or(config.port)).await
}

/// Seed the first admin agent from WARDEN_BOOTSTRAP_* if it does not exist
/// yet. Without at least one active agent nobody can call the directory.
async fn bootstrap(config: &Config, storage: &dyn Storage) -> Result<()> {
    let (Some(username), Some(email), Some(password)) = (
        config.bootstrap_username.as_deref(),
        config.bootstrap_email.as_deref(),
        config.bootstrap_password.as_deref(),
    ) else {
        return Ok(());
    };

    if storage.find_by_username(username).await?.is_some() {
        return Ok(());
    }

    let agent = create_active_agent(username, email, password)?;
    storage.create_agent(&agent).await?;
    tracing::info!(username, id = %agent.id, "bootstrap agent created");
    Ok(())
}

async fn init(username: &str, email: &str, password: &str) -> Result<()> {
    let config = Config::from_env();
    if config.database_url.is_none() {
        bail!("init requires DATABASE_URL: an in-memory agent would not outlive this process");
    }
    let storage = open_storage(&config).await?;

    if storage.find_by_username(username).await?.is_some() {
        bail!("agent {} already exists", username);
    }

    let agent = create_active_agent(username, email, password)?;
    storage.create_agent(&agent).await?;

    println!("Created active agent {} ({})", agent.username, agent.id);
    Ok(())
}

fn create_active_agent(username: &str, email: &str, password: &str) -> Result<Agent> {
    let mut agent = Agent::new(
        username.to_string(),
        email.to_string(),
        credentials::hash_password(password),
    );
    AccountStateMachine::transition(&mut agent, AccountEvent::Approved)?;
    Ok(agent)
}
