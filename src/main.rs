use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use feddsp_licensing::config::Config;
use feddsp_licensing::db::{self, AppState};
use feddsp_licensing::email::EmailService;
use feddsp_licensing::identity::{ClerkClient, IdentityProvider};
use feddsp_licensing::signing::{self, LicenseSigner};

#[derive(Parser)]
#[command(
    name = "feddsp-licensing",
    about = "License fulfillment service for the fedDSP plugin store"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Generate a fresh Ed25519 license signing keypair
    Keygen,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Keygen => keygen(),
    }
}

async fn serve() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    // A malformed key is a deployment mistake: fail startup loudly
    // rather than rejecting every order at runtime.
    let signer = match config.signing_key.as_deref() {
        Some(raw) => Some(Arc::new(
            LicenseSigner::from_config(raw).context("loading license signing key")?,
        )),
        None => {
            tracing::warn!("LIC_ED25519_PRIVATE_KEY not set; license issuance will answer 500");
            None
        }
    };

    let identity = config
        .clerk_secret_key
        .clone()
        .map(|secret| Arc::new(ClerkClient::new(secret)) as Arc<dyn IdentityProvider>);
    if identity.is_none() {
        tracing::warn!("CLERK_SECRET_KEY not set; account lookups will answer 500");
    }

    let db = db::create_pool(&config.database_path).context("opening database")?;
    let email = Arc::new(EmailService::from_config(&config));

    let addr = config.addr();
    let state = AppState {
        db,
        config: Arc::new(config),
        signer,
        email,
        identity,
    };

    let app = feddsp_licensing::handlers::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!(addr = %addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("binding listen address")?;
    axum::serve(listener, app).await.context("server error")
}

fn keygen() -> anyhow::Result<()> {
    let keypair = signing::generate_keypair()?;
    print!("{}", keypair.private_pem);
    println!("Public key (base64, raw 32 bytes): {}", keypair.public_b64);
    Ok(())
}
