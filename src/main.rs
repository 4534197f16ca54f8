use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

use warden::authn::{hash_password, StaticProvider};
use warden::authz::loader::load_policies;
use warden::errors::AppError;
use warden::settings::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "warden",
    version,
    about = "Route and method authorization gateway"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Print an argon2 hash for a `[[users]]` entry
    HashPassword {
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::HashPassword { password } => {
            let hash = hash_password(&password)?;
            println!("{hash}");
            Ok(())
        }
        Command::Serve => {
            let settings = Settings::load(&cli.config)?;
            tracing::info!(?settings, "Loaded configuration");
            serve(settings).await?;
            Ok(())
        }
    }
}

async fn serve(settings: Settings) -> Result<(), AppError> {
    if settings.has_unroutable_base_url() {
        tracing::warn!(
            base = %settings.public_base_url(),
            "Location headers will use the bind address; set server.public_base_url"
        );
    }

    let authz = Arc::new(load_policies(&settings.policy.path)?);

    let provider = StaticProvider::new(&settings.users);
    if provider.is_empty() {
        tracing::warn!("No users configured; every guarded route will answer 401");
    } else {
        tracing::info!(users = provider.len(), "Loaded credential provider");
    }

    warden::web::serve(settings, authz, Arc::new(provider)).await
}
