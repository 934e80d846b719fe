//! OAuth 2.0 Authorization Server - Entry Point

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use oauth2_authz_server::{
    config::{Config, TokenFormat},
    server::AuthServer,
};

#[derive(Parser, Debug)]
#[command(name = "oauth2-authz-server")]
#[command(about = "OAuth 2.0 authorization server")]
#[command(version)]
struct Cli {
    /// HTTP server port
    #[arg(long, default_value = "5000", env = "PORT")]
    port: u16,

    /// Issuer identifier and public base URL (e.g., https://auth.example.com)
    #[arg(long, env = "OAUTH2_ISSUER")]
    issuer: Option<String>,

    /// Access token format
    #[arg(long, env = "OAUTH2_TOKEN_FORMAT")]
    token_format: Option<TokenFormat>,

    /// PEM file with the RSA signing key (generated at startup when absent)
    #[arg(long, env = "OAUTH2_JWT_KEY_PATH")]
    key_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let mut config = Config::from_env()?;
    if let Some(issuer) = cli.issuer {
        config.issuer = issuer.trim_end_matches('/').to_string();
    }
    if let Some(format) = cli.token_format {
        config.token_format = format;
    }
    if cli.key_path.is_some() {
        config.signing_key_path = cli.key_path;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        issuer = %config.issuer,
        token_format = ?config.token_format,
        "Starting OAuth 2.0 authorization server"
    );

    let server = AuthServer::new(config)?;
    server.run_http(cli.port).await
}
