//! # Command Line Interface
//!
//! Starts the gateway, checks configuration, and seals connector secrets
//! into records for the bootstrap document.

use crate::config::AppConfig;
use crate::domain::{ConnectorId, SecretType};
use crate::errors::{Error, Result};
use crate::observability::{init_observability, log_config_info};
use crate::secrets::{SecretEncryption, SecretString};
use crate::ssrf::SsrfGuard;
use crate::store::BootstrapDocument;
use crate::{api, startup, APP_NAME, VERSION};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "flowgate")]
#[command(about = "Flowgate multi-tenant API gateway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bootstrap document override
    #[arg(short, long)]
    pub bootstrap: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway (default)
    Serve,

    /// Validate configuration and the bootstrap document, then exit
    Check,

    /// Encrypt a secret read from stdin and print the stored record as YAML
    Seal {
        /// Connector the secret belongs to
        #[arg(long)]
        connector_id: String,

        /// api_key, bearer_token, basic_password, oauth_client_secret or custom
        #[arg(long)]
        secret_type: SecretType,

        /// Record version; the highest unexpired version wins
        #[arg(long, default_value = "1")]
        version: u32,

        /// RFC 3339 expiry
        #[arg(long)]
        expires_at: Option<DateTime<Utc>>,
    },
}

/// Run CLI commands
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.bootstrap.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Check => check(&config).await,
        Commands::Seal { connector_id, secret_type, version, expires_at } => {
            let mut plaintext = String::new();
            std::io::stdin().read_to_string(&mut plaintext)?;
            let plaintext = SecretString::new(plaintext.trim_end_matches(['\r', '\n']));
            let connector_id = ConnectorId::from(connector_id.as_str());
            let yaml = seal(&config, &connector_id, secret_type, version, expires_at, &plaintext)?;
            print!("{}", yaml);
            Ok(())
        }
    }
}

/// Layer CLI overrides on top of file and environment configuration
pub fn load_config(config_file: Option<&Path>, bootstrap: Option<&Path>) -> Result<AppConfig> {
    let mut config = AppConfig::load(config_file)?;
    if let Some(path) = bootstrap {
        config.bootstrap.path = Some(path.to_string_lossy().into_owned());
    }
    Ok(config)
}

async fn serve(config: AppConfig) -> Result<()> {
    init_observability(&config.observability)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting Flowgate API gateway");
    log_config_info(&config);

    let state = startup::build_state(&config).await?;
    api::start_gateway_server(&config.server, state).await
}

async fn check(config: &AppConfig) -> Result<()> {
    if let Some(path) = config.bootstrap.path.as_deref() {
        let document = BootstrapDocument::from_file(Path::new(path)).await?;
        document.validate(&SsrfGuard::new(config.ssrf.clone())).await?;
        println!(
            "bootstrap ok: {} connectors, {} routes, {} secrets",
            document.connectors.len(),
            document.routes.len(),
            document.secrets.len()
        );
    }
    startup::load_encryption(config)?;
    println!("configuration ok");
    Ok(())
}

/// Seal `plaintext` into a YAML record ready for the `secrets` list
pub fn seal(
    config: &AppConfig,
    connector_id: &ConnectorId,
    secret_type: SecretType,
    version: u32,
    expires_at: Option<DateTime<Utc>>,
    plaintext: &SecretString,
) -> Result<String> {
    if plaintext.expose_secret().is_empty() {
        return Err(Error::validation("Refusing to seal an empty secret"));
    }
    let encryption =
        SecretEncryption::new(&config.secrets).map_err(|e| Error::config(e.to_string()))?;
    let record = encryption
        .seal_record(connector_id, secret_type, version, plaintext, expires_at)
        .map_err(|e| Error::internal(e.to_string()))?;
    Ok(serde_yaml::to_string(&vec![record])?)
}
