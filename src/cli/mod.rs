//! CLI module for tenant API key administration
//!
//! Provides subcommands for each key lifecycle operation:
//! - `create`: issue a new key for a reference id
//! - `rotate`: replace the secret of an existing key
//! - `get-or-create`: fetch a system key, issuing it on first use

use std::sync::Arc;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use crate::domain::Role;
use crate::infrastructure::api_key::{ApiKeyManager, NewApiKey};
use crate::infrastructure::logging;
use crate::infrastructure::secrets::SecretStoreFactory;
use crate::infrastructure::storage::RecordStoreFactory;

/// Tenant API key administration
#[derive(Parser)]
#[command(name = "tenant-api-keys")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Issue a new key and print its plaintext
    Create(CreateArgs),

    /// Rotate an existing key and print the old and new secrets as JSON
    Rotate(RotateArgs),

    /// Print the key for a reference id, issuing a system key if none exists
    GetOrCreate(GetOrCreateArgs),
}

/// Key coordinates shared by every command
#[derive(Args, Clone, Debug)]
pub struct KeyArgs {
    /// Owning tenant
    #[arg(long)]
    pub tenant: String,

    /// Purpose of the key within the tenant
    #[arg(long)]
    pub reference: String,

    /// Actor recorded on the key
    #[arg(long, default_value = "system")]
    pub created_by: String,

    /// Free text stored with the key
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Role granted to the key
    #[arg(long, default_value = "admin")]
    pub role: String,

    /// Mark the key as system-created
    #[arg(long)]
    pub system: bool,
}

#[derive(Args, Clone, Debug)]
pub struct RotateArgs {
    #[command(flatten)]
    pub key: KeyArgs,
}

#[derive(Args, Clone, Debug)]
pub struct GetOrCreateArgs {
    #[command(flatten)]
    pub key: KeyArgs,
}

/// Load configuration, wire the stores and run a single command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config =
        AppConfig::load().map_err(|e| anyhow!("Failed to load configuration: {}", e))?;
    logging::init_logging(&config.logging);

    let manager = build_manager(&config).await?;
    let output = execute(cli.command, &manager).await?;

    println!("{}", output);
    Ok(())
}

/// Build a manager from configured backends
pub async fn build_manager(config: &AppConfig) -> anyhow::Result<ApiKeyManager> {
    let secrets = SecretStoreFactory::create(&config.secret_store).await?;
    let repository = RecordStoreFactory::create(&config.record_store).await?;

    info!(
        secret_store = secrets.backend_name(),
        record_store = ?config.record_store.store_type(),
        "Stores initialized"
    );

    Ok(ApiKeyManager::new(secrets, repository)
        .with_role_resolver(Arc::new(config.roles.resolver())))
}

/// Run a command against a manager and return what should be printed
pub async fn execute(command: Command, manager: &ApiKeyManager) -> anyhow::Result<String> {
    match command {
        Command::Create(args) => {
            let mut request = NewApiKey::new(
                args.key.tenant,
                args.key.reference,
                args.key.created_by,
                Role::new(args.role),
            )
            .with_system(args.system);

            if let Some(description) = args.key.description {
                request = request.with_description(description);
            }

            Ok(manager.create_api_key(request).await?)
        }

        Command::Rotate(args) => {
            let key = args.key;
            let rotated = manager
                .update_api_key(
                    &key.tenant,
                    &key.reference,
                    &key.created_by,
                    key.description.as_deref(),
                )
                .await?
                .ok_or_else(|| {
                    anyhow!(
                        "No API key for tenant '{}' and reference '{}'",
                        key.tenant,
                        key.reference
                    )
                })?;

            Ok(serde_json::to_string_pretty(&rotated)?)
        }

        Command::GetOrCreate(args) => {
            let key = args.key;
            Ok(manager
                .get_or_create_api_key(
                    &key.tenant,
                    &key.created_by,
                    &key.reference,
                    key.description.as_deref(),
                )
                .await?)
        }
    }
}
