//! Tabledesc - Table Description Sync for PostgreSQL
//!
//! Two batch pipelines sharing one catalog:
//! - `generate` fills the catalog table with descriptions produced by an
//!   external description service, one row per table.
//! - `apply` projects catalog rows onto the live tables as comments, with
//!   optional backups of whatever was there before.
//!
//! The pipelines only communicate through the catalog table, so they can
//! run independently and repeatedly; both are idempotent.

mod applier;
mod config;
mod db;
mod describe;
mod error;
mod generator;
mod models;
mod store;

use crate::applier::{ApplyParams, ApplyPolicy};
use crate::config::Settings;
use crate::db::SessionManager;
use crate::describe::HttpDescriptionService;
use crate::generator::GenerateParams;
use crate::models::{Namespace, DEFAULT_CATALOG_TABLE};
use crate::store::CatalogStore;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "tabledesc",
    version,
    about = "Generated table descriptions for PostgreSQL"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate descriptions into the catalog table
    Generate {
        /// Target database name
        #[arg(long)]
        database: String,

        /// Target schema name
        #[arg(long)]
        schema: String,

        /// Allow the description service to sample row data
        #[arg(long)]
        sample_data: bool,

        /// Catalog table receiving the descriptions
        #[arg(long, default_value = DEFAULT_CATALOG_TABLE)]
        catalog_table: String,

        /// Logging namespace override (DATABASE.SCHEMA)
        #[arg(long)]
        log_namespace: Option<String>,
    },

    /// Apply catalog descriptions onto live tables as comments
    Apply {
        /// Target database name
        #[arg(long)]
        database: String,

        /// Target schema name
        #[arg(long)]
        schema: String,

        /// Replace existing comments
        #[arg(long)]
        overwrite: bool,

        /// Back up replaced comments before overwriting
        #[arg(long)]
        backup: bool,

        /// Catalog table the descriptions are read from
        #[arg(long, default_value = DEFAULT_CATALOG_TABLE)]
        catalog_table: String,

        /// Logging namespace override (DATABASE.SCHEMA)
        #[arg(long)]
        log_namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let settings = Settings::load()?;
    info!("Configuration loaded");

    let session = SessionManager::new(&settings.database).await?;

    let status = match cli.command {
        Command::Generate {
            database,
            schema,
            sample_data,
            catalog_table,
            log_namespace,
        } => {
            let target = Namespace::new(database, schema);
            let store = build_store(
                &session,
                &settings,
                &target,
                catalog_table,
                log_namespace.as_deref(),
            )
            .await?;
            let describer = HttpDescriptionService::new(&settings.describer)?;

            let params = GenerateParams {
                target,
                sample_data,
                describe_columns: settings.describer.describe_columns,
                max_failures: settings.limits.max_generation_failures,
            };

            generator::generate_table_descriptions(&session, &describer, &store, &params).await?
        }
        Command::Apply {
            database,
            schema,
            overwrite,
            backup,
            catalog_table,
            log_namespace,
        } => {
            let target = Namespace::new(database, schema);
            let store = build_store(
                &session,
                &settings,
                &target,
                catalog_table,
                log_namespace.as_deref(),
            )
            .await?;

            let params = ApplyParams {
                target,
                policy: ApplyPolicy { overwrite, backup },
                max_failures: settings.limits.max_apply_failures,
            };

            applier::apply_table_descriptions(&session, &store, &params).await?
        }
    };

    println!("{status}");
    Ok(())
}

/// Resolve the logging namespace and open a store against it
async fn build_store(
    session: &SessionManager,
    settings: &Settings,
    target: &Namespace,
    catalog_table: String,
    log_namespace: Option<&str>,
) -> anyhow::Result<CatalogStore> {
    let namespace = Namespace::resolve_logging(
        log_namespace,
        settings.logging.namespace.as_deref(),
        target,
    )?;
    let pool = session.pool_for(&namespace.database).await?;

    Ok(CatalogStore::new(
        pool,
        namespace,
        catalog_table,
        settings.limits.error_message_limit,
    ))
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tabledesc=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .compact(),
        )
        .init();
}
