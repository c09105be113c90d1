//! Generate-and-upsert pipeline
//!
//! Enumerates the base tables of a target namespace, asks the description
//! service for a description of each, and merges the results into the
//! catalog store. Per-table failures land in the generation error log and
//! never abort the run; only the failure ceiling does.

use crate::db::queries::{SqlBuilder, LIST_BASE_TABLES};
use crate::db::SessionManager;
use crate::describe::{DescribeOptions, DescriptionService};
use crate::error::AppError;
use crate::models::{is_bookkeeping_table, GenerationSummary, Namespace};
use crate::store::CatalogStore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Parameters for one generation run
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub target: Namespace,
    /// Allow the description service to sample row data
    pub sample_data: bool,
    /// Ask the service to cover columns in the description
    pub describe_columns: bool,
    /// Run stops once this many per-table failures accumulate
    pub max_failures: usize,
}

/// Generate a description for every eligible table in the target namespace
/// and upsert the results into the catalog store.
///
/// Returns a human-readable status string; fine-grained failures are only
/// visible in the generation error log.
pub async fn generate_table_descriptions(
    session: &SessionManager,
    describer: &dyn DescriptionService,
    store: &CatalogStore,
    params: &GenerateParams,
) -> Result<String, AppError> {
    let run_id = Uuid::new_v4();
    info!(%run_id, target = %params.target, "Starting description generation");

    store.ensure_tables().await?;

    let tables = list_target_tables(session, &params.target, store.catalog_table()).await?;
    if tables.is_empty() {
        info!(%run_id, "No eligible tables found");
        return Ok(format!("No eligible tables found in {}.", params.target));
    }

    let options = DescribeOptions {
        describe_columns: params.describe_columns,
        sample_data: params.sample_data,
    };

    let mut summary = GenerationSummary::default();

    for table in &tables {
        match describe_and_upsert(describer, store, &params.target, table, options).await {
            Ok(()) => {
                summary.success += 1;
                debug!(%run_id, table, "Catalog entry upserted");
            }
            Err(e) => {
                summary.errors += 1;
                warn!(%run_id, table, error = %e, "Description generation failed");

                if let Err(log_err) = store
                    .record_generation_error(&params.target, table, &e.to_string())
                    .await
                {
                    error!(%run_id, table, error = %log_err, "Could not record generation failure");
                }

                if summary.errors > params.max_failures {
                    error!(%run_id, errors = summary.errors, "Failure ceiling exceeded, stopping run");
                    return Ok(summary.render_stopped(&store.generation_errors_location()));
                }
            }
        }
    }

    info!(%run_id, success = summary.success, errors = summary.errors, "Generation finished");
    Ok(summary.render(&store.generation_errors_location()))
}

/// Eligible tables: all base tables in the namespace minus the bookkeeping
/// skip-set
async fn list_target_tables(
    session: &SessionManager,
    target: &Namespace,
    catalog_table: &str,
) -> Result<Vec<String>, AppError> {
    let pool = session.pool_for(&target.database).await?;
    let client = pool.get().await?;

    let rows = client
        .query(LIST_BASE_TABLES, &[&target.database, &target.schema])
        .await?;

    Ok(rows
        .iter()
        .map(|row| row.get::<_, String>("table_name"))
        .filter(|name| !is_bookkeeping_table(name, catalog_table))
        .collect())
}

/// One table end to end: describe, then merge into the catalog.
///
/// A failure anywhere leaves any prior catalog entry for the table
/// untouched; the upsert only runs on a successful description.
async fn describe_and_upsert(
    describer: &dyn DescriptionService,
    store: &CatalogStore,
    target: &Namespace,
    table: &str,
    options: DescribeOptions,
) -> Result<(), AppError> {
    let table_ref = SqlBuilder::qualified_table(Some(&target.database), &target.schema, table);
    let description = describer.describe_table(&table_ref, options).await?;
    store.upsert_entry(target, table, &description).await
}
