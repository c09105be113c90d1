//! Apply-and-backup pipeline
//!
//! Reads catalog rows for a namespace and projects them onto the live
//! tables as comments. Overwrite and backup behavior follow a small
//! decision table; the existing-comment lookup fails open to "no comment"
//! so a broken lookup never blocks an apply run.

use crate::db::queries::{SqlBuilder, GET_TABLE_COMMENT};
use crate::db::SessionManager;
use crate::error::AppError;
use crate::models::{is_bookkeeping_table, ApplyErrorKind, ApplySummary, Namespace};
use crate::store::CatalogStore;
use deadpool_postgres::Pool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Overwrite and backup policy for one apply run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyPolicy {
    /// Replace existing comments
    pub overwrite: bool,
    /// Back up replaced comments
    pub backup: bool,
}

impl ApplyPolicy {
    /// Whether the run needs the table's current comment before deciding
    pub fn needs_existing_state(&self) -> bool {
        !self.overwrite || self.backup
    }
}

/// Parameters for one apply run
#[derive(Debug, Clone)]
pub struct ApplyParams {
    pub target: Namespace,
    pub policy: ApplyPolicy,
    /// Run stops once this many per-table failures accumulate
    pub max_failures: usize,
}

/// What to do with one catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyAction {
    /// Leave the live comment alone
    Skip,
    /// Write the new comment; `backup` holds the prior comment to preserve
    Apply { backup: Option<String> },
}

/// Decide what to do with one table given the run policy and its current
/// live comment
pub fn decide(policy: ApplyPolicy, existing: Option<&str>) -> ApplyAction {
    let present = existing.map(|c| !c.trim().is_empty()).unwrap_or(false);

    if !policy.overwrite {
        if present {
            ApplyAction::Skip
        } else {
            ApplyAction::Apply { backup: None }
        }
    } else if policy.backup && present {
        ApplyAction::Apply {
            backup: existing.map(String::from),
        }
    } else {
        ApplyAction::Apply { backup: None }
    }
}

/// Apply catalog descriptions onto the live tables of the target namespace.
///
/// Returns a human-readable status string; fine-grained failures are only
/// visible in the apply error log.
pub async fn apply_table_descriptions(
    session: &SessionManager,
    store: &CatalogStore,
    params: &ApplyParams,
) -> Result<String, AppError> {
    let run_id = Uuid::new_v4();
    info!(%run_id, target = %params.target, "Starting description apply");

    store.ensure_tables().await?;

    // Nothing to iterate without the catalog: a read failure here is fatal
    // for the whole run and is reported in the status string.
    let entries = match store.entries_for_namespace(&params.target).await {
        Ok(entries) => entries,
        Err(e) => {
            error!(%run_id, error = %e, "Failed to read catalog source");
            return Ok(format!(
                "Apply aborted: failed to read catalog source {}: {}",
                store.catalog_location(),
                e
            ));
        }
    };

    if entries.is_empty() {
        info!(%run_id, "No catalog descriptions to apply");
        return Ok(format!(
            "Nothing to apply: no catalog descriptions found for {}.",
            params.target
        ));
    }

    let pool = session.pool_for(&params.target.database).await?;
    let mut summary = ApplySummary::default();

    for entry in &entries {
        if is_bookkeeping_table(&entry.table_name, store.catalog_table()) {
            continue;
        }

        let existing = if params.policy.needs_existing_state() {
            current_comment(&pool, &params.target.schema, &entry.table_name).await
        } else {
            None
        };

        match decide(params.policy, existing.as_deref()) {
            ApplyAction::Skip => {
                summary.skipped += 1;
                debug!(%run_id, table = %entry.table_name, "Existing comment kept");
            }
            ApplyAction::Apply { backup } => {
                if let Some(original) = backup {
                    match store
                        .insert_backup(&params.target, &entry.table_name, &original)
                        .await
                    {
                        Ok(()) => {
                            summary.backups += 1;
                            debug!(%run_id, table = %entry.table_name, "Prior comment backed up");
                        }
                        Err(e) => {
                            // Best-effort: the apply below still runs
                            warn!(%run_id, table = %entry.table_name, error = %e, "Comment backup failed");
                            if let Err(log_err) = store
                                .record_apply_error(
                                    &params.target,
                                    &entry.table_name,
                                    ApplyErrorKind::Backup,
                                    &e.to_string(),
                                )
                                .await
                            {
                                error!(%run_id, table = %entry.table_name, error = %log_err,
                                    "Could not record backup failure");
                            }
                        }
                    }
                }

                match set_comment(&pool, &params.target.schema, &entry.table_name, &entry.description)
                    .await
                {
                    Ok(()) => {
                        summary.success += 1;
                        debug!(%run_id, table = %entry.table_name, "Comment applied");
                    }
                    Err(e) => {
                        summary.errors += 1;
                        warn!(%run_id, table = %entry.table_name, error = %e, "Comment apply failed");

                        if let Err(log_err) = store
                            .record_apply_error(
                                &params.target,
                                &entry.table_name,
                                ApplyErrorKind::AlterTable,
                                &e.to_string(),
                            )
                            .await
                        {
                            error!(%run_id, table = %entry.table_name, error = %log_err,
                                "Could not record apply failure");
                        }

                        if summary.errors > params.max_failures {
                            error!(%run_id, errors = summary.errors, "Failure ceiling exceeded, stopping run");
                            return Ok(summary.render_stopped(&store.apply_errors_location()));
                        }
                    }
                }
            }
        }
    }

    info!(
        %run_id,
        success = summary.success,
        skipped = summary.skipped,
        backups = summary.backups,
        errors = summary.errors,
        "Apply finished"
    );
    Ok(summary.render(&store.apply_errors_location()))
}

/// Fallible lookup of a table's current comment.
///
/// Read errors and missing tables fail open to `None`: the applier would
/// rather treat the comment as absent than abort the run.
async fn current_comment(pool: &Pool, schema: &str, table: &str) -> Option<String> {
    let client = match pool.get().await {
        Ok(client) => client,
        Err(e) => {
            warn!(table, error = %e, "Comment lookup failed, treating as absent");
            return None;
        }
    };

    match client.query_opt(GET_TABLE_COMMENT, &[&schema, &table]).await {
        Ok(Some(row)) => row.get::<_, Option<String>>("comment"),
        Ok(None) => None,
        Err(e) => {
            warn!(table, error = %e, "Comment lookup failed, treating as absent");
            None
        }
    }
}

/// Set the live comment on one table
async fn set_comment(
    pool: &Pool,
    schema: &str,
    table: &str,
    description: &str,
) -> Result<(), AppError> {
    let client = pool.get().await?;
    let statement = SqlBuilder::comment_on_table(schema, table, description);
    client.execute(&statement, &[]).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEEP: ApplyPolicy = ApplyPolicy {
        overwrite: false,
        backup: false,
    };
    const OVERWRITE: ApplyPolicy = ApplyPolicy {
        overwrite: true,
        backup: false,
    };
    const OVERWRITE_BACKUP: ApplyPolicy = ApplyPolicy {
        overwrite: true,
        backup: true,
    };

    #[test]
    fn test_no_overwrite_skips_commented_tables() {
        assert_eq!(decide(KEEP, Some("legacy")), ApplyAction::Skip);
    }

    #[test]
    fn test_no_overwrite_fills_empty_comments() {
        assert_eq!(decide(KEEP, None), ApplyAction::Apply { backup: None });
        assert_eq!(decide(KEEP, Some("")), ApplyAction::Apply { backup: None });
        assert_eq!(decide(KEEP, Some("   ")), ApplyAction::Apply { backup: None });
    }

    #[test]
    fn test_overwrite_with_backup_preserves_prior_comment() {
        assert_eq!(
            decide(OVERWRITE_BACKUP, Some("legacy")),
            ApplyAction::Apply {
                backup: Some("legacy".to_string())
            }
        );
    }

    #[test]
    fn test_overwrite_with_backup_skips_backup_when_blank() {
        assert_eq!(
            decide(OVERWRITE_BACKUP, None),
            ApplyAction::Apply { backup: None }
        );
        assert_eq!(
            decide(OVERWRITE_BACKUP, Some(" ")),
            ApplyAction::Apply { backup: None }
        );
    }

    #[test]
    fn test_overwrite_without_backup_never_backs_up() {
        assert_eq!(
            decide(OVERWRITE, Some("legacy")),
            ApplyAction::Apply { backup: None }
        );
        assert_eq!(decide(OVERWRITE, None), ApplyAction::Apply { backup: None });
    }

    #[test]
    fn test_existing_state_needed_unless_blind_overwrite() {
        assert!(KEEP.needs_existing_state());
        assert!(OVERWRITE_BACKUP.needs_existing_state());
        assert!(!OVERWRITE.needs_existing_state());
    }

    // Namespace with tables A (no comment), B ("legacy"), C: the catalog
    // holds descriptions for all three.
    fn scenario() -> Vec<(&'static str, Option<&'static str>)> {
        vec![("a", None), ("b", Some("legacy")), ("c", None)]
    }

    #[test]
    fn test_scenario_keep_existing_comments() {
        let mut summary = ApplySummary::default();
        for (_, existing) in scenario() {
            match decide(KEEP, existing) {
                ApplyAction::Skip => summary.skipped += 1,
                ApplyAction::Apply { backup } => {
                    assert!(backup.is_none());
                    summary.success += 1;
                }
            }
        }
        assert_eq!(summary.success, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.backups, 0);
    }

    #[test]
    fn test_scenario_overwrite_with_backup() {
        let mut summary = ApplySummary::default();
        let mut backups = Vec::new();
        for (table, existing) in scenario() {
            match decide(OVERWRITE_BACKUP, existing) {
                ApplyAction::Skip => summary.skipped += 1,
                ApplyAction::Apply { backup } => {
                    if let Some(original) = backup {
                        backups.push((table, original));
                        summary.backups += 1;
                    }
                    summary.success += 1;
                }
            }
        }
        assert_eq!(summary.success, 3);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.backups, 1);
        assert_eq!(backups, vec![("b", "legacy".to_string())]);
    }
}
