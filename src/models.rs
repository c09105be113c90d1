//! Core data model shared by the generator and applier pipelines.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain tag on catalog rows. Only tables are cataloged today; the column
/// exists so the catalog can later hold columns or views without a rewrite.
pub const TABLE_DOMAIN: &str = "TABLE";

/// Default name of the catalog table
pub const DEFAULT_CATALOG_TABLE: &str = "table_descriptions";

/// Generation-failure log
pub const GENERATION_ERRORS_TABLE: &str = "description_errors";

/// Apply-failure log
pub const APPLY_ERRORS_TABLE: &str = "comment_apply_errors";

/// Comment backup log
pub const COMMENT_BACKUPS_TABLE: &str = "comment_backups";

/// Schema used for bookkeeping tables when no logging namespace is given
pub const DEFAULT_LOG_SCHEMA: &str = "table_governance";

/// A (database, schema) pair identifying a container of tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub database: String,
    pub schema: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
        }
    }

    /// Parse a `database.schema` reference
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.split_once('.') {
            Some((database, schema)) if !database.is_empty() && !schema.is_empty() => {
                Ok(Self::new(database, schema))
            }
            _ => Err(AppError::Namespace(format!(
                "expected DATABASE.SCHEMA, got '{}'",
                raw
            ))),
        }
    }

    /// Resolve the logging namespace: explicit override first, then the
    /// configured default, then the governance schema in the target database
    pub fn resolve_logging(
        override_arg: Option<&str>,
        configured: Option<&str>,
        target: &Namespace,
    ) -> Result<Self, AppError> {
        if let Some(raw) = override_arg {
            return Self::parse(raw);
        }
        if let Some(raw) = configured {
            return Self::parse(raw);
        }
        Ok(Self::new(&target.database, DEFAULT_LOG_SCHEMA))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.schema)
    }
}

/// One catalog row per described table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub domain: String,
    pub description: String,
    /// Denormalized copy of `table_name`; the upsert always rewrites it
    pub name: String,
    pub database_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub created_at: DateTime<Utc>,
}

/// One row per failed per-table operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(dead_code)]
pub struct ErrorRecord {
    pub database_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub error_message: String,
    pub error_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row per live comment that was overwritten with backup requested
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(dead_code)]
pub struct CommentBackup {
    pub database_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub original_comment: String,
    pub backed_up_at: DateTime<Utc>,
}

/// Which sub-step an apply-side failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyErrorKind {
    Backup,
    AlterTable,
}

impl ApplyErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyErrorKind::Backup => "BACKUP_ERROR",
            ApplyErrorKind::AlterTable => "ALTER_TABLE",
        }
    }
}

/// Case-insensitive test against the bookkeeping skip-set.
///
/// The catalog name is caller-chosen, so the configured name is checked in
/// addition to the fixed defaults. Keeps the pipelines from describing or
/// commenting their own bookkeeping tables.
pub fn is_bookkeeping_table(name: &str, catalog_table: &str) -> bool {
    const FIXED: [&str; 4] = [
        DEFAULT_CATALOG_TABLE,
        GENERATION_ERRORS_TABLE,
        APPLY_ERRORS_TABLE,
        COMMENT_BACKUPS_TABLE,
    ];

    name.eq_ignore_ascii_case(catalog_table)
        || FIXED.iter().any(|t| name.eq_ignore_ascii_case(t))
}

/// Counters folded through one generation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    pub success: usize,
    pub errors: usize,
}

impl GenerationSummary {
    /// Status string for a completed run
    pub fn render(&self, errors_location: &str) -> String {
        format!(
            "Generation complete: {} descriptions written, {} failures. See {} for details.",
            self.success, self.errors, errors_location
        )
    }

    /// Status string when the failure ceiling stopped the run early
    pub fn render_stopped(&self, errors_location: &str) -> String {
        format!(
            "Generation stopped early after {} failures ({} descriptions written). See {} for details.",
            self.errors, self.success, errors_location
        )
    }
}

/// Counters folded through one apply run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub success: usize,
    pub errors: usize,
    pub skipped: usize,
    pub backups: usize,
}

impl ApplySummary {
    /// Status string for a completed run
    pub fn render(&self, errors_location: &str) -> String {
        format!(
            "Apply complete: {} comments set, {} skipped, {} backed up, {} failures. See {} for details.",
            self.success, self.skipped, self.backups, self.errors, errors_location
        )
    }

    /// Status string when the failure ceiling stopped the run early
    pub fn render_stopped(&self, errors_location: &str) -> String {
        format!(
            "Apply stopped early after {} failures ({} comments set, {} skipped, {} backed up). See {} for details.",
            self.errors, self.success, self.skipped, self.backups, errors_location
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_namespace_parse() {
        let ns = Namespace::parse("SALES.public").unwrap();
        assert_eq!(ns.database, "SALES");
        assert_eq!(ns.schema, "public");
    }

    #[test]
    fn test_namespace_parse_rejects_bare_name() {
        assert!(Namespace::parse("SALES").is_err());
        assert!(Namespace::parse(".public").is_err());
        assert!(Namespace::parse("SALES.").is_err());
    }

    #[test]
    fn test_namespace_display() {
        let ns = Namespace::new("SALES", "public");
        assert_eq!(ns.to_string(), "SALES.public");
    }

    #[test]
    fn test_resolve_logging_precedence() {
        let target = Namespace::new("SALES", "public");

        let ns = Namespace::resolve_logging(Some("AUDIT.logs"), Some("CFG.logs"), &target).unwrap();
        assert_eq!(ns, Namespace::new("AUDIT", "logs"));

        let ns = Namespace::resolve_logging(None, Some("CFG.logs"), &target).unwrap();
        assert_eq!(ns, Namespace::new("CFG", "logs"));

        let ns = Namespace::resolve_logging(None, None, &target).unwrap();
        assert_eq!(ns, Namespace::new("SALES", DEFAULT_LOG_SCHEMA));
    }

    #[test]
    fn test_bookkeeping_match_is_case_insensitive() {
        assert!(is_bookkeeping_table("table_descriptions", DEFAULT_CATALOG_TABLE));
        assert!(is_bookkeeping_table("TABLE_DESCRIPTIONS", DEFAULT_CATALOG_TABLE));
        assert!(is_bookkeeping_table("Description_Errors", DEFAULT_CATALOG_TABLE));
        assert!(is_bookkeeping_table("comment_apply_errors", DEFAULT_CATALOG_TABLE));
        assert!(is_bookkeeping_table("COMMENT_BACKUPS", DEFAULT_CATALOG_TABLE));
        assert!(!is_bookkeeping_table("orders", DEFAULT_CATALOG_TABLE));
    }

    #[test]
    fn test_bookkeeping_includes_configured_catalog_name() {
        assert!(is_bookkeeping_table("MY_DESCRIPTIONS", "my_descriptions"));
        assert!(!is_bookkeeping_table("MY_DESCRIPTIONS", DEFAULT_CATALOG_TABLE));
    }

    #[test]
    fn test_generation_summary_render() {
        let summary = GenerationSummary {
            success: 12,
            errors: 3,
        };
        assert_eq!(
            summary.render("AUDIT.logs.description_errors"),
            "Generation complete: 12 descriptions written, 3 failures. \
             See AUDIT.logs.description_errors for details."
        );
    }

    #[test]
    fn test_apply_summary_render() {
        let summary = ApplySummary {
            success: 2,
            errors: 0,
            skipped: 1,
            backups: 0,
        };
        assert_eq!(
            summary.render("AUDIT.logs.comment_apply_errors"),
            "Apply complete: 2 comments set, 1 skipped, 0 backed up, 0 failures. \
             See AUDIT.logs.comment_apply_errors for details."
        );
    }
}
