//! Catalog, error-log and backup-log storage
//!
//! All bookkeeping rows live in the logging namespace and are created on
//! first use. The catalog upsert is a single MERGE keyed on
//! (domain, database, schema, table) so repeated or concurrent runs never
//! produce duplicate rows for the same table; the error and backup tables
//! are append-only. Requires PostgreSQL 15+ for MERGE.

use crate::db::queries::SqlBuilder;
use crate::error::AppError;
use crate::models::{
    ApplyErrorKind, CatalogEntry, Namespace, APPLY_ERRORS_TABLE, COMMENT_BACKUPS_TABLE,
    GENERATION_ERRORS_TABLE, TABLE_DOMAIN,
};
use deadpool_postgres::Pool;
use tracing::debug;

/// Storage handle for the catalog and its error/backup side tables
pub struct CatalogStore {
    /// Pool connected to the logging database
    pool: Pool,
    /// Namespace holding the bookkeeping tables
    namespace: Namespace,
    /// Caller-chosen catalog table name
    catalog_table: String,
    /// Error messages are truncated to this many characters
    error_message_limit: usize,
}

impl CatalogStore {
    pub fn new(
        pool: Pool,
        namespace: Namespace,
        catalog_table: String,
        error_message_limit: usize,
    ) -> Self {
        Self {
            pool,
            namespace,
            catalog_table,
            error_message_limit,
        }
    }

    pub fn catalog_table(&self) -> &str {
        &self.catalog_table
    }

    /// Human-readable location of the catalog table, for status strings
    pub fn catalog_location(&self) -> String {
        format!("{}.{}", self.namespace, self.catalog_table)
    }

    /// Human-readable location of the generation error log
    pub fn generation_errors_location(&self) -> String {
        format!("{}.{}", self.namespace, GENERATION_ERRORS_TABLE)
    }

    /// Human-readable location of the apply error log
    pub fn apply_errors_location(&self) -> String {
        format!("{}.{}", self.namespace, APPLY_ERRORS_TABLE)
    }

    fn catalog_ref(&self) -> String {
        SqlBuilder::qualified_table(None, &self.namespace.schema, &self.catalog_table)
    }

    fn table_ref(&self, table: &str) -> String {
        SqlBuilder::qualified_table(None, &self.namespace.schema, table)
    }

    /// Create the logging schema and bookkeeping tables if absent
    pub async fn ensure_tables(&self) -> Result<(), AppError> {
        let client = self.pool.get().await?;

        client
            .execute(
                &format!(
                    "CREATE SCHEMA IF NOT EXISTS {}",
                    SqlBuilder::quote_ident(&self.namespace.schema)
                ),
                &[],
            )
            .await?;

        // No uniqueness constraint on the catalog key: the MERGE upsert is
        // the single write path and enforces one row per table.
        client
            .execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        domain TEXT NOT NULL,
                        description TEXT,
                        name TEXT,
                        database_name TEXT NOT NULL,
                        schema_name TEXT NOT NULL,
                        table_name TEXT NOT NULL,
                        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
                    )",
                    self.catalog_ref()
                ),
                &[],
            )
            .await?;

        for errors_table in [GENERATION_ERRORS_TABLE, APPLY_ERRORS_TABLE] {
            client
                .execute(
                    &format!(
                        "CREATE TABLE IF NOT EXISTS {} (
                            database_name TEXT NOT NULL,
                            schema_name TEXT NOT NULL,
                            table_name TEXT NOT NULL,
                            error_message TEXT,
                            error_type TEXT,
                            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
                        )",
                        self.table_ref(errors_table)
                    ),
                    &[],
                )
                .await?;
        }

        client
            .execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        database_name TEXT NOT NULL,
                        schema_name TEXT NOT NULL,
                        table_name TEXT NOT NULL,
                        original_comment TEXT,
                        backed_up_at TIMESTAMPTZ NOT NULL DEFAULT now()
                    )",
                    self.table_ref(COMMENT_BACKUPS_TABLE)
                ),
                &[],
            )
            .await?;

        debug!("Bookkeeping tables ready in {}", self.namespace);
        Ok(())
    }

    /// Insert-or-update the catalog row for one table
    ///
    /// Atomic per key: a single MERGE statement, so concurrent runs cannot
    /// leave duplicate rows behind. `name` is always rewritten to match
    /// `table_name`; the match key deliberately omits it.
    pub async fn upsert_entry(
        &self,
        target: &Namespace,
        table: &str,
        description: &str,
    ) -> Result<(), AppError> {
        let client = self.pool.get().await?;

        let statement = format!(
            r#"
            MERGE INTO {} AS t
            USING (SELECT $1::text AS domain,
                          $2::text AS database_name,
                          $3::text AS schema_name,
                          $4::text AS table_name,
                          $5::text AS description) AS s
            ON t.domain = s.domain
               AND t.database_name = s.database_name
               AND t.schema_name = s.schema_name
               AND t.table_name = s.table_name
            WHEN MATCHED THEN UPDATE SET
                description = s.description,
                name = s.table_name,
                created_at = now()
            WHEN NOT MATCHED THEN INSERT
                (domain, description, name, database_name, schema_name, table_name, created_at)
                VALUES (s.domain, s.description, s.table_name,
                        s.database_name, s.schema_name, s.table_name, now())
            "#,
            self.catalog_ref()
        );

        client
            .execute(
                &statement,
                &[
                    &TABLE_DOMAIN,
                    &target.database,
                    &target.schema,
                    &table,
                    &description,
                ],
            )
            .await?;

        Ok(())
    }

    /// Read the applyable catalog rows for a namespace
    ///
    /// Rows with a null or blank description carry nothing worth applying
    /// and are filtered out at the source.
    pub async fn entries_for_namespace(
        &self,
        target: &Namespace,
    ) -> Result<Vec<CatalogEntry>, AppError> {
        let client = self.pool.get().await?;

        let statement = format!(
            r#"
            SELECT domain, description, name,
                   database_name, schema_name, table_name, created_at
            FROM {}
            WHERE domain = $1
              AND database_name = $2
              AND schema_name = $3
              AND description IS NOT NULL
              AND btrim(description) <> ''
            ORDER BY table_name
            "#,
            self.catalog_ref()
        );

        let rows = client
            .query(&statement, &[&TABLE_DOMAIN, &target.database, &target.schema])
            .await?;

        Ok(rows
            .iter()
            .map(|row| CatalogEntry {
                domain: row.get("domain"),
                description: row.get("description"),
                name: row.get("name"),
                database_name: row.get("database_name"),
                schema_name: row.get("schema_name"),
                table_name: row.get("table_name"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Append one row to the generation error log
    pub async fn record_generation_error(
        &self,
        target: &Namespace,
        table: &str,
        message: &str,
    ) -> Result<(), AppError> {
        self.record_error(GENERATION_ERRORS_TABLE, target, table, message, None)
            .await
    }

    /// Append one row to the apply error log
    pub async fn record_apply_error(
        &self,
        target: &Namespace,
        table: &str,
        kind: ApplyErrorKind,
        message: &str,
    ) -> Result<(), AppError> {
        self.record_error(APPLY_ERRORS_TABLE, target, table, message, Some(kind.as_str()))
            .await
    }

    async fn record_error(
        &self,
        errors_table: &str,
        target: &Namespace,
        table: &str,
        message: &str,
        error_type: Option<&str>,
    ) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        let message = truncate_message(message, self.error_message_limit);

        let statement = format!(
            "INSERT INTO {} (database_name, schema_name, table_name, error_message, error_type, created_at)
             VALUES ($1, $2, $3, $4, $5, now())",
            self.table_ref(errors_table)
        );

        client
            .execute(
                &statement,
                &[
                    &target.database,
                    &target.schema,
                    &table,
                    &message,
                    &error_type,
                ],
            )
            .await?;

        Ok(())
    }

    /// Append one row to the comment backup log
    pub async fn insert_backup(
        &self,
        target: &Namespace,
        table: &str,
        original_comment: &str,
    ) -> Result<(), AppError> {
        let client = self.pool.get().await?;

        let statement = format!(
            "INSERT INTO {} (database_name, schema_name, table_name, original_comment, backed_up_at)
             VALUES ($1, $2, $3, $4, now())",
            self.table_ref(COMMENT_BACKUPS_TABLE)
        );

        client
            .execute(
                &statement,
                &[&target.database, &target.schema, &table, &original_comment],
            )
            .await?;

        Ok(())
    }
}

/// Truncate an error message to `limit` characters, respecting char
/// boundaries so multibyte messages cannot split mid-character
pub fn truncate_message(message: &str, limit: usize) -> String {
    match message.char_indices().nth(limit) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_messages_pass_through() {
        assert_eq!(truncate_message("connection refused", 8000), "connection refused");
    }

    #[test]
    fn test_long_messages_are_bounded() {
        let message = "x".repeat(9000);
        let truncated = truncate_message(&message, 8000);
        assert_eq!(truncated.chars().count(), 8000);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let message = "éléphant";
        let truncated = truncate_message(message, 3);
        assert_eq!(truncated, "élé");
    }

    #[test]
    fn test_exact_limit_is_untouched() {
        let message = "abcd";
        assert_eq!(truncate_message(message, 4), "abcd");
    }
}
