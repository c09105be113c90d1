//! SQL query constants and builders
//!
//! Contains the metadata queries used by the pipelines and the identifier
//! quoting helpers. Identifiers always go through `SqlBuilder`; values are
//! always bound with placeholders. The one exception is `COMMENT ON TABLE`,
//! which cannot take bind parameters, so the comment text goes through
//! `quote_literal` instead.

use once_cell::sync::Lazy;
use regex::Regex;

/// List all base tables in a namespace
pub const LIST_BASE_TABLES: &str = r#"
    SELECT t.table_name
    FROM information_schema.tables t
    WHERE t.table_catalog = $1
      AND t.table_schema = $2
      AND t.table_type = 'BASE TABLE'
    ORDER BY t.table_name
"#;

/// Current comment on a table, if any
pub const GET_TABLE_COMMENT: &str = r#"
    SELECT obj_description(c.oid, 'pg_class') AS comment
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
      AND c.relname = $2
      AND c.relkind IN ('r', 'p')
"#;

/// Names that can be interpolated without quoting
static BARE_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9_]+$").unwrap());

/// SQL builder for safe identifier quoting
pub struct SqlBuilder;

impl SqlBuilder {
    /// Quote an identifier (database/schema/table name) safely
    ///
    /// Names made solely of uppercase alphanumerics and underscores render
    /// bare; anything else is double-quoted with embedded quotes doubled.
    pub fn quote_ident(ident: &str) -> String {
        if BARE_IDENT.is_match(ident) {
            ident.to_string()
        } else {
            format!("\"{}\"", ident.replace('"', "\"\""))
        }
    }

    /// Quote an optional identifier; absent input stays absent
    pub fn quote_ident_opt(ident: Option<&str>) -> Option<String> {
        ident.map(Self::quote_ident)
    }

    /// Quote a string literal for DDL statements that cannot bind parameters
    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Qualified table reference; the database part is optional because
    /// statements running inside a database qualify with schema only
    pub fn qualified_table(database: Option<&str>, schema: &str, table: &str) -> String {
        let tail = format!("{}.{}", Self::quote_ident(schema), Self::quote_ident(table));
        match Self::quote_ident_opt(database) {
            Some(db) => format!("{}.{}", db, tail),
            None => tail,
        }
    }

    /// Build COMMENT ON TABLE statement
    pub fn comment_on_table(schema: &str, table: &str, comment: &str) -> String {
        format!(
            "COMMENT ON TABLE {} IS {}",
            Self::qualified_table(None, schema, table),
            Self::quote_literal(comment)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uppercase_names_stay_bare() {
        assert_eq!(SqlBuilder::quote_ident("CUSTOMER_ORDERS"), "CUSTOMER_ORDERS");
        assert_eq!(SqlBuilder::quote_ident("T2"), "T2");
        assert_eq!(SqlBuilder::quote_ident("_AUDIT"), "_AUDIT");
    }

    #[test]
    fn test_mixed_case_names_are_quoted() {
        assert_eq!(SqlBuilder::quote_ident("orders"), "\"orders\"");
        assert_eq!(SqlBuilder::quote_ident("Order Items"), "\"Order Items\"");
        assert_eq!(SqlBuilder::quote_ident("select"), "\"select\"");
    }

    #[test]
    fn test_embedded_quotes_are_doubled() {
        assert_eq!(SqlBuilder::quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_absent_identifier_passes_through() {
        assert_eq!(SqlBuilder::quote_ident_opt(None), None);
        assert_eq!(
            SqlBuilder::quote_ident_opt(Some("PUBLIC")),
            Some("PUBLIC".to_string())
        );
    }

    #[test]
    fn test_quote_literal_doubles_single_quotes() {
        assert_eq!(
            SqlBuilder::quote_literal("customer's orders"),
            "'customer''s orders'"
        );
    }

    #[test]
    fn test_qualified_table() {
        assert_eq!(
            SqlBuilder::qualified_table(Some("SALES"), "public", "orders"),
            "SALES.\"public\".\"orders\""
        );
        assert_eq!(
            SqlBuilder::qualified_table(None, "public", "orders"),
            "\"public\".\"orders\""
        );
    }

    #[test]
    fn test_comment_on_table_statement() {
        assert_eq!(
            SqlBuilder::comment_on_table("public", "orders", "Customer orders"),
            "COMMENT ON TABLE \"public\".\"orders\" IS 'Customer orders'"
        );
    }
}
