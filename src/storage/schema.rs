//! Database schema constants.
//!
//! This module contains all SQL schema definitions for the PostgreSQL
//! storage backend. Every statement is idempotent via IF NOT EXISTS so
//! the schema can be applied on each startup.

/// SQL schema for creating the articles table.
pub const CREATE_ARTICLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    id UUID PRIMARY KEY,
    source_url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    translated_title TEXT NOT NULL DEFAULT '',
    translated_content TEXT NOT NULL DEFAULT '',
    embedding REAL[] NOT NULL DEFAULT '{}',
    level VARCHAR(2) NOT NULL DEFAULT 'B1',
    published_at TIMESTAMPTZ,
    fetched_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Index for recency queries and retention cleanup.
pub const CREATE_ARTICLES_FETCHED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_articles_fetched_at ON articles(fetched_at)";

/// Index for level-scoped queries.
pub const CREATE_ARTICLES_LEVEL_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_articles_level ON articles(level)";

/// Returns all schema creation statements in the correct order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_ARTICLES_TABLE,
        CREATE_ARTICLES_FETCHED_AT_INDEX,
        CREATE_ARTICLES_LEVEL_INDEX,
    ]
}

/// Table names in the schema.
pub mod tables {
    /// Articles table name.
    pub const ARTICLES: &str = "articles";
    /// Migration bookkeeping table name.
    pub const MIGRATIONS: &str = "_migrations";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_schema_statements_order() {
        let statements = all_schema_statements();
        assert_eq!(statements.len(), 3);
        // The table must come first (indexes reference it)
        assert!(statements[0].contains("CREATE TABLE"));
        assert!(statements[1].contains("CREATE INDEX"));
        assert!(statements[2].contains("CREATE INDEX"));
    }

    #[test]
    fn test_statements_are_idempotent() {
        for statement in all_schema_statements() {
            assert!(statement.contains("IF NOT EXISTS"));
        }
    }

    #[test]
    fn test_upsert_key_is_unique() {
        assert!(CREATE_ARTICLES_TABLE.contains("source_url TEXT NOT NULL UNIQUE"));
    }
}
