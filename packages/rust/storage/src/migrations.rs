//! SQL migration definitions for the directory database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: directory_records",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Reporter directory. Fields are a schemaless JSON object so records may
-- carry attributes this tool never writes.
CREATE TABLE IF NOT EXISTS directory_records (
    id          TEXT PRIMARY KEY,
    fields_json TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_directory_created ON directory_records(created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
