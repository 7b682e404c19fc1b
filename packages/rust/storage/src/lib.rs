//! Directory store: the persisted table of reporter records.
//!
//! The synchronizer talks to the store only through [`DirectoryStore`]
//! (`list_all` / `create` / `update`), so any flat-record backend fits.
//! [`LibsqlDirectory`] keeps records in a local or remote libSQL database;
//! [`MemoryDirectory`] is an in-process table for dry runs and tests.

mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use uuid::Uuid;

use bylines_shared::{BylinesError, DirectoryRecord, Fields, Result};

pub use memory::MemoryDirectory;

/// The persisted directory collaborator.
///
/// No schema is enforced: `fields` is a flat named-attribute map and records
/// may carry fields the caller never writes.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Every record currently in the directory.
    async fn list_all(&self) -> Result<Vec<DirectoryRecord>>;

    /// Insert a new record, returning its id.
    async fn create(&self, fields: &Fields) -> Result<String>;

    /// Write `fields` onto an existing record. Fields not named are left as is.
    async fn update(&self, id: &str, fields: &Fields) -> Result<()>;
}

// ---------------------------------------------------------------------------
// libSQL
// ---------------------------------------------------------------------------

/// Directory backed by a libSQL database.
pub struct LibsqlDirectory {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl LibsqlDirectory {
    /// Open or create a local database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BylinesError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| BylinesError::Storage(e.to_string()))?;

        Self::connect(db).await
    }

    /// Connect to a remote libSQL server.
    pub async fn open_remote(url: &str, auth_token: &str) -> Result<Self> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|e| BylinesError::Storage(e.to_string()))?;

        Self::connect(db).await
    }

    async fn connect(db: Database) -> Result<Self> {
        let conn = db
            .connect()
            .map_err(|e| BylinesError::Storage(e.to_string()))?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    BylinesError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    async fn load_fields(&self, id: &str) -> Result<Option<Fields>> {
        let mut rows = self
            .conn
            .query(
                "SELECT fields_json FROM directory_records WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| BylinesError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json = row
                    .get::<String>(0)
                    .map_err(|e| BylinesError::Storage(e.to_string()))?;
                decode_fields(id, &json).map(Some)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(BylinesError::Storage(e.to_string())),
        }
    }
}

#[async_trait]
impl DirectoryStore for LibsqlDirectory {
    async fn list_all(&self) -> Result<Vec<DirectoryRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, fields_json FROM directory_records ORDER BY created_at, id",
                params![],
            )
            .await
            .map_err(|e| BylinesError::Storage(e.to_string()))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| BylinesError::Storage(e.to_string()))?
        {
            let id = row
                .get::<String>(0)
                .map_err(|e| BylinesError::Storage(e.to_string()))?;
            let json = row
                .get::<String>(1)
                .map_err(|e| BylinesError::Storage(e.to_string()))?;
            let fields = decode_fields(&id, &json)?;
            records.push(DirectoryRecord { id, fields });
        }
        tracing::debug!(count = records.len(), "directory snapshot loaded");
        Ok(records)
    }

    async fn create(&self, fields: &Fields) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let json = encode_fields(fields)?;

        self.conn
            .execute(
                "INSERT INTO directory_records (id, fields_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), json.as_str(), now.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| BylinesError::Storage(e.to_string()))?;
        Ok(id)
    }

    async fn update(&self, id: &str, fields: &Fields) -> Result<()> {
        let mut merged = self
            .load_fields(id)
            .await?
            .ok_or_else(|| BylinesError::Storage(format!("record {id} not found")))?;
        merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));

        let json = encode_fields(&merged)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE directory_records SET fields_json = ?1, updated_at = ?2 WHERE id = ?3",
                params![json.as_str(), now.as_str(), id],
            )
            .await
            .map_err(|e| BylinesError::Storage(e.to_string()))?;
        Ok(())
    }
}

fn encode_fields(fields: &Fields) -> Result<String> {
    serde_json::to_string(fields).map_err(|e| BylinesError::Storage(e.to_string()))
}

fn decode_fields(id: &str, json: &str) -> Result<Fields> {
    serde_json::from_str(json)
        .map_err(|e| BylinesError::Storage(format!("record {id} has malformed fields: {e}")))
}
