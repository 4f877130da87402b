//! Read-only checks against the checkpoint store behind a connection URI.
//!
//! A deployed agent persists conversation state in two tables, `checkpoints`
//! and `checkpoint_blobs`, keyed by `thread_id`. The end user is recorded in
//! the checkpoint `metadata` JSON under `user_id`. [`CheckpointStore`]
//! connects with a resolved [`ConnectionUri`] and answers the questions an
//! operator asks after setup: is the instance reachable, were the tables
//! created, and which threads belong to a user.
//!
//! Blob payloads are reported by type and size only; their serialized
//! contents are not decoded.
//!
//! # Example
//!
//! ```no_run
//! use lakebase::checkpoints::CheckpointStore;
//!
//! #[tokio::main]
//! async fn main() -> lakebase::Result<()> {
//!     let config = lakebase::ResolverConfig::from_env()?;
//!     let uri = lakebase::resolve_from_config(&config).await?;
//!
//!     let store = CheckpointStore::connect(&uri).await?;
//!     println!("{}", store.server_version().await?);
//!     store.ensure_user_id_index().await?;
//!     for thread in store.threads_for_user("user_123").await? {
//!         println!("{}", thread);
//!     }
//!     Ok(())
//! }
//! ```

use crate::uri::ConnectionUri;
use crate::{LakebaseError, Result};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Table holding one row per checkpoint.
pub const CHECKPOINTS_TABLE: &str = "checkpoints";

/// Table holding serialized channel values.
pub const CHECKPOINT_BLOBS_TABLE: &str = "checkpoint_blobs";

/// Name of the expression index over `metadata->>'user_id'`.
pub const USER_ID_INDEX: &str = "idx_checkpoints_metadata_userid";

/// Creates the user-id index so per-user thread lookups avoid a full scan.
pub const USER_ID_INDEX_DDL: &str = "CREATE INDEX IF NOT EXISTS idx_checkpoints_metadata_userid \
     ON checkpoints ((metadata->>'user_id'))";

/// Schema the checkpoint tables are created in.
pub const DEFAULT_SCHEMA: &str = "public";

const VERSION_SQL: &str = "SELECT version()";

// information_schema columns are domain types; cast so they decode as text.
const LIST_TABLES_SQL: &str = "SELECT table_name::text AS table_name \
     FROM information_schema.tables \
     WHERE table_schema = $1 \
     ORDER BY table_name";

const LIST_COLUMNS_SQL: &str = "SELECT column_name::text AS column_name, \
            data_type::text AS data_type, \
            is_nullable::text AS is_nullable, \
            column_default::text AS column_default \
     FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 \
     ORDER BY ordinal_position";

const THREADS_FOR_USER_SQL: &str = "SELECT DISTINCT thread_id \
     FROM checkpoints \
     WHERE metadata->>'user_id' = $1 \
     ORDER BY thread_id";

const CHECKPOINTS_FOR_THREAD_SQL: &str = "SELECT thread_id, checkpoint_ns, checkpoint_id, \
            parent_checkpoint_id, metadata \
     FROM checkpoints \
     WHERE thread_id = $1 \
     ORDER BY checkpoint_id";

const BLOBS_FOR_THREAD_SQL: &str = "SELECT thread_id, checkpoint_ns, channel, version, type, \
            octet_length(blob) AS size \
     FROM checkpoint_blobs \
     WHERE thread_id = $1 \
     ORDER BY channel, version";

/// One column from `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// SQL data type (e.g. `text`, `jsonb`)
    pub data_type: String,
    /// Whether the column accepts NULL
    pub nullable: bool,
    /// Default expression, if any
    pub default: Option<String>,
}

/// A stored checkpoint, without its channel values.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRecord {
    /// Conversation thread
    pub thread_id: String,
    /// Checkpoint namespace (empty for the root graph)
    pub checkpoint_ns: String,
    /// Checkpoint id
    pub checkpoint_id: String,
    /// Previous checkpoint in the thread
    pub parent_checkpoint_id: Option<String>,
    /// Checkpoint metadata, including `user_id` when the agent set it
    pub metadata: Value,
}

impl CheckpointRecord {
    /// The `user_id` recorded in the metadata, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get("user_id").and_then(Value::as_str)
    }
}

/// Size and type of one serialized channel value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobSummary {
    /// Conversation thread
    pub thread_id: String,
    /// Checkpoint namespace
    pub checkpoint_ns: String,
    /// Channel name
    pub channel: String,
    /// Channel version
    pub version: String,
    /// Serializer tag (e.g. `msgpack`, `empty`)
    pub kind: String,
    /// Payload size in bytes; `None` when the blob is NULL
    pub size: Option<i32>,
}

/// Connection pool over one database instance.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    pool: PgPool,
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> LakebaseError {
    move |source| LakebaseError::Database { context, source }
}

impl CheckpointStore {
    /// Opens a small pool using `uri`.
    ///
    /// The credential inside `uri` is short-lived; pooled connections stay
    /// valid once authenticated, but new connections need a fresh URI.
    ///
    /// # Errors
    ///
    /// Returns [`LakebaseError::Database`] if no connection can be made.
    #[instrument(skip(uri), fields(host = uri.host()))]
    pub async fn connect(uri: &ConnectionUri) -> Result<Self> {
        let options = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(30));
        Self::connect_with(options, uri).await
    }

    /// Opens a pool with caller-supplied pool options.
    pub async fn connect_with(options: PgPoolOptions, uri: &ConnectionUri) -> Result<Self> {
        let pool = options
            .connect(uri.expose_secret())
            .await
            .map_err(db_error("connect"))?;
        info!(host = uri.host(), "connected to checkpoint store");
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the server's `version()` string.
    #[instrument(skip(self))]
    pub async fn server_version(&self) -> Result<String> {
        sqlx::query_scalar::<_, String>(VERSION_SQL)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("version check"))
    }

    /// Lists table names in the `public` schema.
    #[instrument(skip(self))]
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(LIST_TABLES_SQL)
            .bind(DEFAULT_SCHEMA)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list tables"))
    }

    /// Returns `true` once both checkpoint tables exist.
    pub async fn has_checkpoint_tables(&self) -> Result<bool> {
        let tables = self.list_tables().await?;
        Ok([CHECKPOINTS_TABLE, CHECKPOINT_BLOBS_TABLE]
            .iter()
            .all(|wanted| tables.iter().any(|t| t.as_str() == *wanted)))
    }

    /// Describes the columns of `table` in the `public` schema, in order.
    #[instrument(skip(self))]
    pub async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(LIST_COLUMNS_SQL)
            .bind(DEFAULT_SCHEMA)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list columns"))?;

        rows.iter()
            .map(column_from_row)
            .collect::<std::result::Result<_, _>>()
            .map_err(db_error("decode columns"))
    }

    /// Lists the threads whose checkpoints carry `user_id` in their metadata.
    #[instrument(skip(self))]
    pub async fn threads_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        let threads = sqlx::query_scalar::<_, String>(THREADS_FOR_USER_SQL)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("threads for user"))?;
        debug!(count = threads.len(), "found threads");
        Ok(threads)
    }

    /// Lists the checkpoints of one thread, oldest id first.
    #[instrument(skip(self))]
    pub async fn checkpoints_for_thread(&self, thread_id: &str) -> Result<Vec<CheckpointRecord>> {
        let rows = sqlx::query(CHECKPOINTS_FOR_THREAD_SQL)
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list checkpoints"))?;

        rows.iter()
            .map(checkpoint_from_row)
            .collect::<std::result::Result<_, _>>()
            .map_err(db_error("decode checkpoints"))
    }

    /// Summarizes the serialized channel values of one thread.
    #[instrument(skip(self))]
    pub async fn blobs_for_thread(&self, thread_id: &str) -> Result<Vec<BlobSummary>> {
        let rows = sqlx::query(BLOBS_FOR_THREAD_SQL)
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list blobs"))?;

        rows.iter()
            .map(blob_from_row)
            .collect::<std::result::Result<_, _>>()
            .map_err(db_error("decode blobs"))
    }

    /// Creates the user-id index if it does not exist yet.
    #[instrument(skip(self))]
    pub async fn ensure_user_id_index(&self) -> Result<()> {
        sqlx::query(USER_ID_INDEX_DDL)
            .execute(&self.pool)
            .await
            .map_err(db_error("create user id index"))?;
        info!(index = USER_ID_INDEX, "user id index present");
        Ok(())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn column_from_row(row: &PgRow) -> std::result::Result<ColumnInfo, sqlx::Error> {
    let is_nullable: String = row.try_get("is_nullable")?;
    Ok(ColumnInfo {
        name: row.try_get("column_name")?,
        data_type: row.try_get("data_type")?,
        nullable: parse_yes_no(&is_nullable),
        default: row.try_get("column_default")?,
    })
}

fn checkpoint_from_row(row: &PgRow) -> std::result::Result<CheckpointRecord, sqlx::Error> {
    Ok(CheckpointRecord {
        thread_id: row.try_get("thread_id")?,
        checkpoint_ns: row.try_get("checkpoint_ns")?,
        checkpoint_id: row.try_get("checkpoint_id")?,
        parent_checkpoint_id: row.try_get("parent_checkpoint_id")?,
        metadata: row.try_get("metadata")?,
    })
}

fn blob_from_row(row: &PgRow) -> std::result::Result<BlobSummary, sqlx::Error> {
    Ok(BlobSummary {
        thread_id: row.try_get("thread_id")?,
        checkpoint_ns: row.try_get("checkpoint_ns")?,
        channel: row.try_get("channel")?,
        version: row.try_get("version")?,
        kind: row.try_get("type")?,
        size: row.try_get("size")?,
    })
}

// information_schema reports booleans as 'YES' / 'NO'.
fn parse_yes_no(value: &str) -> bool {
    value.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_id_index_ddl() {
        assert!(USER_ID_INDEX_DDL.contains(USER_ID_INDEX));
        assert!(USER_ID_INDEX_DDL.contains("IF NOT EXISTS"));
        assert!(USER_ID_INDEX_DDL.contains("ON checkpoints ((metadata->>'user_id'))"));
    }

    #[test]
    fn test_thread_lookup_matches_index_expression() {
        // The planner only uses the index when the predicate repeats its expression.
        assert!(THREADS_FOR_USER_SQL.contains("metadata->>'user_id' = $1"));
    }

    #[test]
    fn test_parse_yes_no() {
        assert!(parse_yes_no("YES"));
        assert!(!parse_yes_no("NO"));
        assert!(!parse_yes_no(""));
    }

    #[test]
    fn test_checkpoint_record_user_id() {
        let record = CheckpointRecord {
            thread_id: "t-1".to_string(),
            checkpoint_ns: String::new(),
            checkpoint_id: "c-1".to_string(),
            parent_checkpoint_id: None,
            metadata: json!({"user_id": "user_123", "step": 1}),
        };
        assert_eq!(record.user_id(), Some("user_123"));

        let anonymous = CheckpointRecord {
            metadata: json!({"step": 1}),
            ..record
        };
        assert_eq!(anonymous.user_id(), None);
    }

    #[tokio::test]
    async fn test_connect_failure_hides_credential() {
        let uri = ConnectionUri::new("sp-1", "pw-never-shown", "lakebase-host.invalid");
        let options = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5));

        let err = CheckpointStore::connect_with(options, &uri).await.unwrap_err();

        assert!(matches!(err, LakebaseError::Database { context: "connect", .. }));
        let rendered = format!("{} / {:?}", err, err);
        assert!(!rendered.contains("pw-never-shown"));
    }
}
