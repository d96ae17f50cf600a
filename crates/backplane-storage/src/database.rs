// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use backplane_config::model::StorageConfig;
use backplane_core::BackplaneError;
use tracing::{debug, info};

use crate::migrations;

/// Maps a tokio-rusqlite call failure into a `BackplaneError`.
///
/// A closed connection and SQLite's busy, locked, and I/O result codes are
/// connection faults (`StorageUnavailable`). Everything raised by the SQL
/// itself, such as constraint violations or conversion failures, is `Internal`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> BackplaneError {
    match e {
        tokio_rusqlite::Error::Error(inner) => map_sqlite_err(inner),
        other => BackplaneError::storage(other),
    }
}

pub(crate) fn map_sqlite_err(e: rusqlite::Error) -> BackplaneError {
    match e.sqlite_error_code() {
        Some(code) if is_connection_fault(code) => BackplaneError::storage(e),
        _ => BackplaneError::Internal(format!("sqlite: {e}")),
    }
}

fn is_connection_fault(code: rusqlite::ErrorCode) -> bool {
    use rusqlite::ErrorCode::*;
    matches!(
        code,
        DatabaseBusy
            | DatabaseLocked
            | SystemIoFailure
            | CannotOpen
            | FileLockingProtocolFailed
            | OperationInterrupted
            | DiskFull
    )
}

/// Handle to the single writer connection.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open the database at `path` with default settings.
    pub async fn open(path: &str) -> Result<Self, BackplaneError> {
        let config = StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        };
        Self::open_with(&config).await
    }

    /// Open the configured database, apply PRAGMAs, and run migrations.
    pub async fn open_with(config: &StorageConfig) -> Result<Self, BackplaneError> {
        if let Some(parent) = Path::new(&config.database_path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(BackplaneError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(&config.database_path)
            .await
            .map_err(|e| BackplaneError::StorageUnavailable {
                source: Box::new(e),
            })?;

        let journal = if config.wal_mode { "WAL" } else { "DELETE" };
        let pragmas = format!(
            "PRAGMA journal_mode = {journal};
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {};",
            config.busy_timeout_ms
        );
        conn.call(move |conn| conn.execute_batch(&pragmas))
            .await
            .map_err(map_tr_err)?;

        conn.call(|conn| Ok::<_, rusqlite::Error>(migrations::run_migrations(conn)))
            .await
            .map_err(map_tr_err)??;

        info!(path = %config.database_path, wal = config.wal_mode, "database opened");
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL so the main database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), BackplaneError> {
        self.conn
            .call(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);"))
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), BackplaneError> {
        self.checkpoint().await?;
        self.conn
            .close()
            .await
            .map_err(|e| BackplaneError::storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sqlite_failure(code: std::ffi::c_int) -> tokio_rusqlite::Error<rusqlite::Error> {
        tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn connection_faults_map_to_storage_unavailable() {
        for e in [
            tokio_rusqlite::Error::ConnectionClosed,
            sqlite_failure(rusqlite::ffi::SQLITE_BUSY),
            sqlite_failure(rusqlite::ffi::SQLITE_LOCKED),
            sqlite_failure(rusqlite::ffi::SQLITE_IOERR),
        ] {
            let mapped = map_tr_err(e);
            assert!(
                matches!(mapped, BackplaneError::StorageUnavailable { .. }),
                "got {mapped:?}"
            );
        }
    }

    #[test]
    fn statement_errors_map_to_internal() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t VALUES (1);")
            .unwrap();
        let duplicate = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();

        for e in [
            duplicate,
            rusqlite::Error::ToSqlConversionFailure("bad id".into()),
            rusqlite::Error::QueryReturnedNoRows,
        ] {
            let mapped = map_tr_err(tokio_rusqlite::Error::Error(e));
            assert!(matches!(mapped, BackplaneError::Internal(_)), "got {mapped:?}");
            assert!(!mapped.is_transient());
        }
    }

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("schema.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap();

        for expected in [
            "bus_index",
            "channel_log",
            "global_index",
            "inbound_queue",
            "index_version",
            "messages",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_does_not_rerun_migrations() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reopen.db");
        let path = db_path.to_str().unwrap();

        Database::open(path).await.unwrap().close().await.unwrap();
        let db = Database::open(path).await.unwrap();
        let version: i64 = db
            .connection()
            .call(|conn| {
                conn.query_row(
                    "SELECT version FROM index_version WHERE name = 'global'",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(version, 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn wal_mode_is_applied() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("wal.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let mode: String = db
            .connection()
            .call(|conn| conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested/deeper/bp.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists());
        db.close().await.unwrap();
    }
}
