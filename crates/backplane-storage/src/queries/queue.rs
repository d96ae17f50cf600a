// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound queue operations.
//!
//! Entries are only ever removed by a successful conditional commit, so a
//! peek followed by a rejected commit leaves the queue exactly as it was.

use backplane_core::BackplaneError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::{QueueEntry, to_u64};

/// Append a raw record to the tail. Returns its queue position.
pub async fn enqueue(db: &Database, payload: Vec<u8>) -> Result<u64, BackplaneError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO inbound_queue (payload) VALUES (?1)",
                params![payload],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map(to_u64)
        .map_err(map_tr_err)
}

/// Number of entries waiting.
pub async fn queue_len(db: &Database) -> Result<usize, BackplaneError> {
    let count: i64 = db
        .connection()
        .call(|conn| conn.query_row("SELECT COUNT(*) FROM inbound_queue", [], |row| row.get(0)))
        .await
        .map_err(map_tr_err)?;
    Ok(usize::try_from(count).unwrap_or_default())
}

/// Read up to `max` entries from the head without removing them.
pub async fn peek(db: &Database, max: usize) -> Result<Vec<QueueEntry>, BackplaneError> {
    let limit = i64::try_from(max).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT position, payload FROM inbound_queue
                 ORDER BY position ASC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(QueueEntry {
                    position: to_u64(row.get(0)?),
                    payload: row.get(1)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("queue.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn positions_increase_and_peek_is_fifo() {
        let (db, _dir) = setup_db().await;

        let a = enqueue(&db, b"first".to_vec()).await.unwrap();
        let b = enqueue(&db, b"second".to_vec()).await.unwrap();
        assert!(b > a);

        let head = peek(&db, 10).await.unwrap();
        assert_eq!(head.len(), 2);
        assert_eq!(head[0].payload, b"first");
        assert_eq!(head[1].position, b);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn peek_respects_limit_and_does_not_remove() {
        let (db, _dir) = setup_db().await;
        for i in 0..5u8 {
            enqueue(&db, vec![i]).await.unwrap();
        }

        assert_eq!(peek(&db, 3).await.unwrap().len(), 3);
        assert_eq!(queue_len(&db).await.unwrap(), 5);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn peek_empty_queue_returns_nothing() {
        let (db, _dir) = setup_db().await;
        assert!(peek(&db, 10).await.unwrap().is_empty());
        assert_eq!(queue_len(&db).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_enqueues_all_land() {
        let (db, _dir) = setup_db().await;
        let db = std::sync::Arc::new(db);

        let mut handles = Vec::new();
        for i in 0..10u8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move { enqueue(&db, vec![i]).await }));
        }
        let mut positions = Vec::new();
        for handle in handles {
            positions.push(handle.await.unwrap().unwrap());
        }
        positions.sort_unstable();
        positions.dedup();
        assert_eq!(positions.len(), 10);
        assert_eq!(queue_len(&db).await.unwrap(), 10);
    }
}
