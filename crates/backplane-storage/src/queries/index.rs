// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write path: the watched GlobalIndex version, the conditional batch commit,
//! and the expired-entry purge.

use backplane_core::{BackplaneError, StagedBatch, WatchToken};
use rusqlite::{Transaction, TransactionBehavior, params};
use tracing::debug;

use crate::database::{Database, map_tr_err};
use crate::models::{global_entry, to_u64};

enum CommitOutcome {
    Applied,
    Conflict { found: u64 },
}

fn current_version(tx: &Transaction<'_>) -> rusqlite::Result<u64> {
    tx.query_row(
        "SELECT version FROM index_version WHERE name = 'global'",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map(to_u64)
}

fn bump_version(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute(
        "UPDATE index_version SET version = version + 1 WHERE name = 'global'",
        [],
    )?;
    Ok(())
}

/// Current GlobalIndex version.
pub async fn watch(db: &Database) -> Result<WatchToken, BackplaneError> {
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
        .map_err(map_tr_err)?;
    Ok(WatchToken(to_u64(version)))
}

/// Apply `batch` in one IMMEDIATE transaction if the version still matches.
///
/// Expiry is absolute: `now_ms` plus each message's TTL.
pub async fn commit(
    db: &Database,
    token: WatchToken,
    batch: StagedBatch,
    now_ms: i64,
) -> Result<(), BackplaneError> {
    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let found = current_version(&tx)?;
            if found != token.0 {
                tx.rollback()?;
                return Ok(CommitOutcome::Conflict { found });
            }

            for staged in &batch.messages {
                let m = &staged.message;
                let sort_key = m
                    .id
                    .millis()
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                let ttl_ms = i64::try_from(staged.ttl.as_millis()).unwrap_or(i64::MAX);
                let payload = serde_json::to_string(&m.payload)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

                tx.execute(
                    "INSERT INTO messages (id, bus, channel, sticky, payload, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        m.id.as_str(),
                        m.bus,
                        m.channel,
                        m.sticky,
                        payload,
                        now_ms.saturating_add(ttl_ms)
                    ],
                )?;
                tx.execute(
                    "INSERT INTO global_index (sort_key, entry, id) VALUES (?1, ?2, ?3)",
                    params![sort_key, global_entry(m), m.id.as_str()],
                )?;
                tx.execute(
                    "INSERT INTO bus_index (bus, sort_key, id) VALUES (?1, ?2, ?3)",
                    params![m.bus, sort_key, m.id.as_str()],
                )?;
                tx.execute(
                    "INSERT INTO channel_log (channel, id) VALUES (?1, ?2)",
                    params![m.channel, m.id.as_str()],
                )?;
            }

            if !batch.messages.is_empty() {
                bump_version(&tx)?;
            }

            if let Some(through) = batch.dequeue_through {
                let through = i64::try_from(through).unwrap_or(i64::MAX);
                tx.execute(
                    "DELETE FROM inbound_queue WHERE position <= ?1",
                    params![through],
                )?;
            }

            tx.commit()?;
            Ok(CommitOutcome::Applied)
        })
        .await
        .map_err(map_tr_err)?;

    match outcome {
        CommitOutcome::Applied => Ok(()),
        CommitOutcome::Conflict { found } => Err(BackplaneError::TransactionConflict {
            expected: token.0,
            found,
        }),
    }
}

/// Delete expired bodies and their index rows, keeping the GlobalIndex tail.
pub async fn purge_expired(db: &Database, now_ms: i64) -> Result<usize, BackplaneError> {
    let removed = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            tx.execute(
                "CREATE TEMP TABLE IF NOT EXISTS purge_ids (id TEXT PRIMARY KEY)",
                [],
            )?;
            tx.execute("DELETE FROM purge_ids", [])?;
            let removed = tx.execute(
                "INSERT INTO purge_ids (id) SELECT id FROM messages WHERE expires_at <= ?1",
                params![now_ms],
            )?;

            if removed > 0 {
                tx.execute(
                    "DELETE FROM bus_index WHERE id IN (SELECT id FROM purge_ids)",
                    [],
                )?;
                tx.execute(
                    "DELETE FROM channel_log WHERE id IN (SELECT id FROM purge_ids)",
                    [],
                )?;
                tx.execute(
                    "DELETE FROM messages WHERE id IN (SELECT id FROM purge_ids)",
                    [],
                )?;
            }
            // Also catches a previous tail whose body is already gone.
            let orphans = tx.execute(
                "DELETE FROM global_index
                 WHERE sort_key < (SELECT MAX(sort_key) FROM global_index)
                   AND id NOT IN (SELECT id FROM messages)",
                [],
            )?;
            if removed > 0 || orphans > 0 {
                bump_version(&tx)?;
            }
            tx.execute("DELETE FROM purge_ids", [])?;

            tx.commit()?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)?;

    if removed > 0 {
        debug!(removed, "purged expired messages");
    }
    Ok(removed)
}
