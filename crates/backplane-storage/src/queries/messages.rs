// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read path: point lookups, scoped scans, and the GlobalIndex tail.
//!
//! Every read joins against `messages.expires_at`, so an expired body is
//! invisible even while its index rows are still waiting for a purge.

use backplane_core::{BackplaneError, LastAssigned, ScanFilter};
use rusqlite::{OptionalExtension, params, params_from_iter, types::Value};

use crate::database::{Database, map_tr_err};
use crate::models::{MESSAGE_COLUMNS, Message, MessageId, message_from_row};

/// Fetch one live message.
pub async fn get(db: &Database, id: &MessageId, now_ms: i64) -> Result<Option<Message>, BackplaneError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages m
                     WHERE m.id = ?1 AND m.expires_at > ?2"
                ),
                params![id, now_ms],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Live messages newer than `since` on the index selected by `filter`.
pub async fn scan(
    db: &Database,
    filter: &ScanFilter,
    since: Option<&MessageId>,
    limit: usize,
    now_ms: i64,
) -> Result<Vec<Message>, BackplaneError> {
    let since = since.map(|s| s.as_str().to_string()).unwrap_or_default();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let (sql, mut bind): (String, Vec<Value>) = match filter {
        ScanFilter::Buses(buses) => {
            if buses.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; buses.len()].join(", ");
            (
                format!(
                    "SELECT {MESSAGE_COLUMNS} FROM bus_index b
                     JOIN messages m ON m.id = b.id
                     WHERE b.bus IN ({placeholders}) AND b.id > ? AND m.expires_at > ?
                     ORDER BY b.id ASC
                     LIMIT ?"
                ),
                buses.iter().cloned().map(Value::Text).collect(),
            )
        }
        ScanFilter::Channel(channel) => (
            format!(
                "SELECT {MESSAGE_COLUMNS} FROM channel_log c
                 JOIN messages m ON m.id = c.id
                 WHERE c.channel = ? AND c.id > ? AND m.expires_at > ?
                 ORDER BY c.id ASC
                 LIMIT ?"
            ),
            vec![Value::Text(channel.clone())],
        ),
    };
    bind.extend([Value::Text(since), Value::Integer(now_ms), Value::Integer(limit)]);

    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(bind), message_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// The GlobalIndex tail, regardless of whether its body has expired.
pub async fn last_assigned(db: &Database) -> Result<Option<LastAssigned>, BackplaneError> {
    let tail: Option<(String, i64)> = db
        .connection()
        .call(|conn| {
            conn.query_row(
                "SELECT id, sort_key FROM global_index ORDER BY sort_key DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    Ok(tail.map(|(id, millis)| LastAssigned {
        id: MessageId(id),
        millis,
    }))
}
