// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the core domain types.

pub use backplane_core::types::{Message, MessageId, QueueEntry};

/// Column list matching [`message_from_row`].
pub(crate) const MESSAGE_COLUMNS: &str = "m.id, m.bus, m.channel, m.sticky, m.payload";

/// Builds a [`Message`] from a row selected with [`MESSAGE_COLUMNS`].
pub(crate) fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let payload: String = row.get(4)?;
    let payload = serde_json::from_str(&payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Message {
        id: MessageId(row.get(0)?),
        bus: row.get(1)?,
        channel: row.get(2)?,
        sticky: row.get(3)?,
        payload,
    })
}

/// The GlobalIndex value for a message: `"bus channel id"`.
pub(crate) fn global_entry(message: &Message) -> String {
    format!("{} {} {}", message.bus, message.channel, message.id)
}

/// Milliseconds as the unsigned queue position / version domain.
pub(crate) fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}
