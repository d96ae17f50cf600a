// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules backing [`SqliteStore`](crate::SqliteStore).

pub mod index;
pub mod messages;
pub mod queue;
