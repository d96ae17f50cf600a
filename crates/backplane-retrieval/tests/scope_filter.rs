// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messages an index scan should never have returned are filtered out.

use backplane_core::{ConsumerScope, Message, MessageId};
use backplane_test_utils::TestHarness;

fn foreign(millis: i64, bus: &str, channel: &str) -> Message {
    Message {
        id: MessageId::from_millis(millis).unwrap(),
        bus: bus.into(),
        channel: channel.into(),
        sticky: false,
        payload: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn drifted_index_entries_never_reach_a_channel_consumer() {
    let h = TestHarness::builder().build().await.unwrap();
    h.publish("a", "x", false, serde_json::json!(1), 1_000).await.unwrap();
    h.drain_all().await.unwrap();
    h.store.inject_into_scans(foreign(1_500, "a", "y"));

    let got = h.retrieve(&ConsumerScope::channel("x"), "").await.unwrap();
    assert_eq!(got.messages.len(), 1);
    assert!(got.messages.iter().all(|m| m.channel == "x"));
    assert_eq!(got.next_cursor, MessageId::from_millis(1_500).unwrap().to_string());

    let again = h.retrieve(&ConsumerScope::channel("x"), &got.next_cursor).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(again.next_cursor, got.next_cursor);
}

#[tokio::test]
async fn drifted_index_entries_never_reach_a_privileged_consumer() {
    let h = TestHarness::builder().build().await.unwrap();
    h.store.inject_into_scans(foreign(2_000, "other", "x"));

    let got = h.retrieve(&ConsumerScope::privileged(["a"]), "").await.unwrap();
    assert!(got.is_empty());
    assert_eq!(got.next_cursor, MessageId::from_millis(2_000).unwrap().to_string());
}

#[tokio::test]
async fn a_page_of_only_drifted_entries_does_not_pin_the_cursor() {
    let h = TestHarness::builder().with_max_messages(2).build().await.unwrap();
    h.store.inject_into_scans(foreign(1_000, "a", "y"));
    h.store.inject_into_scans(foreign(1_001, "a", "y"));
    let scope = ConsumerScope::channel("x");

    let first = h.retrieve(&scope, "").await.unwrap();
    assert!(first.is_empty());
    assert_eq!(first.next_cursor, MessageId::from_millis(1_001).unwrap().to_string());

    h.publish("a", "x", false, serde_json::json!("real"), 3_000).await.unwrap();
    h.drain_all().await.unwrap();

    let second = h.retrieve(&scope, &first.next_cursor).await.unwrap();
    assert_eq!(second.messages.len(), 1);
    assert_eq!(second.messages[0].payload, serde_json::json!("real"));
    assert_eq!(second.next_cursor, MessageId::from_millis(3_000).unwrap().to_string());
}

#[tokio::test]
async fn storage_faults_surface_as_errors() {
    let h = TestHarness::builder().build().await.unwrap();
    h.store.fail_next_operations(1);
    assert!(h.retrieve(&ConsumerScope::channel("x"), "").await.is_err());
}
