// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: publish, drain, and retrieve through one store.
//!
//! Each test creates an isolated TestHarness with a simulated clock. Tests
//! that touch persistence run against both the memory and SQLite stores.

use std::sync::Arc;
use std::time::Duration;

use backplane_bus::NotificationBus;
use backplane_config::model::ProcessorConfig;
use backplane_core::{
    BackplaneError, Clock, ConsumerScope, LeaderElector, MAX_ID_MILLIS, MessageId, MessageStore,
    RetentionPolicy, ScanFilter,
};
use backplane_processor::{CycleOutcome, LocalElector, MessageProcessor, RetentionResolver};
use backplane_test_utils::{MockBusConfig, TestHarness};
use proptest::prelude::*;

async fn both_backends() -> Vec<TestHarness> {
    vec![
        TestHarness::builder().build().await.unwrap(),
        TestHarness::builder().with_sqlite().build().await.unwrap(),
    ]
}

fn id(millis: i64) -> MessageId {
    MessageId::from_millis(millis).unwrap()
}

// ---- Ordering ----

#[tokio::test]
async fn same_millisecond_messages_are_bumped_and_returned_in_order() {
    for h in both_backends().await {
        h.publish("b", "c1", false, serde_json::json!("m1"), 1_000).await.unwrap();
        h.publish("b", "c2", false, serde_json::json!("m2"), 1_000).await.unwrap();
        h.drain_all().await.unwrap();

        let bus_index = h
            .store
            .scan(&ScanFilter::Buses(["b".to_string()].into()), None, 10)
            .await
            .unwrap();
        assert_eq!(bus_index.len(), 2);

        let got = h.retrieve(&ConsumerScope::privileged(["b"]), "").await.unwrap();
        let payloads: Vec<&str> = got
            .messages
            .iter()
            .map(|m| m.payload.as_str().unwrap())
            .collect();
        assert_eq!(payloads, vec!["m1", "m2"]);
        assert_eq!(got.messages[0].id, id(1_000));
        assert_eq!(got.messages[1].id, id(1_001));
        assert_eq!(got.next_cursor, id(1_001).to_string());
    }
}

#[tokio::test]
async fn concurrent_producers_with_identical_timestamps_get_distinct_increasing_ids() {
    let h = Arc::new(TestHarness::builder().with_batch_size(7).build().await.unwrap());
    let mut producers = Vec::new();
    for i in 0..40 {
        let h = h.clone();
        producers.push(tokio::spawn(async move {
            h.publish("b", "c", false, serde_json::json!(i), 5_000).await.unwrap();
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    assert_eq!(h.drain_all().await.unwrap(), 6);

    let got = h
        .store
        .scan(&ScanFilter::Channel("c".into()), None, 100)
        .await
        .unwrap();
    let millis: Vec<i64> = got.iter().map(|m| m.id.millis().unwrap()).collect();
    assert_eq!(millis, (5_000..5_040).collect::<Vec<_>>());
}

#[tokio::test]
async fn a_new_leader_continues_from_the_persisted_tail() {
    let h = TestHarness::builder().build().await.unwrap();
    h.publish("b", "c", false, serde_json::json!(1), 9_000).await.unwrap();
    h.drain_all().await.unwrap();
    h.elector.revoke();

    // A second node with its own elector takes over the same store.
    let elector = LocalElector::new();
    let successor = MessageProcessor::new(
        h.store.clone(),
        RetentionResolver::new(
            Arc::new(MockBusConfig::new()),
            h.clock.clone(),
            RetentionPolicy::default(),
            Duration::from_secs(10),
        ),
        elector.subscribe(),
        Arc::new(NotificationBus::new()),
        h.clock.clone(),
        ProcessorConfig::default(),
    );
    elector.grant();

    h.publish("b", "c", false, serde_json::json!(2), 100).await.unwrap();
    assert_eq!(h.drain().await.unwrap(), CycleOutcome::Abandoned);
    let outcome = successor.run_cycle().await.unwrap();
    assert!(matches!(
        outcome,
        CycleOutcome::Committed { newest: Some(ref newest), .. } if *newest == id(9_001)
    ));
}

#[tokio::test]
async fn far_future_producer_timestamp_is_discarded_without_stalling_the_queue() {
    for h in both_backends().await {
        h.publish("b", "c", false, serde_json::json!("future"), MAX_ID_MILLIS + 1)
            .await
            .unwrap();
        h.publish("b", "c", false, serde_json::json!("now"), 3_000).await.unwrap();

        let outcome = h.drain().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Committed { count: 1, skipped: 1, .. }));
        assert_eq!(h.store.queue_len().await.unwrap(), 0);

        let got = h.retrieve(&ConsumerScope::channel("c"), "").await.unwrap();
        assert_eq!(got.messages.len(), 1);
        assert_eq!(got.messages[0].payload, serde_json::json!("now"));
    }
}

// ---- Atomicity ----

#[tokio::test]
async fn forced_conflict_persists_nothing_from_the_batch() {
    for h in both_backends().await {
        h.publish("b", "c1", false, serde_json::json!(1), 1_000).await.unwrap();
        h.publish("b", "c2", true, serde_json::json!(2), 1_000).await.unwrap();
        h.store.conflict_next_commits(1);

        let err = h.drain().await.unwrap_err();
        assert!(matches!(err, BackplaneError::TransactionConflict { .. }));
        assert_eq!(h.store.queue_len().await.unwrap(), 2);
        assert!(h.store.last_assigned().await.unwrap().is_none());
        assert!(h.store.get(&id(1_000)).await.unwrap().is_none());
        assert!(
            h.retrieve(&ConsumerScope::privileged(["b"]), "")
                .await
                .unwrap()
                .is_empty()
        );
        for channel in ["c1", "c2"] {
            assert!(
                h.retrieve(&ConsumerScope::channel(channel), "")
                    .await
                    .unwrap()
                    .is_empty()
            );
        }

        h.drain_all().await.unwrap();
        assert_eq!(
            h.retrieve(&ConsumerScope::privileged(["b"]), "")
                .await
                .unwrap()
                .messages
                .len(),
            2
        );
    }
}

// ---- Polling ----

#[tokio::test]
async fn polling_without_new_messages_is_idempotent() {
    for h in both_backends().await {
        h.publish_now("b", "c", serde_json::json!(1)).await.unwrap();
        h.drain_all().await.unwrap();
        let scope = ConsumerScope::channel("c");

        let first = h.retrieve(&scope, "").await.unwrap();
        assert_eq!(first.messages.len(), 1);
        let second = h.retrieve(&scope, &first.next_cursor).await.unwrap();
        let third = h.retrieve(&scope, &first.next_cursor).await.unwrap();
        assert!(second.is_empty() && third.is_empty());
        assert_eq!(second.next_cursor, first.next_cursor);
        assert_eq!(third.next_cursor, first.next_cursor);

        h.advance(chrono::Duration::milliseconds(5));
        h.publish_now("b", "c", serde_json::json!(2)).await.unwrap();
        h.drain_all().await.unwrap();
        let fourth = h.retrieve(&scope, &third.next_cursor).await.unwrap();
        assert_eq!(fourth.messages.len(), 1);
        assert_eq!(fourth.messages[0].payload, serde_json::json!(2));
    }
}

#[tokio::test]
async fn commit_notification_wakes_a_waiting_consumer() {
    let h = Arc::new(TestHarness::builder().build().await.unwrap());
    let waiter = {
        let h = h.clone();
        tokio::spawn(async move { h.notifications.wait_past(None, Duration::from_secs(5)).await })
    };
    while h.notifications.subscriber_count() == 0 {
        tokio::task::yield_now().await;
    }

    h.publish("b", "c", false, serde_json::json!(1), 2_000).await.unwrap();
    h.drain_all().await.unwrap();
    assert_eq!(waiter.await.unwrap(), Some(id(2_000)));
}

// ---- Retention ----

#[tokio::test]
async fn sticky_message_lives_for_the_bus_sticky_ttl() {
    for backend in [false, true] {
        let builder = TestHarness::builder().with_clock_at(1_000_000).with_bus("b", 60, 3600);
        let builder = if backend { builder.with_sqlite() } else { builder };
        let h = builder.build().await.unwrap();
        h.publish("b", "c", true, serde_json::json!("sticky"), 1_000_000)
            .await
            .unwrap();
        h.drain_all().await.unwrap();
        let scope = ConsumerScope::channel("c");

        h.advance(chrono::Duration::seconds(3599));
        assert_eq!(h.retrieve(&scope, "").await.unwrap().messages.len(), 1);

        h.advance(chrono::Duration::seconds(2));
        assert!(h.retrieve(&scope, "").await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn default_policy_expires_plain_messages_after_sixty_seconds() {
    for h in both_backends().await {
        let start = h.clock.now_millis();
        h.publish("unconfigured", "c", false, serde_json::json!(1), start)
            .await
            .unwrap();
        h.drain_all().await.unwrap();
        let scope = ConsumerScope::privileged(["unconfigured"]);

        h.advance(chrono::Duration::seconds(59));
        assert_eq!(h.retrieve(&scope, "").await.unwrap().messages.len(), 1);
        h.advance(chrono::Duration::seconds(2));
        assert!(h.retrieve(&scope, "").await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn purge_reclaims_expired_messages_but_ordering_survives() {
    for h in both_backends().await {
        h.publish("b", "c", false, serde_json::json!(1), 50_000).await.unwrap();
        h.drain_all().await.unwrap();
        h.advance(chrono::Duration::seconds(120));
        assert_eq!(h.processor.purge().await, 1);

        h.publish("b", "c", false, serde_json::json!(2), 10).await.unwrap();
        let outcome = h.drain().await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Committed { newest: Some(ref newest), .. } if *newest == id(50_001)
        ));
    }
}

// ---- Scope isolation ----

#[tokio::test]
async fn scopes_only_see_what_they_are_bound_to() {
    let h = TestHarness::builder().build().await.unwrap();
    for (i, (bus, channel)) in [("a", "x"), ("b", "x"), ("a", "y"), ("c", "z")]
        .into_iter()
        .enumerate()
    {
        h.publish(bus, channel, false, serde_json::json!(i), 1_000 + i as i64)
            .await
            .unwrap();
    }
    h.drain_all().await.unwrap();

    let channel_x = h.retrieve(&ConsumerScope::channel("x"), "").await.unwrap();
    assert_eq!(channel_x.messages.len(), 2);
    assert!(channel_x.messages.iter().all(|m| m.channel == "x"));

    let bus_a = h.retrieve(&ConsumerScope::privileged(["a"]), "").await.unwrap();
    assert_eq!(bus_a.messages.len(), 2);
    assert!(bus_a.messages.iter().all(|m| m.bus == "a"));

    let nothing = h
        .retrieve(&ConsumerScope::privileged(Vec::<String>::new()), "")
        .await
        .unwrap();
    assert!(nothing.is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn retrieval_never_leaks_outside_scope(
        messages in proptest::collection::vec((0usize..3, 0usize..3, 0i64..50), 1..30),
        bound in 0usize..3,
    ) {
        const BUSES: [&str; 3] = ["a", "b", "c"];
        const CHANNELS: [&str; 3] = ["x", "y", "z"];

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (channel_scope, bus_scope) = runtime.block_on(async {
            let h = TestHarness::builder().build().await.unwrap();
            for (bus, channel, at) in &messages {
                h.publish(BUSES[*bus], CHANNELS[*channel], false, serde_json::json!(at), 1_000 + at)
                    .await
                    .unwrap();
            }
            h.drain_all().await.unwrap();
            (
                h.retrieve(&ConsumerScope::channel(CHANNELS[bound]), "").await.unwrap(),
                h.retrieve(&ConsumerScope::privileged([BUSES[bound]]), "").await.unwrap(),
            )
        });

        prop_assert!(channel_scope.messages.iter().all(|m| m.channel == CHANNELS[bound]));
        prop_assert!(bus_scope.messages.iter().all(|m| m.bus == BUSES[bound]));
        prop_assert_eq!(
            channel_scope.messages.len(),
            messages.iter().filter(|(_, c, _)| *c == bound).count()
        );
        prop_assert!(channel_scope.messages.windows(2).all(|w| w[0].id < w[1].id));
        prop_assert!(bus_scope.messages.windows(2).all(|w| w[0].id < w[1].id));
    }
}
