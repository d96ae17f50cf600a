// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fault-injecting [`MessageStore`] wrapper.
//!
//! `FlakyStore` delegates to a real store and, on request, rejects commits
//! as conflicts, fails operations as storage faults, or adds out-of-scope
//! messages to scan results to simulate index drift.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use backplane_core::{
    AdapterType, BackplaneError, HealthStatus, LastAssigned, Message, MessageId, MessageStore,
    PluginAdapter, QueueEntry, ScanFilter, StagedBatch, WatchToken,
};

pub struct FlakyStore {
    inner: Arc<dyn MessageStore>,
    conflicts: AtomicUsize,
    faults: AtomicUsize,
    statement_errors: AtomicUsize,
    commits: AtomicUsize,
    reconnects: AtomicUsize,
    foreign: Mutex<Vec<Message>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn MessageStore>) -> Self {
        Self {
            inner,
            conflicts: AtomicUsize::new(0),
            faults: AtomicUsize::new(0),
            statement_errors: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
            foreign: Mutex::new(Vec::new()),
        }
    }

    /// The next `n` commits are rejected as conflicts without touching the store.
    pub fn conflict_next_commits(&self, n: usize) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    /// The next `n` operations fail with `StorageUnavailable`. Reconnect is exempt.
    pub fn fail_next_operations(&self, n: usize) {
        self.faults.store(n, Ordering::SeqCst);
    }

    /// The next `n` commits fail with a non-connection `Internal` error.
    pub fn fail_next_commits_internally(&self, n: usize) {
        self.statement_errors.store(n, Ordering::SeqCst);
    }

    /// Simulates index drift: `message` is readable by id and appended to
    /// every subsequent scan whose cursor it lies past.
    pub fn inject_into_scans(&self, message: Message) {
        self.foreign_messages().push(message);
    }

    /// Commits that reached the inner store successfully.
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn foreign_messages(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        self.foreign.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_fault(&self) -> Result<(), BackplaneError> {
        if take(&self.faults) {
            return Err(BackplaneError::storage(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "injected storage fault",
            )));
        }
        Ok(())
    }
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl PluginAdapter for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    fn version(&self) -> semver::Version {
        self.inner.version()
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, BackplaneError> {
        if self.faults.load(Ordering::SeqCst) > 0 {
            return Ok(HealthStatus::Degraded("faults pending".into()));
        }
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), BackplaneError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn enqueue(&self, payload: Vec<u8>) -> Result<u64, BackplaneError> {
        self.check_fault()?;
        self.inner.enqueue(payload).await
    }

    async fn queue_len(&self) -> Result<usize, BackplaneError> {
        self.check_fault()?;
        self.inner.queue_len().await
    }

    async fn peek_queue(&self, max: usize) -> Result<Vec<QueueEntry>, BackplaneError> {
        self.check_fault()?;
        self.inner.peek_queue(max).await
    }

    async fn watch(&self) -> Result<WatchToken, BackplaneError> {
        self.check_fault()?;
        self.inner.watch().await
    }

    async fn last_assigned(&self) -> Result<Option<LastAssigned>, BackplaneError> {
        self.check_fault()?;
        self.inner.last_assigned().await
    }

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, BackplaneError> {
        self.check_fault()?;
        let drifted = self.foreign_messages().iter().find(|m| m.id == *id).cloned();
        if drifted.is_some() {
            return Ok(drifted);
        }
        self.inner.get(id).await
    }

    async fn scan(
        &self,
        filter: &ScanFilter,
        since: Option<&MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, BackplaneError> {
        self.check_fault()?;
        let mut messages = self.inner.scan(filter, since, limit).await?;
        messages.extend(
            self.foreign_messages()
                .iter()
                .filter(|m| since.is_none_or(|since| m.id > *since))
                .cloned(),
        );
        Ok(messages)
    }

    async fn commit(&self, token: WatchToken, batch: StagedBatch) -> Result<(), BackplaneError> {
        self.check_fault()?;
        if take(&self.statement_errors) {
            return Err(BackplaneError::Internal("injected constraint violation".into()));
        }
        if take(&self.conflicts) {
            return Err(BackplaneError::TransactionConflict {
                expected: token.0,
                found: token.0 + 1,
            });
        }
        self.inner.commit(token, batch).await?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, BackplaneError> {
        self.check_fault()?;
        self.inner.purge_expired().await
    }

    async fn reconnect(&self) -> Result<(), BackplaneError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        self.inner.reconnect().await
    }
}
