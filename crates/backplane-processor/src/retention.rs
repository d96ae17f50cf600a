// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-bus retention policy resolution with a bounded-age cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use backplane_core::{BusConfigSource, Clock, RetentionPolicy};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct CachedLookup {
    policy: Option<RetentionPolicy>,
    fetched_at: DateTime<Utc>,
}

/// Resolves the retention policy for a bus, falling back to defaults.
///
/// Found and not-found results are both cached for `max_age`. A failed
/// lookup is logged and answered with the fallback without being cached,
/// so the next message for that bus asks the source again.
pub struct RetentionResolver {
    source: Arc<dyn BusConfigSource>,
    clock: Arc<dyn Clock>,
    fallback: RetentionPolicy,
    max_age: Duration,
    cache: Mutex<HashMap<String, CachedLookup>>,
}

impl RetentionResolver {
    pub fn new(
        source: Arc<dyn BusConfigSource>,
        clock: Arc<dyn Clock>,
        fallback: RetentionPolicy,
        max_age: Duration,
    ) -> Self {
        Self {
            source,
            clock,
            fallback,
            max_age,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the policy to apply to a message on `bus`. Never fails.
    pub async fn resolve(&self, bus: &str) -> RetentionPolicy {
        let now = self.clock.now();
        if let Some(cached) = self.cache().get(bus)
            && !self.is_stale(cached, now)
        {
            return cached.policy.unwrap_or(self.fallback);
        }

        match self.source.retention_policy(bus).await {
            Ok(policy) => {
                if policy.is_none() {
                    debug!(bus, "no retention policy configured, using defaults");
                }
                self.cache().insert(
                    bus.to_string(),
                    CachedLookup {
                        policy,
                        fetched_at: now,
                    },
                );
                policy.unwrap_or(self.fallback)
            }
            Err(e) => {
                warn!(bus, error = %e, "retention policy lookup failed, using defaults");
                self.fallback
            }
        }
    }

    fn is_stale(&self, cached: &CachedLookup, now: DateTime<Utc>) -> bool {
        match (now - cached.fetched_at).to_std() {
            Ok(age) => age >= self.max_age,
            // Clock moved backwards.
            Err(_) => true,
        }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, CachedLookup>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for RetentionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionResolver")
            .field("source", &self.source.name())
            .field("fallback", &self.fallback)
            .field("max_age", &self.max_age)
            .finish()
    }
}
