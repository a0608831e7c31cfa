//! Query performance tracking.
//!
//! Every executed statement becomes one `PerformanceSample`. Samples go into
//! two bounded rings (recent and slow); totals and the running mean live in
//! `PerformanceAggregate`.

use crate::models::{PerformanceAggregate, PerformanceSample, PerformanceStats, QueryParam};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// Longest statement text kept in a fingerprint.
const FINGERPRINT_MAX_CHARS: usize = 200;

#[derive(Debug, Default)]
struct Inner {
    aggregate: PerformanceAggregate,
    recent: VecDeque<PerformanceSample>,
    slow: VecDeque<PerformanceSample>,
}

/// Thread-safe sample store. The lock is never held across an await.
#[derive(Debug)]
pub struct PerformanceTracker {
    inner: Mutex<Inner>,
    slow_threshold: Duration,
    recent_cap: usize,
    slow_cap: usize,
}

impl PerformanceTracker {
    pub fn new(slow_threshold: Duration, recent_cap: usize, slow_cap: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            slow_threshold,
            recent_cap: recent_cap.max(1),
            slow_cap: slow_cap.max(1),
        }
    }

    /// Record one executed statement, successful or not.
    pub fn record(&self, sql: &str, params: &[QueryParam], duration: Duration, success: bool) {
        let sample = PerformanceSample {
            query_fingerprint: fingerprint(sql),
            duration,
            timestamp: Utc::now(),
            params_summary: params_summary(params),
            success,
        };
        let is_slow = duration > self.slow_threshold;
        if is_slow {
            warn!(
                elapsed_ms = duration.as_millis() as u64,
                threshold_ms = self.slow_threshold.as_millis() as u64,
                query = %sample.query_fingerprint,
                "Slow query"
            );
        }

        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.aggregate.observe(duration, success);
        if is_slow {
            push_bounded(&mut inner.slow, sample.clone(), self.slow_cap);
        }
        push_bounded(&mut inner.recent, sample, self.recent_cap);
    }

    pub fn aggregate(&self) -> PerformanceAggregate {
        match self.inner.lock() {
            Ok(inner) => inner.aggregate,
            Err(poisoned) => poisoned.into_inner().aggregate,
        }
    }

    /// Snapshot of totals and both rings, newest last.
    pub fn snapshot(&self) -> PerformanceStats {
        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        PerformanceStats {
            aggregate: inner.aggregate,
            slow_query_threshold_ms: self.slow_threshold.as_millis() as u64,
            recent_queries: inner.recent.iter().cloned().collect(),
            slow_queries: inner.slow.iter().cloned().collect(),
        }
    }
}

fn push_bounded(ring: &mut VecDeque<PerformanceSample>, sample: PerformanceSample, cap: usize) {
    while ring.len() >= cap {
        ring.pop_front();
    }
    ring.push_back(sample);
}

/// Statement text with whitespace collapsed and length capped.
pub fn fingerprint(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= FINGERPRINT_MAX_CHARS {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(FINGERPRINT_MAX_CHARS).collect();
    truncated.push_str("...");
    truncated
}

/// Parameter types only; values never leave the executor.
pub fn params_summary(params: &[QueryParam]) -> String {
    let types: Vec<_> = params.iter().map(QueryParam::type_name).collect();
    format!("[{}]", types.join(", "))
}
