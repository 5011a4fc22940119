use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// Process-wide counters; tests run invocations from many threads at once
static INVOCATIONS: AtomicU64 = AtomicU64::new(0);
static FAILED_INVOCATIONS: AtomicU64 = AtomicU64::new(0);
static NAMESPACES_CREATED: AtomicU64 = AtomicU64::new(0);
static NAMESPACES_DROPPED: AtomicU64 = AtomicU64::new(0);
static CLEANUP_FAILURES: AtomicU64 = AtomicU64::new(0);
static SETUP_STATEMENTS: AtomicU64 = AtomicU64::new(0);

/// Public interface for metrics tracking
pub mod metrics_api {
    use super::*;

    pub fn record_invocation() {
        INVOCATIONS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_invocation() {
        FAILED_INVOCATIONS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_namespace_created() {
        NAMESPACES_CREATED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_namespace_dropped() {
        NAMESPACES_DROPPED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cleanup_failure() {
        CLEANUP_FAILURES.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_setup_statement() {
        SETUP_STATEMENTS.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values
    pub fn snapshot() -> IsolationStats {
        IsolationStats {
            invocations: INVOCATIONS.load(Ordering::Relaxed),
            failed_invocations: FAILED_INVOCATIONS.load(Ordering::Relaxed),
            namespaces_created: NAMESPACES_CREATED.load(Ordering::Relaxed),
            namespaces_dropped: NAMESPACES_DROPPED.load(Ordering::Relaxed),
            cleanup_failures: CLEANUP_FAILURES.load(Ordering::Relaxed),
            setup_statements: SETUP_STATEMENTS.load(Ordering::Relaxed),
        }
    }
}

/// Statistics returned by `metrics_api::snapshot`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IsolationStats {
    pub invocations: u64,
    pub failed_invocations: u64,
    pub namespaces_created: u64,
    pub namespaces_dropped: u64,
    pub cleanup_failures: u64,
    pub setup_statements: u64,
}

impl IsolationStats {
    /// Namespaces created but never confirmed dropped
    pub fn possibly_leaked(&self) -> u64 {
        self.namespaces_created.saturating_sub(self.namespaces_dropped)
    }
}
