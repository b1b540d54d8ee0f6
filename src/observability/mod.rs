//! Structured logging and search metrics.
//!
//! - [`init_logging`]: one-time `tracing` setup with `RUST_LOG` support
//! - [`SearchMetrics`]: counters over path search outcomes

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::EnvFilter;

use crate::types::{PathFindResultType, PathUpdated};

/// Initialize structured logging with `RUST_LOG` environment variable support.
///
/// Defaults to `wordchain=info` when `RUST_LOG` is not set. Later calls are
/// ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wordchain=info"));

    // try_init so double-init in tests doesn't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Outcome counters for path searches. Shared by reference; every method
/// takes `&self`.
#[derive(Debug, Default)]
pub struct SearchMetrics {
    searches: AtomicU64,
    found: AtomicU64,
    not_found: AtomicU64,
    end_word: AtomicU64,
    errors: AtomicU64,
    total_elapsed_ms: AtomicU64,
}

impl SearchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, update: &PathUpdated) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.total_elapsed_ms
            .fetch_add(update.elapsed_ms, Ordering::Relaxed);
        let counter = match update.result {
            PathFindResultType::Found => &self.found,
            PathFindResultType::NotFound => &self.not_found,
            PathFindResultType::EndWord => &self.end_word,
            PathFindResultType::Error => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn searches(&self) -> u64 {
        self.searches.load(Ordering::Relaxed)
    }

    pub fn mean_elapsed_ms(&self) -> f64 {
        let searches = self.searches();
        if searches == 0 {
            return 0.0;
        }
        self.total_elapsed_ms.load(Ordering::Relaxed) as f64 / searches as f64
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "searches": self.searches(),
            "found": self.found.load(Ordering::Relaxed),
            "not_found": self.not_found.load(Ordering::Relaxed),
            "end_word": self.end_word.load(Ordering::Relaxed),
            "errors": self.errors.load(Ordering::Relaxed),
            "mean_elapsed_ms": self.mean_elapsed_ms(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
