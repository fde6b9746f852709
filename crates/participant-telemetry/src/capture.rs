//! Counting layer for asserting on emitted log levels in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Number of WARN and ERROR events seen.
#[derive(Debug, Default)]
pub struct LevelCounts {
    warnings: AtomicUsize,
    errors: AtomicUsize,
}

impl LevelCounts {
    pub fn warnings(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

/// Layer feeding a shared [`LevelCounts`].
#[derive(Debug, Clone, Default)]
pub struct CountingLayer {
    counts: Arc<LevelCounts>,
}

impl CountingLayer {
    pub fn counts(&self) -> Arc<LevelCounts> {
        Arc::clone(&self.counts)
    }
}

impl<S: Subscriber> Layer<S> for CountingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::WARN => self.counts.warnings.fetch_add(1, Ordering::SeqCst),
            Level::ERROR => self.counts.errors.fetch_add(1, Ordering::SeqCst),
            _ => 0,
        };
    }
}

/// Run `f` with a thread-local subscriber counting warnings and errors.
pub fn capture_levels<R>(f: impl FnOnce() -> R) -> (R, Arc<LevelCounts>) {
    let layer = CountingLayer::default();
    let counts = layer.counts();
    let subscriber = tracing_subscriber::registry().with(layer);
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, counts)
}
