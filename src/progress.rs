//! Progress-callback trait for per-unit extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through each document unit.
//!
//! # Example
//!
//! ```rust
//! use clinicscan::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     records: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_unit_complete(&self, position: usize, total: usize, records: usize) {
//!         let sum = self.records.fetch_add(records, Ordering::SeqCst) + records;
//!         eprintln!("unit {position}/{total}: {sum} records so far");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { records: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::prompts::CorrectionPass;
use std::sync::Arc;

/// Called by the pipeline as it processes each unit.
///
/// All methods default to no-ops. With `concurrency > 1` the per-unit
/// methods may be called concurrently from different tasks.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once, after inputs are rasterised and before the first model call.
    fn on_run_start(&self, total_units: usize) {
        let _ = total_units;
    }

    /// Called before the base extraction call of a unit.
    fn on_unit_start(&self, position: usize, total_units: usize, label: &str) {
        let _ = (position, total_units, label);
    }

    /// Called after each correction pass of a unit, whether it produced a
    /// patch or degraded to an empty one.
    fn on_pass_complete(&self, position: usize, pass: CorrectionPass) {
        let _ = (position, pass);
    }

    /// Called when a unit produced its merged records.
    fn on_unit_complete(&self, position: usize, total_units: usize, records: usize) {
        let _ = (position, total_units, records);
    }

    /// Called when a unit failed or was skipped.
    fn on_unit_error(&self, position: usize, total_units: usize, error: &str) {
        let _ = (position, total_units, error);
    }

    /// Called once after every unit has been attempted.
    fn on_run_complete(&self, total_units: usize, succeeded: usize) {
        let _ = (total_units, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        passes: Mutex<Vec<CorrectionPass>>,
        errors: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_pass_complete(&self, _position: usize, pass: CorrectionPass) {
            self.passes.lock().unwrap().push(pass);
        }

        fn on_unit_error(&self, _position: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(3);
        cb.on_unit_start(1, 3, "scan_page_1.png");
        cb.on_pass_complete(1, CorrectionPass::Address);
        cb.on_unit_complete(1, 3, 12);
        cb.on_unit_error(2, 3, "empty reply");
        cb.on_run_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let cb = TrackingCallback::default();
        for pass in CorrectionPass::ORDER {
            cb.on_pass_complete(1, pass);
        }
        cb.on_unit_error(2, 2, "upload failed");
        assert_eq!(*cb.passes.lock().unwrap(), CorrectionPass::ORDER.to_vec());
        assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
    }
}
