//! Tracing spans for run lifecycle events.
//!
//! Spans carry the run id and date range so every event logged while a run
//! executes (lock waits, solver statistics, post-condition strips, commits)
//! can be correlated.
//!
//! # Example
//!
//! ```ignore
//! let span = generation_span(run_id, range, Algorithm::Hybrid);
//! async { /* ... */ }.instrument(span).await;
//! ```

use tracing::{info_span, Span};

use crate::models::{DateRange, RunId};
use crate::solver::Algorithm;

/// Span for a generation run.
#[must_use]
pub fn generation_span(run_id: RunId, range: DateRange, algorithm: Algorithm) -> Span {
    info_span!(
        "roster.generate",
        run_id = %run_id,
        range = %range,
        algorithm = %algorithm,
    )
}

/// Span for a repair run.
#[must_use]
pub fn repair_span(run_id: RunId, person_id: impl AsRef<str>, window: DateRange) -> Span {
    info_span!(
        "roster.repair",
        run_id = %run_id,
        person_id = %person_id.as_ref(),
        window = %window,
    )
}

/// Span around one strategy invocation.
///
/// # Arguments
/// * `algorithm` - Strategy being run
/// * `slots` - Open slots in the instance
/// * `candidates` - Total candidate pairs
#[must_use]
pub fn solve_span(algorithm: Algorithm, slots: usize, candidates: usize) -> Span {
    info_span!(
        "roster.solve",
        algorithm = %algorithm,
        slots = slots,
        candidates = candidates,
    )
}

/// Span for a read-only compliance validation.
#[must_use]
pub fn validation_span(range: DateRange) -> Span {
    info_span!("roster.validate", range = %range)
}
