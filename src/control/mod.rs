//! Concurrency and idempotency control.
//!
//! | Component | Guards against |
//! |-----------|----------------|
//! | [`RangeLockTable`] | two runs writing intersecting date ranges |
//! | [`IdempotencyRegistry`] | duplicate or contradictory client retries |
//! | [`CancellationToken`] | runaway solves after cancel or timeout |
//! | [`RunGuard`] | runs left `running` when their caller goes away |

mod cancel;
mod idempotency;
mod range_lock;
mod runs;

pub use cancel::CancellationToken;
pub use idempotency::{parameter_hash, IdempotencyRegistry, Reservation};
pub use range_lock::{LeaseId, RangeGuard, RangeLease, RangeLockTable};
pub use runs::{ActiveRuns, RunGuard};
