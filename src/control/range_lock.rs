//! Date-range leases.
//!
//! Runs with intersecting ranges are mutually exclusive; disjoint ranges
//! proceed in parallel. A lease is released when its [`RangeGuard`] drops
//! (success, failure, cancellation or panic) or, if the holder vanished,
//! when it expires and is swept.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{DateRange, RunId};

/// Unique identifier for a range lease.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LeaseId(pub Uuid);

impl LeaseId {
    /// Creates a new lease ID using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exclusive claim on a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeLease {
    /// Lease identifier.
    pub lease_id: LeaseId,
    /// Claimed range.
    pub range: DateRange,
    /// Run holding the lease.
    pub holder: RunId,
    /// Expiry for crash recovery.
    pub expires_at: DateTime<Utc>,
}

impl RangeLease {
    /// Whether the lease outlived its expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

#[derive(Debug, Default)]
struct LockInner {
    leases: Mutex<Vec<RangeLease>>,
    released: Notify,
}

/// Table of live range leases. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct RangeLockTable {
    inner: Arc<LockInner>,
}

impl RangeLockTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `range` for `holder` unless a live lease intersects it.
    ///
    /// Expired leases never block and are dropped on the way.
    ///
    /// # Errors
    /// The first live lease intersecting `range`.
    pub fn try_acquire(
        &self,
        range: DateRange,
        holder: RunId,
        ttl: Duration,
    ) -> Result<RangeGuard, RangeLease> {
        let mut leases = self.inner.leases.lock();
        leases.retain(|l| {
            let live = !l.is_expired();
            if !live {
                warn!(
                    lease = %l.lease_id,
                    holder = %l.holder,
                    range = %l.range,
                    "dropping expired range lease"
                );
            }
            live
        });
        if let Some(blocking) = leases.iter().find(|l| l.range.overlaps(&range)) {
            return Err(blocking.clone());
        }
        let lease = RangeLease {
            lease_id: LeaseId::new(),
            range,
            holder,
            expires_at: Utc::now() + ttl,
        };
        leases.push(lease.clone());
        debug!(lease = %lease.lease_id, holder = %holder, range = %range, "range lease acquired");
        Ok(RangeGuard {
            table: self.clone(),
            lease,
        })
    }

    /// Claims `range`, waiting up to `wait` for intersecting leases to go.
    ///
    /// # Errors
    /// The blocking lease when the wait elapses.
    pub async fn acquire(
        &self,
        range: DateRange,
        holder: RunId,
        ttl: Duration,
        wait: std::time::Duration,
    ) -> Result<RangeGuard, RangeLease> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let blocking = match self.try_acquire(range, holder, ttl) {
                Ok(guard) => return Ok(guard),
                Err(blocking) => blocking,
            };
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(blocking);
            }
            // Wake on release, or at the deadline / lease expiry to re-check.
            let expiry = (blocking.expires_at - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            let nap = (deadline - now).min(expiry + std::time::Duration::from_millis(1));
            let _ = tokio::time::timeout(nap, released).await;
        }
    }

    /// Live leases.
    pub fn leases(&self) -> Vec<RangeLease> {
        self.inner.leases.lock().clone()
    }

    /// Number of held leases.
    pub fn len(&self) -> usize {
        self.inner.leases.lock().len()
    }

    /// Whether no lease is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes expired leases and returns them.
    pub fn sweep_expired(&self) -> Vec<RangeLease> {
        let mut leases = self.inner.leases.lock();
        let (expired, live): (Vec<RangeLease>, Vec<RangeLease>) =
            leases.drain(..).partition(|l| l.is_expired());
        *leases = live;
        drop(leases);
        if !expired.is_empty() {
            for lease in &expired {
                warn!(
                    lease = %lease.lease_id,
                    holder = %lease.holder,
                    range = %lease.range,
                    "swept expired range lease"
                );
            }
            self.inner.released.notify_waiters();
        }
        expired
    }

    fn release(&self, lease_id: LeaseId) {
        let mut leases = self.inner.leases.lock();
        let before = leases.len();
        leases.retain(|l| l.lease_id != lease_id);
        let removed = leases.len() != before;
        drop(leases);
        if removed {
            debug!(lease = %lease_id, "range lease released");
            self.inner.released.notify_waiters();
        }
    }
}

/// Holds a range lease; releases it on drop.
#[derive(Debug)]
pub struct RangeGuard {
    table: RangeLockTable,
    lease: RangeLease,
}

impl RangeGuard {
    /// The held lease.
    pub fn lease(&self) -> &RangeLease {
        &self.lease
    }
}

impl Drop for RangeGuard {
    fn drop(&mut self) {
        self.table.release(self.lease.lease_id);
    }
}
