//! Sliding-window hit counting per key.
//!
//! Each key (usually a client address) gets a [`Record`]: a window that
//! expires at a fixed instant and a count of hits inside it. When a window
//! lapses the next hit opens a new one. Hits rejected in an overfull window
//! are carried into the next window, which is also pushed back by one minute
//! per carried hit.
//!
//! ```text
//! limit = 2, window = 60s
//!
//! t0      hit  → hits 1, remain 1          window ends t0+60s
//! t0+10s  hit  → hits 2, remain 0
//! t0+20s  hit  → rejected, hits 3 (1 over)
//! t0+61s  hit  → new window, 1 hit carried: hits 2, ends t0+61s+60s+1min
//! ```
//!
//! Records for keys that stop sending are removed by a periodic sweep.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Default interval between sweeps of lapsed records.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Source of wall-clock time for window arithmetic.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *now = after(*now, to_delta(by));
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Record ────────────────────────────────────────────────────────────────────

/// Throttle state for one key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub id: String,
    pub window_expiration: DateTime<Utc>,
    pub window_duration: TimeDelta,
    pub hits_under_window: u32,
    pub limit: u32,
}

impl Record {
    fn new(id: &str, limit: u32, window: TimeDelta, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_owned(),
            window_expiration: after(now, window),
            window_duration: window,
            hits_under_window: 1,
            limit,
        }
    }

    /// Hits left in the current window, floored at zero.
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.hits_under_window)
    }

    /// Hits counted beyond the limit.
    pub fn excess(&self) -> u32 {
        self.hits_under_window.saturating_sub(self.limit)
    }

    fn hit(&mut self, now: DateTime<Utc>, max_penalty_hits: Option<u32>) -> Result<Record, Throttled> {
        if now > self.window_expiration {
            self.reset_window(now);
        }
        if self.hits_under_window >= self.limit {
            // Rejected hits still count unless capped; they become the
            // penalty carried into the next window.
            if max_penalty_hits.is_none_or(|cap| self.excess() < cap) {
                self.hits_under_window = self.hits_under_window.saturating_add(1);
            }
            return Err(Throttled { record: self.clone() });
        }
        self.hits_under_window += 1;
        Ok(self.clone())
    }

    fn reset_window(&mut self, window_start: DateTime<Utc>) {
        self.window_expiration = after(window_start, self.window_duration);
        if self.hits_under_window > self.limit {
            let excess = self.excess();
            self.hits_under_window = excess;
            self.window_expiration = after(self.window_expiration, TimeDelta::minutes(excess.into()));
        } else {
            self.hits_under_window = 0;
        }
    }
}

/// A hit landed in a full window.
#[derive(Clone, Debug, thiserror::Error)]
#[error(
    "number of requests exceeded throttle limit in window by {} hits, next window begins at {}",
    .record.excess(),
    .record.window_expiration.to_rfc3339()
)]
pub struct Throttled {
    pub record: Record,
}

// ── Config ────────────────────────────────────────────────────────────────────

/// Throttle settings, usually read from the `[throttle]` table.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Hits allowed per window and key.
    pub limit: u32,
    pub window_secs: u64,
    pub sweep_interval_secs: u64,
    /// Cap on rejected hits carried into the next window. Unset means every
    /// rejected hit counts, so the penalty keeps growing under sustained load.
    pub max_penalty_hits: Option<u32>,
}

impl ThrottleConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// `0` falls back to [`SWEEP_INTERVAL`].
    pub fn sweep_interval(&self) -> Duration {
        match self.sweep_interval_secs {
            0 => SWEEP_INTERVAL,
            secs => Duration::from_secs(secs),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit: 60,
            window_secs: 60,
            sweep_interval_secs: SWEEP_INTERVAL.as_secs(),
            max_penalty_hits: None,
        }
    }
}

// ── Throttle ──────────────────────────────────────────────────────────────────

/// Concurrent map of key → [`Record`].
///
/// A hit reads and writes its record under the map's per-shard lock, so two
/// hits on one key never interleave. Keys on different shards never contend.
pub struct Throttle {
    records: DashMap<String, Record>,
    clock: Arc<dyn Clock>,
    max_penalty_hits: Option<u32>,
}

impl Throttle {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { records: DashMap::new(), clock, max_penalty_hits: None }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new().max_penalty_hits(config.max_penalty_hits)
    }

    pub fn max_penalty_hits(mut self, cap: Option<u32>) -> Self {
        self.max_penalty_hits = cap;
        self
    }

    /// Counts one hit for `id`.
    ///
    /// The first hit for a key creates its record and always succeeds.
    /// `limit` and `window` are fixed when the record is created.
    pub fn hit(&self, id: &str, limit: u32, window: Duration) -> Result<Record, Throttled> {
        let now = self.clock.now();
        if let Some(mut record) = self.records.get_mut(id) {
            return record.hit(now, self.max_penalty_hits);
        }
        // No record yet; `entry` settles a race with a concurrent creator.
        match self.records.entry(id.to_owned()) {
            Entry::Occupied(mut entry) => entry.get_mut().hit(now, self.max_penalty_hits),
            Entry::Vacant(entry) => {
                let record = Record::new(id, limit, to_delta(window), now);
                entry.insert(record.clone());
                Ok(record)
            }
        }
    }

    /// Snapshot of the record for `id`.
    pub fn get(&self, id: &str) -> Option<Record> {
        self.records.get(id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes records whose window has lapsed. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = now <= record.window_expiration;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Removes every record.
    pub fn clear(&self) {
        self.records.clear();
    }

    /// Sweeps every `every` on the current tokio runtime until the last
    /// `Arc<Throttle>` is dropped. A zero interval means [`SWEEP_INTERVAL`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let throttle = Arc::downgrade(self);
        let every = if every.is_zero() { SWEEP_INTERVAL } else { every };
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticks.tick().await;
            loop {
                ticks.tick().await;
                let Some(throttle) = throttle.upgrade() else { break };
                let removed = throttle.sweep();
                if removed > 0 {
                    debug!(removed, remaining = throttle.len(), "throttle sweep");
                }
            }
        })
    }
}

impl Default for Throttle {
    fn default() -> Self { Self::new() }
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

fn after(t: DateTime<Utc>, by: TimeDelta) -> DateTime<Utc> {
    t.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
