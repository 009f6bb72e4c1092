//! GPU/CPU synchronization.
//!
//! The only synchronization primitive the frame core relies on is a
//! *completion counter*: a monotonically increasing 64-bit value that the
//! queue advances as submitted work finishes, paired with a blocking
//! "wait until the counter reaches N" operation.
//!
//! - [`CompletionCounter`] is the trait the scheduler is written against, so
//!   tests can inject a counter they drive by hand.
//! - [`TimelineFence`] is the concrete counter used by the software device
//!   (and by test doubles): a value guarded by a mutex plus a condition
//!   variable that wakes waiters on every signal.
//!
//! # Overview
//!
//! ```text
//! CPU                                   GPU queue
//! submit(list, 5) ───────────────────▶  execute list
//! ...                                   signal(5)  ──▶ completed = 5
//! wait_until(5)  ◀── wakes ─────────────┘
//! ```
//!
//! A fence can be marked lost. From then on every wait and signal fails with
//! [`RhiError::DeviceLost`]; waiters blocked at that moment are woken and see
//! the same error.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use deferred_rhi::sync::{CompletionCounter, TimelineFence};
//!
//! let fence = Arc::new(TimelineFence::new());
//! let gpu = {
//!     let fence = fence.clone();
//!     std::thread::spawn(move || fence.signal(1).unwrap())
//! };
//!
//! fence.wait_until(1).unwrap();
//! assert!(fence.completed_value().unwrap() >= 1);
//! gpu.join().unwrap();
//! ```

use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{error, trace};

use crate::error::{RhiError, RhiResult};

/// A point on the queue's completion timeline.
pub type FenceValue = u64;

/// Monotonic completion counter with a blocking wait.
///
/// Implementations must never report a completed value lower than one they
/// reported before.
pub trait CompletionCounter: Send + Sync {
    /// Returns the highest value the GPU has finished.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] once the device has been lost.
    fn completed_value(&self) -> RhiResult<FenceValue>;

    /// Blocks the calling thread until the completed value is at least `value`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the device is lost before or
    /// during the wait.
    fn wait_until(&self, value: FenceValue) -> RhiResult<()>;

    /// Non-blocking check that `value` has been reached.
    ///
    /// # Errors
    ///
    /// Same as [`completed_value`](Self::completed_value).
    fn is_reached(&self, value: FenceValue) -> RhiResult<bool> {
        Ok(self.completed_value()? >= value)
    }
}

#[derive(Debug, Default)]
struct FenceState {
    completed: FenceValue,
    lost: Option<String>,
}

/// Timeline fence backed by a mutex and a condition variable.
///
/// # Thread Safety
///
/// Signal and wait may be called from any thread. Signals must arrive in
/// non-decreasing order; a lower value than the current one is rejected.
#[derive(Debug, Default)]
pub struct TimelineFence {
    state: Mutex<FenceState>,
    signaled: Condvar,
}

impl TimelineFence {
    /// Creates a fence whose completed value is 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the completed value and wakes every waiter.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the fence was marked lost and
    /// [`RhiError::InvalidUsage`] if `value` would move the counter backwards.
    pub fn signal(&self, value: FenceValue) -> RhiResult<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.lost {
            return Err(RhiError::DeviceLost(reason.clone()));
        }
        if value < state.completed {
            return Err(RhiError::InvalidUsage(format!(
                "fence signal {} is behind completed value {}",
                value, state.completed
            )));
        }
        state.completed = value;
        trace!("Fence signaled: {}", value);
        drop(state);
        self.signaled.notify_all();
        Ok(())
    }

    /// Marks the fence lost and wakes every waiter.
    ///
    /// The first reason wins; later calls keep it.
    pub fn mark_lost(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if state.lost.is_none() {
            let reason = reason.into();
            error!("Fence marked lost: {}", reason);
            state.lost = Some(reason);
        }
        drop(state);
        self.signaled.notify_all();
    }

    /// Returns true once [`mark_lost`](Self::mark_lost) has been called.
    pub fn is_lost(&self) -> bool {
        self.state.lock().lost.is_some()
    }

    /// Waits for `value` with an upper bound on the blocking time.
    ///
    /// Returns `Ok(true)` if the value was reached and `Ok(false)` on timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the fence is or becomes lost.
    pub fn wait_until_timeout(&self, value: FenceValue, timeout: Duration) -> RhiResult<bool> {
        let mut state = self.state.lock();
        loop {
            if let Some(reason) = &state.lost {
                return Err(RhiError::DeviceLost(reason.clone()));
            }
            if state.completed >= value {
                return Ok(true);
            }
            if self.signaled.wait_for(&mut state, timeout).timed_out() {
                if let Some(reason) = &state.lost {
                    return Err(RhiError::DeviceLost(reason.clone()));
                }
                return Ok(state.completed >= value);
            }
        }
    }
}

impl CompletionCounter for TimelineFence {
    fn completed_value(&self) -> RhiResult<FenceValue> {
        let state = self.state.lock();
        match &state.lost {
            Some(reason) => Err(RhiError::DeviceLost(reason.clone())),
            None => Ok(state.completed),
        }
    }

    fn wait_until(&self, value: FenceValue) -> RhiResult<()> {
        let mut state = self.state.lock();
        loop {
            if let Some(reason) = &state.lost {
                return Err(RhiError::DeviceLost(reason.clone()));
            }
            if state.completed >= value {
                return Ok(());
            }
            self.signaled.wait(&mut state);
        }
    }
}
