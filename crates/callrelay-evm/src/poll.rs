//! Poll scheduling for request/response-only endpoints.
//!
//! Manual poll requests travel over a capacity-one channel. A request made
//! while a poll is executing, or while another request is already waiting, is
//! dropped: the next timer tick covers whatever it would have fetched.
//!
//! The worker owns exactly one [`PollTimer`]. Re-arming moves its deadline
//! instead of starting another timer, so however a poll was triggered there
//! is never more than one tick pending.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};

use crate::metrics::ListenerMetrics;

struct Inner {
    tx: mpsc::Sender<()>,
    in_flight: AtomicBool,
    metrics: Arc<ListenerMetrics>,
}

/// Handle for asking the worker to poll now.
#[derive(Clone)]
pub struct PollScheduler {
    inner: Arc<Inner>,
}

/// Marks a poll as executing until dropped.
pub struct PollGuard {
    inner: Arc<Inner>,
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.inner.in_flight.store(false, Ordering::Release);
    }
}

impl PollScheduler {
    pub fn new(metrics: Arc<ListenerMetrics>) -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        let inner = Inner {
            tx,
            in_flight: AtomicBool::new(false),
            metrics,
        };
        (Self { inner: Arc::new(inner) }, rx)
    }

    /// Ask for a poll. Returns `false` if the request was dropped.
    pub fn request(&self) -> bool {
        let accepted = !self.inner.in_flight.load(Ordering::Acquire)
            && self.inner.tx.try_send(()).is_ok();
        if !accepted {
            ListenerMetrics::incr(&self.inner.metrics.poll_requests_dropped);
            tracing::debug!("poll request dropped, poll already pending");
        }
        accepted
    }

    /// Mark a poll as executing. Requests are dropped until the guard is released.
    pub fn begin(&self) -> PollGuard {
        self.inner.in_flight.store(true, Ordering::Release);
        PollGuard {
            inner: self.inner.clone(),
        }
    }
}

/// The poll worker's single re-armable timer.
pub struct PollTimer {
    interval: Duration,
    sleep: Pin<Box<Sleep>>,
    armed: bool,
    metrics: Arc<ListenerMetrics>,
}

impl PollTimer {
    /// `interval` of zero disables arming.
    pub fn new(interval: Duration, metrics: Arc<ListenerMetrics>) -> Self {
        Self {
            interval,
            sleep: Box::pin(tokio::time::sleep(interval)),
            armed: false,
            metrics,
        }
    }

    /// Set the deadline one interval from now, replacing any pending one.
    /// Returns `false` when arming is disabled.
    pub fn arm(&mut self) -> bool {
        if self.interval.is_zero() {
            return false;
        }
        self.sleep.as_mut().reset(Instant::now() + self.interval);
        self.armed = true;
        ListenerMetrics::incr(&self.metrics.timer_arms);
        true
    }

    /// Resolves once the armed deadline passes. Never resolves while disarmed.
    ///
    /// Cancel-safe: dropping the future keeps the deadline.
    pub async fn fired(&mut self) {
        if !self.armed {
            return std::future::pending().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}
