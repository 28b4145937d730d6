// ── Expiration countdown ──
//
// One-shot countdown per charge. The remaining time is derived from a
// fixed deadline, so it stays exact regardless of tick jitter; ticks only
// drive the `watch` that a UI renders from.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to one running countdown.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancel: CancellationToken,
    deadline: Instant,
    fired: Arc<AtomicBool>,
    remaining: watch::Receiver<Duration>,
}

impl TimerHandle {
    /// Stop the countdown. Idempotent; a stopped timer never fires.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Time left until the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Remaining time, updated every tick.
    pub fn subscribe(&self) -> watch::Receiver<Duration> {
        self.remaining.clone()
    }
}

/// Owner of at most one live countdown.
#[derive(Debug)]
pub struct ExpirationTimer {
    tick: Duration,
    current: Mutex<Option<TimerHandle>>,
}

impl Default for ExpirationTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl ExpirationTimer {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(1)),
            current: Mutex::new(None),
        }
    }

    /// Start a countdown, stopping any previous one first.
    ///
    /// `on_expired` runs exactly once when the deadline passes, unless the
    /// countdown is stopped before.
    pub fn start<F>(&self, duration: Duration, on_expired: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.take() {
            previous.stop();
        }

        let deadline = Instant::now() + duration;
        let (tx, rx) = watch::channel(duration);
        let handle = TimerHandle {
            cancel: CancellationToken::new(),
            deadline,
            fired: Arc::new(AtomicBool::new(false)),
            remaining: rx,
        };

        tokio::spawn(countdown(handle.clone(), self.tick, tx, on_expired));
        debug!(secs = duration.as_secs(), "expiration timer started");

        *current = Some(handle.clone());
        handle
    }

    /// Stop the current countdown, if any. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.stop();
            debug!("expiration timer stopped");
        }
    }

    /// Time left on the current countdown. `None` when no countdown exists.
    pub fn remaining(&self) -> Option<Duration> {
        self.handle().map(|h| h.remaining())
    }

    /// Tick stream of the current countdown.
    pub fn subscribe(&self) -> Option<watch::Receiver<Duration>> {
        self.handle().map(|h| h.subscribe())
    }

    pub fn handle(&self) -> Option<TimerHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn countdown<F>(
    handle: TimerHandle,
    tick: Duration,
    tx: watch::Sender<Duration>,
    on_expired: F,
) where
    F: FnOnce() + Send + 'static,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let expiry = tokio::time::sleep_until(handle.deadline);
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            biased;
            () = handle.cancel.cancelled() => return,
            () = &mut expiry => break,
            _ = ticker.tick() => {
                let _ = tx.send(handle.remaining());
            }
        }
    }

    if handle.cancel.is_cancelled() {
        return;
    }
    handle.fired.store(true, Ordering::Release);
    handle.cancel.cancel();
    let _ = tx.send(Duration::ZERO);
    debug!("expiration timer fired");
    on_expired();
}

/// Render a countdown as `mm:ss`. Minutes grow past 59 instead of wrapping.
pub fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
