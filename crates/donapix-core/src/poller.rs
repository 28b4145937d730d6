// ── Payment status polling ──
//
// Asks the backend whether a charge was paid, at a fixed interval, until
// it is paid or the poll is stopped. Query failures never end the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::charge::PaymentBackend;

/// Handle to one running poll loop.
#[derive(Debug, Clone)]
pub struct PollHandle {
    transaction_id: Arc<str>,
    cancel: CancellationToken,
    queries: Arc<AtomicU64>,
}

impl PollHandle {
    /// Stop polling. Idempotent; no query is issued after this returns.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of status queries issued so far.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Acquire)
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }
}

/// Owner of at most one live poll loop.
pub struct PaymentStatusPoller {
    backend: Arc<dyn PaymentBackend>,
    interval: Duration,
    current: Mutex<Option<PollHandle>>,
}

impl PaymentStatusPoller {
    pub fn new(backend: Arc<dyn PaymentBackend>, interval: Duration) -> Self {
        Self {
            backend,
            interval: interval.max(Duration::from_millis(1)),
            current: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll `transaction_id`, stopping any previous poll first.
    ///
    /// The first query goes out one interval after start. `on_paid` runs
    /// exactly once, on the first `paid` answer, and the loop ends.
    pub fn start<F>(&self, transaction_id: impl Into<Arc<str>>, on_paid: F) -> PollHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.take() {
            previous.stop();
        }

        let handle = PollHandle {
            transaction_id: transaction_id.into(),
            cancel: CancellationToken::new(),
            queries: Arc::new(AtomicU64::new(0)),
        };
        tokio::spawn(poll_task(
            Arc::clone(&self.backend),
            self.interval,
            handle.clone(),
            on_paid,
        ));
        debug!(transaction_id = %handle.transaction_id, "payment polling started");

        *current = Some(handle.clone());
        handle
    }

    /// Stop the current poll, if any. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.stop();
            debug!(transaction_id = %handle.transaction_id, "payment polling stopped");
        }
    }

    pub fn handle(&self) -> Option<PollHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn poll_task<F>(
    backend: Arc<dyn PaymentBackend>,
    period: Duration,
    handle: PollHandle,
    on_paid: F,
) where
    F: FnOnce() + Send + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = handle.cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        handle.queries.fetch_add(1, Ordering::AcqRel);
        let result = tokio::select! {
            biased;
            () = handle.cancel.cancelled() => return,
            result = backend.charge_status(&handle.transaction_id) => result,
        };

        match result {
            Ok(status) if status.is_paid() => {
                if handle.cancel.is_cancelled() {
                    return;
                }
                handle.cancel.cancel();
                debug!(transaction_id = %handle.transaction_id, "payment confirmed");
                on_paid();
                return;
            }
            Ok(status) => {
                trace!(transaction_id = %handle.transaction_id, ?status, "payment still pending");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    transaction_id = %handle.transaction_id,
                    "payment status query failed"
                );
            }
        }
    }
}
