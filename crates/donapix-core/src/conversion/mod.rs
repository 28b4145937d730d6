// ── Conversion event dispatch ──
//
// One dispatcher per page. Every event is delivered twice with the same
// event id: to the server relay (always, in the background) and to the
// browser pixel (immediately once it is ready, queued before that).

mod sink;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use url::Url;

use donapix_api::ServerConversion;

pub use sink::{ConversionRelay, ConversionSink, LoggingSink};

use crate::config::PixelConfig;
use crate::model::{Amount, CURRENCY, ConversionEvent, EventName, EventParams, UserData};

/// Events held while the pixel loads. The oldest is dropped beyond this.
pub const MAX_PENDING: usize = 256;

/// Diagnostics for the pixel integration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelStatus {
    pub pixel_ids: Vec<String>,
    /// A load was started.
    pub script_injected: bool,
    /// The pixel reported ready.
    pub script_loaded: bool,
    /// Last load failure.
    pub last_error: Option<String>,
    pub pending_count: usize,
    /// Relay deliveries that failed.
    pub server_failures: u64,
}

/// A sink call waiting to be made.
#[derive(Debug)]
enum SinkCall {
    Init(String),
    Event(ConversionEvent),
}

#[derive(Debug, Default)]
struct DispatchState {
    ready: bool,
    pending: VecDeque<ConversionEvent>,
    /// Calls for the sink, made outside the lock by whoever drains.
    outbox: VecDeque<SinkCall>,
    delivering: bool,
    script_injected: bool,
    last_error: Option<String>,
    server_failures: u64,
}

/// Page-wide sink for marketing events. Cheap to clone.
#[derive(Clone)]
pub struct ConversionDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    pixels: Vec<PixelConfig>,
    source_url: Option<String>,
    sink: Arc<dyn ConversionSink>,
    relay: Arc<dyn ConversionRelay>,
    state: Mutex<DispatchState>,
    seq: AtomicU64,
    deliveries: TaskTracker,
}

impl ConversionDispatcher {
    pub fn new(
        pixels: Vec<PixelConfig>,
        source_url: Option<&Url>,
        sink: Arc<dyn ConversionSink>,
        relay: Arc<dyn ConversionRelay>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                pixels,
                source_url: source_url.map(ToString::to_string),
                sink,
                relay,
                state: Mutex::new(DispatchState::default()),
                seq: AtomicU64::new(0),
                deliveries: TaskTracker::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DispatchState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── Dispatch ─────────────────────────────────────────────────

    /// Normalize and deliver an event. Returns the event id.
    ///
    /// Never fails: delivery faults are logged and counted.
    pub fn dispatch(
        &self,
        name: impl Into<EventName>,
        params: EventParams,
        user_data: UserData,
    ) -> String {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let event = normalize(
            name.into(),
            params,
            user_data,
            self.inner.source_url.clone(),
            seq,
        );
        let event_id = event.event_id.clone();
        debug!(event = %event.name, event_id = %event_id, "dispatching conversion");

        self.relay(&event);

        let mut state = self.lock();
        if state.ready {
            state.outbox.push_back(SinkCall::Event(event));
        } else {
            state.pending.push_back(event);
            if state.pending.len() > MAX_PENDING {
                if let Some(dropped) = state.pending.pop_front() {
                    warn!(
                        event = %dropped.name,
                        event_id = %dropped.event_id,
                        "pending conversion queue full, dropping oldest event"
                    );
                }
            }
        }
        drop(state);

        self.flush_outbox();
        event_id
    }

    /// Make queued sink calls in order, without the state lock held.
    ///
    /// Only one caller drains at a time. A call queued while another
    /// caller is draining, including one queued from inside the sink, is
    /// made by that caller.
    fn flush_outbox(&self) {
        {
            let mut state = self.lock();
            if state.delivering {
                return;
            }
            state.delivering = true;
        }

        loop {
            let next = {
                let mut state = self.lock();
                let next = state.outbox.pop_front();
                if next.is_none() {
                    state.delivering = false;
                }
                next
            };
            let Some(call) = next else {
                return;
            };
            self.deliver(&call);
        }
    }

    fn deliver(&self, call: &SinkCall) {
        let sink = &self.inner.sink;
        match call {
            SinkCall::Init(pixel_id) => sink.init(pixel_id),
            SinkCall::Event(event) if event.name.is_standard() => sink.track(event),
            SinkCall::Event(event) => sink.track_custom(event),
        }
    }

    fn relay(&self, event: &ConversionEvent) {
        if self.inner.pixels.is_empty() {
            debug!(event_id = %event.event_id, "no pixels configured, skipping relay");
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(event_id = %event.event_id, "no async runtime, relay delivery skipped");
            return;
        };

        for pixel in &self.inner.pixels {
            let conversion = server_conversion(pixel, event);
            let dispatcher = self.clone();
            self.inner.deliveries.spawn_on(
                async move {
                    if let Err(e) = dispatcher.inner.relay.track_conversion(&conversion).await {
                        warn!(
                            error = %e,
                            pixel_id = %conversion.pixel_id,
                            event_id = %conversion.event_id,
                            "server conversion delivery failed"
                        );
                        dispatcher.lock().server_failures += 1;
                    }
                },
                &handle,
            );
        }
    }

    /// Wait up to `limit` for in-flight relay deliveries. Returns whether
    /// all of them finished.
    pub async fn drain(&self, limit: Duration) -> bool {
        let deliveries = &self.inner.deliveries;
        deliveries.close();
        let finished = tokio::time::timeout(limit, deliveries.wait()).await.is_ok();
        deliveries.reopen();
        finished
    }

    // ── Pixel lifecycle ──────────────────────────────────────────

    /// The pixel finished loading. The first call initializes every pixel;
    /// each call flushes the pending queue in order.
    pub fn mark_ready(&self) {
        let mut state = self.lock();
        if !state.ready {
            state.ready = true;
            state.last_error = None;
            for pixel in &self.inner.pixels {
                state.outbox.push_back(SinkCall::Init(pixel.id.clone()));
            }
            info!(pixels = self.inner.pixels.len(), "pixel ready");
        }

        let pending = std::mem::take(&mut state.pending);
        if !pending.is_empty() {
            debug!(count = pending.len(), "flushing pending conversions");
        }
        state
            .outbox
            .extend(pending.into_iter().map(SinkCall::Event));
        drop(state);

        self.flush_outbox();
    }

    /// The pixel failed to load. Events stay queued.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "pixel failed to load");
        self.lock().last_error = Some(reason);
    }

    /// Watch a pixel load in the background and mark the outcome.
    pub fn load<F, E>(&self, loader: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.lock().script_injected = true;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.mark_failed("no async runtime to load the pixel on");
            return;
        };
        let dispatcher = self.clone();
        handle.spawn(async move {
            match loader.await {
                Ok(()) => dispatcher.mark_ready(),
                Err(e) => dispatcher.mark_failed(e.to_string()),
            }
        });
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn status(&self) -> PixelStatus {
        let state = self.lock();
        PixelStatus {
            pixel_ids: self.inner.pixels.iter().map(|p| p.id.clone()).collect(),
            script_injected: state.script_injected,
            script_loaded: state.ready,
            last_error: state.last_error.clone(),
            pending_count: state.pending.len(),
            server_failures: state.server_failures,
        }
    }
}

// ── Normalization ────────────────────────────────────────────────

fn normalize(
    name: EventName,
    mut params: EventParams,
    user_data: UserData,
    source_url: Option<String>,
    seq: u64,
) -> ConversionEvent {
    let created_at = Utc::now();

    lift_custom_fields(&mut params);
    if params.value.is_some() && params.currency.is_none() {
        params.currency = Some(CURRENCY.to_owned());
    }

    let event_id = params.event_id.clone().unwrap_or_else(|| {
        format!(
            "{}_{}_{}_{seq}",
            name.slug(),
            params.transaction_id.as_deref().unwrap_or("evt"),
            created_at.timestamp_millis(),
        )
    });
    params.event_id = Some(event_id.clone());

    ConversionEvent {
        name,
        event_id,
        params,
        user_data,
        source_url,
        created_at,
    }
}

/// Fold a free-form `value` / `currency` into the typed fields, so the
/// pixel and the relay carry the same amount. Typed fields win.
fn lift_custom_fields(params: &mut EventParams) {
    if let Some(raw) = params.custom.remove("value") {
        let amount = match &raw {
            Value::Number(n) => n.as_f64().and_then(Amount::from_reais_f64),
            Value::String(s) => s.parse::<Amount>().ok(),
            _ => None,
        };
        match (amount, params.value) {
            (Some(amount), None) => params.value = Some(amount),
            (Some(_), Some(_)) => debug!("custom value shadowed by typed value"),
            (None, _) => warn!(value = %raw, "dropping unparseable custom value"),
        }
    }

    if let Some(raw) = params.custom.remove("currency") {
        match raw {
            Value::String(currency) if params.currency.is_none() => {
                params.currency = Some(currency);
            }
            Value::String(_) => debug!("custom currency shadowed by typed currency"),
            other => warn!(currency = %other, "dropping non-string custom currency"),
        }
    }
}

fn server_conversion(pixel: &PixelConfig, event: &ConversionEvent) -> ServerConversion {
    ServerConversion {
        pixel_id: pixel.id.clone(),
        access_token: pixel
            .access_token
            .as_ref()
            .map(|t| t.expose_secret().to_owned()),
        event_name: event.name.to_string(),
        event_id: event.event_id.clone(),
        value: event.params.value.map(|v| v.as_reais()),
        currency: event.params.currency.clone(),
        transaction_id: event.params.transaction_id.clone(),
        customer_email: event.user_data.email.clone(),
        customer_name: event.user_data.full_name(),
        source_url: event.source_url.clone(),
        fbc: event.user_data.fbc.clone(),
        fbp: event.user_data.fbp.clone(),
    }
}
