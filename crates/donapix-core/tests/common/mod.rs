// Shared test doubles: a scripted payment backend, a recording pixel sink
// and a recording relay.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use donapix_api::{CreateChargeRequest, CreateChargeResponse, PaymentStatus, ServerConversion};
use donapix_core::{
    AttributionResolver, CheckoutConfig, ConversionDispatcher, ConversionEvent, ConversionRelay,
    ConversionSink, EventName, PaymentBackend, PixelConfig, TransactionController,
};

// ── Payment backend ──────────────────────────────────────────────

type ChargeResult = Result<CreateChargeResponse, donapix_api::Error>;
type StatusResult = Result<PaymentStatus, donapix_api::Error>;

/// Backend answering from scripted queues. An exhausted charge queue
/// answers with a fresh transaction; an exhausted status queue answers
/// `pending`.
#[derive(Default)]
pub struct ScriptedBackend {
    charges: Mutex<VecDeque<ChargeResult>>,
    statuses: Mutex<VecDeque<StatusResult>>,
    charge_delay: Mutex<Option<Duration>>,
    status_delay: Mutex<Option<Duration>>,
    pub charge_requests: Mutex<Vec<CreateChargeRequest>>,
    pub status_queries: Mutex<Vec<String>>,
    create_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_charge(&self, result: ChargeResult) {
        self.charges.lock().unwrap().push_back(result);
    }

    pub fn push_status(&self, result: StatusResult) {
        self.statuses.lock().unwrap().push_back(result);
    }

    pub fn push_statuses(&self, statuses: &[PaymentStatus]) {
        for status in statuses {
            self.push_status(Ok(*status));
        }
    }

    pub fn delay_charges(&self, delay: Duration) {
        *self.charge_delay.lock().unwrap() = Some(delay);
    }

    pub fn delay_statuses(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = Some(delay);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_queries.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentBackend for ScriptedBackend {
    async fn create_charge(&self, request: &CreateChargeRequest) -> ChargeResult {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.charge_requests.lock().unwrap().push(request.clone());
        let delay = *self.charge_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.charges.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(charge(&format!("tx_{call}"))))
    }

    async fn charge_status(&self, transaction_id: &str) -> StatusResult {
        self.status_queries
            .lock()
            .unwrap()
            .push(transaction_id.to_owned());
        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.statuses.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(PaymentStatus::Pending))
    }
}

pub fn charge(transaction_id: &str) -> CreateChargeResponse {
    CreateChargeResponse {
        pix_code: Some(format!("00020126-{transaction_id}")),
        qr_code_url: Some(format!("https://qr.example/{transaction_id}.png")),
        transaction_id: Some(transaction_id.to_owned()),
    }
}

pub fn rate_limited(message: &str) -> donapix_api::Error {
    donapix_api::Error::RateLimited {
        message: message.to_owned(),
    }
}

pub fn server_error() -> donapix_api::Error {
    donapix_api::Error::Backend {
        status: 502,
        message: "bad gateway".into(),
    }
}

// ── Pixel sink ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Init(String),
    Track(ConversionEvent),
    TrackCustom(ConversionEvent),
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Delivered events, in order, regardless of `track` / `trackCustom`.
    pub fn events(&self) -> Vec<ConversionEvent> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Track(e) | SinkCall::TrackCustom(e) => Some(e),
                SinkCall::Init(_) => None,
            })
            .collect()
    }

    pub fn events_named(&self, name: &EventName) -> Vec<ConversionEvent> {
        self.events()
            .into_iter()
            .filter(|e| &e.name == name)
            .collect()
    }

    pub fn inits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Init(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

impl ConversionSink for RecordingSink {
    fn init(&self, pixel_id: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Init(pixel_id.to_owned()));
    }

    fn track(&self, event: &ConversionEvent) {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Track(event.clone()));
    }

    fn track_custom(&self, event: &ConversionEvent) {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::TrackCustom(event.clone()));
    }
}

// ── Relay ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingRelay {
    sent: Mutex<Vec<ServerConversion>>,
    failing: AtomicBool,
}

impl RecordingRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<ServerConversion> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversionRelay for RecordingRelay {
    async fn track_conversion(
        &self,
        conversion: &ServerConversion,
    ) -> Result<(), donapix_api::Error> {
        self.sent.lock().unwrap().push(conversion.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        Ok(())
    }
}

// ── Harness ──────────────────────────────────────────────────────

pub const PIXEL_ID: &str = "1234567890";

pub fn test_config() -> CheckoutConfig {
    CheckoutConfig {
        expiry: Duration::from_secs(15 * 60),
        poll_interval: Duration::from_secs(3),
        tick: Duration::from_secs(1),
        content_name: Some("Doação".into()),
        pixels: vec![PixelConfig::new(PIXEL_ID)],
        ..CheckoutConfig::default()
    }
}

pub fn dispatcher(
    pixels: &[&str],
    sink: Arc<RecordingSink>,
    relay: Arc<RecordingRelay>,
) -> ConversionDispatcher {
    ConversionDispatcher::new(
        pixels.iter().map(|id| PixelConfig::new(*id)).collect(),
        None,
        sink,
        relay,
    )
}

pub struct Harness {
    pub controller: TransactionController,
    pub backend: Arc<ScriptedBackend>,
    pub sink: Arc<RecordingSink>,
    pub relay: Arc<RecordingRelay>,
}

impl Harness {
    /// Controller with a ready pixel, so sink calls are observable directly.
    pub fn new(config: CheckoutConfig) -> Self {
        let backend = ScriptedBackend::new();
        let sink = RecordingSink::new();
        let relay = RecordingRelay::new();
        let dispatcher = ConversionDispatcher::new(
            config.pixels.clone(),
            config.source_url.as_ref(),
            sink.clone(),
            relay.clone(),
        );
        dispatcher.mark_ready();
        let controller = TransactionController::new(
            config,
            backend.clone(),
            dispatcher,
            AttributionResolver::in_memory(),
        );
        Self {
            controller,
            backend,
            sink,
            relay,
        }
    }
}

/// Let spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock, then let woken tasks finish.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}
