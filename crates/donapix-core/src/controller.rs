// ── Transaction controller ──
//
// State machine for one checkout popup:
//
//   Idle ─generate─▶ Generating ─ok─▶ AwaitingPayment ─paid─▶ Paid
//     ▲                  │                  │
//     └──────failure─────┘                  └─deadline─▶ Expired ─generate─▶ …
//
// Every transition happens under the session mutex, and conversion
// events go out only after it is released. Timer and poller callbacks
// carry the epoch they were started in; `close` and `regenerate` bump the
// epoch so stale callbacks fall through.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::attribution::AttributionResolver;
use crate::charge::{ChargeGenerator, ChargeRequest, PaymentBackend};
use crate::config::CheckoutConfig;
use crate::conversion::ConversionDispatcher;
use crate::error::CoreError;
use crate::model::{
    Amount, AttributionContext, CURRENCY, CustomerInfo, EventName, EventParams, QrImage,
    Transaction, TransactionSnapshot, TransactionStatus, UserData,
};
use crate::poller::PaymentStatusPoller;
use crate::timer::{ExpirationTimer, format_countdown};

#[derive(Debug, Default)]
struct Session {
    epoch: u64,
    snapshot: TransactionSnapshot,
    /// Identity fields of the current charge, reused for `Purchase`.
    user_data: UserData,
    explicit_attribution: Option<AttributionContext>,
}

/// Checkout orchestrator. Cheaply cloneable via `Arc<ControllerInner>`.
#[derive(Clone)]
pub struct TransactionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: CheckoutConfig,
    generator: ChargeGenerator,
    timer: ExpirationTimer,
    poller: PaymentStatusPoller,
    dispatcher: ConversionDispatcher,
    attribution: AttributionResolver,
    state_tx: watch::Sender<TransactionSnapshot>,
    session: Mutex<Session>,
}

impl ControllerInner {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, session: &Session) {
        self.state_tx.send_replace(session.snapshot.clone());
    }

    fn set_status(&self, session: &mut Session, status: TransactionStatus) {
        session.snapshot.status = status;
        if let Some(tx) = session.snapshot.transaction.as_mut() {
            tx.status = status;
        }
        self.publish(session);
    }

    fn stop_tasks(&self) {
        self.timer.stop();
        self.poller.stop();
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

impl TransactionController {
    pub fn new(
        config: CheckoutConfig,
        backend: Arc<dyn PaymentBackend>,
        dispatcher: ConversionDispatcher,
        attribution: AttributionResolver,
    ) -> Self {
        let generator = ChargeGenerator::new(Arc::clone(&backend), config.retry);
        let timer = ExpirationTimer::new(config.tick);
        let poller = PaymentStatusPoller::new(backend, config.poll_interval);
        let (state_tx, _) = watch::channel(TransactionSnapshot::default());

        Self {
            inner: Arc::new(ControllerInner {
                config,
                generator,
                timer,
                poller,
                dispatcher,
                attribution,
                state_tx,
                session: Mutex::new(Session::default()),
            }),
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &ConversionDispatcher {
        &self.inner.dispatcher
    }

    pub fn attribution(&self) -> &AttributionResolver {
        &self.inner.attribution
    }

    /// Attribution supplied by the host page. Takes priority over captured
    /// and persisted context for every later charge and event.
    pub fn set_attribution(&self, context: AttributionContext) {
        self.inner.lock().explicit_attribution = Some(context);
    }

    fn resolve_attribution(&self) -> AttributionContext {
        let explicit = self.inner.lock().explicit_attribution.clone();
        self.inner.attribution.resolve(explicit.as_ref())
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Generate a charge for `amount`.
    ///
    /// Allowed from `Idle` and `Expired`. On failure the controller returns
    /// to `Idle` with the error on the snapshot.
    pub async fn generate(
        &self,
        amount: Amount,
        customer: CustomerInfo,
    ) -> Result<Transaction, CoreError> {
        if !amount.is_positive() {
            return Err(CoreError::InvalidAmount {
                message: "amount must be greater than zero".into(),
            });
        }

        let attribution = self.resolve_attribution();
        let user_data = UserData::from_customer(&customer, &attribution);

        let epoch = {
            let mut session = self.inner.lock();
            check_can_generate(&session.snapshot)?;
            session.epoch += 1;
            session.snapshot = TransactionSnapshot {
                status: TransactionStatus::Generating,
                amount: Some(amount),
                transaction: None,
                last_error: None,
            };
            session.user_data = user_data.clone();
            self.inner.publish(&session);
            session.epoch
        };
        debug!(amount = %amount, epoch, "generating charge");

        let request = ChargeRequest {
            amount,
            attribution,
            customer,
            popup_variant: self.inner.config.popup_variant.clone(),
            offer_id: self.inner.config.offer_id.clone(),
        };
        let result = self.inner.generator.generate(&request).await;

        let mut session = self.inner.lock();
        if session.epoch != epoch {
            debug!(
                epoch,
                "checkout closed during generation, discarding result"
            );
            return Err(CoreError::Cancelled);
        }

        let accepted = match result {
            Ok(accepted) => accepted,
            Err(e) => {
                session.snapshot = TransactionSnapshot {
                    status: TransactionStatus::Idle,
                    amount: Some(amount),
                    transaction: None,
                    last_error: Some(e.clone()),
                };
                self.inner.publish(&session);
                return Err(e.into());
            }
        };

        let created_at = Utc::now();
        let transaction = Transaction {
            id: accepted.transaction_id,
            amount,
            code: accepted.code,
            qr_image: QrImage::from_url(accepted.qr_image_url),
            status: TransactionStatus::AwaitingPayment,
            created_at,
            expires_at: expires_at(created_at, self.inner.config.expiry),
        };
        session.snapshot = TransactionSnapshot {
            status: TransactionStatus::AwaitingPayment,
            amount: Some(amount),
            transaction: Some(transaction.clone()),
            last_error: None,
        };
        self.inner.publish(&session);
        let user_data = session.user_data.clone();
        drop(session);

        let mut params = EventParams::new()
            .value(amount)
            .currency(CURRENCY)
            .transaction_id(transaction.id.clone());
        if let Some(name) = &self.inner.config.content_name {
            params = params.content_name(name.clone());
        }
        self.inner
            .dispatcher
            .dispatch(EventName::PixGenerated, params, user_data);

        let session = self.inner.lock();
        if session.epoch != epoch || !session.snapshot.status.is_waiting() {
            debug!(epoch, "checkout closed before payment tracking started");
            return Err(CoreError::Cancelled);
        }
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .timer
            .start(self.inner.config.expiry, move || on_expired(&weak, epoch));
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .poller
            .start(transaction.id.as_str(), move || on_paid(&weak, epoch));
        drop(session);

        info!(transaction_id = %transaction.id, amount = %amount, "awaiting payment");
        Ok(transaction)
    }

    /// Discard the current charge and generate a new one.
    pub async fn regenerate(
        &self,
        amount: Amount,
        customer: CustomerInfo,
    ) -> Result<Transaction, CoreError> {
        {
            let mut session = self.inner.lock();
            match session.snapshot.status {
                TransactionStatus::Generating => return Err(CoreError::GenerationInProgress),
                TransactionStatus::Paid => {
                    return Err(CoreError::AlreadyPaid {
                        transaction_id: session
                            .snapshot
                            .transaction_id()
                            .unwrap_or_default()
                            .into(),
                    });
                }
                _ => {}
            }
            self.reset(&mut session);
        }
        self.generate(amount, customer).await
    }

    /// Close the popup: stop everything and return to `Idle`.
    pub fn close(&self) {
        let mut session = self.inner.lock();
        self.reset(&mut session);
        debug!(epoch = session.epoch, "checkout closed");
    }

    fn reset(&self, session: &mut Session) {
        session.epoch += 1;
        self.inner.stop_tasks();
        session.snapshot = TransactionSnapshot::default();
        self.inner.publish(session);
    }

    /// Report that the user committed to an amount. Returns the event id.
    pub fn initiate_checkout(&self, amount: Amount, customer: &CustomerInfo) -> String {
        let attribution = self.resolve_attribution();
        let mut params = EventParams::new().value(amount).currency(CURRENCY);
        if let Some(name) = &self.inner.config.content_name {
            params = params.content_name(name.clone());
        }
        self.inner.dispatcher.dispatch(
            EventName::InitiateCheckout,
            params,
            UserData::from_customer(customer, &attribution),
        )
    }

    // ── Observation ──────────────────────────────────────────────

    /// Snapshot stream, one value per transition.
    pub fn state(&self) -> watch::Receiver<TransactionSnapshot> {
        self.inner.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> TransactionSnapshot {
        self.inner.lock().snapshot.clone()
    }

    /// Time left on the current charge while it awaits payment.
    pub fn remaining(&self) -> Option<Duration> {
        let session = self.inner.lock();
        if session.snapshot.status.is_waiting() {
            self.inner.timer.remaining()
        } else {
            None
        }
    }

    /// Remaining time as `mm:ss`.
    pub fn countdown(&self) -> Option<String> {
        self.remaining().map(format_countdown)
    }

    /// Countdown ticks of the current charge.
    pub fn countdown_ticks(&self) -> Option<watch::Receiver<Duration>> {
        self.inner.timer.subscribe()
    }
}

fn check_can_generate(snapshot: &TransactionSnapshot) -> Result<(), CoreError> {
    let transaction_id = || snapshot.transaction_id().unwrap_or_default().to_owned();
    match snapshot.status {
        TransactionStatus::Idle | TransactionStatus::Expired | TransactionStatus::Failed => Ok(()),
        TransactionStatus::Generating => Err(CoreError::GenerationInProgress),
        TransactionStatus::AwaitingPayment => Err(CoreError::ChargeActive {
            transaction_id: transaction_id(),
        }),
        TransactionStatus::Paid => Err(CoreError::AlreadyPaid {
            transaction_id: transaction_id(),
        }),
    }
}

fn expires_at(created_at: DateTime<Utc>, expiry: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(expiry)
        .ok()
        .and_then(|delta| created_at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ── Task callbacks ───────────────────────────────────────────────

fn on_expired(weak: &Weak<ControllerInner>, epoch: u64) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let mut session = inner.lock();
    if session.epoch != epoch || !session.snapshot.status.is_waiting() {
        debug!(epoch, "stale expiration ignored");
        return;
    }

    inner.poller.stop();
    inner.set_status(&mut session, TransactionStatus::Expired);
    info!(
        transaction_id = session.snapshot.transaction_id().unwrap_or_default(),
        "charge expired"
    );
}

fn on_paid(weak: &Weak<ControllerInner>, epoch: u64) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let mut session = inner.lock();
    if session.epoch != epoch || !session.snapshot.status.is_waiting() {
        debug!(epoch, "stale payment confirmation ignored");
        return;
    }

    if inner.timer.remaining().is_some_and(|r| r.is_zero()) {
        warn!(
            transaction_id = session.snapshot.transaction_id().unwrap_or_default(),
            "payment confirmed at the deadline, treating charge as expired"
        );
        inner.stop_tasks();
        inner.set_status(&mut session, TransactionStatus::Expired);
        return;
    }

    inner.timer.stop();
    inner.poller.stop();
    inner.set_status(&mut session, TransactionStatus::Paid);

    let Some(transaction) = session.snapshot.transaction.clone() else {
        return;
    };
    let user_data = session.user_data.clone();
    drop(session);
    info!(
        transaction_id = %transaction.id,
        amount = %transaction.amount,
        "payment confirmed"
    );

    let params = EventParams::new()
        .value(transaction.amount)
        .currency(CURRENCY)
        .transaction_id(transaction.id);
    inner
        .dispatcher
        .dispatch(EventName::Purchase, params, user_data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_guard_follows_status() {
        let mut snapshot = TransactionSnapshot::default();
        assert!(check_can_generate(&snapshot).is_ok());

        snapshot.status = TransactionStatus::Expired;
        assert!(check_can_generate(&snapshot).is_ok());

        snapshot.status = TransactionStatus::Generating;
        assert!(matches!(
            check_can_generate(&snapshot),
            Err(CoreError::GenerationInProgress)
        ));

        snapshot.status = TransactionStatus::AwaitingPayment;
        assert!(matches!(
            check_can_generate(&snapshot),
            Err(CoreError::ChargeActive { .. })
        ));

        snapshot.status = TransactionStatus::Paid;
        assert!(matches!(
            check_can_generate(&snapshot),
            Err(CoreError::AlreadyPaid { .. })
        ));
    }

    #[test]
    fn expiry_is_added_to_creation_time() {
        let created = Utc::now();
        let expires = expires_at(created, Duration::from_secs(900));
        assert_eq!((expires - created).num_seconds(), 900);
        assert_eq!(expires_at(created, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
