// donapix-core: Transaction lifecycle and conversion events for PIX checkout popups.

pub mod attribution;
pub mod charge;
pub mod config;
pub mod controller;
pub mod conversion;
pub mod error;
pub mod model;
pub mod poller;
pub mod timer;

// ── Primary re-exports ──────────────────────────────────────────────
pub use attribution::{AttributionResolver, AttributionStore, JsonFileStore, MemoryStore};
pub use charge::{ChargeAccepted, ChargeGenerator, ChargeRequest, PaymentBackend};
pub use config::{CheckoutConfig, PixelConfig, RetryPolicy};
pub use controller::TransactionController;
pub use conversion::{
    ConversionDispatcher, ConversionRelay, ConversionSink, LoggingSink, MAX_PENDING, PixelStatus,
};
pub use error::{ChargeError, CoreError};
pub use poller::{PaymentStatusPoller, PollHandle};
pub use timer::{ExpirationTimer, TimerHandle, format_countdown};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Money
    Amount, AmountParseError, CURRENCY,
    // Attribution
    AttributionContext, TRACKED_PARAMS,
    // Events
    ConversionEvent, CustomerInfo, EventName, EventParams, UserData,
    // Transactions
    QrImage, Transaction, TransactionSnapshot, TransactionStatus,
};
