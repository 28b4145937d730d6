// ── Checkout domain model ──
//
// Every type in this module is the canonical representation of a checkout
// entity. Wire shapes live in donapix-api; these are what the controller,
// the dispatcher and their consumers (UI hosts) depend on.

pub mod amount;
pub mod attribution;
pub mod event;
pub mod transaction;

// ── Re-exports ──────────────────────────────────────────────────────

pub use amount::{Amount, AmountParseError, CURRENCY};
pub use attribution::{AttributionContext, TRACKED_PARAMS};
pub use event::{ConversionEvent, CustomerInfo, EventName, EventParams, UserData};
pub use transaction::{QrImage, Transaction, TransactionSnapshot, TransactionStatus};
