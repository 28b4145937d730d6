// donapix-api: Async Rust clients for the PIX charge backend and the conversion relay

pub mod error;
pub mod pix;
pub mod relay;
pub mod transport;

pub use error::Error;
pub use pix::PixClient;
pub use pix::models::{
    ChargeStatusResponse, CreateChargeRequest, CreateChargeResponse, PaymentStatus,
};
pub use relay::{RelayClient, ServerConversion};
pub use transport::TransportConfig;
