// ── Delivery seams ──
//
// The dispatcher talks to the browser pixel through `ConversionSink` and
// to the server relay through `ConversionRelay`. Neither is ever a global.

use async_trait::async_trait;
use tracing::info;

use donapix_api::{RelayClient, ServerConversion};

use crate::model::ConversionEvent;

/// Client-side pixel API (`init` / `track` / `trackCustom`).
///
/// Calls are fire-and-forget and arrive in dispatch order. They are made
/// without any dispatcher lock held, so an implementation may read
/// `status()` or dispatch follow-up events.
pub trait ConversionSink: Send + Sync {
    fn init(&self, pixel_id: &str);
    /// Standard event. `event.event_id` goes out as the pixel's `eventID`.
    fn track(&self, event: &ConversionEvent);
    /// Custom event.
    fn track_custom(&self, event: &ConversionEvent);
}

/// Server-side conversion delivery.
#[async_trait]
pub trait ConversionRelay: Send + Sync {
    async fn track_conversion(
        &self,
        conversion: &ServerConversion,
    ) -> Result<(), donapix_api::Error>;
}

#[async_trait]
impl ConversionRelay for RelayClient {
    async fn track_conversion(
        &self,
        conversion: &ServerConversion,
    ) -> Result<(), donapix_api::Error> {
        RelayClient::track_conversion(self, conversion).await
    }
}

/// Sink for headless hosts: every pixel call becomes a tracing record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl ConversionSink for LoggingSink {
    fn init(&self, pixel_id: &str) {
        info!(pixel_id, "pixel initialized");
    }

    fn track(&self, event: &ConversionEvent) {
        info!(
            event = %event.name,
            event_id = %event.event_id,
            params = %event.params.to_json(),
            "pixel track"
        );
    }

    fn track_custom(&self, event: &ConversionEvent) {
        info!(
            event = %event.name,
            event_id = %event.event_id,
            params = %event.params.to_json(),
            "pixel trackCustom"
        );
    }
}
