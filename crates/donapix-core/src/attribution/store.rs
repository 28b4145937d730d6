// ── Attribution persistence ──
//
// Session-scoped storage for the captured attribution context. Loads and
// saves are synchronous: they stand in for browser session storage.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::model::AttributionContext;

/// How long a file-backed session keeps its attribution by default.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Where a session's attribution survives popup close/reopen.
pub trait AttributionStore: Send + Sync {
    fn load(&self) -> Result<Option<AttributionContext>, CoreError>;
    fn save(&self, context: &AttributionContext) -> Result<(), CoreError>;
    /// Forget the stored context, starting a new session.
    fn clear(&self) -> Result<(), CoreError>;
}

/// Process-local store. Lives as long as the host keeps it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<AttributionContext>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<AttributionContext>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AttributionStore for MemoryStore {
    fn load(&self) -> Result<Option<AttributionContext>, CoreError> {
        Ok(self.slot().clone())
    }

    fn save(&self, context: &AttributionContext) -> Result<(), CoreError> {
        *self.slot() = Some(context.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CoreError> {
        self.slot().take();
        Ok(())
    }
}

/// On-disk form: the context plus the time its session started. Files
/// written without a timestamp count as expired.
#[derive(Debug, Serialize, Deserialize)]
struct StoredContext {
    #[serde(default)]
    captured_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    context: AttributionContext,
}

/// JSON file store, for hosts whose "session" outlives the process.
///
/// A session lasts `ttl` from its first save; later saves keep the start
/// time. Expired entries load as `None`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    ttl: Duration,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn read(&self) -> Result<Option<StoredContext>, CoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CoreError::Storage(e.to_string())),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CoreError::Storage(format!("{}: {e}", self.path.display())))
    }

    /// Start time of the stored session, if it has not expired.
    fn live_since(&self, stored: &StoredContext, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let captured_at = stored.captured_at?;
        let ttl = TimeDelta::from_std(self.ttl).unwrap_or(TimeDelta::MAX);
        let age = now.signed_duration_since(captured_at);
        (age < ttl).then_some(captured_at)
    }
}

impl AttributionStore for JsonFileStore {
    fn load(&self) -> Result<Option<AttributionContext>, CoreError> {
        let Some(stored) = self.read()? else {
            return Ok(None);
        };
        if self.live_since(&stored, Utc::now()).is_none() {
            debug!(path = %self.path.display(), "stored attribution expired");
            return Ok(None);
        }
        Ok(Some(stored.context))
    }

    fn save(&self, context: &AttributionContext) -> Result<(), CoreError> {
        let now = Utc::now();
        let captured_at = self
            .read()
            .ok()
            .flatten()
            .and_then(|stored| self.live_since(&stored, now))
            .unwrap_or(now);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::Storage(e.to_string()))?;
        }
        let stored = StoredContext {
            captured_at: Some(captured_at),
            context: context.clone(),
        };
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| CoreError::Storage(e.to_string()))
    }

    fn clear(&self) -> Result<(), CoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Storage(e.to_string())),
        }
    }
}
