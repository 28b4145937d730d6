// ── Attribution resolution ──
//
// Resolves the campaign context a checkout reports with. Priority:
// explicit context from the host page, then whatever this session already
// captured, then the persisted store. Captures are sticky: a later page
// without tags never erases what an earlier one recorded.

mod store;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};
use url::Url;

pub use store::{AttributionStore, DEFAULT_SESSION_TTL, JsonFileStore, MemoryStore};

use crate::model::{AttributionContext, TRACKED_PARAMS};

const CLICK_COOKIE: &str = "_fbc";
const BROWSER_COOKIE: &str = "_fbp";
const CLICK_PARAM: &str = "fbclid";

#[derive(Debug, Default)]
struct ResolverState {
    captured: Option<AttributionContext>,
    persisted: bool,
}

/// Session-wide attribution resolver.
///
/// Shared by every checkout on the page; cheap to clone.
#[derive(Clone)]
pub struct AttributionResolver {
    store: Arc<dyn AttributionStore>,
    state: Arc<Mutex<ResolverState>>,
}

impl AttributionResolver {
    pub fn new(store: Arc<dyn AttributionStore>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(ResolverState::default())),
        }
    }

    /// Resolver backed by a process-local [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Resolve the context for a checkout.
    ///
    /// An explicit, non-empty context wins and replaces the in-memory one.
    /// The first non-empty resolution of the session is persisted.
    pub fn resolve(&self, explicit: Option<&AttributionContext>) -> AttributionContext {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let resolved = if let Some(ctx) = explicit.filter(|c| !c.is_empty()) {
            debug!("using explicit attribution context");
            state.captured = Some(ctx.clone());
            ctx.clone()
        } else if let Some(ctx) = state.captured.clone().filter(|c| !c.is_empty()) {
            ctx
        } else if let Some(ctx) = self.load_persisted() {
            debug!("restored attribution context from store");
            state.captured = Some(ctx.clone());
            state.persisted = true;
            ctx
        } else {
            AttributionContext::default()
        };

        if !resolved.is_empty() && !state.persisted {
            self.persist(&resolved);
            state.persisted = true;
        }

        resolved
    }

    /// Capture tags from the landing URL and the pixel cookies.
    ///
    /// New keys are merged into the session context; values captured
    /// earlier are kept. The merged context is written to the store.
    pub fn capture(&self, url: &Url, cookies: &BTreeMap<String, String>) -> AttributionContext {
        let fresh = context_from_page(url, cookies);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut context = state
            .captured
            .take()
            .filter(|c| !c.is_empty())
            .or_else(|| self.load_persisted())
            .unwrap_or_default();
        context.merge_missing(&fresh);

        if !context.is_empty() {
            self.persist(&context);
            state.persisted = true;
        }
        state.captured = Some(context.clone());

        debug!(tags = context.utm_params.len(), "captured attribution");
        context
    }

    /// Start a new session: forget the captured context and clear the
    /// store.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = ResolverState::default();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear persisted attribution");
        }
        debug!("attribution session reset");
    }

    fn load_persisted(&self) -> Option<AttributionContext> {
        match self.store.load() {
            Ok(ctx) => ctx.filter(|c| !c.is_empty()),
            Err(e) => {
                warn!(error = %e, "failed to load persisted attribution");
                None
            }
        }
    }

    fn persist(&self, context: &AttributionContext) {
        if let Err(e) = self.store.save(context) {
            warn!(error = %e, "failed to persist attribution");
        }
    }
}

/// Extract tracked tags and identifiers from one page load.
pub fn context_from_page(url: &Url, cookies: &BTreeMap<String, String>) -> AttributionContext {
    let mut context = AttributionContext::default();
    let mut fbclid = None;

    for (key, value) in url.query_pairs() {
        if value.is_empty() {
            continue;
        }
        if TRACKED_PARAMS.contains(&key.as_ref()) {
            context
                .utm_params
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        } else if key == CLICK_PARAM {
            fbclid = Some(value.into_owned());
        }
    }

    context.click_id = cookies
        .get(CLICK_COOKIE)
        .filter(|v| !v.is_empty())
        .cloned()
        .or_else(|| fbclid.map(|id| format!("fb.1.{}.{id}", Utc::now().timestamp_millis())));
    context.browser_id = cookies
        .get(BROWSER_COOKIE)
        .filter(|v| !v.is_empty())
        .cloned();

    context
}

/// Parse a `Cookie` header (`a=1; b=2`) into a map.
pub fn parse_cookie_header(header: &str) -> BTreeMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_owned(), value.trim().to_owned()))
        })
        .collect()
}
