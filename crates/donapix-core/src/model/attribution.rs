// ── Campaign attribution ──

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// URL query parameters captured as campaign tags.
///
/// The standard UTM set plus the `src`/`sck`/`xcod` tags used by Brazilian
/// affiliate trackers.
pub const TRACKED_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "src",
    "sck",
    "xcod",
];

/// Attribution parameters for one browsing session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionContext {
    /// Campaign tag name → value.
    #[serde(default)]
    pub utm_params: BTreeMap<String, String>,
    /// Click identifier (`_fbc` cookie or synthesized from `fbclid`).
    #[serde(default)]
    pub click_id: Option<String>,
    /// Browser identifier (`_fbp` cookie).
    #[serde(default)]
    pub browser_id: Option<String>,
    /// Destination pixel identifiers.
    #[serde(default)]
    pub pixel_ids: BTreeSet<String>,
}

impl AttributionContext {
    pub fn is_empty(&self) -> bool {
        self.utm_params.is_empty()
            && self.click_id.is_none()
            && self.browser_id.is_none()
            && self.pixel_ids.is_empty()
    }

    /// Fill in everything `other` has that `self` lacks. Values already
    /// present in `self` are never replaced.
    pub fn merge_missing(&mut self, other: &Self) {
        for (key, value) in &other.utm_params {
            self.utm_params
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if self.click_id.is_none() {
            self.click_id.clone_from(&other.click_id);
        }
        if self.browser_id.is_none() {
            self.browser_id.clone_from(&other.browser_id);
        }
        self.pixel_ids.extend(other.pixel_ids.iter().cloned());
    }

    pub fn utm(&self, key: &str) -> Option<&str> {
        self.utm_params.get(key).map(String::as_str)
    }
}
