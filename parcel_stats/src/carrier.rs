//! Carrier resolution from track numbers.
//!
//! The engine only needs to know *whether* a parcel has a known carrier and
//! which one; unresolved carriers are excluded from carrier-level aggregates
//! but still counted at store level.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::{CarrierRule, EngineConfig};

/// Normalized (trimmed, lowercase) carrier identifier as stored in the
/// `carrier` columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CarrierCode(String);

impl CarrierCode {
    /// Normalize and wrap a code; `None` if it is blank.
    pub fn new(raw: &str) -> Option<Self> {
        let code = raw.trim().to_lowercase();
        (!code.is_empty()).then_some(CarrierCode(code))
    }

    /// Borrow the stored form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CarrierCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides which carrier handles a track number.
pub trait CarrierClassifier {
    /// Resolve a track number; `None` means Unknown.
    fn resolve(&self, track_number: &str) -> Option<CarrierCode>;
}

impl<F> CarrierClassifier for F
where
    F: Fn(&str) -> Option<CarrierCode>,
{
    fn resolve(&self, track_number: &str) -> Option<CarrierCode> {
        self(track_number)
    }
}

/// Classifier driven by the `[carriers]` table of [`EngineConfig`].
///
/// Rules are tried in declaration order; the first whose prefix (and length,
/// if set) matches wins.
#[derive(Debug, Clone, Default)]
pub struct PrefixClassifier {
    rules: IndexMap<CarrierCode, CarrierRule>,
}

impl PrefixClassifier {
    /// Build from an already-normalized config.
    pub fn from_config(cfg: &EngineConfig) -> Self {
        let rules = cfg
            .carriers
            .iter()
            .filter_map(|(code, rule)| CarrierCode::new(code).map(|c| (c, rule.clone())))
            .collect();
        PrefixClassifier { rules }
    }

    /// Number of configured carriers.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no carrier is configured (everything resolves to Unknown).
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl CarrierClassifier for PrefixClassifier {
    fn resolve(&self, track_number: &str) -> Option<CarrierCode> {
        let track = track_number.trim().to_uppercase();
        if track.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|(_, rule)| {
                rule.length.is_none_or(|len| track.chars().count() == len)
                    && rule.prefixes.iter().any(|p| track.starts_with(p.as_str()))
            })
            .map(|(code, _)| code.clone())
    }
}
