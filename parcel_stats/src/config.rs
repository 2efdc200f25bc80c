//! Engine configuration: parsing, normalization, and loading.
//!
//! The TOML file describes where the database lives, which zone period queries
//! default to, and how track numbers map to carriers:
//!
//! ```toml
//! database_url = "stats.db"
//! default_zone = "Europe/Minsk"
//!
//! [carriers.belpost]
//! name = "Belpost"
//! prefixes = ["RB", "CP", "LP"]
//! length = 13
//!
//! [carriers.evropochta]
//! prefixes = ["BY"]
//! length = 16
//! ```
//!
//! Key behaviors:
//! - Carrier codes are trimmed and lowercased; two codes colliding after that
//!   is an error.
//! - Prefixes are trimmed, uppercased and de-duplicated, preserving order.
//!   A carrier without prefixes can never match and is rejected.
//! - Carrier order is kept (IndexMap, with toml's `preserve_order`): the classifier
//!   tries rules top to bottom.
//! - `default_zone` must be a valid IANA name.

use std::collections::HashSet;

use anyhow::{Context, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::tz;

fn default_zone() -> String {
    "UTC".to_string()
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// SQLite path or URL. Falls back to `DATABASE_URL` when absent.
    pub database_url: Option<String>,
    /// IANA zone used when a query does not name one.
    #[serde(default = "default_zone")]
    pub default_zone: String,
    /// Map of carrier code -> track-number rule.
    #[serde(default)]
    pub carriers: IndexMap<String, CarrierRule>,
}

/// How to recognise one carrier's track numbers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CarrierRule {
    /// Human-readable name (e.g., "Belpost").
    pub name: Option<String>,
    /// Track-number prefixes; any match selects the carrier.
    pub prefixes: Vec<String>,
    /// Exact track-number length, when the format fixes one.
    pub length: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_url: None,
            default_zone: default_zone(),
            carriers: IndexMap::new(),
        }
    }
}

/// Summary of changes performed during normalization.
#[derive(Debug, Default)]
pub struct NormalizationReport {
    /// Number of carrier keys that changed when lowercasing/trimming.
    pub carriers_renamed: usize,
    /// Count of removed duplicate prefixes.
    pub prefixes_deduped: usize,
}

/// Normalize a config in place.
///
/// Errors:
/// - Empty or duplicate carrier codes after normalization
/// - A carrier with no usable prefix
/// - An unknown `default_zone`
pub fn normalize_config(cfg: &mut EngineConfig) -> anyhow::Result<NormalizationReport> {
    let mut report = NormalizationReport::default();

    tz::parse_zone(&cfg.default_zone)?;
    cfg.default_zone = cfg.default_zone.trim().to_string();

    let mut rebuilt: IndexMap<String, CarrierRule> = IndexMap::new();
    for (raw_code, mut rule) in std::mem::take(&mut cfg.carriers) {
        let code = raw_code.trim().to_lowercase();
        if code.is_empty() {
            bail!("carrier code cannot be empty after trimming");
        }
        if code != raw_code {
            report.carriers_renamed += 1;
        }
        if rebuilt.contains_key(&code) {
            bail!("duplicate carrier code after normalization: {code}");
        }

        let before = rule.prefixes.len();
        let mut seen = HashSet::new();
        let mut prefixes = Vec::with_capacity(before);
        for p in std::mem::take(&mut rule.prefixes) {
            let p = p.trim().to_uppercase();
            if p.is_empty() {
                continue;
            }
            if seen.insert(p.clone()) {
                prefixes.push(p);
            }
        }
        if prefixes.is_empty() {
            bail!("carrier '{code}' has no prefixes");
        }
        report.prefixes_deduped += before.saturating_sub(prefixes.len());
        rule.prefixes = prefixes;
        rebuilt.insert(code, rule);
    }

    cfg.carriers = rebuilt;
    Ok(report)
}

/// Parse and normalize a config from a TOML string.
pub fn load_config_str(toml_str: &str) -> anyhow::Result<EngineConfig> {
    let mut cfg: EngineConfig = toml::from_str(toml_str).context("failed to parse config TOML")?;
    let report = normalize_config(&mut cfg).context("normalize_config failed")?;
    tracing::debug!(?report, "config normalized");
    Ok(cfg)
}

/// Read a config TOML file from disk, parse, and normalize it.
pub fn load_config_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<EngineConfig> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read config file {}", path.as_ref().display()))?;
    load_config_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        database_url = "stats.db"
        default_zone = "Europe/Minsk"

        [carriers." BelPost "]
        name = "Belpost"
        prefixes = ["rb", "RB ", "cp"]
        length = 13

        [carriers.evropochta]
        prefixes = ["BY"]
    "#;

    #[test]
    fn normalizes_codes_and_prefixes() {
        let cfg = load_config_str(SAMPLE).unwrap();
        let codes: Vec<_> = cfg.carriers.keys().cloned().collect();
        assert_eq!(codes, vec!["belpost", "evropochta"]);
        assert_eq!(cfg.carriers["belpost"].prefixes, vec!["RB", "CP"]);
        assert_eq!(cfg.carriers["belpost"].length, Some(13));
        assert_eq!(cfg.default_zone, "Europe/Minsk");
    }

    #[test]
    fn carrier_order_follows_the_file_not_the_alphabet() {
        let cfg = load_config_str(
            r#"
            [carriers.zeta]
            prefixes = ["Z"]
            [carriers.mid]
            prefixes = ["M"]
            [carriers.alpha]
            prefixes = ["A"]
        "#,
        )
        .unwrap();
        let codes: Vec<_> = cfg.carriers.keys().map(String::as_str).collect();
        assert_eq!(codes, ["zeta", "mid", "alpha"]);
    }

    #[test]
    fn defaults_apply() {
        let cfg = load_config_str("").unwrap();
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.default_zone, "UTC");
        assert!(cfg.carriers.is_empty());
    }

    #[test]
    fn rejects_bad_zone_and_collisions() {
        let err = load_config_str(r#"default_zone = "Nowhere/Land""#).unwrap_err();
        assert!(format!("{err:#}").contains("unknown time zone"));

        let err = load_config_str(
            r#"
            [carriers.CDEK]
            prefixes = ["1"]
            [carriers.cdek]
            prefixes = ["2"]
        "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("duplicate carrier code"));
    }

    #[test]
    fn rejects_unknown_fields_and_empty_prefixes() {
        assert!(load_config_str("colour = \"blue\"").is_err());
        let err = load_config_str(
            r#"
            [carriers.dpd]
            prefixes = ["  "]
        "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("no prefixes"));
    }
}
