//! Engine configuration.
//!
//! Loaded from a TOML file, with environment variables taking priority:
//!
//! ```toml
//! # hfs.toml
//! variant = "plus_plus"        # full | lite | plus_plus | plus
//! smoothing_factor = 1.0
//! prior_probability = 0.5
//! empty_evidence = "zero"      # zero | neutral
//! parallel = true
//! warm_cache = true
//! ```
//!
//! Environment overrides: `HFS_VARIANT`, `HFS_PARALLEL`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::cpt::{Smoothing, PRIOR_PROBABILITY, SMOOTHING_FACTOR};
use crate::engine::{EmptyEvidence, Variant};
use crate::errors::{HfsError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub variant: Variant,
    pub smoothing_factor: f64,
    pub prior_probability: f64,
    pub empty_evidence: EmptyEvidence,
    /// Score test rows on the rayon pool.
    pub parallel: bool,
    /// Fill the whole CPT cache before scoring.
    pub warm_cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            variant: Variant::default(),
            smoothing_factor: SMOOTHING_FACTOR,
            prior_probability: PRIOR_PROBABILITY,
            empty_evidence: EmptyEvidence::default(),
            parallel: false,
            warm_cache: false,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.smoothing()?;
        Ok(config)
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        debug!("Loaded engine config from {}", path.display());
        Self::from_toml_str(&content)?.with_env_overrides()
    }

    /// Apply `HFS_VARIANT` / `HFS_PARALLEL` from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(variant) = lookup("HFS_VARIANT") {
            self.variant = variant.parse()?;
        }
        if let Some(parallel) = lookup("HFS_PARALLEL") {
            self.parallel = matches!(parallel.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(self)
    }

    /// Validated smoothing constants.
    pub fn smoothing(&self) -> Result<Smoothing> {
        Smoothing::new(self.smoothing_factor, self.prior_probability)
    }
}

impl std::str::FromStr for EngineConfig {
    type Err = HfsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_toml_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.variant, Variant::Full);
        assert_eq!(config.smoothing().unwrap(), Smoothing::default());
        assert_eq!(config.empty_evidence, EmptyEvidence::Zero);
        assert!(!config.parallel);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("variant = \"plus_plus\"\nparallel = true\n").unwrap();
        assert_eq!(config.variant, Variant::PlusPlus);
        assert!(config.parallel);
        assert_eq!(config.smoothing_factor, 1.0);
        assert!(!config.warm_cache);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            EngineConfig::from_toml_str("variant = \"nope\""),
            Err(HfsError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("smoothing_factor = 0.0"),
            Err(HfsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::default()
            .apply_overrides(|key| match key {
                "HFS_VARIANT" => Some("lite".to_string()),
                "HFS_PARALLEL" => Some("true".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.variant, Variant::Lite);
        assert!(config.parallel);

        let bad = EngineConfig::default().apply_overrides(|key| (key == "HFS_VARIANT").then(|| "x".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = EngineConfig {
            variant: Variant::Lite,
            empty_evidence: EmptyEvidence::Neutral,
            ..EngineConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            EngineConfig::load(Path::new("/nonexistent/hfs.toml")),
            Err(HfsError::Io(_))
        ));
    }
}
