//! Detector configuration
//!
//! Scoring weights, pass multipliers and thresholds are empirical and tuned
//! per deployment, so they live in a TOML file rather than in code.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for an override (explicit path, or ~/.local/share/recur/config/detector.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Keys missing from an override keep their default values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::GroupingPass;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/detector.toml");

/// Default number of days of history a run covers (five years)
pub const DEFAULT_LOOKBACK_DAYS: u32 = 1825;

/// Weights and gates for per-frequency confidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringConfig {
    pub interval_weight: f64,
    pub amount_weight: f64,
    pub occurrence_weight: f64,
    /// Allowed relative deviation from the nominal interval
    pub interval_tolerance: f64,
    /// Allowed relative amount spread
    pub amount_tolerance: f64,
    /// Calibrated confidence needed for a frequency to be eligible
    pub min_confidence: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            interval_weight: 0.5,
            amount_weight: 0.3,
            occurrence_weight: 0.2,
            interval_tolerance: 0.30,
            amount_tolerance: 0.05,
            min_confidence: 0.60,
        }
    }
}

/// Weights of the composite score used to pick one frequency per group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeWeights {
    pub confidence_weight: f64,
    pub priority_weight: f64,
    pub occurrence_weight: f64,
    pub interval_accuracy_weight: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            confidence_weight: 0.5,
            priority_weight: 0.2,
            occurrence_weight: 0.2,
            interval_accuracy_weight: 0.1,
        }
    }
}

/// Reliability multiplier applied to groups from each pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassMultipliers {
    pub partner_info: f64,
    pub merchant_info: f64,
    pub description_fuzzy: f64,
}

impl PassMultipliers {
    pub fn for_pass(&self, pass: GroupingPass) -> f64 {
        match pass {
            GroupingPass::PartnerInfo => self.partner_info,
            GroupingPass::MerchantInfo => self.merchant_info,
            GroupingPass::DescriptionFuzzy => self.description_fuzzy,
        }
    }
}

impl Default for PassMultipliers {
    fn default() -> Self {
        Self {
            partner_info: 1.0,
            merchant_info: 0.85,
            description_fuzzy: 0.65,
        }
    }
}

/// Fuzzy description matching settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuzzyConfig {
    /// Minimum similarity for two texts to share a group
    pub threshold: f64,
    /// Normalized text shorter than this is ungroupable
    pub min_text_len: usize,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            min_text_len: 3,
        }
    }
}

/// Complete detector configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorConfig {
    pub lookback_days: u32,
    pub scoring: ScoringConfig,
    pub composite: CompositeWeights,
    pub passes: PassMultipliers,
    pub fuzzy: FuzzyConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            scoring: ScoringConfig::default(),
            composite: CompositeWeights::default(),
            passes: PassMultipliers::default(),
            fuzzy: FuzzyConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Load from the default override location, falling back to embedded defaults
    pub fn load() -> Result<Self> {
        let content = match default_config_path() {
            Some(path) if path.exists() => fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?,
            _ => DEFAULT_CONFIG.to_string(),
        };
        Self::from_toml(&content)
    }

    /// Load an explicit override file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Config file {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse TOML content on top of the built-in defaults and validate it
    pub fn from_toml(content: &str) -> Result<Self> {
        let config = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(format!("Failed to render config: {}", e)))
    }

    /// Reject values that would break scoring invariants
    ///
    /// Multipliers above 1.0 would let calibrated confidence exceed raw confidence.
    pub fn validate(&self) -> Result<()> {
        if self.lookback_days == 0 {
            return Err(Error::Config("lookback_days must be positive".into()));
        }

        let unit_values = [
            ("scoring.interval_weight", self.scoring.interval_weight),
            ("scoring.amount_weight", self.scoring.amount_weight),
            ("scoring.occurrence_weight", self.scoring.occurrence_weight),
            ("scoring.min_confidence", self.scoring.min_confidence),
            ("composite.confidence_weight", self.composite.confidence_weight),
            ("composite.priority_weight", self.composite.priority_weight),
            ("composite.occurrence_weight", self.composite.occurrence_weight),
            (
                "composite.interval_accuracy_weight",
                self.composite.interval_accuracy_weight,
            ),
            ("fuzzy.threshold", self.fuzzy.threshold),
        ];
        for (name, value) in unit_values {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be between 0 and 1 (got {})",
                    name, value
                )));
            }
        }

        let multipliers = [
            ("passes.partner_info", self.passes.partner_info),
            ("passes.merchant_info", self.passes.merchant_info),
            ("passes.description_fuzzy", self.passes.description_fuzzy),
        ];
        for (name, value) in multipliers {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::Config(format!(
                    "{} must be in (0, 1] (got {})",
                    name, value
                )));
            }
        }

        let tolerances = [
            ("scoring.interval_tolerance", self.scoring.interval_tolerance),
            ("scoring.amount_tolerance", self.scoring.amount_tolerance),
        ];
        for (name, value) in tolerances {
            if !(value > 0.0 && value.is_finite()) {
                return Err(Error::Config(format!(
                    "{} must be positive (got {})",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("recur").join("config").join("detector.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    lookback_days: Option<u32>,
    scoring: Option<RawScoring>,
    composite: Option<RawComposite>,
    passes: Option<RawPasses>,
    fuzzy: Option<RawFuzzy>,
}

#[derive(Debug, Deserialize)]
struct RawScoring {
    interval_weight: Option<f64>,
    amount_weight: Option<f64>,
    occurrence_weight: Option<f64>,
    interval_tolerance: Option<f64>,
    amount_tolerance: Option<f64>,
    min_confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawComposite {
    confidence_weight: Option<f64>,
    priority_weight: Option<f64>,
    occurrence_weight: Option<f64>,
    interval_accuracy_weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPasses {
    partner_info: Option<f64>,
    merchant_info: Option<f64>,
    description_fuzzy: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawFuzzy {
    threshold: Option<f64>,
    min_text_len: Option<usize>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<DetectorConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = DetectorConfig::default();

    if let Some(days) = raw.lookback_days {
        config.lookback_days = days;
    }

    if let Some(scoring) = raw.scoring {
        let s = &mut config.scoring;
        if let Some(v) = scoring.interval_weight {
            s.interval_weight = v;
        }
        if let Some(v) = scoring.amount_weight {
            s.amount_weight = v;
        }
        if let Some(v) = scoring.occurrence_weight {
            s.occurrence_weight = v;
        }
        if let Some(v) = scoring.interval_tolerance {
            s.interval_tolerance = v;
        }
        if let Some(v) = scoring.amount_tolerance {
            s.amount_tolerance = v;
        }
        if let Some(v) = scoring.min_confidence {
            s.min_confidence = v;
        }
    }

    if let Some(composite) = raw.composite {
        let c = &mut config.composite;
        if let Some(v) = composite.confidence_weight {
            c.confidence_weight = v;
        }
        if let Some(v) = composite.priority_weight {
            c.priority_weight = v;
        }
        if let Some(v) = composite.occurrence_weight {
            c.occurrence_weight = v;
        }
        if let Some(v) = composite.interval_accuracy_weight {
            c.interval_accuracy_weight = v;
        }
    }

    if let Some(passes) = raw.passes {
        let p = &mut config.passes;
        if let Some(v) = passes.partner_info {
            p.partner_info = v;
        }
        if let Some(v) = passes.merchant_info {
            p.merchant_info = v;
        }
        if let Some(v) = passes.description_fuzzy {
            p.description_fuzzy = v;
        }
    }

    if let Some(fuzzy) = raw.fuzzy {
        if let Some(v) = fuzzy.threshold {
            config.fuzzy.threshold = v;
        }
        if let Some(v) = fuzzy.min_text_len {
            config.fuzzy.min_text_len = v;
        }
    }

    Ok(config)
}
