use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Trigger rules loaded from a YAML document with `defaults` and `triggers` sections.
/// Missing keys take the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub defaults: TriggerDefaults,
    pub triggers: TriggerRules,
}

/// Global knobs shared by the per-capability rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerDefaults {
    /// Engine-level switch. When false nothing ever triggers.
    pub enabled: bool,
    /// Confidence below which an adversarial review is requested.
    pub confidence_threshold: f64,
    /// Confidence below which documentation research is requested.
    pub research_confidence_threshold: f64,
    pub file_threshold: usize,
    pub loc_threshold: u64,
}

impl Default for TriggerDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.7,
            research_confidence_threshold: 0.6,
            file_threshold: 3,
            loc_threshold: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerRules {
    pub code_mapper: CodeMapperRule,
    pub project_checkpoint: ProjectCheckpointRule,
    pub adversarial_review: AdversarialReviewRule,
    pub doc_research: DocResearchRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeMapperRule {
    pub enabled: bool,
    /// Falls back to `defaults.file_threshold`.
    pub file_threshold: Option<usize>,
    /// Falls back to `defaults.loc_threshold`.
    pub loc_threshold: Option<u64>,
}

impl Default for CodeMapperRule {
    fn default() -> Self {
        Self {
            enabled: true,
            file_threshold: None,
            loc_threshold: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectCheckpointRule {
    pub enabled: bool,
    /// Modified lines since the last snapshot that warrant a new one.
    pub loc_threshold: u64,
}

impl Default for ProjectCheckpointRule {
    fn default() -> Self {
        Self {
            enabled: true,
            loc_threshold: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdversarialReviewRule {
    pub enabled: bool,
    /// Falls back to `defaults.confidence_threshold`.
    pub confidence_threshold: Option<f64>,
}

impl Default for AdversarialReviewRule {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocResearchRule {
    pub enabled: bool,
    /// Falls back to `defaults.research_confidence_threshold`.
    pub confidence_threshold: Option<f64>,
}

impl Default for DocResearchRule {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: None,
        }
    }
}

impl TriggerConfig {
    /// Load trigger rules from a YAML file. Errors when the file is missing or invalid.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Trigger config not found: {}", path.display());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trigger config: {}", path.display()))?;

        let config: TriggerConfig = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse trigger config: {}", path.display()))?;

        Ok(config)
    }

    /// Load trigger rules, falling back to the built-in defaults on any failure.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("No trigger config given, using built-in defaults");
            return Self::default();
        };

        match Self::load(path) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded trigger config");
                config
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Trigger config unusable, using built-in defaults");
                Self::default()
            }
        }
    }

    pub fn file_threshold(&self) -> usize {
        self.triggers
            .code_mapper
            .file_threshold
            .unwrap_or(self.defaults.file_threshold)
    }

    pub fn loc_threshold(&self) -> u64 {
        self.triggers
            .code_mapper
            .loc_threshold
            .unwrap_or(self.defaults.loc_threshold)
    }

    pub fn review_confidence_threshold(&self) -> f64 {
        self.triggers
            .adversarial_review
            .confidence_threshold
            .unwrap_or(self.defaults.confidence_threshold)
    }

    pub fn research_confidence_threshold(&self) -> f64 {
        self.triggers
            .doc_research
            .confidence_threshold
            .unwrap_or(self.defaults.research_confidence_threshold)
    }
}
