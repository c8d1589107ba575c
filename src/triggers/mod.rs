pub mod config;
pub mod context;
pub mod engine;

use serde::{Deserialize, Serialize};

use crate::engine::types::Metadata;

pub use config::TriggerConfig;
pub use context::{Complexity, TriggerContext};
pub use engine::{CapabilityTriggerStats, TriggerEngine, TriggerMetrics};

/// Auxiliary capabilities the trigger engine decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Map the files and code paths a change will touch.
    CodeMapper,
    /// Prompt for a project snapshot.
    ProjectCheckpoint,
    /// Adversarial review of a risky change.
    AdversarialReview,
    /// Research external library or API documentation.
    DocResearch,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::CodeMapper,
        Capability::ProjectCheckpoint,
        Capability::AdversarialReview,
        Capability::DocResearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CodeMapper => "code_mapper",
            Capability::ProjectCheckpoint => "project_checkpoint",
            Capability::AdversarialReview => "adversarial_review",
            Capability::DocResearch => "doc_research",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown capability: {}", s))
    }
}

/// Verdict for one capability given one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDecision {
    pub should_trigger: bool,
    pub capability_name: String,
    pub reason: String,
    /// Strength of the case for invoking, `0.0..=1.0`.
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl TriggerDecision {
    pub fn trigger(
        capability: Capability,
        reason: impl Into<String>,
        confidence: f64,
        metadata: Metadata,
    ) -> Self {
        Self {
            should_trigger: true,
            capability_name: capability.to_string(),
            reason: reason.into(),
            confidence,
            metadata,
        }
    }

    pub fn skip(capability: Capability, reason: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            should_trigger: false,
            capability_name: capability.to_string(),
            reason: reason.into(),
            confidence: 0.0,
            metadata,
        }
    }
}
