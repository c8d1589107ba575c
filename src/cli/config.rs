use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;
use tracing::warn;

use crate::capabilities::CapabilityRegistry;
use crate::capabilities::command::CommandCapability;
use crate::engine::types::WorkflowDefinition;

const DEFAULT_CONFIG_FILE: &str = "ideaflow.yaml";

/// External command bound to a capability name.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityCommandConfig {
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: Option<String>,
    /// Seconds before the command is killed.
    pub timeout: Option<f64>,
    pub description: Option<String>,
    /// Plan text shown before interactive runs; supports `${ctx.*}` placeholders.
    pub plan: Option<String>,
}

/// Configuration loaded from `ideaflow.yaml`.
/// Every field is optional; missing ones fall back to flags, env or defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct IdeaflowConfig {
    pub checkpoint_dir: Option<String>,
    /// Path to the trigger rules YAML.
    pub trigger_config: Option<String>,
    /// Retention applied after every mutating command.
    pub keep_checkpoints: Option<usize>,
    pub auto_save: Option<bool>,
    /// JSON-lines file receiving milestones, metadata and artifacts.
    pub journal: Option<String>,
    pub workflow: Option<WorkflowDefinition>,
    /// Capability name → command mappings.
    pub capabilities: Option<HashMap<String, CapabilityCommandConfig>>,
}

impl IdeaflowConfig {
    /// Read `path`, or `ideaflow.yaml` in the working directory when no path is given.
    /// An explicit path must exist; a missing default file yields an empty config.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) if p.exists() => p,
            Some(p) => anyhow::bail!("Config file not found: {}", p.display()),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Path::new(DEFAULT_CONFIG_FILE),
            None => return Ok(Self::default()),
        };

        let contents = std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;
        serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))
    }

    /// Registry with one command-backed handler per configured capability.
    pub fn build_registry(&self) -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        for (name, cfg) in self.capabilities.iter().flatten() {
            let mut capability = CommandCapability::new(name, &cfg.cmd);
            capability.args = cfg.args.clone();
            capability.cwd = cfg.cwd.as_ref().map(Into::into);
            match cfg.timeout.map(Duration::try_from_secs_f64) {
                Some(Ok(timeout)) if !timeout.is_zero() => capability.timeout = timeout,
                Some(_) => warn!(
                    capability = %name,
                    timeout = ?cfg.timeout,
                    default = ?capability.timeout,
                    "Ignoring unusable capability timeout"
                ),
                None => {}
            }
            if let Some(description) = &cfg.description {
                capability.description = description.clone();
            }
            registry.register(Arc::new(capability));
        }
        registry
    }

    /// Plan templates keyed by capability name.
    pub fn plan_templates(&self) -> Vec<(String, String)> {
        self.capabilities
            .iter()
            .flatten()
            .filter_map(|(name, cfg)| cfg.plan.clone().map(|p| (name.clone(), p)))
            .collect()
    }
}
