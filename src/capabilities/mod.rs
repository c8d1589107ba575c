pub mod command;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::triggers::TriggerContext;

/// What a capability hands back after a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityOutput {
    /// One-line human summary.
    pub summary: String,
    /// Kind of artifact in `data`, forwarded to the project recorder.
    pub artifact_type: String,
    pub data: serde_json::Value,
}

/// Trait that all auxiliary capabilities implement.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Capability identifier (e.g., "code_mapper").
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Run the capability against the supplied context.
    async fn invoke(&self, ctx: &TriggerContext) -> Result<CapabilityOutput>;
}

/// Registry of capability implementations, keyed by name.
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous one with the same name.
    pub fn register(&mut self, handler: Arc<dyn CapabilityHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// List all registered capabilities with descriptions.
    pub fn list(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .handlers
            .values()
            .map(|h| (h.name(), h.description()))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }
}
