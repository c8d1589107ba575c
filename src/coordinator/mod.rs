pub mod interaction;
pub mod plan;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::capabilities::{CapabilityOutput, CapabilityRegistry};
use crate::engine::types::Metadata;
use crate::recorder::{ProjectRecorder, log_outcome};
use crate::triggers::{Capability, TriggerContext, TriggerDecision};

pub use interaction::{ExecutionPlan, Interaction, ScriptedInteraction, TerminalInteraction, UserChoice};

/// Execution discipline for a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Runs without waiting for the user.
    Silent,
    /// Requires proceed/skip/adjust approval first.
    Interactive,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            ExecutionMode::Silent => "silent",
            ExecutionMode::Interactive => "interactive",
        })
    }
}

/// Static classification. Unknown names are interactive.
pub fn execution_mode(capability: &str) -> ExecutionMode {
    match capability {
        "code_mapper" | "doc_research" => ExecutionMode::Silent,
        _ => ExecutionMode::Interactive,
    }
}

/// Outcome of one capability execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub capability_name: String,
    pub mode: ExecutionMode,
    pub success: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// History entry for a capability run (skips are not recorded).
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub capability_name: String,
    pub mode: ExecutionMode,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<serde_json::Value>,
}

/// Running per-capability totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionMetrics {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub total_duration_seconds: f64,
    pub average_duration_seconds: f64,
}

/// Executes triggered capabilities under the right discipline and records outcomes.
pub struct Coordinator {
    project_id: String,
    session_id: String,
    registry: CapabilityRegistry,
    interaction: Arc<dyn Interaction>,
    recorder: Arc<dyn ProjectRecorder>,
    plan_templates: HashMap<String, String>,
    records: Vec<ExecutionRecord>,
    metrics: BTreeMap<String, ExecutionMetrics>,
}

impl Coordinator {
    pub fn new(
        project_id: &str,
        session_id: &str,
        registry: CapabilityRegistry,
        interaction: Arc<dyn Interaction>,
        recorder: Arc<dyn ProjectRecorder>,
    ) -> Self {
        Self {
            project_id: project_id.to_string(),
            session_id: session_id.to_string(),
            registry,
            interaction,
            recorder,
            plan_templates: HashMap::new(),
            records: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// Use `template` (with `${ctx.*}` placeholders) as the plan text for `capability`.
    pub fn with_plan_template(mut self, capability: &str, template: &str) -> Self {
        self.plan_templates
            .insert(capability.to_string(), template.to_string());
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    pub fn metrics(&self) -> &BTreeMap<String, ExecutionMetrics> {
        &self.metrics
    }

    /// Execute one capability by name. Failures come back as results, never as errors.
    pub async fn execute_capability(&mut self, name: &str, ctx: &TriggerContext) -> ExecutionResult {
        self.run(name, &plan::direct_reason(ctx), ctx).await
    }

    /// Execute the capability a decision refers to, citing its reason in the plan.
    pub async fn execute_decision(
        &mut self,
        decision: &TriggerDecision,
        ctx: &TriggerContext,
    ) -> ExecutionResult {
        self.run(&decision.capability_name, &decision.reason, ctx)
            .await
    }

    /// Execute every triggered decision in order. One failure never stops the rest.
    pub async fn execute_triggered(
        &mut self,
        decisions: &BTreeMap<Capability, TriggerDecision>,
        ctx: &TriggerContext,
    ) -> Vec<ExecutionResult> {
        let mut results = Vec::new();
        for decision in decisions.values().filter(|d| d.should_trigger) {
            results.push(self.execute_decision(decision, ctx).await);
        }

        if !results.is_empty() {
            let mut metadata = Metadata::new();
            metadata.insert("capability_metrics".to_string(), json!(self.metrics));
            metadata.insert(
                "last_batch".to_string(),
                json!(
                    results
                        .iter()
                        .map(|r| json!({
                            "capability": r.capability_name,
                            "success": r.success,
                            "skipped": r.skipped,
                        }))
                        .collect::<Vec<_>>()
                ),
            );
            let outcome = self
                .recorder
                .update_metadata(&self.project_id, &self.session_id, &metadata)
                .await;
            log_outcome("update_metadata", outcome);
        }

        results
    }

    async fn run(&mut self, name: &str, reason: &str, ctx: &TriggerContext) -> ExecutionResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mode = execution_mode(name);

        let outcome = match mode {
            ExecutionMode::Silent => {
                self.interaction.progress(&format!("▸ Running {}...", name));
                let outcome = self.invoke(name, ctx).await;
                match &outcome {
                    Ok(output) => self
                        .interaction
                        .progress(&format!("✓ {}: {}", name, output.summary)),
                    Err(e) => self.interaction.progress(&format!("✗ {} failed: {}", name, e)),
                }
                outcome
            }
            ExecutionMode::Interactive => {
                let plan = ExecutionPlan {
                    capability: name.to_string(),
                    reason: reason.to_string(),
                    text: plan::render_plan(
                        name,
                        self.plan_templates.get(name).map(String::as_str),
                        ctx,
                    ),
                };

                match self.interaction.decide(&plan).await {
                    Ok(UserChoice::Skip) => {
                        info!(capability = %name, "Capability skipped by user");
                        return ExecutionResult {
                            capability_name: name.to_string(),
                            mode,
                            success: false,
                            skipped: true,
                            summary: None,
                            error: None,
                            artifact_type: None,
                            artifact: None,
                            started_at,
                            duration_seconds: clock.elapsed().as_secs_f64(),
                        };
                    }
                    Ok(UserChoice::Proceed) => self.invoke(name, ctx).await,
                    Ok(UserChoice::Adjust(adjustment)) => {
                        info!(capability = %name, adjustment = %adjustment, "Capability parameters adjusted");
                        let mut adjusted = ctx.clone();
                        adjusted.apply_adjustment(&adjustment);
                        self.invoke(name, &adjusted).await
                    }
                    Err(e) => Err(e.context("Failed to obtain user decision")),
                }
            }
        };

        let duration_seconds = clock.elapsed().as_secs_f64();
        self.finish(name, mode, started_at, duration_seconds, outcome)
            .await
    }

    async fn invoke(&self, name: &str, ctx: &TriggerContext) -> anyhow::Result<CapabilityOutput> {
        let handler = self
            .registry
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("No handler registered for capability '{}'", name))?;
        handler.invoke(ctx).await
    }

    /// Update metrics and history, then forward the result to the recorder.
    async fn finish(
        &mut self,
        name: &str,
        mode: ExecutionMode,
        started_at: DateTime<Utc>,
        duration_seconds: f64,
        outcome: anyhow::Result<CapabilityOutput>,
    ) -> ExecutionResult {
        let result = match outcome {
            Ok(output) => {
                info!(capability = %name, mode = %mode, duration_s = duration_seconds, "Capability succeeded");
                ExecutionResult {
                    capability_name: name.to_string(),
                    mode,
                    success: true,
                    skipped: false,
                    summary: Some(output.summary),
                    error: None,
                    artifact_type: Some(output.artifact_type),
                    artifact: Some(output.data),
                    started_at,
                    duration_seconds,
                }
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!(capability = %name, mode = %mode, error = %message, "Capability failed");
                ExecutionResult {
                    capability_name: name.to_string(),
                    mode,
                    success: false,
                    skipped: false,
                    summary: None,
                    error: Some(message),
                    artifact_type: None,
                    artifact: None,
                    started_at,
                    duration_seconds,
                }
            }
        };

        let entry = self.metrics.entry(name.to_string()).or_default();
        entry.total_runs += 1;
        if result.success {
            entry.successful_runs += 1;
        }
        entry.total_duration_seconds += duration_seconds;
        entry.average_duration_seconds = entry.total_duration_seconds / entry.total_runs as f64;

        self.records.push(ExecutionRecord {
            capability_name: name.to_string(),
            mode,
            started_at,
            duration_seconds,
            success: result.success,
            artifact: result.artifact.clone(),
        });

        let artifact_type = result
            .artifact_type
            .clone()
            .unwrap_or_else(|| format!("{}_failure", name));
        let data = match (&result.artifact, &result.error) {
            (Some(artifact), _) => artifact.clone(),
            (None, Some(error)) => json!({ "error": error }),
            (None, None) => serde_json::Value::Null,
        };
        let mut metadata = Metadata::new();
        metadata.insert("mode".to_string(), json!(mode));
        metadata.insert("success".to_string(), json!(result.success));
        metadata.insert("duration_seconds".to_string(), json!(duration_seconds));
        metadata.insert("started_at".to_string(), json!(started_at.to_rfc3339()));
        let outcome = self
            .recorder
            .record_artifact(
                &self.project_id,
                &self.session_id,
                name,
                &artifact_type,
                &data,
                &metadata,
            )
            .await;
        log_outcome("record_artifact", outcome);

        result
    }
}
