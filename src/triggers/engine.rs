use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::engine::types::Metadata;
use crate::triggers::{Capability, TriggerConfig, TriggerContext, TriggerDecision};

/// Per-capability aggregate over triggered decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapabilityTriggerStats {
    pub trigger_count: usize,
    pub mean_confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TriggerMetrics {
    pub evaluations: usize,
    pub total_triggers: usize,
    pub capabilities: BTreeMap<String, CapabilityTriggerStats>,
}

/// Rule evaluator deciding which auxiliary capabilities to invoke.
///
/// Decisions depend only on the configuration and the context passed in;
/// the engine's own state is limited to the trigger history used for metrics.
pub struct TriggerEngine {
    config: TriggerConfig,
    enabled: bool,
    history: Vec<TriggerDecision>,
    evaluations: usize,
}

fn meta(pairs: &[(&str, serde_json::Value)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

impl TriggerEngine {
    pub fn new(config: TriggerConfig) -> Self {
        let enabled = config.defaults.enabled;
        Self {
            config,
            enabled,
            history: Vec::new(),
            evaluations: 0,
        }
    }

    /// Build from a YAML file, falling back to built-in defaults when it is missing or malformed.
    pub fn from_path(path: Option<&Path>) -> Self {
        Self::new(TriggerConfig::load_or_default(path))
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Triggered decisions accumulated so far, oldest first.
    pub fn history(&self) -> &[TriggerDecision] {
        &self.history
    }

    /// Disablement check that precedes every rule.
    fn disabled(&self, capability: Capability, rule_enabled: bool) -> Option<TriggerDecision> {
        if !self.enabled {
            return Some(TriggerDecision::skip(
                capability,
                "Trigger engine is disabled (enabled=false)",
                meta(&[("disabled", json!("engine"))]),
            ));
        }
        if !rule_enabled {
            return Some(TriggerDecision::skip(
                capability,
                format!("{} is disabled in configuration", capability),
                meta(&[("disabled", json!("config"))]),
            ));
        }
        None
    }

    /// File/code mapping: many files, many lines, or high complexity.
    pub fn should_invoke_code_mapper(&self, ctx: &TriggerContext) -> TriggerDecision {
        let cap = Capability::CodeMapper;
        if let Some(decision) = self.disabled(cap, self.config.triggers.code_mapper.enabled) {
            return decision;
        }

        let file_threshold = self.config.file_threshold();
        let file_count = ctx.files_to_modify.len();
        if file_count >= file_threshold {
            return TriggerDecision::trigger(
                cap,
                format!("{} files to modify (threshold: {})", file_count, file_threshold),
                0.9,
                meta(&[
                    ("rule", json!("file_count")),
                    ("file_count", json!(file_count)),
                    ("threshold", json!(file_threshold)),
                ]),
            );
        }

        let loc_threshold = self.config.loc_threshold();
        if ctx.estimated_loc >= loc_threshold {
            return TriggerDecision::trigger(
                cap,
                format!(
                    "Estimated {} lines of change (threshold: {})",
                    ctx.estimated_loc, loc_threshold
                ),
                0.85,
                meta(&[
                    ("rule", json!("estimated_loc")),
                    ("estimated_loc", json!(ctx.estimated_loc)),
                    ("threshold", json!(loc_threshold)),
                ]),
            );
        }

        if ctx.complexity.is_high() {
            return TriggerDecision::trigger(
                cap,
                format!("Complexity is {}", ctx.complexity),
                0.8,
                meta(&[
                    ("rule", json!("complexity")),
                    ("complexity", json!(ctx.complexity)),
                ]),
            );
        }

        TriggerDecision::skip(
            cap,
            format!(
                "{} files, {} estimated lines and {} complexity are below thresholds",
                file_count, ctx.estimated_loc, ctx.complexity
            ),
            Metadata::new(),
        )
    }

    /// Project snapshot prompt at natural boundaries of the work.
    pub fn should_invoke_project_checkpoint(&self, ctx: &TriggerContext) -> TriggerDecision {
        let cap = Capability::ProjectCheckpoint;
        let rule = &self.config.triggers.project_checkpoint;
        if let Some(decision) = self.disabled(cap, rule.enabled) {
            return decision;
        }

        if ctx.end_of_work_block {
            return TriggerDecision::trigger(
                cap,
                "End of work block",
                0.95,
                meta(&[("rule", json!("end_of_work_block"))]),
            );
        }

        if ctx.critical_document_changed {
            return TriggerDecision::trigger(
                cap,
                "Critical document changed",
                0.9,
                meta(&[("rule", json!("critical_document_changed"))]),
            );
        }

        if ctx.milestone_reached {
            return TriggerDecision::trigger(
                cap,
                "Milestone reached",
                0.9,
                meta(&[("rule", json!("milestone_reached"))]),
            );
        }

        if ctx.modified_loc >= rule.loc_threshold {
            return TriggerDecision::trigger(
                cap,
                format!(
                    "{} lines modified since last snapshot (threshold: {})",
                    ctx.modified_loc, rule.loc_threshold
                ),
                0.8,
                meta(&[
                    ("rule", json!("modified_loc")),
                    ("modified_loc", json!(ctx.modified_loc)),
                    ("threshold", json!(rule.loc_threshold)),
                ]),
            );
        }

        TriggerDecision::skip(cap, "No snapshot boundary reached", Metadata::new())
    }

    /// Adversarial review for risky or uncertain changes.
    pub fn should_invoke_adversarial_review(&self, ctx: &TriggerContext) -> TriggerDecision {
        let cap = Capability::AdversarialReview;
        if let Some(decision) = self.disabled(cap, self.config.triggers.adversarial_review.enabled) {
            return decision;
        }

        if ctx.security_impact {
            return TriggerDecision::trigger(
                cap,
                "Change has security impact",
                0.95,
                meta(&[("rule", json!("security_impact"))]),
            );
        }

        if ctx.affects_auth {
            return TriggerDecision::trigger(
                cap,
                "Change affects authentication",
                0.9,
                meta(&[("rule", json!("affects_auth"))]),
            );
        }

        if ctx.affects_payment {
            return TriggerDecision::trigger(
                cap,
                "Change affects payment handling",
                0.9,
                meta(&[("rule", json!("affects_payment"))]),
            );
        }

        if ctx.complexity.is_high() {
            return TriggerDecision::trigger(
                cap,
                format!("Complexity is {}", ctx.complexity),
                0.8,
                meta(&[
                    ("rule", json!("complexity")),
                    ("complexity", json!(ctx.complexity)),
                ]),
            );
        }

        let threshold = self.config.review_confidence_threshold();
        if let Some(confidence) = ctx.confidence
            && confidence < threshold
        {
            return TriggerDecision::trigger(
                cap,
                format!(
                    "Confidence {:.2} is below threshold {:.2}",
                    confidence, threshold
                ),
                0.75,
                meta(&[
                    ("rule", json!("low_confidence")),
                    ("confidence", json!(confidence)),
                    ("threshold", json!(threshold)),
                ]),
            );
        }

        TriggerDecision::skip(cap, "No risk factors present", Metadata::new())
    }

    /// External documentation research for unfamiliar or changing dependencies.
    pub fn should_invoke_doc_research(&self, ctx: &TriggerContext) -> TriggerDecision {
        let cap = Capability::DocResearch;
        let rule = &self.config.triggers.doc_research;
        if let Some(decision) = self.disabled(cap, rule.enabled) {
            return decision;
        }

        if let Some(library) = ctx.external_library.as_deref().map(str::trim)
            && !library.is_empty()
        {
            return TriggerDecision::trigger(
                cap,
                format!("Introduces external library or API: {}", library),
                0.9,
                meta(&[
                    ("rule", json!("external_library")),
                    ("library", json!(library)),
                ]),
            );
        }

        if ctx.major_version_bump {
            return TriggerDecision::trigger(
                cap,
                "Major version upgrade",
                0.85,
                meta(&[("rule", json!("major_version_bump"))]),
            );
        }

        let threshold = self.config.research_confidence_threshold();
        if let Some(confidence) = ctx.confidence
            && confidence < threshold
        {
            return TriggerDecision::trigger(
                cap,
                format!(
                    "Confidence {:.2} is below threshold {:.2}",
                    confidence, threshold
                ),
                0.7,
                meta(&[
                    ("rule", json!("low_confidence")),
                    ("confidence", json!(confidence)),
                    ("threshold", json!(threshold)),
                ]),
            );
        }

        if ctx.unfamiliar_technology {
            return TriggerDecision::trigger(
                cap,
                "Unfamiliar technology",
                0.8,
                meta(&[("rule", json!("unfamiliar_technology"))]),
            );
        }

        TriggerDecision::skip(cap, "No research need detected", Metadata::new())
    }

    /// Evaluate one capability.
    pub fn evaluate(&self, capability: Capability, ctx: &TriggerContext) -> TriggerDecision {
        match capability {
            Capability::CodeMapper => self.should_invoke_code_mapper(ctx),
            Capability::ProjectCheckpoint => self.should_invoke_project_checkpoint(ctx),
            Capability::AdversarialReview => self.should_invoke_adversarial_review(ctx),
            Capability::DocResearch => self.should_invoke_doc_research(ctx),
        }
    }

    /// Evaluate every capability and record triggered decisions in the history.
    pub fn evaluate_all(&mut self, ctx: &TriggerContext) -> BTreeMap<Capability, TriggerDecision> {
        let decisions: BTreeMap<Capability, TriggerDecision> = Capability::ALL
            .into_iter()
            .map(|cap| (cap, self.evaluate(cap, ctx)))
            .collect();

        self.evaluations += 1;
        for decision in decisions.values() {
            if decision.should_trigger {
                info!(
                    capability = %decision.capability_name,
                    reason = %decision.reason,
                    confidence = decision.confidence,
                    "Capability triggered"
                );
                self.history.push(decision.clone());
            } else {
                debug!(
                    capability = %decision.capability_name,
                    reason = %decision.reason,
                    "Capability not triggered"
                );
            }
        }

        decisions
    }

    /// Names of the capabilities that trigger for `ctx`.
    pub fn triggered_capabilities(&mut self, ctx: &TriggerContext) -> Vec<Capability> {
        self.evaluate_all(ctx)
            .into_iter()
            .filter(|(_, d)| d.should_trigger)
            .map(|(cap, _)| cap)
            .collect()
    }

    pub fn metrics(&self) -> TriggerMetrics {
        let mut sums: BTreeMap<String, (usize, f64)> = BTreeMap::new();
        for decision in &self.history {
            let entry = sums.entry(decision.capability_name.clone()).or_default();
            entry.0 += 1;
            entry.1 += decision.confidence;
        }

        TriggerMetrics {
            evaluations: self.evaluations,
            total_triggers: self.history.len(),
            capabilities: sums
                .into_iter()
                .map(|(name, (count, total))| {
                    (
                        name,
                        CapabilityTriggerStats {
                            trigger_count: count,
                            mean_confidence: total / count as f64,
                        },
                    )
                })
                .collect(),
        }
    }
}
