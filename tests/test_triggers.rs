//! Tests for the trigger engine: rule order, disablement, config loading and metrics.

use ideaflow::triggers::*;
use serde_json::json;

fn engine() -> TriggerEngine {
    TriggerEngine::new(TriggerConfig::default())
}

fn ctx(value: serde_json::Value) -> TriggerContext {
    serde_json::from_value(value).unwrap()
}

// ===== Scenarios =====

#[test]
fn three_files_trigger_code_mapper_only() {
    let mut engine = engine();
    let context = ctx(json!({
        "files_to_modify": ["a.rs", "b.rs", "c.rs"],
        "estimated_loc": 50,
        "complexity": "medium"
    }));

    let decisions = engine.evaluate_all(&context);
    assert_eq!(decisions.len(), 4);

    let mapper = &decisions[&Capability::CodeMapper];
    assert!(mapper.should_trigger);
    assert_eq!(mapper.reason, "3 files to modify (threshold: 3)");
    assert_eq!(mapper.confidence, 0.9);
    assert_eq!(mapper.capability_name, "code_mapper");

    assert!(!decisions[&Capability::ProjectCheckpoint].should_trigger);
    assert!(!decisions[&Capability::AdversarialReview].should_trigger);
    assert!(!decisions[&Capability::DocResearch].should_trigger);
}

#[test]
fn auth_change_triggers_review() {
    let mut engine = engine();
    let context = ctx(json!({ "affects_auth": true, "files_to_modify": ["login.rs"] }));

    let triggered = engine.triggered_capabilities(&context);
    assert_eq!(triggered, vec![Capability::AdversarialReview]);

    let review = engine.should_invoke_adversarial_review(&context);
    assert_eq!(review.reason, "Change affects authentication");
    assert_eq!(review.confidence, 0.9);
}

#[test]
fn empty_context_triggers_nothing() {
    let mut engine = engine();
    let decisions = engine.evaluate_all(&TriggerContext::default());
    for decision in decisions.values() {
        assert!(!decision.should_trigger, "{} triggered", decision.capability_name);
        assert_eq!(decision.confidence, 0.0);
        assert!(!decision.reason.is_empty());
    }
    assert!(engine.history().is_empty());
}

#[test]
fn evaluation_is_deterministic() {
    let engine = engine();
    let context = ctx(json!({
        "estimated_loc": 150,
        "complexity": "high",
        "external_library": "stripe",
        "modified_loc": 250
    }));

    for cap in Capability::ALL {
        assert_eq!(engine.evaluate(cap, &context), engine.evaluate(cap, &context));
    }
}

// ===== Rule order =====

#[test]
fn code_mapper_rule_order() {
    let engine = engine();

    let loc = engine.should_invoke_code_mapper(&ctx(json!({ "estimated_loc": 100 })));
    assert!(loc.should_trigger);
    assert_eq!(loc.reason, "Estimated 100 lines of change (threshold: 100)");
    assert_eq!(loc.confidence, 0.85);

    let complexity = engine.should_invoke_code_mapper(&ctx(json!({ "complexity": "very_high" })));
    assert!(complexity.should_trigger);
    assert_eq!(complexity.reason, "Complexity is very_high");
    assert_eq!(complexity.confidence, 0.8);

    // file count wins over the other rules
    let both = engine.should_invoke_code_mapper(&ctx(json!({
        "files_to_modify": ["a", "b", "c", "d"],
        "estimated_loc": 500
    })));
    assert_eq!(both.metadata["rule"], "file_count");

    let below = engine.should_invoke_code_mapper(&ctx(json!({
        "files_to_modify": ["a", "b"],
        "estimated_loc": 99
    })));
    assert!(!below.should_trigger);
}

#[test]
fn project_checkpoint_rule_order() {
    let engine = engine();

    let end = engine.should_invoke_project_checkpoint(&ctx(json!({
        "end_of_work_block": true,
        "milestone_reached": true
    })));
    assert_eq!(end.reason, "End of work block");
    assert_eq!(end.confidence, 0.95);

    let doc = engine.should_invoke_project_checkpoint(&ctx(json!({ "critical_document_changed": true })));
    assert_eq!(doc.reason, "Critical document changed");

    let milestone = engine.should_invoke_project_checkpoint(&ctx(json!({ "milestone_reached": true })));
    assert_eq!(milestone.reason, "Milestone reached");

    let loc = engine.should_invoke_project_checkpoint(&ctx(json!({ "modified_loc": 200 })));
    assert!(loc.should_trigger);
    assert_eq!(loc.confidence, 0.8);

    let below = engine.should_invoke_project_checkpoint(&ctx(json!({ "modified_loc": 199 })));
    assert!(!below.should_trigger);
}

#[test]
fn adversarial_review_rule_order() {
    let engine = engine();

    let security = engine.should_invoke_adversarial_review(&ctx(json!({
        "security_impact": true,
        "affects_auth": true
    })));
    assert_eq!(security.reason, "Change has security impact");
    assert_eq!(security.confidence, 0.95);

    let payment = engine.should_invoke_adversarial_review(&ctx(json!({ "affects_payment": true })));
    assert_eq!(payment.reason, "Change affects payment handling");

    let complex = engine.should_invoke_adversarial_review(&ctx(json!({ "complexity": "high" })));
    assert_eq!(complex.reason, "Complexity is high");

    let unsure = engine.should_invoke_adversarial_review(&ctx(json!({ "confidence": 0.5 })));
    assert!(unsure.should_trigger);
    assert_eq!(unsure.reason, "Confidence 0.50 is below threshold 0.70");
    assert_eq!(unsure.confidence, 0.75);

    let sure = engine.should_invoke_adversarial_review(&ctx(json!({ "confidence": 0.7 })));
    assert!(!sure.should_trigger);
}

#[test]
fn doc_research_rule_order() {
    let engine = engine();

    let library = engine.should_invoke_doc_research(&ctx(json!({
        "external_library": "tokio",
        "major_version_bump": true
    })));
    assert_eq!(library.reason, "Introduces external library or API: tokio");
    assert_eq!(library.confidence, 0.9);

    let blank = engine.should_invoke_doc_research(&ctx(json!({ "external_library": "  " })));
    assert!(!blank.should_trigger);

    let bump = engine.should_invoke_doc_research(&ctx(json!({ "major_version_bump": true })));
    assert_eq!(bump.reason, "Major version upgrade");

    let unsure = engine.should_invoke_doc_research(&ctx(json!({ "confidence": 0.5 })));
    assert!(unsure.should_trigger);
    assert_eq!(unsure.confidence, 0.7);

    // 0.65 is low for review but fine for research
    let middling = ctx(json!({ "confidence": 0.65 }));
    assert!(!engine.should_invoke_doc_research(&middling).should_trigger);
    assert!(engine.should_invoke_adversarial_review(&middling).should_trigger);

    let unfamiliar = engine.should_invoke_doc_research(&ctx(json!({ "unfamiliar_technology": true })));
    assert_eq!(unfamiliar.reason, "Unfamiliar technology");
    assert_eq!(unfamiliar.confidence, 0.8);
}

// ===== Disablement =====

#[test]
fn disabled_engine_never_triggers() {
    let mut engine = engine();
    engine.set_enabled(false);
    assert!(!engine.is_enabled());

    let context = ctx(json!({
        "files_to_modify": ["a", "b", "c"],
        "security_impact": true,
        "end_of_work_block": true,
        "external_library": "serde"
    }));
    let decisions = engine.evaluate_all(&context);
    for decision in decisions.values() {
        assert!(!decision.should_trigger);
        assert_eq!(decision.reason, "Trigger engine is disabled (enabled=false)");
        assert_eq!(decision.confidence, 0.0);
    }
}

#[test]
fn disabled_capability_is_skipped() {
    let mut config = TriggerConfig::default();
    config.triggers.adversarial_review.enabled = false;
    let engine = TriggerEngine::new(config);

    let decision = engine.should_invoke_adversarial_review(&ctx(json!({ "security_impact": true })));
    assert!(!decision.should_trigger);
    assert_eq!(decision.reason, "adversarial_review is disabled in configuration");
    assert_eq!(decision.metadata["disabled"], "config");

    // other capabilities unaffected
    let mapper = engine.should_invoke_code_mapper(&ctx(json!({ "complexity": "high" })));
    assert!(mapper.should_trigger);
}

// ===== Config =====

#[test]
fn loads_yaml_config_with_partial_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("triggers.yaml");
    std::fs::write(
        &path,
        r#"
defaults:
  file_threshold: 5
  confidence_threshold: 0.8
triggers:
  project_checkpoint:
    loc_threshold: 50
  doc_research:
    enabled: false
"#,
    )
    .unwrap();

    let config = TriggerConfig::load(&path).unwrap();
    assert_eq!(config.file_threshold(), 5);
    assert_eq!(config.loc_threshold(), 100);
    assert_eq!(config.review_confidence_threshold(), 0.8);
    assert_eq!(config.triggers.project_checkpoint.loc_threshold, 50);
    assert!(!config.triggers.doc_research.enabled);
    assert!(config.defaults.enabled);

    let engine = TriggerEngine::from_path(Some(&path));
    let files = ctx(json!({ "files_to_modify": ["a", "b", "c", "d"] }));
    assert!(!engine.should_invoke_code_mapper(&files).should_trigger);
    assert!(engine.should_invoke_project_checkpoint(&ctx(json!({ "modified_loc": 60 }))).should_trigger);
}

#[test]
fn per_capability_thresholds_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("triggers.yaml");
    std::fs::write(
        &path,
        "triggers:\n  code_mapper:\n    file_threshold: 2\n  adversarial_review:\n    confidence_threshold: 0.5\n",
    )
    .unwrap();

    let engine = TriggerEngine::from_path(Some(&path));
    assert!(engine.should_invoke_code_mapper(&ctx(json!({ "files_to_modify": ["a", "b"] }))).should_trigger);
    assert!(!engine.should_invoke_adversarial_review(&ctx(json!({ "confidence": 0.6 }))).should_trigger);
}

#[test]
fn research_threshold_follows_defaults_unless_overridden() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("triggers.yaml");
    std::fs::write(&path, "defaults:\n  research_confidence_threshold: 0.4\n").unwrap();

    let config = TriggerConfig::load(&path).unwrap();
    assert_eq!(config.research_confidence_threshold(), 0.4);
    assert_eq!(config.review_confidence_threshold(), 0.7);

    let engine = TriggerEngine::from_path(Some(&path));
    assert!(!engine.should_invoke_doc_research(&ctx(json!({ "confidence": 0.5 }))).should_trigger);
    let low = engine.should_invoke_doc_research(&ctx(json!({ "confidence": 0.3 })));
    assert!(low.should_trigger);
    assert_eq!(low.metadata["threshold"], 0.4);

    std::fs::write(
        &path,
        "defaults:\n  research_confidence_threshold: 0.4\ntriggers:\n  doc_research:\n    confidence_threshold: 0.55\n",
    )
    .unwrap();
    let engine = TriggerEngine::from_path(Some(&path));
    assert!(engine.should_invoke_doc_research(&ctx(json!({ "confidence": 0.5 }))).should_trigger);

    assert_eq!(TriggerConfig::default().research_confidence_threshold(), 0.6);
}

#[test]
fn yaml_can_disable_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("triggers.yaml");
    std::fs::write(&path, "defaults:\n  enabled: false\n").unwrap();

    let engine = TriggerEngine::from_path(Some(&path));
    assert!(!engine.is_enabled());
}

#[test]
fn missing_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.yaml");

    let err = TriggerConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("Trigger config not found"));

    let engine = TriggerEngine::from_path(Some(&path));
    assert_eq!(engine.config(), &TriggerConfig::default());
    assert!(engine.is_enabled());
}

#[test]
fn malformed_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "defaults: [not, a, map\n").unwrap();

    let err = TriggerConfig::load(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse trigger config"));

    let engine = TriggerEngine::from_path(Some(&path));
    assert_eq!(engine.config(), &TriggerConfig::default());
}

// ===== Metrics =====

#[test]
fn metrics_aggregate_triggered_decisions() {
    let mut engine = engine();

    engine.evaluate_all(&ctx(json!({ "files_to_modify": ["a", "b", "c"] })));
    engine.evaluate_all(&ctx(json!({ "complexity": "high" })));
    engine.evaluate_all(&TriggerContext::default());

    let metrics = engine.metrics();
    assert_eq!(metrics.evaluations, 3);
    // complexity=high triggers both code_mapper and adversarial_review
    assert_eq!(metrics.total_triggers, 3);
    assert_eq!(engine.history().len(), 3);

    let mapper = &metrics.capabilities["code_mapper"];
    assert_eq!(mapper.trigger_count, 2);
    assert!((mapper.mean_confidence - 0.85).abs() < 1e-9);

    let review = &metrics.capabilities["adversarial_review"];
    assert_eq!(review.trigger_count, 1);
    assert_eq!(review.mean_confidence, 0.8);
    assert!(!metrics.capabilities.contains_key("doc_research"));
}

#[test]
fn capability_names_round_trip() {
    for cap in Capability::ALL {
        assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
    }
    assert!("bogus".parse::<Capability>().is_err());
}
