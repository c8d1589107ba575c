use std::io::Write;

use ideaflow::cli::IdeaflowConfig;
use tempfile::NamedTempFile;

#[test]
fn load_valid_config_all_fields() {
    let yaml = r#"
checkpoint_dir: "custom/checkpoints"
trigger_config: "config/triggers.yaml"
keep_checkpoints: 20
auto_save: false
journal: "data/journal.jsonl"
workflow:
  name: validation
  steps:
    - name: problem
      description: Who hurts and how much
    - name: market
capabilities:
  adversarial_review:
    cmd: "./scripts/review.sh"
    args: ["--strict"]
    timeout: 30
    description: "Red-team the change"
    plan: "Review ${ctx.task}"
"#;

    let mut f = NamedTempFile::new().unwrap();
    f.write_all(yaml.as_bytes()).unwrap();

    let cfg = IdeaflowConfig::load(Some(f.path())).unwrap();

    assert_eq!(cfg.checkpoint_dir.as_deref(), Some("custom/checkpoints"));
    assert_eq!(cfg.trigger_config.as_deref(), Some("config/triggers.yaml"));
    assert_eq!(cfg.keep_checkpoints, Some(20));
    assert_eq!(cfg.auto_save, Some(false));
    assert_eq!(cfg.journal.as_deref(), Some("data/journal.jsonl"));

    let workflow = cfg.workflow.as_ref().unwrap();
    assert_eq!(workflow.name, "validation");
    assert_eq!(workflow.total_steps(), 2);
    assert_eq!(workflow.steps[0].description, "Who hurts and how much");
    assert_eq!(workflow.steps[1].description, "");

    let review = &cfg.capabilities.as_ref().unwrap()["adversarial_review"];
    assert_eq!(review.cmd, "./scripts/review.sh");
    assert_eq!(review.args, vec!["--strict".to_string()]);
    assert_eq!(review.timeout, Some(30.0));
    assert!(review.cwd.is_none());
}

#[test]
fn load_partial_config() {
    let yaml = r#"
keep_checkpoints: 5
"#;

    let mut f = NamedTempFile::new().unwrap();
    f.write_all(yaml.as_bytes()).unwrap();

    let cfg = IdeaflowConfig::load(Some(f.path())).unwrap();

    assert_eq!(cfg.keep_checkpoints, Some(5));
    assert!(cfg.checkpoint_dir.is_none());
    assert!(cfg.trigger_config.is_none());
    assert!(cfg.auto_save.is_none());
    assert!(cfg.journal.is_none());
    assert!(cfg.workflow.is_none());
    assert!(cfg.capabilities.is_none());
}

#[test]
fn missing_explicit_path_returns_error() {
    let result = IdeaflowConfig::load(Some(std::path::Path::new("/nonexistent/ideaflow.yaml")));
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("Config file not found")
    );
}

#[test]
fn invalid_yaml_returns_error() {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(b"keep_checkpoints: [not a number").unwrap();

    let result = IdeaflowConfig::load(Some(f.path()));
    assert!(result.is_err());
    assert!(format!("{:#}", result.unwrap_err()).contains("Failed to parse config file"));
}

#[test]
fn build_registry_from_capabilities() {
    let yaml = r#"
capabilities:
  code_mapper:
    cmd: "tree"
  doc_research:
    cmd: "./research.sh"
    description: "Fetch docs"
    plan: "Research ${ctx.external_library}"
"#;

    let mut f = NamedTempFile::new().unwrap();
    f.write_all(yaml.as_bytes()).unwrap();
    let cfg = IdeaflowConfig::load(Some(f.path())).unwrap();

    let registry = cfg.build_registry();
    assert!(registry.contains("code_mapper"));
    assert!(registry.contains("doc_research"));
    assert!(!registry.contains("adversarial_review"));

    let listed = registry.list();
    assert_eq!(listed[0], ("code_mapper", "Run `tree`"));
    assert_eq!(listed[1], ("doc_research", "Fetch docs"));

    let templates = cfg.plan_templates();
    assert_eq!(
        templates,
        vec![(
            "doc_research".to_string(),
            "Research ${ctx.external_library}".to_string()
        )]
    );
}

#[test]
fn empty_config_builds_empty_registry() {
    let cfg = IdeaflowConfig::default();
    assert!(cfg.build_registry().list().is_empty());
    assert!(cfg.plan_templates().is_empty());
}

#[test]
fn unusable_timeouts_fall_back_to_default() {
    let yaml = r#"
capabilities:
  code_mapper:
    cmd: "tree"
    timeout: 1.0e+30
  doc_research:
    cmd: "./research.sh"
    timeout: -5
  adversarial_review:
    cmd: "./review.sh"
    timeout: 0
"#;

    let mut f = NamedTempFile::new().unwrap();
    f.write_all(yaml.as_bytes()).unwrap();
    let cfg = IdeaflowConfig::load(Some(f.path())).unwrap();

    let mapper = &cfg.capabilities.as_ref().unwrap()["code_mapper"];
    assert_eq!(mapper.timeout, Some(1e30));

    let registry = cfg.build_registry();
    assert!(registry.contains("code_mapper"));
    assert!(registry.contains("doc_research"));
    assert!(registry.contains("adversarial_review"));
}
