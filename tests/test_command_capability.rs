#![cfg(unix)]
//! Tests for command-backed capabilities.

use std::time::Duration;

use ideaflow::capabilities::CapabilityHandler;
use ideaflow::capabilities::command::CommandCapability;
use ideaflow::triggers::TriggerContext;

fn sh(name: &str, script: &str) -> CommandCapability {
    let mut capability = CommandCapability::new(name, "sh");
    capability.args = vec!["-c".to_string(), script.to_string()];
    capability
}

#[tokio::test]
async fn json_stdout_becomes_artifact() {
    let capability = sh(
        "code_mapper",
        r#"echo '{"summary": "mapped 2 files", "files": ["a.rs", "b.rs"]}'"#,
    );
    let output = capability.invoke(&TriggerContext::default()).await.unwrap();

    assert_eq!(output.summary, "mapped 2 files");
    assert_eq!(output.artifact_type, "code_mapper_json");
    assert_eq!(output.data["files"][1], "b.rs");
}

#[tokio::test]
async fn text_stdout_is_kept_verbatim() {
    let capability = sh("doc_research", "printf 'first line\\nsecond line\\n'");
    let output = capability.invoke(&TriggerContext::default()).await.unwrap();

    assert_eq!(output.summary, "first line");
    assert_eq!(output.artifact_type, "doc_research_text");
    assert_eq!(output.data, "first line\nsecond line");
}

#[tokio::test]
async fn context_is_piped_to_stdin() {
    let capability = sh("code_mapper", "cat");
    let ctx = TriggerContext {
        task: Some("split billing module".to_string()),
        files_to_modify: vec!["billing.rs".to_string()],
        ..Default::default()
    };
    let output = capability.invoke(&ctx).await.unwrap();

    assert_eq!(output.artifact_type, "code_mapper_json");
    assert_eq!(output.data["task"], "split billing module");
    assert_eq!(output.data["files_to_modify"][0], "billing.rs");
    assert_eq!(output.summary, "code_mapper completed");
}

#[tokio::test]
async fn capability_name_is_exported() {
    let capability = sh("adversarial_review", "echo $IDEAFLOW_CAPABILITY");
    let output = capability.invoke(&TriggerContext::default()).await.unwrap();
    assert_eq!(output.data, "adversarial_review");
}

#[tokio::test]
async fn nonzero_exit_is_an_error() {
    let capability = sh("code_mapper", "echo boom >&2; exit 3");
    let err = capability
        .invoke(&TriggerContext::default())
        .await
        .unwrap_err()
        .to_string();
    assert!(err.contains("exited with code 3"));
    assert!(err.contains("boom"));
}

#[tokio::test]
async fn slow_command_times_out() {
    let mut capability = sh("doc_research", "sleep 5");
    capability.timeout = Duration::from_millis(200);
    let err = capability
        .invoke(&TriggerContext::default())
        .await
        .unwrap_err()
        .to_string();
    assert!(err.contains("timed out"));
}

#[tokio::test]
async fn missing_binary_fails_to_spawn() {
    let capability = CommandCapability::new("code_mapper", "/definitely/not/here");
    let err = capability
        .invoke(&TriggerContext::default())
        .await
        .unwrap_err()
        .to_string();
    assert!(err.contains("Failed to spawn"));
}
