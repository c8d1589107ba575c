use crate::triggers::TriggerContext;

const PLACEHOLDER: &str = "${ctx.";

/// Replace `${ctx.path}` placeholders with values from `ctx`.
/// Substituted text is never expanded again; an unterminated placeholder stays verbatim.
pub fn interpolate(template: &str, ctx: &serde_json::Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find(PLACEHOLDER) {
        let body = &rest[open + PLACEHOLDER.len()..];
        let Some(close) = body.find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(&resolve_path(&body[..close], ctx));
        rest = &body[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Resolve a dotted path (e.g., "files_to_modify.0") from the context.
fn resolve_path(path: &str, ctx: &serde_json::Value) -> String {
    let mut current = ctx;
    for part in path.split('.') {
        let next = match current {
            serde_json::Value::Object(map) => map.get(part),
            serde_json::Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = match next {
            Some(v) => v,
            None => return String::new(),
        };
    }

    match current {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn default_intent(capability: &str) -> String {
    match capability {
        "adversarial_review" => {
            "Run an adversarial review of the planned change, hunting for security holes, broken edge cases and wrong assumptions.".to_string()
        }
        "project_checkpoint" => {
            "Capture a project snapshot: progress so far, decisions taken and open risks.".to_string()
        }
        "code_mapper" => "Map the files and code paths the change will touch.".to_string(),
        "doc_research" => {
            "Look up current documentation for the external libraries and APIs involved.".to_string()
        }
        other => format!("Run capability '{}'.", other),
    }
}

/// Reason given for a capability run that no trigger decision asked for.
pub fn direct_reason(ctx: &TriggerContext) -> String {
    let flags: Vec<&str> = [
        (ctx.security_impact, "security impact"),
        (ctx.affects_auth, "affects authentication"),
        (ctx.affects_payment, "affects payment"),
        (ctx.major_version_bump, "major version bump"),
        (ctx.unfamiliar_technology, "unfamiliar technology"),
        (ctx.milestone_reached, "milestone reached"),
        (ctx.end_of_work_block, "end of work block"),
        (ctx.critical_document_changed, "critical document changed"),
    ]
    .into_iter()
    .filter_map(|(set, label)| set.then_some(label))
    .collect();

    let mut reason = match ctx.task.as_deref().map(str::trim) {
        Some(task) if !task.is_empty() => format!("Requested directly for: {}", task),
        _ => "Requested directly".to_string(),
    };
    if !flags.is_empty() {
        reason.push_str(&format!(" ({})", flags.join(", ")));
    }
    reason
}

/// Natural-language plan shown before an interactive capability runs.
pub fn render_plan(capability: &str, template: Option<&str>, ctx: &TriggerContext) -> String {
    if let Some(template) = template {
        return interpolate(template, &ctx.to_json());
    }

    let mut lines = vec![default_intent(capability)];
    if let Some(task) = &ctx.task {
        lines.push(format!("Task: {}", task));
    }
    if !ctx.files_to_modify.is_empty() {
        lines.push(format!(
            "Files ({}): {}",
            ctx.files_to_modify.len(),
            ctx.files_to_modify.join(", ")
        ));
    }
    if ctx.estimated_loc > 0 {
        lines.push(format!("Estimated change: {} lines", ctx.estimated_loc));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_interpolation() {
        let ctx = serde_json::json!({"task": "billing page"});
        assert_eq!(
            interpolate("Review ${ctx.task}!", &ctx),
            "Review billing page!"
        );
    }

    #[test]
    fn test_nested_and_indexed_interpolation() {
        let ctx = serde_json::json!({
            "owner": {"email": "ops@example.com"},
            "files_to_modify": ["a.rs", "b.rs"]
        });
        assert_eq!(
            interpolate("${ctx.owner.email} / ${ctx.files_to_modify.1}", &ctx),
            "ops@example.com / b.rs"
        );
        assert_eq!(
            interpolate("Files: ${ctx.files_to_modify}", &ctx),
            "Files: a.rs, b.rs"
        );
    }

    #[test]
    fn test_unterminated_placeholder_is_kept() {
        let ctx = serde_json::json!({"task": "billing"});
        assert_eq!(
            interpolate("${ctx.task} then ${ctx.task", &ctx),
            "billing then ${ctx.task"
        );
    }

    #[test]
    fn test_substituted_text_is_not_expanded() {
        let ctx = serde_json::json!({"task": "${ctx.secret}", "secret": "leak"});
        assert_eq!(interpolate("Do ${ctx.task}", &ctx), "Do ${ctx.secret}");
    }

    #[test]
    fn direct_reason_combines_task_and_flags() {
        let ctx = TriggerContext {
            task: Some("Swap ORM".to_string()),
            major_version_bump: true,
            ..Default::default()
        };
        assert_eq!(
            direct_reason(&ctx),
            "Requested directly for: Swap ORM (major version bump)"
        );

        let blank = TriggerContext {
            task: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(direct_reason(&blank), "Requested directly");
    }

    #[test]
    fn test_missing_key() {
        let ctx = serde_json::json!({});
        assert_eq!(interpolate("Hello ${ctx.missing}!", &ctx), "Hello !");
    }

    #[test]
    fn default_plan_lists_task_and_files() {
        let ctx = TriggerContext {
            task: Some("Add Stripe checkout".to_string()),
            files_to_modify: vec!["pay.rs".to_string()],
            ..Default::default()
        };
        let plan = render_plan("adversarial_review", None, &ctx);
        assert!(plan.starts_with("Run an adversarial review"));
        assert!(plan.contains("Task: Add Stripe checkout"));
        assert!(plan.contains("Files (1): pay.rs"));
    }
}
