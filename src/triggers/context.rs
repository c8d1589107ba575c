use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Complexity rating of the work about to happen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    #[default]
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Complexity {
    pub fn is_high(&self) -> bool {
        matches!(self, Complexity::High | Complexity::VeryHigh)
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
            Complexity::VeryHigh => "very_high",
        })
    }
}

/// Description of the unit of work about to happen. Every field is optional in JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerContext {
    /// Short description of the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub files_to_modify: Vec<String>,
    pub estimated_loc: u64,
    /// Lines modified since the last project snapshot.
    pub modified_loc: u64,
    pub complexity: Complexity,

    pub end_of_work_block: bool,
    pub critical_document_changed: bool,
    pub milestone_reached: bool,

    pub security_impact: bool,
    pub affects_auth: bool,
    pub affects_payment: bool,
    /// Self-assessed confidence in the planned approach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// External library or API being introduced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_library: Option<String>,
    pub major_version_bump: bool,
    pub unfamiliar_technology: bool,

    /// Anything else the caller wants handlers to see.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TriggerContext {
    /// Merge a user adjustment into the context.
    ///
    /// A JSON object overrides matching fields (unknown keys land in `extra`);
    /// any other text is kept verbatim under `user_adjustment`.
    pub fn apply_adjustment(&mut self, adjustment: &str) {
        let trimmed = adjustment.trim();
        if trimmed.is_empty() {
            return;
        }

        if let Ok(serde_json::Value::Object(overrides)) = serde_json::from_str(trimmed)
            && let Ok(serde_json::Value::Object(mut current)) = serde_json::to_value(&*self)
        {
            current.extend(overrides);
            match serde_json::from_value::<TriggerContext>(serde_json::Value::Object(current)) {
                Ok(merged) => {
                    *self = merged;
                    return;
                }
                Err(e) => debug!(error = %e, "Adjustment does not fit the context, keeping as text"),
            }
        }

        self.extra.insert(
            "user_adjustment".to_string(),
            serde_json::Value::String(trimmed.to_string()),
        );
    }

    /// JSON view used for plan templating and external handlers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_json() {
        let ctx: TriggerContext = serde_json::from_str(
            r#"{"files_to_modify": ["a.rs", "b.rs"], "complexity": "very_high", "owner": "ops"}"#,
        )
        .unwrap();
        assert_eq!(ctx.files_to_modify.len(), 2);
        assert_eq!(ctx.complexity, Complexity::VeryHigh);
        assert!(ctx.complexity.is_high());
        assert_eq!(ctx.extra.get("owner").unwrap(), "ops");
        assert!(!ctx.affects_auth);
    }

    #[test]
    fn json_adjustment_overrides_fields() {
        let mut ctx = TriggerContext {
            estimated_loc: 400,
            ..Default::default()
        };
        ctx.apply_adjustment(r#"{"estimated_loc": 50, "focus": "billing"}"#);
        assert_eq!(ctx.estimated_loc, 50);
        assert_eq!(ctx.extra.get("focus").unwrap(), "billing");
    }

    #[test]
    fn text_adjustment_is_kept_verbatim() {
        let mut ctx = TriggerContext::default();
        ctx.apply_adjustment("  only look at the auth module ");
        assert_eq!(
            ctx.extra.get("user_adjustment").unwrap(),
            "only look at the auth module"
        );
    }

    #[test]
    fn ill_typed_json_adjustment_falls_back_to_text() {
        let mut ctx = TriggerContext::default();
        ctx.apply_adjustment(r#"{"estimated_loc": "lots"}"#);
        assert_eq!(ctx.estimated_loc, 0);
        assert!(ctx.extra.contains_key("user_adjustment"));
    }
}
