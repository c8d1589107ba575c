use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use console::style;
use serde::Serialize;

/// What the user is asked to approve before an interactive capability runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub capability: String,
    /// Why the capability is about to run.
    pub reason: String,
    pub text: String,
}

/// The user's answer to an execution plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserChoice {
    Proceed,
    Skip,
    /// Proceed after merging this free-text adjustment into the context.
    Adjust(String),
}

/// Request/response boundary between the coordinator and whoever approves work.
#[async_trait]
pub trait Interaction: Send + Sync {
    /// Emit a short progress line.
    fn progress(&self, message: &str);

    /// Present a plan and wait for a decision. No timeout.
    async fn decide(&self, plan: &ExecutionPlan) -> Result<UserChoice>;
}

/// Terminal prompt driven by `dialoguer`.
pub struct TerminalInteraction {
    assume_yes: bool,
}

impl TerminalInteraction {
    pub fn new() -> Self {
        Self { assume_yes: false }
    }

    /// Approve every plan without prompting.
    pub fn assume_yes() -> Self {
        Self { assume_yes: true }
    }
}

impl Default for TerminalInteraction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Interaction for TerminalInteraction {
    fn progress(&self, message: &str) {
        println!("  {}", message);
    }

    async fn decide(&self, plan: &ExecutionPlan) -> Result<UserChoice> {
        println!();
        println!("  {} {}", style("?").yellow(), style(&plan.capability).cyan().bold());
        println!("    {} {}", style("why:").dim(), plan.reason);
        for line in plan.text.lines() {
            println!("    {}", line);
        }
        println!();

        if self.assume_yes {
            println!("  {} proceeding (--yes)", style("✓").green());
            return Ok(UserChoice::Proceed);
        }

        // dialoguer blocks on the terminal; keep it off the async workers
        let choice = tokio::task::spawn_blocking(|| -> Result<UserChoice> {
            let options = ["Proceed", "Skip", "Adjust parameters"];
            let selection = dialoguer::Select::new()
                .with_prompt("  How do you want to continue?")
                .items(&options)
                .default(0)
                .interact()?;

            Ok(match selection {
                0 => UserChoice::Proceed,
                2 => {
                    let text: String = dialoguer::Input::new()
                        .with_prompt("  Adjustment (text or JSON object)")
                        .interact_text()?;
                    UserChoice::Adjust(text)
                }
                _ => UserChoice::Skip,
            })
        })
        .await??;

        Ok(choice)
    }
}

/// Pre-scripted responder for tests and non-interactive runs.
///
/// Answers come off the script in order; once it runs dry every plan is skipped.
#[derive(Default)]
pub struct ScriptedInteraction {
    script: Mutex<VecDeque<UserChoice>>,
    plans: Mutex<Vec<ExecutionPlan>>,
    messages: Mutex<Vec<String>>,
}

impl ScriptedInteraction {
    pub fn new(script: impl IntoIterator<Item = UserChoice>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            plans: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Plans presented so far.
    pub fn plans(&self) -> Vec<ExecutionPlan> {
        self.plans.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Progress lines emitted so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Interaction for ScriptedInteraction {
    fn progress(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }

    async fn decide(&self, plan: &ExecutionPlan) -> Result<UserChoice> {
        self.plans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(plan.clone());
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        Ok(next.unwrap_or(UserChoice::Skip))
    }
}
