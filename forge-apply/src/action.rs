//! The action model: what an AI response asks for, and where each request is
//! in its approval lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one pending action for the lifetime of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell cards apart in a log line.
        let s = self.0.simple().to_string();
        write!(f, "{}", &s[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Edit,
    Create,
    Delete,
    Terminal,
    Plan,
}

impl ActionKind {
    /// Whether applying this kind writes to the file store.
    pub fn mutates_files(self) -> bool {
        !matches!(self, ActionKind::Terminal)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Edit => "edit",
            ActionKind::Create => "create",
            ActionKind::Delete => "delete",
            ActionKind::Terminal => "terminal",
            ActionKind::Plan => "plan",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a pending action.
///
/// `Proposed` is the only initial state. `Applied`, `Rejected` and `Failed`
/// are terminal; nothing moves out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Proposed,
    Applying,
    Applied,
    Rejected,
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Applied | ActionStatus::Rejected | ActionStatus::Failed
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionStatus::Proposed => "proposed",
            ActionStatus::Applying => "applying",
            ActionStatus::Applied => "applied",
            ActionStatus::Rejected => "rejected",
            ActionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ── Plans ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTask {
    pub title: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tasks: Vec<PlanTask>,
}

/// Render a plan as the markdown document written to the plan file.
///
/// Phased tasks are grouped under one heading per phase, in the order each
/// phase first appears. Tasks without a phase come last.
pub fn render_plan_markdown(plan: &Plan) -> String {
    let mut out = format!("# {}\n", plan.title);
    if let Some(desc) = plan.description.as_deref().filter(|d| !d.trim().is_empty()) {
        out.push('\n');
        out.push_str(desc.trim());
        out.push('\n');
    }

    let mut phases: Vec<&str> = Vec::new();
    for task in &plan.tasks {
        if let Some(phase) = task.phase.as_deref() {
            if !phases.contains(&phase) {
                phases.push(phase);
            }
        }
    }

    for phase in &phases {
        out.push_str(&format!("\n## {phase}\n\n"));
        for task in plan.tasks.iter().filter(|t| t.phase.as_deref() == Some(*phase)) {
            push_task(&mut out, task);
        }
    }

    let unphased: Vec<&PlanTask> = plan.tasks.iter().filter(|t| t.phase.is_none()).collect();
    if !unphased.is_empty() {
        if phases.is_empty() {
            out.push('\n');
        } else {
            out.push_str("\n## Other\n\n");
        }
        for task in unphased {
            push_task(&mut out, task);
        }
    }
    out
}

fn push_task(out: &mut String, task: &PlanTask) {
    let mark = if task.done { '☑' } else { '☐' };
    out.push_str(&format!("- {mark} {}\n", task.title));
}

// ── Proposals ───────────────────────────────────────────────────

/// What an action carries besides its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ActionPayload {
    /// Full proposed file content (edit, create).
    Content(String),
    /// Shell command line (terminal).
    Command(String),
    Plan(Plan),
    /// Delete carries nothing.
    None,
}

/// One parsed request from an AI response, before it enters the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub kind: ActionKind,
    /// Filename for file actions, the command line for terminal actions,
    /// the plan title for plans.
    pub target: String,
    pub payload: ActionPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProposedAction {
    pub fn edit(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Edit,
            target: filename.into(),
            payload: ActionPayload::Content(content.into()),
            description: None,
        }
    }

    pub fn create(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Create,
            target: filename.into(),
            payload: ActionPayload::Content(content.into()),
            description: None,
        }
    }

    pub fn delete(filename: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Delete,
            target: filename.into(),
            payload: ActionPayload::None,
            description: None,
        }
    }

    pub fn terminal(command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            kind: ActionKind::Terminal,
            target: command.clone(),
            payload: ActionPayload::Command(command),
            description: None,
        }
    }

    pub fn plan(plan: Plan) -> Self {
        Self {
            kind: ActionKind::Plan,
            target: plan.title.clone(),
            payload: ActionPayload::Plan(plan),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Proposed file content for edit and create actions.
    pub fn content(&self) -> Option<&str> {
        match &self.payload {
            ActionPayload::Content(content) => Some(content),
            _ => None,
        }
    }
}

/// An action in the pipeline's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: ActionId,
    pub kind: ActionKind,
    pub target: String,
    pub payload: ActionPayload,
    pub description: Option<String>,
    pub status: ActionStatus,
    /// Target content when the action was proposed, used as the merge base
    /// for edits. `None` when the file did not exist.
    #[serde(skip)]
    pub snapshot: Option<String>,
}

impl PendingAction {
    pub fn new(action: ProposedAction, snapshot: Option<String>) -> Self {
        Self {
            id: ActionId::new(),
            kind: action.kind,
            target: action.target,
            payload: action.payload,
            description: action.description,
            status: ActionStatus::Proposed,
            snapshot,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match &self.payload {
            ActionPayload::Content(content) => Some(content),
            _ => None,
        }
    }

    /// One-line summary for approval prompts and logs.
    pub fn summary(&self) -> String {
        let base = match self.kind {
            ActionKind::Edit => format!("Edit {}", self.target),
            ActionKind::Create => format!("Create {}", self.target),
            ActionKind::Delete => format!("Delete {}", self.target),
            ActionKind::Terminal => format!("Run `{}`", self.target),
            ActionKind::Plan => format!("Write plan \"{}\"", self.target),
        };
        match self.description.as_deref() {
            Some(desc) if !desc.is_empty() => format!("{base}: {desc}"),
            _ => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str, done: bool, phase: Option<&str>) -> PlanTask {
        PlanTask {
            title: title.into(),
            done,
            phase: phase.map(String::from),
        }
    }

    #[test]
    fn test_plan_groups_by_phase_unphased_last() {
        let plan = Plan {
            title: "Refactor".into(),
            description: Some("Split the parser".into()),
            tasks: vec![
                task("loose end", false, None),
                task("extract lexer", true, Some("Setup")),
                task("write tests", false, Some("Verify")),
                task("move tokens", false, Some("Setup")),
            ],
        };
        let md = render_plan_markdown(&plan);
        assert_eq!(
            md,
            "# Refactor\n\nSplit the parser\n\n## Setup\n\n- ☑ extract lexer\n- ☐ move tokens\n\n\
             ## Verify\n\n- ☐ write tests\n\n## Other\n\n- ☐ loose end\n"
        );
    }

    #[test]
    fn test_plan_without_phases_is_flat() {
        let plan = Plan {
            title: "Quick".into(),
            description: None,
            tasks: vec![task("one", false, None), task("two", true, None)],
        };
        assert_eq!(render_plan_markdown(&plan), "# Quick\n\n- ☐ one\n- ☑ two\n");
    }

    #[test]
    fn test_status_terminality() {
        assert!(!ActionStatus::Proposed.is_terminal());
        assert!(!ActionStatus::Applying.is_terminal());
        assert!(ActionStatus::Applied.is_terminal());
        assert!(ActionStatus::Rejected.is_terminal());
        assert!(ActionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_pending_action_summary() {
        let pending = PendingAction::new(
            ProposedAction::terminal("cargo test").with_description("run the suite"),
            None,
        );
        assert_eq!(pending.summary(), "Run `cargo test`: run the suite");
        assert_eq!(pending.status, ActionStatus::Proposed);
        assert!(!pending.kind.mutates_files());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(ActionId::new(), ActionId::new());
        assert_eq!(ActionId::new().to_string().len(), 8);
    }
}
