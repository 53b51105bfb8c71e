//! The approval-gated action pipeline.
//!
//! Every proposed action waits in `Proposed` until the user explicitly
//! applies or rejects it:
//!
//! ```text
//! Proposed ──apply──▶ Applying ──▶ Applied | Failed
//!    │
//!    └──reject──▶ Rejected
//! ```
//!
//! Nothing moves on its own. A create that would clobber an existing file
//! stays `Proposed` until the overwrite is confirmed or declined. Failures
//! are caught here and turned into a `Failed` report plus a notification;
//! one bad action never aborts the others.
//!
//! UI cards drive the pipeline through [`DecisionHandlers`], one per action,
//! whose decisions are picked up by [`ActionPipeline::await_decision`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::action::{
    render_plan_markdown, ActionId, ActionKind, ActionPayload, ActionStatus, PendingAction,
    ProposedAction,
};
use crate::bridge::{CommandOutput, EditorView, FileStore, NotificationSink, NotifyLevel, TerminalExecutor};
use crate::config::ApplyConfig;
use crate::diff::{compute_diff, DiffResult};
use crate::error::{ApplyError, PipelineError};
use crate::history::{ChangeHistory, ChangeSource, UndoAction};
use crate::hunks::{collapse_context, DisplayHunk};
use crate::reconcile::{reconcile, MergeConflict, ReconcileOutcome};

// ── Public types ────────────────────────────────────────────────

/// The editor-side services the pipeline works through.
#[derive(Clone)]
pub struct Collaborators {
    pub files: Arc<dyn FileStore>,
    pub editor: Arc<dyn EditorView>,
    pub terminal: Arc<dyn TerminalExecutor>,
    pub notifier: Arc<dyn NotificationSink>,
}

/// What happened when an action was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// An edit was written. Conflicts, if any, are marked inline.
    Edited { conflicts: Vec<MergeConflict> },
    /// The file already held the proposed content; nothing was written.
    AlreadyApplied,
    Created,
    Deleted,
    PlanWritten { path: String },
    /// The command ran; a non-zero exit marks the action `Failed`.
    CommandRan(CommandOutput),
    /// The create targets an existing file and needs a second confirmation.
    OverwriteRequired,
    Rejected,
    Failed { message: String },
}

/// Status line for one resolved (or still pending) action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub id: ActionId,
    pub kind: ActionKind,
    pub target: String,
    pub status: ActionStatus,
    pub outcome: ApplyOutcome,
}

/// Data for rendering an action card before the user decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionPreview {
    Edit {
        diff: DiffResult,
        display: Vec<DisplayHunk>,
    },
    Create {
        diff: DiffResult,
        display: Vec<DisplayHunk>,
        overwrites_existing: bool,
    },
    Delete {
        diff: DiffResult,
        display: Vec<DisplayHunk>,
    },
    Terminal {
        command: String,
    },
    Plan {
        path: String,
        markdown: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Apply,
    Reject,
    /// Answer to an overwrite prompt: `true` replaces the existing file.
    Overwrite(bool),
}

/// Entry points bound to a single action card.
///
/// Handlers can be cloned and moved into UI callbacks. Once the action is
/// resolved further calls return `false`.
#[derive(Debug, Clone)]
pub struct DecisionHandlers {
    id: ActionId,
    tx: mpsc::UnboundedSender<Decision>,
}

impl DecisionHandlers {
    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn on_apply(&self) -> bool {
        self.tx.send(Decision::Apply).is_ok()
    }

    pub fn on_reject(&self) -> bool {
        self.tx.send(Decision::Reject).is_ok()
    }

    pub fn on_overwrite(&self, confirm: bool) -> bool {
        self.tx.send(Decision::Overwrite(confirm)).is_ok()
    }
}

// ── Pipeline ────────────────────────────────────────────────────

pub struct ActionPipeline {
    files: Arc<dyn FileStore>,
    editor: Arc<dyn EditorView>,
    terminal: Arc<dyn TerminalExecutor>,
    notifier: Arc<dyn NotificationSink>,
    history: Arc<Mutex<ChangeHistory>>,
    config: ApplyConfig,
    pending: Vec<PendingAction>,
    awaiting_overwrite: HashSet<ActionId>,
    decisions: HashMap<ActionId, mpsc::UnboundedReceiver<Decision>>,
}

impl ActionPipeline {
    /// A pipeline with a fresh history sized from `config`.
    pub fn new(collaborators: Collaborators, config: ApplyConfig) -> Self {
        let history = Arc::new(Mutex::new(ChangeHistory::with_capacity(config.history_capacity)));
        Self::with_history(collaborators, config, history)
    }

    /// A pipeline sharing an existing session history.
    pub fn with_history(
        collaborators: Collaborators,
        config: ApplyConfig,
        history: Arc<Mutex<ChangeHistory>>,
    ) -> Self {
        Self {
            files: collaborators.files,
            editor: collaborators.editor,
            terminal: collaborators.terminal,
            notifier: collaborators.notifier,
            history,
            config,
            pending: Vec::new(),
            awaiting_overwrite: HashSet::new(),
            decisions: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ApplyConfig {
        &self.config
    }

    pub fn history(&self) -> Arc<Mutex<ChangeHistory>> {
        Arc::clone(&self.history)
    }

    /// Actions not yet resolved, in proposal order.
    pub fn pending(&self) -> &[PendingAction] {
        &self.pending
    }

    pub fn get(&self, id: ActionId) -> Option<&PendingAction> {
        self.pending.iter().find(|a| a.id == id)
    }

    /// Whether a create is waiting on an overwrite answer.
    pub fn awaiting_overwrite(&self, id: ActionId) -> bool {
        self.awaiting_overwrite.contains(&id)
    }

    // ── Proposal ────────────────────────────────────────────────

    /// Queue parsed actions. File actions snapshot their target now so an
    /// edit can later be merged against whatever the user did meanwhile.
    pub async fn propose(&mut self, actions: Vec<ProposedAction>) -> Result<Vec<ActionId>, PipelineError> {
        let mut ids = Vec::with_capacity(actions.len());
        for action in actions {
            let snapshot = match action.kind {
                ActionKind::Edit | ActionKind::Create | ActionKind::Delete => self
                    .files
                    .find_file(&action.target)
                    .await
                    .map_err(store_error(&action.target))?,
                ActionKind::Terminal | ActionKind::Plan => None,
            };
            let pending = PendingAction::new(action, snapshot);
            tracing::info!("proposed {} ({})", pending.summary(), pending.id);
            ids.push(pending.id);
            self.pending.push(pending);
        }
        Ok(ids)
    }

    pub async fn preview(&self, id: ActionId) -> Result<ActionPreview, PipelineError> {
        let action = self.get(id).ok_or(PipelineError::UnknownAction(id))?;
        let preview = match action.kind {
            ActionKind::Edit => {
                let diff = compute_diff(
                    action.snapshot.as_deref().unwrap_or_default(),
                    action.content().unwrap_or_default(),
                );
                ActionPreview::Edit {
                    display: self.display(&diff),
                    diff,
                }
            }
            ActionKind::Create => {
                let existing = self
                    .files
                    .find_file(&action.target)
                    .await
                    .map_err(store_error(&action.target))?;
                let diff = compute_diff("", action.content().unwrap_or_default());
                ActionPreview::Create {
                    display: self.display(&diff),
                    diff,
                    overwrites_existing: existing.is_some(),
                }
            }
            ActionKind::Delete => {
                let diff = compute_diff(action.snapshot.as_deref().unwrap_or_default(), "");
                ActionPreview::Delete {
                    display: self.display(&diff),
                    diff,
                }
            }
            ActionKind::Terminal => ActionPreview::Terminal {
                command: action.target.clone(),
            },
            ActionKind::Plan => {
                let markdown = match &action.payload {
                    ActionPayload::Plan(plan) => render_plan_markdown(plan),
                    _ => String::new(),
                };
                ActionPreview::Plan {
                    path: self.config.plan_file.clone(),
                    markdown,
                }
            }
        };
        Ok(preview)
    }

    fn display(&self, diff: &DiffResult) -> Vec<DisplayHunk> {
        collapse_context(&diff.hunks, self.config.context_lines, self.config.collapse_context)
    }

    // ── Decisions ───────────────────────────────────────────────

    /// Create the handlers for an action card. Calling this again replaces
    /// the previous handlers; the old ones stop working.
    pub fn handlers(&mut self, id: ActionId) -> Result<DecisionHandlers, PipelineError> {
        self.index_of(id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.decisions.insert(id, rx);
        Ok(DecisionHandlers { id, tx })
    }

    /// Wait for the next decision on `id` and carry it out.
    ///
    /// If every handler is dropped without a decision the action is
    /// rejected. When the report says `OverwriteRequired`, call this again
    /// to wait for the overwrite answer.
    pub async fn await_decision(&mut self, id: ActionId) -> Result<ActionReport, PipelineError> {
        let mut rx = self.decisions.remove(&id).ok_or(PipelineError::NoHandlers(id))?;
        let decision = rx.recv().await.unwrap_or(Decision::Reject);
        tracing::debug!("decision for {id}: {decision:?}");

        let result = match decision {
            Decision::Apply => self.apply(id).await,
            Decision::Reject => self.reject(id).await,
            Decision::Overwrite(confirm) => self.confirm_overwrite(id, confirm).await,
        };
        if self.get(id).is_some() {
            self.decisions.insert(id, rx);
        }
        result
    }

    pub async fn apply(&mut self, id: ActionId) -> Result<ActionReport, PipelineError> {
        let idx = self.index_of(id)?;
        if self.awaiting_overwrite.contains(&id) {
            return Ok(self.report(idx, ApplyOutcome::OverwriteRequired));
        }
        self.expect_status(idx, ActionStatus::Proposed, "proposed")?;

        self.pending[idx].status = ActionStatus::Applying;
        let action = self.pending[idx].clone();
        tracing::info!("applying {} ({id})", action.summary());
        let result = self.execute(&action, false).await;
        Ok(self.finish(action, result).await)
    }

    /// Discard a proposed action. No side effects, no history.
    pub async fn reject(&mut self, id: ActionId) -> Result<ActionReport, PipelineError> {
        let idx = self.index_of(id)?;
        self.expect_status(idx, ActionStatus::Proposed, "proposed")?;
        self.pending[idx].status = ActionStatus::Rejected;
        tracing::info!("rejected {} ({id})", self.pending[idx].summary());
        let report = self.report(idx, ApplyOutcome::Rejected);
        self.remove(id);
        Ok(report)
    }

    /// Answer the overwrite prompt of a create action.
    pub async fn confirm_overwrite(&mut self, id: ActionId, confirm: bool) -> Result<ActionReport, PipelineError> {
        let idx = self.index_of(id)?;
        if !self.awaiting_overwrite.contains(&id) {
            return Err(PipelineError::InvalidState {
                id,
                status: self.pending[idx].status.to_string(),
                expected: "awaiting overwrite confirmation",
            });
        }
        self.awaiting_overwrite.remove(&id);
        if !confirm {
            return self.reject(id).await;
        }

        self.pending[idx].status = ActionStatus::Applying;
        let action = self.pending[idx].clone();
        tracing::info!("overwrite confirmed for {} ({id})", action.target);
        let result = self.execute(&action, true).await;
        Ok(self.finish(action, result).await)
    }

    /// Apply every proposed action, one at a time, in queue order.
    ///
    /// Creates that need an overwrite confirmation are reported as
    /// `OverwriteRequired` and stay pending.
    pub async fn apply_all(&mut self) -> Vec<ActionReport> {
        let ids: Vec<ActionId> = self
            .pending
            .iter()
            .filter(|a| a.status == ActionStatus::Proposed)
            .map(|a| a.id)
            .collect();

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            match self.apply(id).await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::warn!("apply_all skipped {id}: {e}"),
            }
        }
        reports
    }

    // ── Undo ────────────────────────────────────────────────────

    /// Revert the newest AI change to `filename`.
    ///
    /// Returns the restored content, or `None` when the change created the
    /// file and undoing it removed the file.
    pub async fn undo_last(&mut self, filename: &str) -> Result<Option<String>, PipelineError> {
        // The record only leaves the history once the store has reverted the
        // file, so a failed revert can be retried.
        let undo = self
            .history
            .lock()
            .peek_undo(filename)
            .ok_or_else(|| PipelineError::NothingToUndo(filename.to_string()))?;

        let restored = match undo {
            UndoAction::Restore(content) => {
                let exists = self
                    .files
                    .find_file(filename)
                    .await
                    .map_err(store_error(filename))?
                    .is_some();
                let written = if exists {
                    self.files.write_file(filename, &content).await
                } else {
                    self.files.create_file(filename, &content).await
                };
                written.map_err(store_error(filename))?;
                self.refresh_editor(filename, &content).await;
                Some(content)
            }
            UndoAction::Remove => {
                self.files
                    .delete_file(filename)
                    .await
                    .map_err(store_error(filename))?;
                self.clear_editor(filename).await;
                None
            }
        };

        if self.history.lock().undo_last(filename).is_none() {
            tracing::debug!("history for {filename} changed while undoing");
        }
        tracing::info!("undid last AI change to {filename}");
        self.notifier
            .notify(&format!("Reverted AI change to {filename}"), NotifyLevel::Info)
            .await;
        Ok(restored)
    }

    /// Note an edit the user made so undo will not roll past it.
    pub fn record_user_change(&self, filename: &str, old_content: Option<String>, new_content: Option<String>) {
        self.history
            .lock()
            .record(filename, old_content, new_content, ChangeSource::User);
    }

    // ── Internals ───────────────────────────────────────────────

    fn index_of(&self, id: ActionId) -> Result<usize, PipelineError> {
        self.pending
            .iter()
            .position(|a| a.id == id)
            .ok_or(PipelineError::UnknownAction(id))
    }

    fn expect_status(&self, idx: usize, expected: ActionStatus, label: &'static str) -> Result<(), PipelineError> {
        let action = &self.pending[idx];
        if action.status != expected {
            return Err(PipelineError::InvalidState {
                id: action.id,
                status: action.status.to_string(),
                expected: label,
            });
        }
        Ok(())
    }

    fn report(&self, idx: usize, outcome: ApplyOutcome) -> ActionReport {
        let action = &self.pending[idx];
        ActionReport {
            id: action.id,
            kind: action.kind,
            target: action.target.clone(),
            status: action.status,
            outcome,
        }
    }

    fn remove(&mut self, id: ActionId) {
        self.pending.retain(|a| a.id != id);
        self.awaiting_overwrite.remove(&id);
        self.decisions.remove(&id);
    }

    /// Settle the status after an apply attempt and notify the user.
    async fn finish(&mut self, action: PendingAction, result: Result<ApplyOutcome, ApplyError>) -> ActionReport {
        let id = action.id;
        let target = action.target;

        let (status, outcome, level, message) = match result {
            Ok(ApplyOutcome::OverwriteRequired) => {
                self.awaiting_overwrite.insert(id);
                (
                    ActionStatus::Proposed,
                    ApplyOutcome::OverwriteRequired,
                    NotifyLevel::Warning,
                    format!("{target} already exists; confirm to overwrite it"),
                )
            }
            Ok(ApplyOutcome::CommandRan(output)) => {
                let ok = output.succeeded();
                let message = command_message(&target, &output);
                (
                    if ok { ActionStatus::Applied } else { ActionStatus::Failed },
                    ApplyOutcome::CommandRan(output),
                    if ok { NotifyLevel::Success } else { NotifyLevel::Error },
                    message,
                )
            }
            Ok(outcome) => {
                let (level, message) = match &outcome {
                    ApplyOutcome::Edited { conflicts } if !conflicts.is_empty() => (
                        NotifyLevel::Warning,
                        format!(
                            "Applied changes to {target} with {} conflict(s); resolve the marked sections",
                            conflicts.len()
                        ),
                    ),
                    ApplyOutcome::AlreadyApplied => (
                        NotifyLevel::Info,
                        format!("{target} already contains these changes"),
                    ),
                    ApplyOutcome::Created => (NotifyLevel::Success, format!("Created {target}")),
                    ApplyOutcome::Deleted => (NotifyLevel::Success, format!("Deleted {target}")),
                    ApplyOutcome::PlanWritten { path } => {
                        (NotifyLevel::Success, format!("Wrote plan to {path}"))
                    }
                    _ => (NotifyLevel::Success, format!("Applied changes to {target}")),
                };
                (ActionStatus::Applied, outcome, level, message)
            }
            Err(e) => {
                tracing::error!("action {id} on {target} failed: {e}");
                let message = format!("Failed to apply to {target}: {e}");
                (
                    ActionStatus::Failed,
                    ApplyOutcome::Failed { message: e.to_string() },
                    NotifyLevel::Error,
                    message,
                )
            }
        };

        if let Ok(idx) = self.index_of(id) {
            self.pending[idx].status = status;
        }
        let report = ActionReport {
            id,
            kind: action.kind,
            target: target.clone(),
            status,
            outcome,
        };
        if status.is_terminal() {
            tracing::info!("{} {target} ({id})", status);
            self.remove(id);
        }
        self.notifier.notify(&message, level).await;
        report
    }

    /// Carry out an action against the collaborators.
    async fn execute(&self, action: &PendingAction, overwrite: bool) -> Result<ApplyOutcome, ApplyError> {
        match (&action.kind, &action.payload) {
            (ActionKind::Edit, ActionPayload::Content(proposed)) => self.execute_edit(action, proposed).await,
            (ActionKind::Create, ActionPayload::Content(content)) => {
                self.execute_create(&action.target, content, overwrite).await
            }
            (ActionKind::Delete, _) => self.execute_delete(&action.target).await,
            (ActionKind::Terminal, ActionPayload::Command(command)) => self
                .terminal
                .run(command)
                .await
                .map(ApplyOutcome::CommandRan)
                .map_err(|e| ApplyError::Execution {
                    command: command.clone(),
                    message: format!("{e:#}"),
                }),
            (ActionKind::Plan, ActionPayload::Plan(plan)) => {
                let path = self.config.plan_file.clone();
                let markdown = render_plan_markdown(plan);
                let old = self.files.find_file(&path).await.map_err(store_error(&path))?;
                self.files
                    .create_file(&path, &markdown)
                    .await
                    .map_err(store_error(&path))?;
                self.history
                    .lock()
                    .record(&path, old, Some(markdown.clone()), ChangeSource::Ai);
                self.refresh_editor(&path, &markdown).await;
                Ok(ApplyOutcome::PlanWritten { path })
            }
            (kind, payload) => Err(ApplyError::Execution {
                command: kind.to_string(),
                message: format!("payload {payload:?} does not fit a {kind} action"),
            }),
        }
    }

    async fn execute_edit(&self, action: &PendingAction, proposed: &str) -> Result<ApplyOutcome, ApplyError> {
        let target = &action.target;
        let current = self
            .files
            .find_file(target)
            .await
            .map_err(store_error(target))?
            .ok_or_else(|| ApplyError::NotFound(target.clone()))?;
        let base = action.snapshot.as_deref().unwrap_or(current.as_str());

        let text = match reconcile(base, proposed, &current) {
            ReconcileOutcome::AlreadyApplied { .. } => return Ok(ApplyOutcome::AlreadyApplied),
            outcome => outcome,
        };
        let conflicts = text.conflicts().to_vec();
        if !conflicts.is_empty() {
            tracing::warn!("{target}: {} merge conflict(s) written inline", conflicts.len());
        }
        let text = text.into_text();

        self.files
            .write_file(target, &text)
            .await
            .map_err(store_error(target))?;
        self.history
            .lock()
            .record(target, Some(current), Some(text.clone()), ChangeSource::Ai);
        self.refresh_editor(target, &text).await;
        Ok(ApplyOutcome::Edited { conflicts })
    }

    async fn execute_create(&self, target: &str, content: &str, overwrite: bool) -> Result<ApplyOutcome, ApplyError> {
        let existing = self.files.find_file(target).await.map_err(store_error(target))?;
        if existing.is_some() && !overwrite {
            return Ok(ApplyOutcome::OverwriteRequired);
        }
        self.files
            .create_file(target, content)
            .await
            .map_err(store_error(target))?;
        self.history
            .lock()
            .record(target, existing, Some(content.to_string()), ChangeSource::Ai);
        self.refresh_editor(target, content).await;
        Ok(ApplyOutcome::Created)
    }

    async fn execute_delete(&self, target: &str) -> Result<ApplyOutcome, ApplyError> {
        let current = self
            .files
            .find_file(target)
            .await
            .map_err(store_error(target))?
            .ok_or_else(|| ApplyError::NotFound(target.to_string()))?;
        self.files.delete_file(target).await.map_err(store_error(target))?;
        self.history
            .lock()
            .record(target, Some(current), None, ChangeSource::Ai);
        self.clear_editor(target).await;
        Ok(ApplyOutcome::Deleted)
    }

    /// Push new content to the editor if `filename` is the one on screen.
    async fn refresh_editor(&self, filename: &str, content: &str) {
        match self.files.currently_open_file().await {
            Ok(Some(open)) if open == filename => {
                if let Err(e) = self.editor.set_displayed_content(content).await {
                    tracing::warn!("failed to refresh editor for {filename}: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("could not query the open file: {e}"),
        }
    }

    /// Blank the editor if it is showing `filename`, which no longer exists.
    async fn clear_editor(&self, filename: &str) {
        match self.files.currently_open_file().await {
            Ok(Some(open)) if open == filename => {
                tracing::warn!("{filename} is open in the editor but was removed");
                if let Err(e) = self.editor.set_displayed_content("").await {
                    tracing::warn!("failed to clear editor for {filename}: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("could not query the open file: {e}"),
        }
    }
}

fn store_error(path: &str) -> impl FnOnce(anyhow::Error) -> ApplyError + '_ {
    move |source| ApplyError::Store {
        path: path.to_string(),
        source,
    }
}

fn command_message(command: &str, output: &CommandOutput) -> String {
    let mut message = if output.succeeded() {
        format!("`{command}` finished")
    } else {
        format!("`{command}` exited with code {}", output.exit_code)
    };
    for stream in [&output.output, &output.stderr] {
        if !stream.is_empty() {
            message.push('\n');
            message.push_str(stream);
        }
    }
    if let Some(error) = output.error.as_deref() {
        message.push('\n');
        message.push_str(error);
    }
    message
}
