pub mod action;
pub mod bridge;
pub mod config;
pub mod diff;
pub mod error;
pub mod history;
pub mod hunks;
pub mod parse;
pub mod pipeline;
pub mod reconcile;
pub mod standalone;

// Re-export key types
pub use action::{ActionId, ActionKind, ActionStatus, PendingAction, Plan, PlanTask, ProposedAction};
pub use bridge::{CommandOutput, EditorView, FileStore, NotificationSink, NotifyLevel, TerminalExecutor};
pub use config::ApplyConfig;
pub use diff::{compute_diff, DiffHunk, DiffResult, DiffStats};
pub use error::{ApplyError, HunkError, ParseError, PipelineError};
pub use history::{ChangeHistory, ChangeRecord, ChangeSource};
pub use hunks::{apply_hunks, collapse_context, DisplayHunk, LineEdit};
pub use parse::{parse_response, GRAMMAR_VERSION};
pub use pipeline::{
    ActionPipeline, ActionPreview, ActionReport, ApplyOutcome, Collaborators, Decision, DecisionHandlers,
};
pub use reconcile::{reconcile, three_way_merge, MergeConflict, MergeResult, ReconcileOutcome};
pub use standalone::{DiskFileStore, MemoryFileStore, NullEditor, ShellExecutor, TracingNotifier};
