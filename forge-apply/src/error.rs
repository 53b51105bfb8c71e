//! Error types for the apply pipeline.

use thiserror::Error;

use crate::action::ActionId;

/// Why an approved action could not be carried out.
///
/// These never escape the action boundary: the pipeline turns them into a
/// `Failed` status and a user-visible notification.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Edit or delete targets a file the store does not have.
    #[error("file not found: {0}")]
    NotFound(String),
    /// The terminal collaborator could not run the command.
    #[error("command `{command}` failed: {message}")]
    Execution { command: String, message: String },
    /// The file store rejected a read or write.
    #[error("file store error on {path}: {source}")]
    Store {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Misuse of the pipeline API itself (as opposed to an action failing).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no pending action with id {0}")]
    UnknownAction(ActionId),
    #[error("action {id} is {status}, expected {expected}")]
    InvalidState {
        id: ActionId,
        status: String,
        expected: &'static str,
    },
    #[error("action {0} has no decision handlers")]
    NoHandlers(ActionId),
    #[error("no AI change to undo for {0}")]
    NothingToUndo(String),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

/// Problems with a set of line-range edits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HunkError {
    #[error("edit at line {start} overlaps edit at line {other}")]
    Overlapping { start: usize, other: usize },
    #[error("edit at line {start} is outside the document ({len} lines)")]
    OutOfRange { start: usize, len: usize },
    #[error("no change block with index {0}")]
    UnknownBlock(usize),
}

/// A malformed block in an AI response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: <{tag}> block is never closed")]
    Unterminated { tag: String, line: usize },
    #[error("line {line}: <{tag}> is missing the `{attribute}` attribute")]
    MissingAttribute {
        tag: String,
        attribute: &'static str,
        line: usize,
    },
    #[error("line {line}: unknown file action `{action}` (expected create, modify or delete)")]
    UnknownFileAction { action: String, line: usize },
    #[error("line {line}: {filename} has no fenced content block")]
    MissingContent { filename: String, line: usize },
    #[error("line {line}: terminal command is empty")]
    EmptyCommand { line: usize },
    #[error("line {line}: plan has no tasks")]
    EmptyPlan { line: usize },
}
