//! Collaborator traits -- the pipeline's view of the editor around it.
//!
//! The pipeline never touches the filesystem, a terminal or the UI
//! directly.  Everything goes through these traits so the IDE can route
//! calls to its open buffers and the CLI can use the standalone versions
//! in `standalone.rs`.

use anyhow::Result;

// ── Files ────────────────────────────────────────────────────────

/// Project file storage.
///
/// Filenames are workspace-relative strings, exactly as the AI wrote them.
#[async_trait::async_trait]
pub trait FileStore: Send + Sync {
    /// Current content of `name`, or `None` if there is no such file.
    async fn find_file(&self, name: &str) -> Result<Option<String>>;

    /// Replace the content of an existing file.
    async fn write_file(&self, name: &str, content: &str) -> Result<()>;

    /// Create a file, replacing it if it exists.
    async fn create_file(&self, name: &str, content: &str) -> Result<()>;

    async fn delete_file(&self, name: &str) -> Result<()>;

    /// The file shown in the active editor, if any.
    async fn currently_open_file(&self) -> Result<Option<String>>;
}

// ── Editor ───────────────────────────────────────────────────────

/// The live editor buffer for the currently open file.
#[async_trait::async_trait]
pub trait EditorView: Send + Sync {
    async fn set_displayed_content(&self, content: &str) -> Result<()>;
}

// ── Terminal ─────────────────────────────────────────────────────

/// Result of executing a command.
///
/// `stderr` is ordinary command output (progress, warnings) and says nothing
/// about success on its own. `error` is only set when the executor could not
/// run the command properly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub output: String,
    pub stderr: String,
    pub error: Option<String>,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }
}

#[async_trait::async_trait]
pub trait TerminalExecutor: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput>;
}

// ── Notifications ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// User-visible status messages (toasts, status bar, stderr).
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, message: &str, level: NotifyLevel);
}
