//! Standalone collaborator implementations.
//!
//! These work without a running editor, which makes them suitable for:
//!  - the `forge-apply` CLI
//!  - headless / CI usage
//!  - tests (`MemoryFileStore`)

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;

use crate::bridge::*;

// ── In-memory store ──────────────────────────────────────────────

/// A file store backed by a map. Cheap to build, easy to inspect.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: Mutex<BTreeMap<String, String>>,
    open: Mutex<Option<String>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<I, K, V>(files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        store
            .files
            .lock()
            .extend(files.into_iter().map(|(k, v)| (k.into(), v.into())));
        store
    }

    /// Mark `name` as the file in the active editor.
    pub fn set_open(&self, name: Option<&str>) {
        *self.open.lock() = name.map(String::from);
    }

    /// Simulate a user edit made outside the pipeline.
    pub fn put(&self, name: &str, content: &str) {
        self.files.lock().insert(name.to_string(), content.to_string());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.files.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn find_file(&self, name: &str) -> Result<Option<String>> {
        Ok(self.get(name))
    }

    async fn write_file(&self, name: &str, content: &str) -> Result<()> {
        let mut files = self.files.lock();
        match files.get_mut(name) {
            Some(existing) => {
                *existing = content.to_string();
                Ok(())
            }
            None => bail!("no such file: {name}"),
        }
    }

    async fn create_file(&self, name: &str, content: &str) -> Result<()> {
        self.put(name, content);
        Ok(())
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        if self.files.lock().remove(name).is_none() {
            bail!("no such file: {name}");
        }
        Ok(())
    }

    async fn currently_open_file(&self) -> Result<Option<String>> {
        Ok(self.open.lock().clone())
    }
}

// ── Disk store ───────────────────────────────────────────────────

/// A file store rooted at a workspace directory on disk.
///
/// There is no open editor, so `currently_open_file` is always `None`.
pub struct DiskFileStore {
    workspace_root: PathBuf,
}

impl DiskFileStore {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Resolve a workspace-relative name, refusing paths that climb out.
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let rel = Path::new(name);
        if rel.is_absolute() || rel.components().any(|c| matches!(c, Component::ParentDir)) {
            bail!("path escapes the workspace: {name}");
        }
        Ok(self.workspace_root.join(rel))
    }
}

#[async_trait]
impl FileStore for DiskFileStore {
    async fn find_file(&self, name: &str) -> Result<Option<String>> {
        let path = self.resolve(name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn write_file(&self, name: &str, content: &str) -> Result<()> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    async fn create_file(&self, name: &str, content: &str) -> Result<()> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to delete {}", path.display()))
    }

    async fn currently_open_file(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

// ── Terminal ─────────────────────────────────────────────────────

/// Runs commands with `sh -c` in a fixed working directory.
pub struct ShellExecutor {
    working_dir: PathBuf,
}

impl ShellExecutor {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }
}

#[async_trait]
impl TerminalExecutor for ShellExecutor {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .output()
            .await
            .with_context(|| format!("Failed to execute: {command}"))?;

        // Killed by a signal: no exit code to report.
        let error = match output.status.code() {
            Some(_) => None,
            None => Some(format!("terminated by signal ({})", output.status)),
        };
        Ok(CommandOutput {
            output: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            error,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

// ── Notifications ────────────────────────────────────────────────

/// Forwards notifications to `tracing` at the matching level.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(&self, message: &str, level: NotifyLevel) {
        match level {
            NotifyLevel::Success | NotifyLevel::Info => tracing::info!("{message}"),
            NotifyLevel::Warning => tracing::warn!("{message}"),
            NotifyLevel::Error => tracing::error!("{message}"),
        }
    }
}

// ── Editor ───────────────────────────────────────────────────────

/// An editor that shows nothing.
#[derive(Debug, Default)]
pub struct NullEditor;

#[async_trait]
impl EditorView for NullEditor {
    async fn set_displayed_content(&self, _content: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_write_requires_existing() {
        let store = MemoryFileStore::with_files([("a.rs", "one")]);
        assert!(store.write_file("b.rs", "x").await.is_err());
        store.write_file("a.rs", "two").await.unwrap();
        assert_eq!(store.find_file("a.rs").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_disk_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskFileStore::new(dir.path().to_path_buf());

        assert_eq!(store.find_file("src/new.rs").await.unwrap(), None);
        store.create_file("src/new.rs", "fn main() {}\n").await.unwrap();
        assert_eq!(
            store.find_file("src/new.rs").await.unwrap().as_deref(),
            Some("fn main() {}\n")
        );
        store.delete_file("src/new.rs").await.unwrap();
        assert!(!dir.path().join("src/new.rs").exists());
    }

    #[tokio::test]
    async fn test_disk_store_refuses_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskFileStore::new(dir.path().to_path_buf());
        assert!(store.find_file("../outside.txt").await.is_err());
        assert!(store.create_file("/etc/passwd", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_shell_executor_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let shell = ShellExecutor::new(dir.path().to_path_buf());

        let ok = shell.run("echo hello").await.unwrap();
        assert_eq!(ok.output.trim(), "hello");
        assert!(ok.succeeded());

        let failed = shell.run("echo oops >&2; exit 3").await.unwrap();
        assert_eq!(failed.exit_code, 3);
        assert_eq!(failed.stderr.trim(), "oops");
        assert_eq!(failed.error, None);
        assert!(!failed.succeeded());
    }

    #[tokio::test]
    async fn test_shell_executor_stderr_alone_is_not_failure() {
        let dir = tempfile::tempdir().unwrap();
        let shell = ShellExecutor::new(dir.path().to_path_buf());

        let out = shell.run("echo 'Compiling foo' >&2; echo done; exit 0").await.unwrap();
        assert_eq!(out.output, "done\n");
        assert_eq!(out.stderr, "Compiling foo\n");
        assert_eq!(out.exit_code, 0);
        assert!(out.succeeded());
    }
}
