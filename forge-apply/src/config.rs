//! Settings for diff display, history and plan output.
//!
//! Stored as JSON at `~/.forge/apply.json`, next to the agent's own
//! `config.json`. Environment variables prefixed `FORGE_APPLY_` win over
//! the file.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::history::DEFAULT_HISTORY_CAPACITY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Maximum number of change records kept for undo.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Unchanged lines shown on each side of a change in previews.
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    #[serde(default = "default_true")]
    pub collapse_context: bool,

    /// Workspace-relative file that plan actions are written to.
    #[serde(default = "default_plan_file")]
    pub plan_file: String,

    /// Run terminal actions without asking (CLI only).
    #[serde(default)]
    pub auto_approve_commands: bool,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_context_lines() -> usize {
    3
}

fn default_true() -> bool { true }

fn default_plan_file() -> String {
    "PLAN.md".to_string()
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            context_lines: default_context_lines(),
            collapse_context: true,
            plan_file: default_plan_file(),
            auto_approve_commands: false,
        }
    }
}

impl ApplyConfig {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`. A missing or unparsable file gives the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!("ignoring malformed config {}: {e}", path.display());
            Self::default()
        }))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("No home directory"))?;
        Ok(home.join(".forge").join("apply.json"))
    }

    /// Override fields from `FORGE_APPLY_*` variables found by `lookup`.
    /// Values that do not parse are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FORGE_APPLY_HISTORY_CAPACITY").and_then(|v| v.parse().ok()) {
            self.history_capacity = v;
        }
        if let Some(v) = lookup("FORGE_APPLY_CONTEXT_LINES").and_then(|v| v.parse().ok()) {
            self.context_lines = v;
        }
        if let Some(v) = lookup("FORGE_APPLY_COLLAPSE_CONTEXT").and_then(|v| parse_bool(&v)) {
            self.collapse_context = v;
        }
        if let Some(v) = lookup("FORGE_APPLY_PLAN_FILE").filter(|v| !v.trim().is_empty()) {
            self.plan_file = v;
        }
        if let Some(v) = lookup("FORGE_APPLY_AUTO_APPROVE_COMMANDS").and_then(|v| parse_bool(&v)) {
            self.auto_approve_commands = v;
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
