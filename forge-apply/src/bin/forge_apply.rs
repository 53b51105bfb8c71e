//! forge-apply -- diff, merge and apply AI-proposed changes from the shell.
//!
//! Usage:
//!   forge-apply diff old.rs new.rs --context 2
//!   forge-apply merge base.rs proposed.rs current.rs --output merged.rs
//!   forge-apply apply response.md --workspace /path/to/project

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use forge_apply::{
    collapse_context, compute_diff, parse_response, reconcile, ActionKind, ActionPipeline, ActionPreview,
    ActionReport, ActionStatus, ApplyConfig, ApplyOutcome, Collaborators, DiffHunk, DiffResult, DiskFileStore,
    DisplayHunk, NotificationSink, NotifyLevel, NullEditor, ShellExecutor,
};

// ── ANSI colors ──────────────────────────────────────────────────
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "forge-apply", about = "Diff, merge and apply AI-proposed changes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show a line diff between two files
    Diff {
        old: PathBuf,
        new: PathBuf,
        /// Unchanged lines kept around each change
        #[arg(long)]
        context: Option<usize>,
        /// Show every line, no collapsing
        #[arg(long)]
        full: bool,
        #[arg(long)]
        json: bool,
    },
    /// Reconcile a proposal (made against BASE) with the current file
    Merge {
        base: PathBuf,
        proposed: PathBuf,
        current: PathBuf,
        /// Write the merged text here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Parse an AI response and apply its actions one by one
    Apply {
        response: PathBuf,
        /// Workspace the filenames in the response are relative to
        #[arg(long, default_value = ".")]
        workspace: String,
        /// Approve everything without asking
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = ApplyConfig::load().unwrap_or_else(|e| {
        eprintln!("{YELLOW}Warning:{RESET} could not load config ({e}), using defaults");
        ApplyConfig::default()
    });

    let result = match cli.command {
        Command::Diff { old, new, context, full, json } => {
            run_diff(&config, &old, &new, context, full, json)
        }
        Command::Merge { base, proposed, current, output, json } => {
            run_merge(&base, &proposed, &current, output.as_deref(), json)
        }
        Command::Apply { response, workspace, yes } => run_apply(config, &response, &workspace, yes).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{RED}{BOLD}[error]{RESET} {e:#}");
            std::process::exit(2);
        }
    }
}

fn read(path: &std::path::Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

// ── diff ─────────────────────────────────────────────────────────

fn run_diff(
    config: &ApplyConfig,
    old: &std::path::Path,
    new: &std::path::Path,
    context: Option<usize>,
    full: bool,
    json: bool,
) -> Result<i32> {
    let diff = compute_diff(&read(old)?, &read(new)?);
    let shown = collapse_context(
        &diff.hunks,
        context.unwrap_or(config.context_lines),
        config.collapse_context && !full,
    );

    if json {
        let value = serde_json::json!({ "hunks": shown, "stats": diff.stats });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{BOLD}--- {}{RESET}", old.display());
        println!("{BOLD}+++ {}{RESET}", new.display());
        print_hunks(&shown);
        print_stats(&diff);
    }
    Ok(0)
}

fn print_hunks(hunks: &[DisplayHunk]) {
    for hunk in hunks {
        match hunk {
            DisplayHunk::Line(DiffHunk::Context { content, .. }) => println!("  {content}"),
            DisplayHunk::Line(DiffHunk::Deletion { content, .. }) => println!("{RED}- {content}{RESET}"),
            DisplayHunk::Line(DiffHunk::Addition { content, .. }) => println!("{GREEN}+ {content}{RESET}"),
            DisplayHunk::Collapsed { hidden, old_line, .. } => {
                println!("{DIM}@@ {hidden} unchanged line(s) from line {old_line} @@{RESET}")
            }
        }
    }
}

fn print_stats(diff: &DiffResult) {
    let s = diff.stats;
    eprintln!(
        "{DIM}{GREEN}+{}{RESET}{DIM} {RED}-{}{RESET}{DIM} ({}% changed){RESET}",
        s.additions, s.deletions, s.change_percentage
    );
}

// ── merge ────────────────────────────────────────────────────────

fn run_merge(
    base: &std::path::Path,
    proposed: &std::path::Path,
    current: &std::path::Path,
    output: Option<&std::path::Path>,
    json: bool,
) -> Result<i32> {
    let outcome = reconcile(&read(base)?, &read(proposed)?, &read(current)?);

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        match output {
            Some(path) => std::fs::write(path, outcome.text())
                .with_context(|| format!("Failed to write {}", path.display()))?,
            None => print!("{}", outcome.text()),
        }
        for conflict in outcome.conflicts() {
            eprintln!(
                "{YELLOW}[conflict]{RESET} line {}: AI {:?} vs yours {:?}",
                conflict.line, conflict.theirs, conflict.ours
            );
        }
    }
    Ok(if outcome.success() { 0 } else { 1 })
}

// ── apply ────────────────────────────────────────────────────────

/// Prints notifications as they arrive.
struct StderrNotifier;

#[async_trait]
impl NotificationSink for StderrNotifier {
    async fn notify(&self, message: &str, level: NotifyLevel) {
        let tag = match level {
            NotifyLevel::Success => format!("{GREEN}[ok]{RESET}"),
            NotifyLevel::Info => format!("{CYAN}[info]{RESET}"),
            NotifyLevel::Warning => format!("{YELLOW}[warn]{RESET}"),
            NotifyLevel::Error => format!("{RED}[error]{RESET}"),
        };
        eprintln!("{tag} {message}");
    }
}

fn ask(question: &str) -> Result<bool> {
    eprint!("{BOLD}{question} [y/N]{RESET} ");
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

async fn run_apply(config: ApplyConfig, response: &std::path::Path, workspace: &str, yes: bool) -> Result<i32> {
    let workspace = std::fs::canonicalize(workspace)
        .with_context(|| format!("Bad workspace path '{workspace}'"))?;
    let actions = parse_response(&read(response)?)?;
    if actions.is_empty() {
        eprintln!("{DIM}No actions found in {}{RESET}", response.display());
        return Ok(0);
    }

    let auto_commands = config.auto_approve_commands;
    let mut pipeline = ActionPipeline::new(
        Collaborators {
            files: Arc::new(DiskFileStore::new(workspace.clone())),
            editor: Arc::new(NullEditor),
            terminal: Arc::new(ShellExecutor::new(workspace)),
            notifier: Arc::new(StderrNotifier),
        },
        config,
    );
    let ids = pipeline.propose(actions).await?;

    let mut reports = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(action) = pipeline.get(id) else { continue };
        let kind = action.kind;
        eprintln!("\n{CYAN}{BOLD}[{kind}]{RESET} {}", action.summary());
        print_preview(&pipeline.preview(id).await?);

        let handlers = pipeline.handlers(id)?;
        let approved = yes || (kind == ActionKind::Terminal && auto_commands) || ask("apply?")?;
        if approved {
            handlers.on_apply();
        } else {
            handlers.on_reject();
        }

        let mut report = pipeline.await_decision(id).await?;
        if report.outcome == ApplyOutcome::OverwriteRequired {
            handlers.on_overwrite(yes || ask(&format!("{} exists, overwrite?", report.target))?);
            report = pipeline.await_decision(id).await?;
        }
        if let ApplyOutcome::CommandRan(output) = &report.outcome {
            print!("{}", output.output);
            eprint!("{}", output.stderr);
            if let Some(err) = &output.error {
                eprintln!("{RED}{err}{RESET}");
            }
        }
        reports.push(report);
    }

    print_summary(&reports);
    let failed = reports.iter().any(|r| r.status == ActionStatus::Failed);
    Ok(if failed { 1 } else { 0 })
}

fn print_preview(preview: &ActionPreview) {
    match preview {
        ActionPreview::Edit { diff, display } | ActionPreview::Delete { diff, display } => {
            print_hunks(display);
            print_stats(diff);
        }
        ActionPreview::Create { diff, display, overwrites_existing } => {
            if *overwrites_existing {
                eprintln!("{YELLOW}This replaces an existing file.{RESET}");
            }
            print_hunks(display);
            print_stats(diff);
        }
        ActionPreview::Terminal { command } => println!("  $ {command}"),
        ActionPreview::Plan { path, markdown } => {
            println!("{DIM}{path}:{RESET}");
            println!("{markdown}");
        }
    }
}

fn print_summary(reports: &[ActionReport]) {
    eprintln!();
    for r in reports {
        let color = match r.status {
            ActionStatus::Applied => GREEN,
            ActionStatus::Failed => RED,
            _ => DIM,
        };
        eprintln!("{color}{:>8}{RESET} {} {}", r.status.to_string(), r.kind, r.target);
    }
}
