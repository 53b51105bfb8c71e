//! Reconcile an AI proposal against the live document.
//!
//! The proposal was computed from `original`, but by the time the user
//! approves it the document may have moved on to `current`. Cheap equality
//! checks handle the common cases; everything else goes through a line-based
//! three-way merge. Conflicts are never resolved silently: both candidates
//! are written between conflict markers and reported back.

use serde::{Deserialize, Serialize};

use crate::diff::{compute_diff, split_lines, DiffResult};

/// Opens the AI side of a conflict block.
pub const CONFLICT_START: &str = "<<<<<<< AI Change";
/// Separates the AI side from the user side.
pub const CONFLICT_SEPARATOR: &str = "=======";
/// Closes the user side of a conflict block.
pub const CONFLICT_END: &str = ">>>>>>> Your Change";

// ── Types ───────────────────────────────────────────────────────

/// A base line both branches changed, in different ways.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    /// 1-based base line. For conflicting insertions this is the base line
    /// the insertions precede (`base_len + 1` past the end).
    pub line: usize,
    /// The base line, empty for conflicting insertions.
    pub base: String,
    /// The proposal's version, lines joined with `\n` (empty if deleted).
    pub theirs: String,
    /// The live document's version, lines joined with `\n` (empty if deleted).
    pub ours: String,
}

/// Merged text plus any conflicts found on the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub text: String,
    pub conflicts: Vec<MergeConflict>,
}

impl MergeResult {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// How a proposal lands on the live document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The document is untouched since the proposal; use it verbatim.
    CleanApply { text: String },
    /// The document already equals the proposal.
    AlreadyApplied { text: String },
    /// Both sides changed; the text may contain conflict blocks.
    Merged {
        text: String,
        conflicts: Vec<MergeConflict>,
    },
}

impl ReconcileOutcome {
    pub fn text(&self) -> &str {
        match self {
            ReconcileOutcome::CleanApply { text }
            | ReconcileOutcome::AlreadyApplied { text }
            | ReconcileOutcome::Merged { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ReconcileOutcome::CleanApply { text }
            | ReconcileOutcome::AlreadyApplied { text }
            | ReconcileOutcome::Merged { text, .. } => text,
        }
    }

    pub fn conflicts(&self) -> &[MergeConflict] {
        match self {
            ReconcileOutcome::Merged { conflicts, .. } => conflicts,
            _ => &[],
        }
    }

    /// True when nothing needs manual resolution.
    pub fn success(&self) -> bool {
        self.conflicts().is_empty()
    }
}

// ── Entry point ─────────────────────────────────────────────────

/// Decide how `proposed` (computed from `original`) applies to `current`.
pub fn reconcile(original: &str, proposed: &str, current: &str) -> ReconcileOutcome {
    if current == original {
        tracing::debug!("reconcile: document unchanged since proposal, clean apply");
        return ReconcileOutcome::CleanApply {
            text: proposed.to_string(),
        };
    }
    if current == proposed {
        tracing::debug!("reconcile: proposal already applied");
        return ReconcileOutcome::AlreadyApplied {
            text: proposed.to_string(),
        };
    }

    let merged = three_way_merge(original, proposed, current);
    tracing::debug!(
        "reconcile: three-way merge produced {} conflict(s)",
        merged.conflicts.len()
    );
    ReconcileOutcome::Merged {
        text: merged.text,
        conflicts: merged.conflicts,
    }
}

// ── Three-way merge ─────────────────────────────────────────────

/// What one branch did to a base line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BaseAction {
    Keep,
    Delete,
    /// The line was replaced by these lines.
    Replace(Vec<String>),
}

impl BaseAction {
    fn lines(&self) -> &[String] {
        match self {
            BaseAction::Replace(lines) => lines,
            BaseAction::Keep | BaseAction::Delete => &[],
        }
    }
}

/// Per-base-line view of one branch's diff.
struct BranchEdits {
    actions: Vec<BaseAction>,
    /// `inserts[i]` holds lines inserted before base line `i` (0-based);
    /// `inserts[base_len]` holds lines appended at the end.
    inserts: Vec<Vec<String>>,
}

impl BranchEdits {
    fn from_diff(diff: &DiffResult, base_len: usize) -> Self {
        let mut actions = vec![BaseAction::Keep; base_len];
        let mut inserts = vec![Vec::new(); base_len + 1];

        for block in diff.change_blocks() {
            let at = block.old_start - 1;
            let added: Vec<String> = block.added.iter().map(|s| s.to_string()).collect();
            if block.is_insertion() {
                inserts[at].extend(added);
                continue;
            }
            // The replacement hangs off the first deleted line; the rest of
            // the run is plain deletion.
            actions[at] = if added.is_empty() {
                BaseAction::Delete
            } else {
                BaseAction::Replace(added)
            };
            for action in actions.iter_mut().skip(at + 1).take(block.deleted.len() - 1) {
                *action = BaseAction::Delete;
            }
        }

        Self { actions, inserts }
    }
}

/// Merge two independent edits (`theirs` = the proposal, `ours` = the live
/// document) of a common `base`.
pub fn three_way_merge(base: &str, theirs: &str, ours: &str) -> MergeResult {
    let base_lines = split_lines(base);
    let base_len = base_lines.len();
    let their_edits = BranchEdits::from_diff(&compute_diff(base, theirs), base_len);
    let our_edits = BranchEdits::from_diff(&compute_diff(base, ours), base_len);

    let mut out: Vec<String> = Vec::with_capacity(base_len);
    let mut conflicts = Vec::new();

    for (i, base_line) in base_lines.iter().enumerate() {
        merge_inserts(
            &their_edits.inserts[i],
            &our_edits.inserts[i],
            i + 1,
            &mut out,
            &mut conflicts,
        );

        match (&their_edits.actions[i], &our_edits.actions[i]) {
            (BaseAction::Keep, BaseAction::Keep) => out.push(base_line.to_string()),
            (BaseAction::Keep, changed) | (changed, BaseAction::Keep) => {
                out.extend(changed.lines().iter().cloned());
            }
            (theirs_action, ours_action) if theirs_action == ours_action => {
                out.extend(theirs_action.lines().iter().cloned());
            }
            (theirs_action, ours_action) => push_conflict(
                MergeConflict {
                    line: i + 1,
                    base: base_line.to_string(),
                    theirs: theirs_action.lines().join("\n"),
                    ours: ours_action.lines().join("\n"),
                },
                theirs_action.lines(),
                ours_action.lines(),
                &mut out,
                &mut conflicts,
            ),
        }
    }

    // Additions past the end of the base follow the same policy as any
    // other insertion point, so neither branch's tail is dropped.
    merge_inserts(
        &their_edits.inserts[base_len],
        &our_edits.inserts[base_len],
        base_len + 1,
        &mut out,
        &mut conflicts,
    );

    MergeResult {
        text: out.join("\n"),
        conflicts,
    }
}

fn merge_inserts(
    theirs: &[String],
    ours: &[String],
    line: usize,
    out: &mut Vec<String>,
    conflicts: &mut Vec<MergeConflict>,
) {
    match (theirs.is_empty(), ours.is_empty()) {
        (true, true) => {}
        (false, true) => out.extend(theirs.iter().cloned()),
        (true, false) => out.extend(ours.iter().cloned()),
        (false, false) if theirs == ours => out.extend(theirs.iter().cloned()),
        (false, false) => push_conflict(
            MergeConflict {
                line,
                base: String::new(),
                theirs: theirs.join("\n"),
                ours: ours.join("\n"),
            },
            theirs,
            ours,
            out,
            conflicts,
        ),
    }
}

fn push_conflict(
    conflict: MergeConflict,
    theirs: &[String],
    ours: &[String],
    out: &mut Vec<String>,
    conflicts: &mut Vec<MergeConflict>,
) {
    out.push(CONFLICT_START.to_string());
    out.extend(theirs.iter().cloned());
    out.push(CONFLICT_SEPARATOR.to_string());
    out.extend(ours.iter().cloned());
    out.push(CONFLICT_END.to_string());
    conflicts.push(conflict);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untouched_document_applies_cleanly() {
        let outcome = reconcile("a\nb", "a\nB", "a\nb");
        assert_eq!(outcome, ReconcileOutcome::CleanApply { text: "a\nB".into() });
        assert!(outcome.success());
    }

    #[test]
    fn test_already_applied_is_idempotent() {
        let outcome = reconcile("a\nb", "a\nB", "a\nB");
        assert_eq!(outcome, ReconcileOutcome::AlreadyApplied { text: "a\nB".into() });
    }

    #[test]
    fn test_user_appended_line_survives() {
        let outcome = reconcile("a\nb\nc", "a\nX\nc", "a\nb\nc\nd");
        assert_eq!(
            outcome,
            ReconcileOutcome::Merged {
                text: "a\nX\nc\nd".into(),
                conflicts: vec![],
            }
        );
    }

    #[test]
    fn test_changes_on_different_lines_merge() {
        let outcome = reconcile("1\n2", "1\nTWO", "ONE\n2");
        assert_eq!(outcome.text(), "ONE\nTWO");
        assert!(outcome.success());
    }

    #[test]
    fn test_same_line_conflict() {
        let outcome = reconcile("x", "y", "z");
        assert_eq!(
            outcome.conflicts(),
            &[MergeConflict {
                line: 1,
                base: "x".into(),
                theirs: "y".into(),
                ours: "z".into(),
            }]
        );
        assert!(!outcome.success());
        assert_eq!(
            outcome.text(),
            "<<<<<<< AI Change\ny\n=======\nz\n>>>>>>> Your Change"
        );
    }

    #[test]
    fn test_delete_versus_modify_conflicts() {
        let merged = three_way_merge("a\nb\nc", "a\nc", "a\nB\nc");
        assert_eq!(merged.conflicts.len(), 1);
        assert_eq!(merged.conflicts[0].line, 2);
        assert_eq!(merged.conflicts[0].theirs, "");
        assert_eq!(merged.conflicts[0].ours, "B");
    }

    #[test]
    fn test_identical_changes_agree() {
        let merged = three_way_merge("a\nb\nc", "a\nSAME\nc\nextra", "a\nSAME\nc\nextra");
        assert!(merged.is_clean());
        assert_eq!(merged.text, "a\nSAME\nc\nextra");
    }

    #[test]
    fn test_both_deleting_a_line_agree() {
        let merged = three_way_merge("a\nb\nc", "a\nc", "a\nc\nd");
        assert!(merged.is_clean());
        assert_eq!(merged.text, "a\nc\nd");
    }

    #[test]
    fn test_diverging_tails_are_both_kept() {
        let merged = three_way_merge("a", "a\nfrom-ai", "a\nfrom-user");
        assert_eq!(merged.conflicts.len(), 1);
        assert_eq!(merged.conflicts[0].line, 2);
        assert_eq!(merged.conflicts[0].base, "");
        assert_eq!(
            merged.text,
            "a\n<<<<<<< AI Change\nfrom-ai\n=======\nfrom-user\n>>>>>>> Your Change"
        );
    }

    #[test]
    fn test_insertions_at_different_points() {
        let merged = three_way_merge("a\nc", "a\nb\nc", "a\nc\nd");
        assert!(merged.is_clean());
        assert_eq!(merged.text, "a\nb\nc\nd");
    }

    #[test]
    fn test_multi_line_replacement_onto_edited_document() {
        let base = "fn a() {}\n\nfn b() {}\n\nfn c() {}\n";
        let theirs = "fn a() {}\n\nfn b(x: u32) {\n    x;\n}\n\nfn c() {}\n";
        let ours = "// header\nfn a() {}\n\nfn b() {}\n\nfn c() { todo() }\n";
        let merged = three_way_merge(base, theirs, ours);
        assert!(merged.is_clean(), "{:?}", merged.conflicts);
        assert_eq!(
            merged.text,
            "// header\nfn a() {}\n\nfn b(x: u32) {\n    x;\n}\n\nfn c() { todo() }\n"
        );
    }

    #[test]
    fn test_trailing_newline_preserved() {
        let outcome = reconcile("a\nb\n", "a\nX\n", "a\nb\nc\n");
        assert_eq!(outcome.text(), "a\nX\nc\n");
        assert!(outcome.success());
    }
}
