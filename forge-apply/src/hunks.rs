//! Display-side hunk handling and bulk line-range application.
//!
//! `collapse_context` is purely cosmetic: it folds long unchanged stretches
//! for a preview and must never feed back into patch application.
//! `apply_hunks` is the functional side used when only some change
//! blocks of a diff are accepted.

use serde::{Deserialize, Serialize};

use crate::diff::{split_lines, DiffHunk, DiffResult};
use crate::error::HunkError;

// ── Context collapsing ──────────────────────────────────────────

/// A hunk as shown in a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayHunk {
    Line(DiffHunk),
    /// Stand-in for `hidden` unchanged lines starting at the given positions.
    Collapsed {
        hidden: usize,
        old_line: usize,
        new_line: usize,
    },
}

impl DisplayHunk {
    pub fn as_line(&self) -> Option<&DiffHunk> {
        match self {
            DisplayHunk::Line(hunk) => Some(hunk),
            DisplayHunk::Collapsed { .. } => None,
        }
    }
}

/// Fold runs of context lines that are far from any change.
///
/// Each maximal context run keeps up to `context_lines` lines next to a
/// change on either side; the rest of the run becomes one `Collapsed`
/// marker. A run touching no change at all is folded entirely. With
/// `collapse == false` every hunk is passed through unchanged.
pub fn collapse_context(hunks: &[DiffHunk], context_lines: usize, collapse: bool) -> Vec<DisplayHunk> {
    if !collapse {
        return hunks.iter().cloned().map(DisplayHunk::Line).collect();
    }

    let mut out = Vec::with_capacity(hunks.len());
    let mut i = 0;
    while i < hunks.len() {
        if hunks[i].is_change() {
            out.push(DisplayHunk::Line(hunks[i].clone()));
            i += 1;
            continue;
        }

        let run_start = i;
        while i < hunks.len() && !hunks[i].is_change() {
            i += 1;
        }
        let run = &hunks[run_start..i];

        let keep_head = if run_start > 0 { context_lines.min(run.len()) } else { 0 };
        let keep_tail = if i < hunks.len() {
            context_lines.min(run.len() - keep_head)
        } else {
            0
        };
        let hidden = run.len() - keep_head - keep_tail;

        if hidden == 0 {
            out.extend(run.iter().cloned().map(DisplayHunk::Line));
            continue;
        }

        out.extend(run[..keep_head].iter().cloned().map(DisplayHunk::Line));
        let first_hidden = &run[keep_head];
        out.push(DisplayHunk::Collapsed {
            hidden,
            old_line: first_hidden.old_line().unwrap_or_default(),
            new_line: first_hidden.new_line().unwrap_or_default(),
        });
        out.extend(run[run.len() - keep_tail..].iter().cloned().map(DisplayHunk::Line));
    }
    out
}

// ── Bulk line-range edits ───────────────────────────────────────

/// Replace `delete` lines starting at 1-based `start` with `insert`.
/// `delete == 0` inserts before `start`; `start == len + 1` appends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEdit {
    pub start: usize,
    pub delete: usize,
    pub insert: Vec<String>,
}

/// Apply non-overlapping line edits to `text`.
///
/// Edits are applied from the end of the document toward the beginning so
/// the line positions of the edits not yet applied stay valid.
pub fn apply_hunks(text: &str, edits: &[LineEdit]) -> Result<String, HunkError> {
    let mut lines: Vec<String> = split_lines(text).into_iter().map(str::to_string).collect();

    let mut ordered: Vec<&LineEdit> = edits.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start).then(b.delete.cmp(&a.delete)));

    // Validate against the original line count before touching anything.
    let len = lines.len();
    for edit in &ordered {
        if edit.start == 0 || edit.start + edit.delete > len + 1 {
            return Err(HunkError::OutOfRange { start: edit.start, len });
        }
    }
    for pair in ordered.windows(2) {
        let (later, earlier) = (pair[0], pair[1]);
        let earlier_end = earlier.start + earlier.delete;
        let touches = earlier_end > later.start
            || (earlier.start == later.start && (earlier.delete == 0) == (later.delete == 0));
        if touches {
            return Err(HunkError::Overlapping {
                start: earlier.start,
                other: later.start,
            });
        }
    }

    for edit in ordered {
        let from = edit.start - 1;
        lines.splice(from..from + edit.delete, edit.insert.iter().cloned());
    }
    Ok(lines.join("\n"))
}

/// Build the line edits for the selected change blocks of `diff`.
pub fn edits_for_blocks(diff: &DiffResult, accepted: &[usize]) -> Result<Vec<LineEdit>, HunkError> {
    let blocks = diff.change_blocks();
    accepted
        .iter()
        .map(|&idx| {
            let block = blocks.get(idx).ok_or(HunkError::UnknownBlock(idx))?;
            Ok(LineEdit {
                start: block.old_start,
                delete: block.deleted.len(),
                insert: block.added.iter().map(|s| s.to_string()).collect(),
            })
        })
        .collect()
}

/// Apply only the accepted change blocks of `diff` to its old text.
///
/// Rejected blocks keep the old lines.
pub fn accept_blocks(old_text: &str, diff: &DiffResult, accepted: &[usize]) -> Result<String, HunkError> {
    let edits = edits_for_blocks(diff, accepted)?;
    apply_hunks(old_text, &edits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::compute_diff;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_collapse_disabled_is_identity() {
        let diff = compute_diff(&numbered(20), &numbered(21));
        let shown = collapse_context(&diff.hunks, 3, false);
        let back: Vec<DiffHunk> = shown.iter().filter_map(|h| h.as_line().cloned()).collect();
        assert_eq!(back, diff.hunks);
    }

    #[test]
    fn test_collapse_keeps_context_around_change() {
        let old = numbered(20);
        let new = old.replace("line10", "changed");
        let diff = compute_diff(&old, &new);
        let shown = collapse_context(&diff.hunks, 3, true);

        // 9 leading context lines: 6 hidden + 3 shown; change (2); 10 trailing: 3 shown + 7 hidden.
        assert_eq!(shown.len(), 1 + 3 + 2 + 3 + 1);
        assert_eq!(
            shown[0],
            DisplayHunk::Collapsed { hidden: 6, old_line: 1, new_line: 1 }
        );
        assert_eq!(shown[1].as_line().map(DiffHunk::content), Some("line7"));
        assert_eq!(
            shown[9],
            DisplayHunk::Collapsed { hidden: 7, old_line: 14, new_line: 14 }
        );
    }

    #[test]
    fn test_short_gap_between_changes_stays_visible() {
        let old = "a\nb\nc\nd\ne";
        let new = "A\nb\nc\nd\nE";
        let diff = compute_diff(old, new);
        let shown = collapse_context(&diff.hunks, 2, true);
        // gap of 3 context lines <= 2 + 2, nothing folded
        assert!(shown.iter().all(|h| h.as_line().is_some()));
        assert_eq!(shown.len(), diff.hunks.len());
    }

    #[test]
    fn test_unchanged_document_folds_entirely() {
        let text = numbered(5);
        let diff = compute_diff(&text, &text);
        let shown = collapse_context(&diff.hunks, 3, true);
        assert_eq!(
            shown,
            vec![DisplayHunk::Collapsed { hidden: 5, old_line: 1, new_line: 1 }]
        );
    }

    #[test]
    fn test_zero_context_hides_everything_unchanged() {
        let diff = compute_diff("a\nb\nc", "a\nB\nc");
        let shown = collapse_context(&diff.hunks, 0, true);
        assert_eq!(shown.len(), 4);
        assert!(matches!(shown[0], DisplayHunk::Collapsed { hidden: 1, .. }));
        assert!(matches!(shown[3], DisplayHunk::Collapsed { hidden: 1, .. }));
    }

    #[test]
    fn test_apply_hunks_end_to_start() {
        let text = "a\nb\nc\nd";
        let edits = vec![
            LineEdit { start: 1, delete: 1, insert: vec!["A".into(), "A2".into()] },
            LineEdit { start: 3, delete: 2, insert: vec!["CD".into()] },
            LineEdit { start: 5, delete: 0, insert: vec!["tail".into()] },
        ];
        assert_eq!(apply_hunks(text, &edits).unwrap(), "A\nA2\nb\nCD\ntail");
    }

    #[test]
    fn test_apply_hunks_rejects_overlap() {
        let edits = vec![
            LineEdit { start: 2, delete: 2, insert: vec![] },
            LineEdit { start: 3, delete: 1, insert: vec!["x".into()] },
        ];
        assert_eq!(
            apply_hunks("a\nb\nc\nd", &edits),
            Err(HunkError::Overlapping { start: 2, other: 3 })
        );
    }

    #[test]
    fn test_apply_hunks_rejects_out_of_range() {
        let edits = vec![LineEdit { start: 4, delete: 1, insert: vec![] }];
        assert_eq!(
            apply_hunks("a\nb", &edits),
            Err(HunkError::OutOfRange { start: 4, len: 2 })
        );
    }

    #[test]
    fn test_accept_subset_of_blocks() {
        let old = "a\nb\nc\nd\ne";
        let new = "A\nb\nc\nd\nE";
        let diff = compute_diff(old, new);
        assert_eq!(accept_blocks(old, &diff, &[1]).unwrap(), "a\nb\nc\nd\nE");
        assert_eq!(accept_blocks(old, &diff, &[0, 1]).unwrap(), new);
        assert_eq!(accept_blocks(old, &diff, &[]).unwrap(), old);
        assert_eq!(accept_blocks(old, &diff, &[7]), Err(HunkError::UnknownBlock(7)));
    }
}
