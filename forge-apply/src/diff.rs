//! Line-level diffing between two text states.
//!
//! The diff is built from a classic longest-common-subsequence table over
//! line equality. The alignment is then walked once to produce typed hunks:
//! an aligned pair becomes a context hunk, and everything between two aligned
//! pairs becomes deletions (old-only lines) followed by additions (new-only
//! lines). That ordering is fixed so identical inputs always produce the
//! same hunk sequence.

use serde::{Deserialize, Serialize};

// ── Hunks ───────────────────────────────────────────────────────

/// One classified line of a diff. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DiffHunk {
    /// Line present in both texts.
    Context {
        content: String,
        old_line: usize,
        new_line: usize,
    },
    /// Line present only in the new text.
    Addition { content: String, new_line: usize },
    /// Line present only in the old text.
    Deletion { content: String, old_line: usize },
}

impl DiffHunk {
    pub fn content(&self) -> &str {
        match self {
            DiffHunk::Context { content, .. }
            | DiffHunk::Addition { content, .. }
            | DiffHunk::Deletion { content, .. } => content,
        }
    }

    pub fn old_line(&self) -> Option<usize> {
        match self {
            DiffHunk::Context { old_line, .. } | DiffHunk::Deletion { old_line, .. } => {
                Some(*old_line)
            }
            DiffHunk::Addition { .. } => None,
        }
    }

    pub fn new_line(&self) -> Option<usize> {
        match self {
            DiffHunk::Context { new_line, .. } | DiffHunk::Addition { new_line, .. } => {
                Some(*new_line)
            }
            DiffHunk::Deletion { .. } => None,
        }
    }

    /// True for additions and deletions.
    pub fn is_change(&self) -> bool {
        !matches!(self, DiffHunk::Context { .. })
    }
}

// ── Result & stats ──────────────────────────────────────────────

/// Aggregate counts over a hunk sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
    pub unchanged: usize,
    /// Number of hunks (context + additions + deletions).
    pub total: usize,
    /// `round(100 * (additions + deletions) / total)`, 0 for an empty diff.
    pub change_percentage: u32,
}

impl DiffStats {
    pub fn from_hunks(hunks: &[DiffHunk]) -> Self {
        let mut stats = DiffStats::default();
        for hunk in hunks {
            match hunk {
                DiffHunk::Context { .. } => stats.unchanged += 1,
                DiffHunk::Addition { .. } => stats.additions += 1,
                DiffHunk::Deletion { .. } => stats.deletions += 1,
            }
        }
        stats.total = hunks.len();
        if stats.total > 0 {
            let changed = (stats.additions + stats.deletions) as f64;
            stats.change_percentage = (100.0 * changed / stats.total as f64).round() as u32;
        }
        stats
    }

    pub fn has_changes(&self) -> bool {
        self.additions + self.deletions > 0
    }
}

/// A maximal run of consecutive non-context hunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBlock<'a> {
    /// Index of the first hunk of the block in `DiffResult::hunks`.
    pub first_hunk: usize,
    /// 1-based old line the block starts at. For a pure insertion this is the
    /// old line the inserted lines precede (`old_len + 1` at the end).
    pub old_start: usize,
    /// 1-based new line the block starts at.
    pub new_start: usize,
    /// Deleted old lines, in order.
    pub deleted: Vec<&'a str>,
    /// Added new lines, in order.
    pub added: Vec<&'a str>,
}

/// Ordered hunks plus their statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub hunks: Vec<DiffHunk>,
    pub stats: DiffStats,
}

impl DiffResult {
    pub fn is_identical(&self) -> bool {
        !self.stats.has_changes()
    }

    /// Old text lines, read back from context and deletion hunks.
    pub fn old_lines(&self) -> Vec<&str> {
        self.hunks
            .iter()
            .filter(|h| !matches!(h, DiffHunk::Addition { .. }))
            .map(DiffHunk::content)
            .collect()
    }

    /// New text lines, read back from context and addition hunks.
    pub fn new_lines(&self) -> Vec<&str> {
        self.hunks
            .iter()
            .filter(|h| !matches!(h, DiffHunk::Deletion { .. }))
            .map(DiffHunk::content)
            .collect()
    }

    /// Group the change hunks into blocks, keeping their base positions.
    pub fn change_blocks(&self) -> Vec<ChangeBlock<'_>> {
        let mut blocks = Vec::new();
        let mut old_cursor = 0usize;
        let mut new_cursor = 0usize;
        let mut current: Option<ChangeBlock<'_>> = None;

        for (idx, hunk) in self.hunks.iter().enumerate() {
            match hunk {
                DiffHunk::Context { .. } => {
                    if let Some(block) = current.take() {
                        blocks.push(block);
                    }
                    old_cursor += 1;
                    new_cursor += 1;
                }
                DiffHunk::Deletion { content, .. } => {
                    current
                        .get_or_insert_with(|| ChangeBlock::starting_at(idx, old_cursor, new_cursor))
                        .deleted
                        .push(content);
                    old_cursor += 1;
                }
                DiffHunk::Addition { content, .. } => {
                    current
                        .get_or_insert_with(|| ChangeBlock::starting_at(idx, old_cursor, new_cursor))
                        .added
                        .push(content);
                    new_cursor += 1;
                }
            }
        }
        if let Some(block) = current {
            blocks.push(block);
        }
        blocks
    }
}

impl<'a> ChangeBlock<'a> {
    fn starting_at(first_hunk: usize, old_consumed: usize, new_consumed: usize) -> Self {
        Self {
            first_hunk,
            old_start: old_consumed + 1,
            new_start: new_consumed + 1,
            deleted: Vec::new(),
            added: Vec::new(),
        }
    }

    /// True when the block only inserts lines.
    pub fn is_insertion(&self) -> bool {
        self.deleted.is_empty()
    }
}

// ── Algorithm ───────────────────────────────────────────────────

/// Split a document into lines on `\n`.
///
/// The empty document has no lines. Otherwise joining the result with `\n`
/// gives back the input exactly, so a trailing newline shows up as a final
/// empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}

/// Build the LCS length table. `table[i][j]` is the LCS length of
/// `old[..i]` and `new[..j]`.
fn lcs_table(old: &[&str], new: &[&str]) -> Vec<Vec<u32>> {
    let m = old.len();
    let n = new.len();
    let mut table = vec![vec![0u32; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            if old[i - 1] == new[j - 1] {
                table[i][j] = table[i - 1][j - 1] + 1;
            } else {
                table[i][j] = table[i - 1][j].max(table[i][j - 1]);
            }
        }
    }
    table
}

/// Backtrack from `(m, n)` to the ordered list of aligned `(old, new)`
/// index pairs (0-based).
pub(crate) fn lcs_alignment(old: &[&str], new: &[&str]) -> Vec<(usize, usize)> {
    let table = lcs_table(old, new);
    let mut pairs = Vec::with_capacity(table[old.len()][new.len()] as usize);
    let mut i = old.len();
    let mut j = new.len();

    while i > 0 && j > 0 {
        if old[i - 1] == new[j - 1] {
            pairs.push((i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if table[i - 1][j] >= table[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }

    pairs.reverse();
    pairs
}

/// Emit the unaligned lines up to `to`: deletions first, then additions.
fn push_gap(
    hunks: &mut Vec<DiffHunk>,
    old: &[&str],
    new: &[&str],
    (i, j): (&mut usize, &mut usize),
    (to_old, to_new): (usize, usize),
) {
    while *i < to_old {
        hunks.push(DiffHunk::Deletion {
            content: old[*i].to_string(),
            old_line: *i + 1,
        });
        *i += 1;
    }
    while *j < to_new {
        hunks.push(DiffHunk::Addition {
            content: new[*j].to_string(),
            new_line: *j + 1,
        });
        *j += 1;
    }
}

/// Compute the line diff between `old_text` and `new_text`.
pub fn compute_diff(old_text: &str, new_text: &str) -> DiffResult {
    let old = split_lines(old_text);
    let new = split_lines(new_text);
    let alignment = lcs_alignment(&old, &new);

    let mut hunks = Vec::with_capacity(old.len().max(new.len()));
    let mut i = 0usize;
    let mut j = 0usize;

    for &(ai, aj) in &alignment {
        push_gap(&mut hunks, &old, &new, (&mut i, &mut j), (ai, aj));
        hunks.push(DiffHunk::Context {
            content: old[i].to_string(),
            old_line: i + 1,
            new_line: j + 1,
        });
        i += 1;
        j += 1;
    }
    push_gap(&mut hunks, &old, &new, (&mut i, &mut j), (old.len(), new.len()));

    let stats = DiffStats::from_hunks(&hunks);
    DiffResult { hunks, stats }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_are_all_context() {
        let result = compute_diff("a\nb\nc", "a\nb\nc");
        assert!(result.hunks.iter().all(|h| !h.is_change()));
        assert_eq!(result.stats.additions, 0);
        assert_eq!(result.stats.deletions, 0);
        assert_eq!(result.stats.unchanged, 3);
        assert_eq!(result.stats.change_percentage, 0);
        assert!(result.is_identical());
    }

    #[test]
    fn test_empty_old_is_all_additions() {
        let result = compute_diff("", "x\ny");
        assert_eq!(
            result.hunks,
            vec![
                DiffHunk::Addition { content: "x".into(), new_line: 1 },
                DiffHunk::Addition { content: "y".into(), new_line: 2 },
            ]
        );
        assert_eq!(result.stats.change_percentage, 100);
    }

    #[test]
    fn test_empty_new_is_all_deletions() {
        let result = compute_diff("x\ny", "");
        assert_eq!(result.stats.deletions, 2);
        assert_eq!(result.stats.additions, 0);
        assert_eq!(result.hunks[1].old_line(), Some(2));
        assert_eq!(result.hunks[1].new_line(), None);
    }

    #[test]
    fn test_both_empty() {
        let result = compute_diff("", "");
        assert!(result.hunks.is_empty());
        assert_eq!(result.stats, DiffStats::default());
    }

    #[test]
    fn test_deletions_precede_additions_in_a_block() {
        let result = compute_diff("a\nb\nc", "a\nX\nY\nc");
        assert_eq!(
            result.hunks,
            vec![
                DiffHunk::Context { content: "a".into(), old_line: 1, new_line: 1 },
                DiffHunk::Deletion { content: "b".into(), old_line: 2 },
                DiffHunk::Addition { content: "X".into(), new_line: 2 },
                DiffHunk::Addition { content: "Y".into(), new_line: 3 },
                DiffHunk::Context { content: "c".into(), old_line: 3, new_line: 4 },
            ]
        );
        assert_eq!(result.stats.total, 5);
        assert_eq!(result.stats.change_percentage, 60);
    }

    #[test]
    fn test_reconstructs_both_sides() {
        let old = "fn main() {\n    let x = 1;\n    println!(\"{x}\");\n}\n";
        let new = "use std::fmt;\n\nfn main() {\n    let x = 2;\n    println!(\"{x}\");\n}\n";
        let result = compute_diff(old, new);
        assert_eq!(result.old_lines().join("\n"), old);
        assert_eq!(result.new_lines().join("\n"), new);
    }

    #[test]
    fn test_trailing_newline_is_a_line() {
        assert_eq!(split_lines("a\n"), vec!["a", ""]);
        assert!(split_lines("").is_empty());
        let result = compute_diff("a", "a\n");
        assert_eq!(result.stats.additions, 1);
        assert_eq!(result.hunks[1].content(), "");
    }

    #[test]
    fn test_change_blocks_positions() {
        let result = compute_diff("a\nb\nc", "a\nX\nc\nd");
        let blocks = result.change_blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].old_start, 2);
        assert_eq!(blocks[0].deleted, vec!["b"]);
        assert_eq!(blocks[0].added, vec!["X"]);
        assert_eq!(blocks[1].old_start, 4);
        assert_eq!(blocks[1].new_start, 4);
        assert!(blocks[1].is_insertion());
    }

    #[test]
    fn test_alignment_is_ordered() {
        let old = ["a", "b", "c", "b"];
        let new = ["b", "a", "b"];
        let pairs = lcs_alignment(&old, &new);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 < w[1].1));
    }
}
