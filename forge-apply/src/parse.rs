//! Parse AI responses into proposed actions.
//!
//! Grammar (version 1). Block tags sit on their own lines; everything
//! outside a block is prose and ignored.
//!
//! ~~~text
//! <file_edit filename="src/lib.rs" action="modify" description="...">
//! ```rust
//! ...full new content...
//! ```
//! </file_edit>
//!
//! <terminal_command description="...">
//! cargo test
//! </terminal_command>
//!
//! <plan title="..." description="...">
//! ### Phase
//! - [ ] open task
//! - [x] finished task
//! </plan>
//! ~~~
//!
//! A malformed block fails the whole parse with the line of its opening tag.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::action::{Plan, PlanTask, ProposedAction};
use crate::error::ParseError;

pub const GRAMMAR_VERSION: u32 = 1;

const FILE_EDIT: &str = "file_edit";
const TERMINAL: &str = "terminal_command";
const PLAN: &str = "plan";

fn open_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*<(file_edit|terminal_command|plan)\b([^>]*)>(.*)$").expect("open tag regex")
    })
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*"([^"]*)""#).expect("attribute regex"))
}

fn task_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[-*]\s+\[([ xX])\]\s+(.+?)\s*$").expect("task regex"))
}

fn phase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*#{2,4}\s+(.+?)\s*$").expect("phase regex"))
}

/// Extract every action block from `raw`, in document order.
pub fn parse_response(raw: &str) -> Result<Vec<ProposedAction>, ParseError> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut actions = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(caps) = open_tag_re().captures(lines[i]) else {
            i += 1;
            continue;
        };
        let tag = caps.get(1).map_or("", |m| m.as_str());
        let attrs = parse_attrs(caps.get(2).map_or("", |m| m.as_str()));
        let rest = caps.get(3).map_or("", |m| m.as_str());
        let line_no = i + 1;
        let close = format!("</{tag}>");

        // Single-line form: <terminal_command>cargo test</terminal_command>
        if let Some(inline) = rest.trim_end().strip_suffix(close.as_str()) {
            actions.push(build_action(tag, &attrs, &[inline], line_no)?);
            i += 1;
            continue;
        }

        let end = lines[i + 1..]
            .iter()
            .position(|l| l.trim() == close)
            .map(|offset| i + 1 + offset)
            .ok_or_else(|| ParseError::Unterminated {
                tag: tag.to_string(),
                line: line_no,
            })?;

        actions.push(build_action(tag, &attrs, &lines[i + 1..end], line_no)?);
        i = end + 1;
    }

    tracing::debug!("parsed {} action(s) from response", actions.len());
    Ok(actions)
}

fn parse_attrs(raw: &str) -> HashMap<String, String> {
    attr_re()
        .captures_iter(raw)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

fn build_action(
    tag: &str,
    attrs: &HashMap<String, String>,
    body: &[&str],
    line: usize,
) -> Result<ProposedAction, ParseError> {
    let description = attrs.get("description").filter(|d| !d.is_empty()).cloned();
    let action = match tag {
        FILE_EDIT => parse_file_edit(attrs, body, line)?,
        TERMINAL => parse_terminal(body, line)?,
        _ => parse_plan(attrs, body, line)?,
    };
    Ok(match description {
        Some(desc) => action.with_description(desc),
        None => action,
    })
}

fn parse_file_edit(
    attrs: &HashMap<String, String>,
    body: &[&str],
    line: usize,
) -> Result<ProposedAction, ParseError> {
    let filename = attrs
        .get("filename")
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ParseError::MissingAttribute {
            tag: FILE_EDIT.to_string(),
            attribute: "filename",
            line,
        })?;

    let action = attrs.get("action").map(String::as_str).unwrap_or("modify");
    match action {
        "delete" => Ok(ProposedAction::delete(filename)),
        "create" | "modify" => {
            let content = fenced_content(body).ok_or_else(|| ParseError::MissingContent {
                filename: filename.to_string(),
                line,
            })?;
            Ok(if action == "create" {
                ProposedAction::create(filename, content)
            } else {
                ProposedAction::edit(filename, content)
            })
        }
        other => Err(ParseError::UnknownFileAction {
            action: other.to_string(),
            line,
        }),
    }
}

/// Content between the first opening fence and the last closing fence.
///
/// Non-empty content gets a trailing newline, since the fence lines
/// themselves swallow the file's final line break.
fn fenced_content(body: &[&str]) -> Option<String> {
    let open = body.iter().position(|l| l.trim_start().starts_with("```"))?;
    let close = body.iter().rposition(|l| l.trim() == "```")?;
    if close <= open {
        return None;
    }
    let inner = &body[open + 1..close];
    if inner.is_empty() {
        return Some(String::new());
    }
    let mut content = inner.join("\n");
    content.push('\n');
    Some(content)
}

fn parse_terminal(body: &[&str], line: usize) -> Result<ProposedAction, ParseError> {
    // Tolerate a fenced command block.
    let lines: Vec<&str> = body
        .iter()
        .copied()
        .filter(|l| !l.trim_start().starts_with("```"))
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return Err(ParseError::EmptyCommand { line });
    }
    Ok(ProposedAction::terminal(lines.join("\n")))
}

fn parse_plan(
    attrs: &HashMap<String, String>,
    body: &[&str],
    line: usize,
) -> Result<ProposedAction, ParseError> {
    let title = attrs
        .get("title")
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ParseError::MissingAttribute {
            tag: PLAN.to_string(),
            attribute: "title",
            line,
        })?;

    let mut phase: Option<String> = None;
    let mut tasks = Vec::new();
    for l in body {
        if let Some(caps) = task_re().captures(l) {
            tasks.push(PlanTask {
                title: caps[2].to_string(),
                done: &caps[1] != " ",
                phase: phase.clone(),
            });
        } else if let Some(caps) = phase_re().captures(l) {
            phase = Some(caps[1].to_string());
        }
    }
    if tasks.is_empty() {
        return Err(ParseError::EmptyPlan { line });
    }

    Ok(ProposedAction::plan(Plan {
        title: title.to_string(),
        description: attrs.get("description").filter(|d| !d.is_empty()).cloned(),
        tasks,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, ActionPayload};

    #[test]
    fn test_parses_mixed_response() {
        let raw = r#"Sure, here is the change.

<file_edit filename="src/lib.rs" action="modify" description="add greeting">
```rust
pub fn hi() {}
```
</file_edit>

Then run the tests:

<terminal_command description="verify">
cargo test
</terminal_command>
"#;
        let actions = parse_response(raw).unwrap();
        assert_eq!(actions.len(), 2);

        assert_eq!(actions[0].kind, ActionKind::Edit);
        assert_eq!(actions[0].target, "src/lib.rs");
        assert_eq!(actions[0].content(), Some("pub fn hi() {}\n"));
        assert_eq!(actions[0].description.as_deref(), Some("add greeting"));

        assert_eq!(actions[1].kind, ActionKind::Terminal);
        assert_eq!(actions[1].payload, ActionPayload::Command("cargo test".into()));
    }

    #[test]
    fn test_prose_only_yields_nothing() {
        assert_eq!(parse_response("no blocks here\n<b>bold</b>").unwrap(), vec![]);
    }

    #[test]
    fn test_create_and_delete() {
        let raw = "<file_edit filename=\"new.txt\" action=\"create\">\n```\nhello\n```\n</file_edit>\n\
                   <file_edit filename=\"old.txt\" action=\"delete\">\n</file_edit>";
        let actions = parse_response(raw).unwrap();
        assert_eq!(actions[0].kind, ActionKind::Create);
        assert_eq!(actions[0].content(), Some("hello\n"));
        assert_eq!(actions[1].kind, ActionKind::Delete);
        assert_eq!(actions[1].payload, ActionPayload::None);
    }

    #[test]
    fn test_nested_fence_keeps_inner_block() {
        let raw = "<file_edit filename=\"README.md\" action=\"create\">\n```markdown\n# Title\n```sh\nmake\n```\n```\n</file_edit>";
        let actions = parse_response(raw).unwrap();
        assert_eq!(actions[0].content(), Some("# Title\n```sh\nmake\n```\n"));
    }

    #[test]
    fn test_inline_terminal_command() {
        let actions = parse_response("<terminal_command>ls -la</terminal_command>").unwrap();
        assert_eq!(actions[0].target, "ls -la");
    }

    #[test]
    fn test_plan_with_phases() {
        let raw = "<plan title=\"Ship it\">\n### Build\n- [x] compile\n- [ ] package\n### Release\n- [ ] tag\n</plan>";
        let actions = parse_response(raw).unwrap();
        let ActionPayload::Plan(plan) = &actions[0].payload else {
            panic!("expected plan payload");
        };
        assert_eq!(plan.title, "Ship it");
        assert_eq!(plan.tasks.len(), 3);
        assert!(plan.tasks[0].done);
        assert_eq!(plan.tasks[0].phase.as_deref(), Some("Build"));
        assert_eq!(plan.tasks[2].phase.as_deref(), Some("Release"));
    }

    #[test]
    fn test_errors_carry_opening_line() {
        let unterminated = "intro\n\n<terminal_command>\nls\n";
        assert_eq!(
            parse_response(unterminated),
            Err(ParseError::Unterminated { tag: "terminal_command".into(), line: 3 })
        );

        let no_name = "<file_edit action=\"modify\">\n```\nx\n```\n</file_edit>";
        assert_eq!(
            parse_response(no_name),
            Err(ParseError::MissingAttribute {
                tag: "file_edit".into(),
                attribute: "filename",
                line: 1
            })
        );

        let bad_action = "x\n<file_edit filename=\"a\" action=\"rename\">\n</file_edit>";
        assert_eq!(
            parse_response(bad_action),
            Err(ParseError::UnknownFileAction { action: "rename".into(), line: 2 })
        );

        let no_fence = "<file_edit filename=\"a.rs\">\nfn x() {}\n</file_edit>";
        assert_eq!(
            parse_response(no_fence),
            Err(ParseError::MissingContent { filename: "a.rs".into(), line: 1 })
        );

        assert_eq!(
            parse_response("<terminal_command>\n\n</terminal_command>"),
            Err(ParseError::EmptyCommand { line: 1 })
        );
        assert_eq!(
            parse_response("<plan title=\"t\">\njust words\n</plan>"),
            Err(ParseError::EmptyPlan { line: 1 })
        );
    }
}
