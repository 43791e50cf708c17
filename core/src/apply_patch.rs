//! Recognises `apply_patch` invocations proposed by the model and summarises
//! the files they touch so a reviewer can see them before approving.

use std::collections::BTreeMap;
use std::path::PathBuf;

use agent_loop_protocol::protocol::ApplyPatchCommand;
use agent_loop_protocol::protocol::FileChange;

pub const APPLY_PATCH_PROGRAM: &str = "apply_patch";

const APPLY_PATCH_ALIASES: [&str; 2] = [APPLY_PATCH_PROGRAM, "applypatch"];

const BEGIN_PATCH_MARKER: &str = "*** Begin Patch";
const END_PATCH_MARKER: &str = "*** End Patch";
const ADD_FILE_MARKER: &str = "*** Add File: ";
const DELETE_FILE_MARKER: &str = "*** Delete File: ";
const UPDATE_FILE_MARKER: &str = "*** Update File: ";
const MOVE_TO_MARKER: &str = "*** Move to: ";

/// Returns the patch text when `argv` invokes `apply_patch`, either directly
/// (`["apply_patch", PATCH]`) or through a heredoc in a login shell
/// (`["bash", "-lc", "apply_patch <<'EOF'\nPATCH\nEOF\n"]`).
pub fn maybe_parse_apply_patch(argv: &[String]) -> Option<String> {
    match argv {
        [program, patch] if APPLY_PATCH_ALIASES.contains(&program.as_str()) => {
            Some(patch.clone())
        }
        [shell, flag, script] if shell == "bash" && flag == "-lc" => {
            extract_heredoc_patch(script)
        }
        _ => None,
    }
}

fn extract_heredoc_patch(script: &str) -> Option<String> {
    let (first_line, rest) = script.trim_start().split_once('\n')?;
    let redirect = APPLY_PATCH_ALIASES
        .iter()
        .find_map(|alias| first_line.trim().strip_prefix(alias))?
        .trim_start()
        .strip_prefix("<<")?;
    let delimiter = redirect
        .trim()
        .trim_start_matches('-')
        .trim_matches(|c| c == '\'' || c == '"');
    if delimiter.is_empty() || delimiter.contains(char::is_whitespace) {
        return None;
    }

    let mut body = Vec::new();
    for line in rest.lines() {
        if line.trim() == delimiter {
            return Some(body.join("\n"));
        }
        body.push(line);
    }
    None
}

/// Builds the reviewer-facing description of `patch`. Unknown lines are
/// ignored; the patch program remains the authority on whether it applies.
pub fn summarize_patch(patch: &str) -> ApplyPatchCommand {
    let mut changes = BTreeMap::new();
    let mut current: Option<(PathBuf, FileChange)> = None;

    for line in patch.lines() {
        if line == BEGIN_PATCH_MARKER {
            continue;
        }
        if line == END_PATCH_MARKER {
            break;
        }

        let next = if let Some(path) = line.strip_prefix(ADD_FILE_MARKER) {
            Some((
                PathBuf::from(path.trim()),
                FileChange::Add {
                    content: String::new(),
                },
            ))
        } else if let Some(path) = line.strip_prefix(DELETE_FILE_MARKER) {
            Some((PathBuf::from(path.trim()), FileChange::Delete))
        } else if let Some(path) = line.strip_prefix(UPDATE_FILE_MARKER) {
            Some((
                PathBuf::from(path.trim()),
                FileChange::Update {
                    unified_diff: String::new(),
                    move_path: None,
                },
            ))
        } else {
            None
        };

        if let Some(next) = next {
            if let Some((path, change)) = current.replace(next) {
                changes.insert(path, change);
            }
            continue;
        }

        match current.as_mut() {
            Some((_, FileChange::Add { content })) => {
                if let Some(added) = line.strip_prefix('+') {
                    content.push_str(added);
                    content.push('\n');
                }
            }
            Some((
                _,
                FileChange::Update {
                    unified_diff,
                    move_path,
                },
            )) => {
                if let Some(dest) = line.strip_prefix(MOVE_TO_MARKER) {
                    *move_path = Some(PathBuf::from(dest.trim()));
                } else {
                    unified_diff.push_str(line);
                    unified_diff.push('\n');
                }
            }
            Some((_, FileChange::Delete)) | None => {}
        }
    }

    if let Some((path, change)) = current {
        changes.insert(path, change);
    }

    ApplyPatchCommand {
        patch: patch.to_string(),
        changes,
    }
}
