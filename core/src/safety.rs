use std::collections::HashSet;

use agent_loop_protocol::protocol::ApplyPatchCommand;
use agent_loop_protocol::protocol::ApprovalPolicy;
use wildmatch::WildMatch;

use crate::command_safety::is_known_safe_command;

#[derive(Debug, PartialEq, Eq)]
pub enum SafetyCheck {
    AutoApprove,
    AskUser,
}

/// Decides whether a proposed command needs a reviewer.
///
/// A command the user approved for the session is matched by its exact
/// tokens and never asks again, whatever the policy.
pub fn assess_command_safety(
    command: &[String],
    apply_patch: Option<&ApplyPatchCommand>,
    policy: &ApprovalPolicy,
    approved: &HashSet<Vec<String>>,
) -> SafetyCheck {
    if approved.contains(command) {
        return SafetyCheck::AutoApprove;
    }

    match policy {
        ApprovalPolicy::AlwaysApprove => SafetyCheck::AutoApprove,
        ApprovalPolicy::AskEveryTime => SafetyCheck::AskUser,
        ApprovalPolicy::Allowlist { commands } => {
            // Patches write files; the allowlist only covers commands.
            if apply_patch.is_some() {
                return SafetyCheck::AskUser;
            }
            if is_known_safe_command(command) || matches_allowlist(command, commands) {
                SafetyCheck::AutoApprove
            } else {
                SafetyCheck::AskUser
            }
        }
    }
}

fn matches_allowlist(command: &[String], patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let joined = shlex::try_join(command.iter().map(String::as_str))
        .unwrap_or_else(|_| command.join(" "));
    patterns
        .iter()
        .any(|pattern| WildMatch::new(pattern).matches(&joined))
}
