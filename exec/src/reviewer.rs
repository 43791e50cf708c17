//! Answers confirmation requests from the terminal.

use agent_loop_core::confirmation::ConfirmationRequest;
use agent_loop_core::protocol::CommandConfirmation;
use owo_colors::OwoColorize;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::debug;

const ANSWER_HELP: &str = "[y]es, [a]lways this session, [n]o [reason], [q]uit turn";

/// Parses one line typed by the reviewer. Anything after `n` is sent to the
/// model as the reason for the denial.
pub(crate) fn parse_review_answer(line: &str) -> Option<CommandConfirmation> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match word.to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(CommandConfirmation::approved()),
        "a" | "always" => Some(CommandConfirmation::approved_for_session()),
        "n" | "no" => {
            let reason = (!rest.is_empty()).then(|| rest.to_string());
            Some(CommandConfirmation::denied(reason))
        }
        "q" | "quit" | "abort" => Some(CommandConfirmation::abort()),
        _ => None,
    }
}

/// Serves confirmation requests one at a time from stdin. Returns when stdin
/// closes; requests still queued then count as denied.
pub(crate) async fn run_stdin_reviewer(mut requests: mpsc::Receiver<ConfirmationRequest>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(mut request) = requests.recv().await {
        let command = shlex::try_join(request.command.iter().map(String::as_str))
            .unwrap_or_else(|_| request.command.join(" "));
        match &request.apply_patch {
            Some(patch) => {
                eprintln!("{}", "apply patch?".bold());
                for (path, change) in &patch.changes {
                    eprintln!("  {} {change:?}", path.display());
                }
            }
            None => eprintln!("{} {}", "run".bold(), command.bold()),
        }

        loop {
            eprintln!("{}", ANSWER_HELP.dimmed());
            let line = tokio::select! {
                _ = request.withdrawn() => {
                    debug!("confirmation withdrawn");
                    break;
                }
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) => {
                    if let Some(confirmation) = parse_review_answer(&line) {
                        if !request.respond(confirmation) {
                            debug!("answer arrived after the turn stopped waiting");
                        }
                        break;
                    }
                }
                Ok(None) | Err(_) => {
                    debug!("stdin closed; denying remaining confirmations");
                    return;
                }
            }
        }
    }
}
