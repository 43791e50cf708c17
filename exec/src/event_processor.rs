use std::path::Path;

use agent_loop_core::config::Config;
use agent_loop_core::protocol::Event;

pub(crate) enum LoopStatus {
    Running,
    TurnEnded,
}

pub(crate) trait EventProcessor {
    /// Print summary of effective configuration and user prompt.
    fn print_config_summary(&mut self, _config: &Config, _prompt: &str) {}

    /// Handle a single event emitted by the session.
    fn process_event(&mut self, event: Event) -> LoopStatus;

    fn print_final_output(&mut self) {}
}

pub(crate) fn handle_last_message(last_agent_message: Option<&str>, last_message_path: Option<&Path>) {
    let Some(path) = last_message_path else {
        return;
    };
    let message = last_agent_message.unwrap_or_default();
    if message.is_empty() {
        eprintln!("Warning: no last agent message; wrote empty content to {}", path.display());
    }
    if let Err(e) = std::fs::write(path, message) {
        eprintln!("Failed to write last message file {}: {e}", path.display());
    }
}
