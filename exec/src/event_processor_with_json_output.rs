use std::path::PathBuf;

use agent_loop_core::config::Config;
use agent_loop_core::protocol::Event;
use agent_loop_core::protocol::EventMsg;
use serde_json::json;

use crate::event_processor::EventProcessor;
use crate::event_processor::LoopStatus;
use crate::event_processor::handle_last_message;

/// Writes every event to stdout as one JSON object per line.
pub(crate) struct EventProcessorWithJsonOutput {
    last_message_path: Option<PathBuf>,
    last_agent_message: Option<String>,
}

impl EventProcessorWithJsonOutput {
    pub fn new(last_message_path: Option<PathBuf>) -> Self {
        Self {
            last_message_path,
            last_agent_message: None,
        }
    }
}

impl EventProcessor for EventProcessorWithJsonOutput {
    fn print_config_summary(&mut self, config: &Config, prompt: &str) {
        let summary = json!({
            "model": config.model,
            "approval_policy": config.approval_policy,
            "cwd": config.cwd,
            "provider": config.model_provider.name,
            "prompt": prompt,
        });
        println!("{summary}");
    }

    fn process_event(&mut self, event: Event) -> LoopStatus {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!("Failed to serialize event: {e}"),
        }

        match event.msg {
            EventMsg::TurnComplete(ev) => {
                self.last_agent_message = ev.last_agent_message;
                LoopStatus::TurnEnded
            }
            EventMsg::TurnAborted(_) | EventMsg::Error(_) => LoopStatus::TurnEnded,
            _ => LoopStatus::Running,
        }
    }

    fn print_final_output(&mut self) {
        handle_last_message(
            self.last_agent_message.as_deref(),
            self.last_message_path.as_deref(),
        );
    }
}
