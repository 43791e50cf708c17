use std::path::PathBuf;

use agent_loop_core::config::Config;
use agent_loop_core::models::LocalShellAction;
use agent_loop_core::models::ReasoningItemReasoningSummary;
use agent_loop_core::models::ResponseItem;
use agent_loop_core::protocol::Event;
use agent_loop_core::protocol::EventMsg;
use agent_loop_core::protocol::TurnAbortReason;
use owo_colors::OwoColorize;
use owo_colors::Style;

use crate::event_processor::EventProcessor;
use crate::event_processor::LoopStatus;
use crate::event_processor::handle_last_message;

/// Tool output longer than this many lines is elided in the terminal.
const MAX_OUTPUT_LINES_FOR_EXEC_TOOL_CALL: usize = 20;

pub(crate) struct EventProcessorWithHumanOutput {
    // To ensure that --color=never is respected, ANSI escapes _must_ be added
    // using .style() with one of these fields. If you need a new style, add a
    // new field here.
    bold: Style,
    italic: Style,
    dimmed: Style,

    magenta: Style,
    red: Style,
    green: Style,
    cyan: Style,

    last_message_path: Option<PathBuf>,
    last_agent_message: Option<String>,
}

impl EventProcessorWithHumanOutput {
    pub(crate) fn create_with_ansi(with_ansi: bool, last_message_path: Option<PathBuf>) -> Self {
        let styled = |style: Style| if with_ansi { style } else { Style::new() };
        Self {
            bold: styled(Style::new().bold()),
            italic: styled(Style::new().italic()),
            dimmed: styled(Style::new().dimmed()),
            magenta: styled(Style::new().magenta()),
            red: styled(Style::new().red()),
            green: styled(Style::new().green()),
            cyan: styled(Style::new().cyan()),
            last_message_path,
            last_agent_message: None,
        }
    }

    fn print_response_item(&self, item: &ResponseItem) {
        match item {
            ResponseItem::Message { role, .. } if role == "assistant" => {
                if let Some(text) = item.assistant_text() {
                    eprintln!("{}", "agent".style(self.magenta).style(self.italic));
                    println!("{text}");
                }
            }
            ResponseItem::Reasoning { summary, .. } => {
                for part in summary {
                    let ReasoningItemReasoningSummary::SummaryText { text } = part;
                    eprintln!("{}", text.style(self.dimmed).style(self.italic));
                }
            }
            ResponseItem::FunctionCall {
                name, arguments, ..
            } => {
                eprintln!(
                    "{} {}",
                    name.style(self.magenta).style(self.bold),
                    arguments.style(self.dimmed)
                );
            }
            ResponseItem::LocalShellCall {
                action: LocalShellAction::Exec(exec),
                ..
            } => {
                eprintln!(
                    "{} {}",
                    "exec".style(self.magenta).style(self.bold),
                    escape_command(&exec.command).style(self.bold)
                );
            }
            ResponseItem::FunctionCallOutput { call_id, output } => {
                let (title, style) = if output.success == Some(false) {
                    ("failed", self.red)
                } else {
                    ("succeeded", self.green)
                };
                eprintln!("{} {}", call_id.style(self.dimmed), title.style(style));
                for line in output
                    .content
                    .lines()
                    .take(MAX_OUTPUT_LINES_FOR_EXEC_TOOL_CALL)
                {
                    eprintln!("{}", line.style(self.dimmed));
                }
            }
            ResponseItem::Message { .. } | ResponseItem::Other => {}
        }
    }
}

fn escape_command(command: &[String]) -> String {
    shlex::try_join(command.iter().map(String::as_str)).unwrap_or_else(|_| command.join(" "))
}

impl EventProcessor for EventProcessorWithHumanOutput {
    fn print_config_summary(&mut self, config: &Config, prompt: &str) {
        let entries = [
            ("workdir", config.cwd.display().to_string()),
            ("model", config.model.clone()),
            ("provider", config.model_provider.name.clone()),
            ("approval", config.approval_policy.to_string()),
        ];
        eprintln!("{}", "--------".style(self.dimmed));
        for (key, value) in entries {
            eprintln!("{} {value}", format!("{key}:").style(self.bold));
        }
        eprintln!("{}", "--------".style(self.dimmed));
        eprintln!("{}", "user".style(self.cyan));
        eprintln!("{prompt}");
    }

    fn process_event(&mut self, event: Event) -> LoopStatus {
        let Event { id: _, msg } = event;
        match msg {
            EventMsg::ResponseItem(ev) => {
                self.print_response_item(&ev.item);
                LoopStatus::Running
            }
            EventMsg::Loading(ev) => {
                if ev.loading {
                    eprintln!("{}", "thinking".style(self.dimmed).style(self.italic));
                }
                LoopStatus::Running
            }
            EventMsg::LastResponseId(ev) => {
                eprintln!(
                    "{} {}",
                    "response id:".style(self.dimmed),
                    ev.response_id.style(self.dimmed)
                );
                LoopStatus::Running
            }
            EventMsg::TurnComplete(ev) => {
                self.last_agent_message = ev.last_agent_message;
                LoopStatus::TurnEnded
            }
            EventMsg::TurnAborted(ev) => {
                let reason = match ev.reason {
                    TurnAbortReason::Interrupted => "turn interrupted",
                    TurnAbortReason::ReviewAborted => "turn aborted by reviewer",
                };
                eprintln!("{}", reason.style(self.red));
                LoopStatus::TurnEnded
            }
            EventMsg::Error(ev) => {
                eprintln!("{} {}", "ERROR:".style(self.red).style(self.bold), ev.message);
                LoopStatus::TurnEnded
            }
            EventMsg::TurnStarted | EventMsg::AgentMessageDelta(_) => LoopStatus::Running,
        }
    }

    fn print_final_output(&mut self) {
        handle_last_message(
            self.last_agent_message.as_deref(),
            self.last_message_path.as_deref(),
        );
    }
}
