mod cli;
mod event_processor;
mod event_processor_with_human_output;
mod event_processor_with_json_output;
mod reviewer;

use std::io::IsTerminal;
use std::io::Read;
use std::sync::Arc;

use agent_loop_core::AgentLoopParams;
use agent_loop_core::SessionLoop;
use agent_loop_core::config::Config;
use agent_loop_core::config::ConfigOverrides;
use agent_loop_core::confirmation::ChannelConfirmationGate;
use agent_loop_core::exec::ShellExecutor;
use agent_loop_core::models::ResponseInputItem;
pub use cli::Cli;
use event_processor::EventProcessor;
use event_processor::LoopStatus;
use event_processor_with_human_output::EventProcessorWithHumanOutput;
use event_processor_with_json_output::EventProcessorWithJsonOutput;
use tracing::debug;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::parse_overrides;
use crate::reviewer::run_stdin_reviewer;

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        model,
        approval_policy,
        allow,
        cwd,
        previous_response_id,
        json: json_mode,
        last_message_file,
        raw_overrides,
        prompt,
    } = cli;

    let stdout_with_ansi = std::io::stdout().is_terminal();
    let stderr_with_ansi = std::io::stderr().is_terminal();

    // Progress and diagnostics go to stderr so stdout stays parseable.
    let default_level = "error";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_ansi(stderr_with_ansi)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .try_init();

    let prompt = resolve_prompt(prompt)?;

    let cli_kv_overrides = parse_overrides(&raw_overrides)?;
    let overrides = ConfigOverrides {
        model,
        approval_policy: approval_policy.map(|mode| mode.into_policy(allow)),
        cwd,
    };
    let config = Config::load_with_cli_overrides(cli_kv_overrides, overrides)?;

    let mut event_processor: Box<dyn EventProcessor> = if json_mode {
        Box::new(EventProcessorWithJsonOutput::new(last_message_file))
    } else {
        Box::new(EventProcessorWithHumanOutput::create_with_ansi(
            stdout_with_ansi,
            last_message_file,
        ))
    };
    event_processor.print_config_summary(&config, &prompt);

    let (gate, requests) = ChannelConfirmationGate::new(1);
    tokio::spawn(run_stdin_reviewer(requests));

    let params = AgentLoopParams::from_config(
        &config,
        Arc::new(gate),
        Arc::new(ShellExecutor::default()),
    );
    let (session, mut events) = SessionLoop::new(params);
    let session = Arc::new(session);
    info!(session_id = %session.session_id(), "session created");

    // The first Ctrl-C interrupts the turn, the second ends the session.
    {
        let session = session.clone();
        tokio::spawn(async move {
            let mut interrupts = 0;
            while tokio::signal::ctrl_c().await.is_ok() {
                interrupts += 1;
                if interrupts == 1 {
                    if let Err(e) = session.cancel() {
                        debug!("cancel after termination: {e}");
                    }
                } else {
                    let _ = session.terminate();
                    break;
                }
            }
        });
    }

    let turn = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .run(vec![ResponseInputItem::user_text(prompt)], previous_response_id)
                .await
        })
    };

    while let Some(event) = events.recv().await {
        if let LoopStatus::TurnEnded = event_processor.process_event(event) {
            break;
        }
    }

    let result = turn.await?;
    event_processor.print_final_output();
    result?;
    Ok(())
}

/// The prompt comes from the argument unless it is missing or `-`, in which
/// case it is read from piped stdin.
fn resolve_prompt(prompt: Option<String>) -> anyhow::Result<String> {
    match prompt {
        Some(p) if p != "-" => Ok(p),
        maybe_dash => {
            let force_stdin = matches!(maybe_dash.as_deref(), Some("-"));

            if std::io::stdin().is_terminal() && !force_stdin {
                anyhow::bail!(
                    "No prompt provided. Either specify one as an argument or pipe the prompt into stdin."
                );
            }

            if !force_stdin {
                eprintln!("Reading prompt from stdin...");
            }
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                anyhow::bail!("No prompt provided via stdin.");
            }
            Ok(buffer)
        }
    }
}
