//! Root of the `agent-loop-core` library.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the event stream or `tracing`.
#![deny(clippy::print_stdout, clippy::print_stderr)]

mod agent_loop;
pub mod agent_services;
mod apply_patch;
mod client;
mod client_common;
mod command_safety;
pub mod config;
mod config_loader;
pub mod confirmation;
pub mod error;
mod events;
pub mod exec;
mod function_tool;
pub mod model_provider_info;
pub mod safety;
mod state;
mod tools;
mod turn;

pub use agent_loop::AgentLoopParams;
pub use agent_loop::SessionLoop;
pub use apply_patch::maybe_parse_apply_patch;
pub use apply_patch::summarize_patch;
pub use client::ModelClient;
pub use client_common::Prompt;
pub use client_common::ResponseEvent;
pub use client_common::ResponseStream;
pub use command_safety::is_known_safe_command;
pub use error::LoopErr;
pub use events::EventReceiver;
pub use tools::format_exec_output;

// Re-export the protocol types so downstream crates depend on a single
// version of them.
pub use agent_loop_protocol::protocol;
pub use agent_loop_protocol::models;
pub use agent_loop_protocol::SessionId;
