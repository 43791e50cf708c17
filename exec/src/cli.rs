use std::path::PathBuf;

use agent_loop_core::protocol::ApprovalPolicy;
use anyhow::Result;
use anyhow::anyhow;
use clap::ArgAction;
use clap::Parser;
use clap::ValueEnum;

#[derive(Parser, Debug)]
#[command(version, about = "Run one agent turn against a prompt.")]
pub struct Cli {
    /// Model the agent should use.
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// When to ask before running a command the model proposes.
    #[arg(long = "approval-policy", short = 'a', value_enum)]
    pub approval_policy: Option<ApprovalModeCliArg>,

    /// Wildcard pattern of commands that run without asking under the
    /// `allowlist` policy. Repeatable.
    #[arg(long = "allow", value_name = "PATTERN", action = ArgAction::Append)]
    pub allow: Vec<String>,

    /// Tell the agent to use the specified directory as its working root.
    #[arg(long = "cd", short = 'C', value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Continue the conversation from this response id.
    #[arg(long = "previous-response-id", value_name = "ID")]
    pub previous_response_id: Option<String>,

    /// Print events to stdout as JSONL.
    #[arg(long = "json", default_value_t = false)]
    pub json: bool,

    /// Specifies file where the last message from the agent should be written.
    #[arg(long = "output-last-message")]
    pub last_message_file: Option<PathBuf>,

    /// Override configuration values (`toml`-parsed). Repeatable.
    #[arg(
        short = 'c',
        long = "config",
        value_name = "key=value",
        action = ArgAction::Append
    )]
    pub raw_overrides: Vec<String>,

    /// Initial instructions for the agent. If not provided as an argument (or
    /// if `-` is used), instructions are read from stdin.
    #[arg(value_name = "PROMPT")]
    pub prompt: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum ApprovalModeCliArg {
    /// Run every command without asking.
    AlwaysApprove,

    /// Run known read-only commands and `--allow` matches; ask for the rest.
    Allowlist,

    /// Ask before every command.
    AskEveryTime,
}

impl ApprovalModeCliArg {
    pub fn into_policy(self, allow: Vec<String>) -> ApprovalPolicy {
        match self {
            ApprovalModeCliArg::AlwaysApprove => ApprovalPolicy::AlwaysApprove,
            ApprovalModeCliArg::Allowlist => ApprovalPolicy::Allowlist { commands: allow },
            ApprovalModeCliArg::AskEveryTime => ApprovalPolicy::AskEveryTime,
        }
    }
}

pub fn parse_overrides(raw: &[String]) -> Result<Vec<(String, toml::Value)>> {
    raw.iter()
        .map(|entry| parse_single_override(entry))
        .collect()
}

fn parse_single_override(raw: &str) -> Result<(String, toml::Value)> {
    let mut split = raw.splitn(2, '=');
    let key = split
        .next()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| anyhow!("override missing key: {raw}"))?;
    let value = split
        .next()
        .map(str::trim)
        .ok_or_else(|| anyhow!("override missing '=' delimiter: {raw}"))?;

    // Bare words like `o3` are not valid TOML; treat them as strings.
    let parsed =
        parse_toml_value(value).unwrap_or_else(|| toml::Value::String(trim_override_string(value)));

    Ok((key.to_string(), parsed))
}

fn trim_override_string(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .to_string()
}

fn parse_toml_value(raw: &str) -> Option<toml::Value> {
    let wrapped = format!("_value_ = {raw}");
    let mut table: toml::Table = toml::from_str(&wrapped).ok()?;
    table.remove("_value_")
}
