use std::io;
use std::path::PathBuf;

use agent_loop_protocol::protocol::ApprovalPolicy;
use serde::Deserialize;
use toml::Value as TomlValue;

use crate::config_loader::load_config_as_toml;
use crate::model_provider_info::ModelProviderInfo;

pub const DEFAULT_MODEL: &str = "codex-mini-latest";

/// Application configuration loaded from disk and merged with overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Model identifier sent with every request.
    pub model: String,

    /// System instructions sent with every request.
    pub instructions: Option<String>,

    pub approval_policy: ApprovalPolicy,

    pub model_provider: ModelProviderInfo,

    /// Directory the model's relative paths are resolved against.
    pub cwd: PathBuf,

    /// Directory holding `config.toml`; `$AGENT_LOOP_HOME` or
    /// `~/.agent-loop`.
    pub agent_loop_home: PathBuf,
}

/// Base config deserialized from `config.toml`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ConfigToml {
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub approval_policy: Option<ApprovalPolicy>,
    pub model_provider: Option<ModelProviderInfo>,
}

/// Optional overrides for user configuration (e.g., from CLI flags).
#[derive(Default, Debug, Clone)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub approval_policy: Option<ApprovalPolicy>,
    pub cwd: Option<PathBuf>,
}

impl Config {
    /// Loads `config.toml` from the agent-loop home, applies the `-c`
    /// style `cli_overrides` (dotted key paths) and then the strongly typed
    /// `overrides`.
    pub fn load_with_cli_overrides(
        cli_overrides: Vec<(String, TomlValue)>,
        overrides: ConfigOverrides,
    ) -> io::Result<Self> {
        let agent_loop_home = find_agent_loop_home()?;

        let mut root_value = load_config_as_toml(&agent_loop_home)?;
        for (path, value) in cli_overrides {
            apply_toml_override(&mut root_value, &path, value);
        }

        let cfg: ConfigToml = root_value.try_into().map_err(|e| {
            tracing::error!("Failed to deserialize overridden config: {e}");
            io::Error::new(io::ErrorKind::InvalidData, e)
        })?;

        Self::load_from_base_config_with_overrides(cfg, overrides, agent_loop_home)
    }

    pub fn load_from_base_config_with_overrides(
        cfg: ConfigToml,
        overrides: ConfigOverrides,
        agent_loop_home: PathBuf,
    ) -> io::Result<Self> {
        let ConfigOverrides {
            model,
            approval_policy,
            cwd,
        } = overrides;

        let cwd = match cwd {
            Some(cwd) if cwd.is_absolute() => cwd,
            Some(cwd) => std::env::current_dir()?.join(cwd),
            None => std::env::current_dir()?,
        };

        Ok(Self {
            model: model
                .or(cfg.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            instructions: cfg.instructions,
            approval_policy: approval_policy.or(cfg.approval_policy).unwrap_or_default(),
            model_provider: cfg.model_provider.unwrap_or_default(),
            cwd,
            agent_loop_home,
        })
    }
}

/// Applies a single dotted-path override onto a TOML value, creating
/// intermediate tables as needed.
pub fn apply_toml_override(root: &mut TomlValue, path: &str, value: TomlValue) {
    let mut current = root;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        let is_last = segments.peek().is_none();

        if !current.is_table() {
            *current = TomlValue::Table(toml::map::Map::new());
        }
        let TomlValue::Table(table) = current else {
            return;
        };

        if is_last {
            table.insert(segment.to_string(), value);
            return;
        }

        current = table
            .entry(segment.to_string())
            .or_insert_with(|| TomlValue::Table(toml::map::Map::new()));
    }
}

/// Returns the path to the agent-loop configuration directory, which can be
/// specified by the `AGENT_LOOP_HOME` environment variable. If not set,
/// defaults to `~/.agent-loop`.
///
/// - If `AGENT_LOOP_HOME` is set, the value will be canonicalized and this
///   function will Err if the path does not exist.
/// - If `AGENT_LOOP_HOME` is not set, this function does not verify that the
///   directory exists.
pub fn find_agent_loop_home() -> io::Result<PathBuf> {
    if let Ok(val) = std::env::var("AGENT_LOOP_HOME")
        && !val.is_empty()
    {
        return PathBuf::from(val).canonicalize();
    }

    let mut p = dirs::home_dir().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "Could not find home directory")
    })?;
    p.push(".agent-loop");
    Ok(p)
}
