//! Reads the layered TOML configuration: the user's `config.toml` first, then
//! a system-wide file whose keys take precedence.

use std::io;
use std::path::Path;
use std::path::PathBuf;

use toml::Value as TomlValue;

const CONFIG_TOML_FILE: &str = "config.toml";
const SYSTEM_CONFIG_PATH: &str = "/etc/agent-loop/config.toml";

pub(crate) fn load_config_as_toml(agent_loop_home: &Path) -> io::Result<TomlValue> {
    load_config_layers(
        &agent_loop_home.join(CONFIG_TOML_FILE),
        &PathBuf::from(SYSTEM_CONFIG_PATH),
    )
}

fn load_config_layers(user_config_path: &Path, system_config_path: &Path) -> io::Result<TomlValue> {
    let user_config = read_config_from_path(user_config_path, true)?;
    let system_config = read_config_from_path(system_config_path, false)?;

    let mut merged = user_config.unwrap_or_else(default_empty_table);
    if let Some(overlay) = system_config {
        merge_toml_values(&mut merged, &overlay);
    }
    Ok(merged)
}

fn default_empty_table() -> TomlValue {
    TomlValue::Table(Default::default())
}

fn read_config_from_path(path: &Path, log_missing_as_info: bool) -> io::Result<Option<TomlValue>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<TomlValue>(&contents) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::error!("Failed to parse {}: {err}", path.display());
                Err(io::Error::new(io::ErrorKind::InvalidData, err))
            }
        },
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if log_missing_as_info {
                tracing::info!("{} not found, using defaults", path.display());
            } else {
                tracing::debug!("{} not found", path.display());
            }
            Ok(None)
        }
        Err(err) => {
            tracing::error!("Failed to read {}: {err}", path.display());
            Err(err)
        }
    }
}

/// Recursively overlays `overlay` onto `base`; tables merge key by key, any
/// other value replaces what was there.
pub(crate) fn merge_toml_values(base: &mut TomlValue, overlay: &TomlValue) {
    if let TomlValue::Table(overlay_table) = overlay
        && let TomlValue::Table(base_table) = base
    {
        for (key, value) in overlay_table {
            if let Some(existing) = base_table.get_mut(key) {
                merge_toml_values(existing, value);
            } else {
                base_table.insert(key.clone(), value.clone());
            }
        }
        return;
    }

    *base = overlay.clone();
}
