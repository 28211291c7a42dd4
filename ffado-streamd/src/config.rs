//! Configuration file loading (§4.9): looks in the current directory
//! first, then the XDG config dirs, for a TOML file deserialising into
//! [`ffado_streaming_types::config::StreamingConfig`].
//!
//! Grounded on the teacher's `bark::config::read`/`load_file`: same
//! current-dir-then-xdg search order, same "log and exit on parse
//! error, fall through silently on missing file" behaviour.

use std::path::Path;

use ffado_streaming_types::config::StreamingConfig;
use ffado_streaming_types::error::ConfigError;

const FILE_NAME: &str = "ffado-streamd.toml";

fn load_file(path: &Path) -> Result<Option<StreamingConfig>, ConfigError> {
    log::debug!("looking for config in {}", path.display());

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io { path: path.display().to_string(), source });
        }
    };

    let config = toml::from_str(&contents)
        .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })?;

    log::info!("read configuration from {}", path.display());
    Ok(Some(config))
}

/// Current directory, then `$XDG_CONFIG_HOME/ffado-streamd/`. Returns the
/// default configuration if no file is found anywhere.
pub fn load() -> Result<StreamingConfig, ConfigError> {
    if let Some(config) = load_file(Path::new(FILE_NAME))? {
        return Ok(config);
    }

    if let Ok(dirs) = xdg::BaseDirectories::with_prefix("ffado-streamd") {
        if let Some(path) = dirs.find_config_file(FILE_NAME) {
            if let Some(config) = load_file(&path)? {
                return Ok(config);
            }
        }
    }

    log::debug!("no configuration file found, using defaults");
    Ok(StreamingConfig::default())
}
