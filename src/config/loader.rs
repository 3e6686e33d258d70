use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::MagellanConfig;

pub const DEFAULT_CONFIG_PATHS: &[&str] = &["magellan.toml", "config/magellan.toml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub fn load_config(path: Option<PathBuf>) -> Result<MagellanConfig, ConfigError> {
    let candidate_paths = match path {
        Some(p) => vec![p],
        None => DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .collect::<Vec<PathBuf>>(),
    };

    for candidate in candidate_paths {
        if let Some(config) = try_load_file(&candidate)? {
            return Ok(config);
        }
    }

    Ok(MagellanConfig::default())
}

fn try_load_file(path: &Path) -> Result<Option<MagellanConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: MagellanConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(None).expect("load defaults");
        assert_eq!(config.workflow.slippage_bps, 50);
        assert!(!config.workflow.auto_authorize);
    }

    #[test]
    fn parses_full_template() {
        let template = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/magellan.toml"));
        let config: MagellanConfig = toml::from_str(template).expect("parse template");
        assert!(config.global.rpc_url.starts_with("http"));
        assert!(config.workflow.vault.is_some());
        assert!(config.workflow.redeem_fraction_bps <= 10_000);
    }
}
