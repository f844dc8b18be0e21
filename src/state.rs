use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::Config;

pub const ENV_SHEET_ID: &str = "GOOGLE_SHEET_ID";
pub const ENV_CREDENTIALS: &str = "GOOGLE_CREDENTIALS";
pub const ENV_CREDENTIALS_PATH: &str = "LEADBOARD_CREDENTIALS_PATH";
pub const ENV_CACHE_TTL_SECS: &str = "LEADBOARD_CACHE_TTL_SECS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "LEADBOARD_FETCH_TIMEOUT_SECS";

pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".leadboard").join("config.json"))
}

/// Load config from ~/.leadboard/config.json, then apply environment overrides.
///
/// A missing file is not an error; defaults apply.
pub fn load_config() -> Result<Config, ConfigError> {
    let mut config = match config_path() {
        Ok(path) => read_config_file(&path)?,
        Err(e) => {
            log::warn!("{}; using default config", e);
            Config::default()
        }
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Read a config file. Missing file yields defaults.
pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Overlay environment variables onto `config`.
///
/// Blank values are ignored. Unparseable numbers are logged and ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(id) = var(ENV_SHEET_ID) {
        config.sheet_id = id.trim().to_string();
    }
    if let Some(raw) = var(ENV_CREDENTIALS) {
        config.credentials_json = Some(raw);
    }
    if let Some(path) = var(ENV_CREDENTIALS_PATH) {
        config.credentials_path = Some(path.trim().to_string());
    }
    if let Some(secs) = var(ENV_CACHE_TTL_SECS).and_then(|v| parse_secs(ENV_CACHE_TTL_SECS, &v)) {
        config.cache_ttl_secs = secs;
    }
    if let Some(secs) =
        var(ENV_FETCH_TIMEOUT_SECS).and_then(|v| parse_secs(ENV_FETCH_TIMEOUT_SECS, &v))
    {
        config.fetch_timeout_secs = secs;
    }
}

fn parse_secs(key: &str, value: &str) -> Option<u64> {
    match value.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(e) => {
            log::warn!("Ignoring {}={:?}: {}", key, value, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_SHEET_ID;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config_file(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.sheet_id, DEFAULT_SHEET_ID);
    }

    #[test]
    fn test_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"sheetId": "from-file", "fetchTimeoutSecs": 5}"#)
            .unwrap();
        let config = read_config_file(file.path()).unwrap();
        assert_eq!(config.sheet_id, "from-file");
        assert_eq!(config.fetch_timeout_secs, 5);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let err = read_config_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config {
            sheet_id: "from-file".to_string(),
            ..Config::default()
        };
        apply_env_overrides(
            &mut config,
            env(&[
                (ENV_SHEET_ID, " from-env "),
                (ENV_CREDENTIALS, r#"{"token": "ya29.x"}"#),
                (ENV_CACHE_TTL_SECS, "120"),
            ]),
        );
        assert_eq!(config.sheet_id, "from-env");
        assert_eq!(config.credentials_json.as_deref(), Some(r#"{"token": "ya29.x"}"#));
        assert_eq!(config.cache_ttl_secs, 120);
        assert_eq!(config.fetch_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_and_blank_env_ignored() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            env(&[
                (ENV_SHEET_ID, "   "),
                (ENV_CACHE_TTL_SECS, "soon"),
                (ENV_FETCH_TIMEOUT_SECS, "-1"),
            ]),
        );
        assert_eq!(config.sheet_id, DEFAULT_SHEET_ID);
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.fetch_timeout_secs, 30);
    }
}
