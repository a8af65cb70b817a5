//! Configuration loading

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::Config;

const CONFIG_PATH_ENV: &str = "GLACIER_CONFIG_PATH";
const CWD_CONFIG: &str = "config.yaml";
const MOUNTED_CONFIG: &str = "/config/config.yaml";

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. `explicit` (from the command line), then the `GLACIER_CONFIG_PATH` environment variable
/// 2. ./config.yaml (current working directory)
/// 3. /config/config.yaml (container mount path)
/// 4. Fall back to environment variables only
///
/// An explicitly named file that does not exist is an error.
pub fn load_config(explicit: Option<&str>) -> Result<Config> {
    let config_path = resolve_config_path(explicit)?;

    let config = match &config_path {
        Some(path) => {
            eprintln!("Loading config from {path}");
            Config::from_file(path).with_context(|| format!("Failed to load {path}"))?
        }
        None => {
            eprintln!("No config file found, using environment variables");
            Config::from_env().context("Failed to load configuration from environment")?
        }
    };

    // fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!("Configuration loaded and validated successfully");
    info!("HTTP address: {}", config.http_address());

    Ok(config)
}

fn resolve_config_path(explicit: Option<&str>) -> Result<Option<String>> {
    let requested = explicit
        .map(str::to_string)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .filter(|p| !p.trim().is_empty());

    if let Some(path) = requested {
        if !Path::new(&path).exists() {
            anyhow::bail!("Config file {path} does not exist");
        }
        return Ok(Some(path));
    }

    Ok([CWD_CONFIG, MOUNTED_CONFIG]
        .into_iter()
        .find(|p| Path::new(p).exists())
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = load_config(Some("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_explicit_file_is_loaded_and_validated() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "mastodon:\n  instance: social.example\n  handle: '@bot@social.example'\nglacier:\n  domain: walls.example\n"
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.glacier.domain, "walls.example");
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "mastodon:\n  instance: social.example\n").unwrap();

        let err = load_config(file.path().to_str()).unwrap_err();
        assert!(err.to_string().contains("validation failed"));
    }
}
