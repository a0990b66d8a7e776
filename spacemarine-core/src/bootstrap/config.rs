//! Configuration loading

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::Config;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SPACEMARINE_CONFIG_PATH";

/// Load configuration from a config file or environment variables
///
/// Config file search order:
/// 1. `cli_path` (the `--config` flag); it must exist and parse
/// 2. `SPACEMARINE_CONFIG_PATH`
/// 3. ./config.yaml
/// 4. Fall back to environment variables only
pub fn load_config(cli_path: Option<&str>) -> Result<Config> {
    let config = if let Some(path) = cli_path {
        if !Path::new(path).exists() {
            return Err(anyhow::anyhow!("Config file {path} does not exist"));
        }
        eprintln!("Loading config from {path}");
        Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?
    } else {
        let discovered = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| Path::new(p).exists())
            .or_else(|| {
                let cwd = "config.yaml";
                Path::new(cwd).exists().then(|| cwd.to_string())
            });

        match discovered {
            Some(path) => {
                eprintln!("Loading config from {path}");
                Config::from_file(&path).unwrap_or_else(|e| {
                    eprintln!("Failed to load {path}: {e}");
                    eprintln!("Falling back to environment variables");
                    Config::from_env().unwrap_or_default()
                })
            }
            None => {
                eprintln!("No config file found, using environment variables");
                Config::from_env().unwrap_or_else(|e| {
                    eprintln!("Failed to load config: {e}");
                    eprintln!("Using default configuration");
                    Config::default()
                })
            }
        }
    };

    // Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for error in &errors {
            tracing::error!("Config validation error: {}", error);
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_cli_path_is_an_error() {
        let err = load_config(Some("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "server:\n  http_port: 0").unwrap();

        let err = load_config(file.path().to_str()).unwrap_err();
        assert!(err.to_string().contains("validation failed"));
    }
}
