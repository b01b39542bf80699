//! Init command implementation

use crate::config::{Config, PathsConfig};
use crate::error::{Error, Result};
use crate::records::RecordStore;
use std::path::PathBuf;
use tracing::info;

/// Initialize ragsync configuration and database
pub async fn cmd_init(config_path: Option<PathBuf>, force: bool) -> Result<Config> {
    let mut config = Config::default();
    if let Some(path) = config_path {
        config.paths.base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathsConfig::default().base_dir);
        config.paths.db_file = config.paths.base_dir.join("records.db");
        config.paths.config_file = path;
    }

    if config.paths.config_file.exists() && !force {
        return Err(Error::AlreadyInitialized(
            config.paths.config_file.display().to_string(),
        ));
    }

    config.save()?;
    info!("Wrote config to {:?}", config.paths.config_file);

    let records = RecordStore::connect(&config).await?;
    records.init_schema().await?;

    Ok(config)
}

/// Print init outcome to console
pub fn print_init(config: &Config) {
    println!("Initialized ragsync");
    println!("  Config: {}", config.paths.config_file.display());
    println!("  Database: {}", config.paths.db_file.display());
    println!("  Qdrant: {}", config.vector.url);
    println!("\nNext: start a worker with 'ragsync worker'");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_config_and_schema() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        let config = cmd_init(Some(config_path.clone()), false).await.unwrap();
        assert!(config_path.exists());
        assert!(config.paths.db_file.exists());

        let records = RecordStore::connect(&config).await.unwrap();
        assert!(records.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        cmd_init(Some(config_path.clone()), false).await.unwrap();
        let err = cmd_init(Some(config_path.clone()), false).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized(_)));

        // --force replaces the existing config
        cmd_init(Some(config_path), true).await.unwrap();
    }
}
