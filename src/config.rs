// Configuration management

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::AppConfig;

/// Environment variable that relocates every file the app touches.
pub const HOME_ENV: &str = "ZIMAGE_HOME";

/// On-disk layout, resolved once at startup and handed to each store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub settings_file: PathBuf,
    pub log_file: PathBuf,
    pub output_dir: PathBuf,
}

impl AppPaths {
    /// Resolve from `ZIMAGE_HOME` if set, else from the platform config and
    /// data directories.
    pub fn resolve() -> Result<Self> {
        if let Some(home) = std::env::var_os(HOME_ENV) {
            return Ok(Self::rooted_at(Path::new(&home)));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("zimage");
        let output_dir = dirs::data_dir()
            .map_or_else(|| config_dir.join("images"), |dir| dir.join("zimage").join("images"));

        Ok(Self::with_dirs(config_dir, output_dir))
    }

    /// Everything under a single directory.
    pub fn rooted_at(root: &Path) -> Self {
        Self::with_dirs(root.to_path_buf(), root.join("images"))
    }

    fn with_dirs(config_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            config_file: config_dir.join("config.toml"),
            settings_file: config_dir.join("settings.json"),
            log_file: config_dir.join("zimage.log"),
            config_dir,
            output_dir,
        }
    }

    /// Apply the `output_dir` override from the loaded config, if any.
    #[must_use]
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        if let Some(dir) = &config.output_dir {
            self.output_dir.clone_from(dir);
        }
        self
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.config_dir).context("Failed to create config directory")?;
        fs::create_dir_all(&self.output_dir).context("Failed to create output directory")?;
        Ok(())
    }
}

pub fn load_config(paths: &AppPaths) -> Result<AppConfig> {
    if !paths.config_file.exists() {
        let default_config = AppConfig::default();
        save_config(paths, &default_config)?;
        return Ok(default_config);
    }

    let contents =
        fs::read_to_string(&paths.config_file).context("Failed to read config file")?;

    let config: AppConfig = toml::from_str(&contents).context("Failed to parse config file")?;

    Ok(config)
}

pub fn save_config(paths: &AppPaths, config: &AppConfig) -> Result<()> {
    fs::create_dir_all(&paths.config_dir).context("Failed to create config directory")?;

    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(&paths.config_file, contents).context("Failed to write config file")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rooted_paths() {
        let paths = AppPaths::rooted_at(Path::new("/tmp/zimage-test"));
        assert_eq!(paths.config_file, Path::new("/tmp/zimage-test/config.toml"));
        assert_eq!(paths.settings_file, Path::new("/tmp/zimage-test/settings.json"));
        assert_eq!(paths.output_dir, Path::new("/tmp/zimage-test/images"));
    }

    #[test]
    fn test_output_dir_override() {
        let paths = AppPaths::rooted_at(Path::new("/tmp/zimage-test"));
        let config = AppConfig {
            output_dir: Some(PathBuf::from("/srv/gallery")),
            ..Default::default()
        };
        let paths = paths.with_config(&config);
        assert_eq!(paths.output_dir, Path::new("/srv/gallery"));
    }

    #[test]
    fn test_load_config_creates_default() {
        let temp_dir = TempDir::new().unwrap();
        let paths = AppPaths::rooted_at(temp_dir.path());

        let config = load_config(&paths);
        assert!(
            config.is_ok(),
            "Config loading failed: {:?}",
            config.as_ref().err()
        );
        assert_eq!(config.unwrap().poll_interval, 2);
        assert!(paths.config_file.exists());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let paths = AppPaths::rooted_at(temp_dir.path());

        let config = AppConfig {
            base_url: "http://custom:8080/v1".to_string(),
            stream_chat: false,
            output_dir: Some(temp_dir.path().join("out")),
            ..Default::default()
        };
        save_config(&paths, &config).unwrap();

        let loaded = load_config(&paths).unwrap();
        assert_eq!(loaded.base_url, "http://custom:8080/v1");
        assert!(!loaded.stream_chat);
        assert_eq!(loaded.output_dir, Some(temp_dir.path().join("out")));
    }

    #[test]
    fn test_load_config_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let paths = AppPaths::rooted_at(temp_dir.path());
        fs::write(&paths.config_file, "base_url = [not toml").unwrap();

        assert!(load_config(&paths).is_err());
    }

    #[test]
    fn test_ensure_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = AppPaths::rooted_at(&temp_dir.path().join("nested"));
        paths.ensure().unwrap();
        assert!(paths.config_dir.is_dir());
        assert!(paths.output_dir.is_dir());
    }
}
