/// Optional user configuration: the folder background images are usually picked from.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "Paths.json";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub default_folder: Option<PathBuf>,
}

impl AppConfig {
    /// Load from a JSON file. A missing file is not an error: it logs a
    /// warning and yields the empty configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "Configuration {} not found, falling back to the working directory",
                    path.display()
                );
                return Ok(AppConfig::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        let mut config: AppConfig = serde_json::from_str(&text)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        if config
            .default_folder
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            config.default_folder = None;
        }
        Ok(config)
    }

    /// Folder a file picker should open in.
    pub fn initial_folder(&self) -> PathBuf {
        self.default_folder
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a user-supplied path. Relative paths that do not exist as
    /// given are looked up in the default folder.
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        match &self.default_folder {
            Some(folder) => folder.join(path),
            None => path.to_path_buf(),
        }
    }
}
