use crate::models::EngineConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// File name of the engine configuration inside the config directory
pub const CONFIG_FILE_NAME: &str = "machseq.yaml";

/// Default prefix of environment overrides, e.g. `MACHSEQ_UPLOAD_DIR`
pub const ENV_PREFIX: &str = "MACHSEQ";

/// Configuration manager for loading and saving the engine configuration.
///
/// Values are layered, later sources winning:
/// 1. built-in defaults ([`EngineConfig::default`])
/// 2. `machseq.yaml` in the config directory (optional)
/// 3. environment variables with the `MACHSEQ_` prefix, nested keys separated
///    by `__` (e.g. `MACHSEQ_MOUNT_LIMITS__DEFAULT_MAX=30`)
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            env_prefix: ENV_PREFIX.to_string(),
        })
    }

    /// Use a different environment variable prefix
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_string();
        self
    }

    /// Load the engine configuration.
    ///
    /// # Returns
    /// The layered EngineConfig; defaults fill everything the file and
    /// environment leave out
    pub fn load_config(&self) -> Result<EngineConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let settings = Config::builder()
            .add_source(File::new(self.config_path.as_str(), FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("xml_tags")
                    .with_list_parse_key("mount_limits.baseline_models")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: EngineConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded engine config from {}", self.config_dir);
        Ok(config)
    }

    /// Save the engine configuration file.
    ///
    /// # Arguments
    /// * `config` - The EngineConfig to save
    pub fn save_config(&self, config: &EngineConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved engine config to {}", self.config_path);
        Ok(())
    }

    /// Write the default configuration if no config file exists yet
    pub fn ensure_config_file(&self) -> Result<()> {
        if self.config_path.exists() {
            return Ok(());
        }
        self.save_config(&EngineConfig::default())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the configuration file path.
    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}
