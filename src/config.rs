//! Configuration for the parsewatch daemon.
//!
//! Settings are layered:
//! - Default values
//! - TOML configuration file (`.parsewatch/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `PW_` and use double underscores
//! to separate nested levels:
//! - `PW_QUEUE__MAX_ATTEMPTS=5` sets `queue.max_attempts`
//! - `PW_STORAGE__STATE_PATH=/var/lib/parsewatch/state.json` sets `storage.state_path`
//! - `PW_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::options::WatcherOptions;
use crate::types::WatcherVariant;

const CONFIG_DIR: &str = ".parsewatch";
const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .parsewatch is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    /// One entry per watched parser
    #[serde(default)]
    pub parsers: Vec<ParserConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Level applied to every target without an override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `"parsewatch::dispatch" = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Watermark file. Relative paths resolve against the workspace root.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueueConfig {
    /// Attempts per chain step before the file is given up on
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts of the same step
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Files processed at the same time across all parsers
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// How long a source file must stay unchanged before it is staged
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    pub variant: WatcherVariant,

    #[serde(flatten)]
    pub options: WatcherOptions,

    /// Program and arguments run for each file; the staged path is appended.
    /// Files are only logged when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_state_path() -> PathBuf {
    PathBuf::from(".parsewatch/watermarks.json")
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_max_concurrent_files() -> usize {
    4
}
fn default_settle_delay_ms() -> u64 {
    500
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
            queue: QueueConfig::default(),
            parsers: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directive built from the default level and overrides.
    pub fn filter_directive(&self) -> String {
        let mut filter = self.default.clone();
        for (module, level) in &self.modules {
            filter.push_str(&format!(",{module}={level}"));
        }
        filter
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_concurrent_files: default_max_concurrent_files(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

/// Commented example appended to freshly initialised settings files.
const PARSER_EXAMPLE: &str = r#"
# Add one [[parsers]] table per watched parser:
#
# [[parsers]]
# variant = "write-time"              # or "creation-time"
# parser_name = "invoices"
# directory_to_watch = "/data/incoming"
# file_search_pattern = '^invoice_.*\.csv$'
# subdirectory_search_pattern = '^2024'  # optional
# check_main_directory = false           # needs subdirectory_search_pattern
# polling_interval_ms = 5000             # at least 5000
# working_directory_path = "/data/work"
# backup_directory_path = "/data/backup"
# delete_source_file_after_parsing = false
# command = ["python3", "import_invoice.py"]  # optional, path is appended
"#;

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed("PW_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find `.parsewatch/settings.toml` from the current directory upwards
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .parsewatch is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Watermark file path with relative paths resolved against the
    /// workspace root.
    pub fn state_path(&self) -> PathBuf {
        match &self.workspace_root {
            Some(root) if self.storage.state_path.is_relative() => {
                root.join(&self.storage.state_path)
            }
            _ => self.storage.state_path.clone(),
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in `.parsewatch/` under `dir`
    pub fn init_config_file(dir: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = dir.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let existed = config_path.exists();
        Settings::default().save(&config_path)?;

        let mut contents = std::fs::read_to_string(&config_path)?;
        contents.push_str(PARSER_EXAMPLE);
        std::fs::write(&config_path, contents)?;

        if existed {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!("Created default configuration at: {}", config_path.display());
        }

        Ok(config_path)
    }
}
