//! Watcher configuration and the rules it must satisfy before registration.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest polling interval a watcher accepts.
pub const MIN_POLLING_INTERVAL_MS: u64 = 5_000;

const PARSER_NAME_MIN_LEN: usize = 3;
const PARSER_NAME_MAX_LEN: usize = 20;

/// Configuration for a single watched parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherOptions {
    /// Unique human readable name; also keys the watermark.
    pub parser_name: String,

    /// Root directory to poll.
    pub directory_to_watch: PathBuf,

    /// Regex matched against file base names.
    pub file_search_pattern: String,

    /// Regex matched against immediate subdirectory names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdirectory_search_pattern: Option<String>,

    /// Also scan the root when a subdirectory pattern is set.
    #[serde(default)]
    pub check_main_directory: bool,

    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,

    /// Files are copied here before they are parsed.
    pub working_directory_path: PathBuf,

    /// Files are copied here after they are parsed.
    pub backup_directory_path: PathBuf,

    #[serde(default)]
    pub delete_source_file_after_parsing: bool,
}

fn default_polling_interval_ms() -> u64 {
    MIN_POLLING_INTERVAL_MS
}

/// First rule a set of options violates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Parser name must not be empty")]
    ParserNameEmpty,

    #[error("Parser name must be between 3 and 20 characters, got {len}")]
    ParserNameLength { len: usize },

    #[error("Directory to watch must not be empty")]
    DirectoryEmpty,

    #[error("File search pattern must not be empty")]
    FilePatternEmpty,

    #[error("Invalid {field}: {reason}")]
    InvalidPattern { field: &'static str, reason: String },

    #[error("Minimal polling interval is 5 seconds, got {interval_ms}ms")]
    PollingIntervalTooShort { interval_ms: u64 },

    #[error("Working directory path must not be empty")]
    WorkingDirectoryEmpty,

    #[error("Backup directory path must not be empty")]
    BackupDirectoryEmpty,

    #[error("check_main_directory requires a subdirectory search pattern")]
    MainDirectoryWithoutSubdirectories,
}

/// The (directory, file pattern, subdirectory pattern) triple that must be
/// unique among registered parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchIdentity<'a> {
    pub directory: &'a Path,
    pub file_pattern: &'a str,
    pub subdirectory_pattern: Option<&'a str>,
}

impl WatcherOptions {
    /// Create options with the required fields and defaults for the rest.
    pub fn new(
        parser_name: impl Into<String>,
        directory_to_watch: impl Into<PathBuf>,
        file_search_pattern: impl Into<String>,
        working_directory_path: impl Into<PathBuf>,
        backup_directory_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            parser_name: parser_name.into(),
            directory_to_watch: directory_to_watch.into(),
            file_search_pattern: file_search_pattern.into(),
            subdirectory_search_pattern: None,
            check_main_directory: false,
            polling_interval_ms: default_polling_interval_ms(),
            working_directory_path: working_directory_path.into(),
            backup_directory_path: backup_directory_path.into(),
            delete_source_file_after_parsing: false,
        }
    }

    pub fn with_subdirectory_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.subdirectory_search_pattern = Some(pattern.into());
        self
    }

    pub fn with_check_main_directory(mut self, check: bool) -> Self {
        self.check_main_directory = check;
        self
    }

    pub fn with_polling_interval_ms(mut self, interval_ms: u64) -> Self {
        self.polling_interval_ms = interval_ms;
        self
    }

    pub fn with_delete_source(mut self, delete: bool) -> Self {
        self.delete_source_file_after_parsing = delete;
        self
    }

    /// The subdirectory pattern, treating a blank string as unset.
    pub fn subdirectory_pattern(&self) -> Option<&str> {
        self.subdirectory_search_pattern
            .as_deref()
            .filter(|p| !p.trim().is_empty())
    }

    /// Whether files directly inside the root directory are scanned.
    ///
    /// The root is always scanned unless a subdirectory pattern is set and
    /// `check_main_directory` is false.
    pub fn scans_main_directory(&self) -> bool {
        self.subdirectory_pattern().is_none() || self.check_main_directory
    }

    pub fn identity(&self) -> WatchIdentity<'_> {
        WatchIdentity {
            directory: &self.directory_to_watch,
            file_pattern: &self.file_search_pattern,
            subdirectory_pattern: self.subdirectory_pattern(),
        }
    }

    /// Check every rule in order, returning the first one violated.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let name_len = self.parser_name.chars().count();
        if name_len == 0 {
            return Err(ValidationError::ParserNameEmpty);
        }
        if !(PARSER_NAME_MIN_LEN..=PARSER_NAME_MAX_LEN).contains(&name_len) {
            return Err(ValidationError::ParserNameLength { len: name_len });
        }

        if self.directory_to_watch.as_os_str().is_empty() {
            return Err(ValidationError::DirectoryEmpty);
        }

        if self.file_search_pattern.is_empty() {
            return Err(ValidationError::FilePatternEmpty);
        }
        compile_pattern("file_search_pattern", &self.file_search_pattern)?;
        if let Some(pattern) = self.subdirectory_pattern() {
            compile_pattern("subdirectory_search_pattern", pattern)?;
        }

        if self.polling_interval_ms < MIN_POLLING_INTERVAL_MS {
            return Err(ValidationError::PollingIntervalTooShort {
                interval_ms: self.polling_interval_ms,
            });
        }

        if self.working_directory_path.as_os_str().is_empty() {
            return Err(ValidationError::WorkingDirectoryEmpty);
        }

        if self.backup_directory_path.as_os_str().is_empty() {
            return Err(ValidationError::BackupDirectoryEmpty);
        }

        if self.check_main_directory && self.subdirectory_pattern().is_none() {
            return Err(ValidationError::MainDirectoryWithoutSubdirectories);
        }

        Ok(())
    }
}

fn compile_pattern(field: &'static str, pattern: &str) -> Result<Regex, ValidationError> {
    Regex::new(pattern).map_err(|e| ValidationError::InvalidPattern {
        field,
        reason: e.to_string(),
    })
}

/// Options paired with their compiled patterns.
///
/// Built once when options are bound to a watcher so that polls never
/// recompile or fail on a bad pattern.
#[derive(Debug, Clone)]
pub struct CompiledOptions {
    options: WatcherOptions,
    file_pattern: Regex,
    subdirectory_pattern: Option<Regex>,
}

impl CompiledOptions {
    pub fn compile(options: WatcherOptions) -> Result<Self, ValidationError> {
        let file_pattern = compile_pattern("file_search_pattern", &options.file_search_pattern)?;
        let subdirectory_pattern = options
            .subdirectory_pattern()
            .map(|p| compile_pattern("subdirectory_search_pattern", p))
            .transpose()?;

        Ok(Self {
            options,
            file_pattern,
            subdirectory_pattern,
        })
    }

    pub fn options(&self) -> &WatcherOptions {
        &self.options
    }

    pub fn parser_name(&self) -> &str {
        &self.options.parser_name
    }

    pub fn file_pattern(&self) -> &Regex {
        &self.file_pattern
    }

    pub fn subdirectory_pattern(&self) -> Option<&Regex> {
        self.subdirectory_pattern.as_ref()
    }
}
