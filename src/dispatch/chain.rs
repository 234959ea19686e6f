//! The ordered per-file pipeline handed to a dispatch queue.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use uuid::Uuid;

use super::{DispatchError, FileParser};
use crate::options::WatcherOptions;
use crate::types::FileDescriptor;

/// Describes how every file discovered for one parser is processed.
#[derive(Clone)]
pub struct ProcessingChain {
    pub parser_name: String,
    pub working_directory: PathBuf,
    pub backup_directory: PathBuf,
    pub delete_source: bool,
    pub parser: Arc<dyn FileParser>,
}

impl fmt::Debug for ProcessingChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingChain")
            .field("parser_name", &self.parser_name)
            .field("working_directory", &self.working_directory)
            .field("backup_directory", &self.backup_directory)
            .field("delete_source", &self.delete_source)
            .field("parser", &self.parser.name())
            .finish()
    }
}

/// One step of a file's pipeline. Steps run in order and a failed step
/// stops the ones after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStep {
    /// Copy the source file into a fresh working folder once it has stopped
    /// changing.
    Stage {
        source: PathBuf,
        destination_dir: PathBuf,
    },
    /// Run the parser on the working copy.
    Parse { path: PathBuf },
    /// Copy the working copy into the dated backup folder.
    Backup {
        source: PathBuf,
        destination_dir: PathBuf,
    },
    /// Remove the working folder.
    Cleanup { directory: PathBuf },
    /// Remove the original source file.
    DeleteSource { path: PathBuf },
}

impl ProcessingChain {
    pub fn from_options(options: &WatcherOptions, parser: Arc<dyn FileParser>) -> Self {
        Self {
            parser_name: options.parser_name.clone(),
            working_directory: options.working_directory_path.clone(),
            backup_directory: options.backup_directory_path.clone(),
            delete_source: options.delete_source_file_after_parsing,
            parser,
        }
    }

    /// Steps for a single file.
    ///
    /// The working folder is `<working>/<job_id>`, the backup folder
    /// `<backup>/<YYYY>/<Month>` for `date`.
    pub fn plan(&self, file: &FileDescriptor, job_id: Uuid, date: NaiveDate) -> Vec<ChainStep> {
        let working_dir = self.working_directory.join(job_id.to_string());
        let working_file = working_dir.join(&file.name);
        let backup_dir = self
            .backup_directory
            .join(date.format("%Y").to_string())
            .join(date.format("%B").to_string());

        let mut steps = vec![
            ChainStep::Stage {
                source: file.path.clone(),
                destination_dir: working_dir.clone(),
            },
            ChainStep::Parse {
                path: working_file.clone(),
            },
            ChainStep::Backup {
                source: working_file,
                destination_dir: backup_dir,
            },
            ChainStep::Cleanup {
                directory: working_dir,
            },
        ];

        if self.delete_source {
            steps.push(ChainStep::DeleteSource {
                path: file.path.clone(),
            });
        }

        steps
    }
}

impl ChainStep {
    pub fn name(&self) -> &'static str {
        match self {
            ChainStep::Stage { .. } => "stage",
            ChainStep::Parse { .. } => "parse",
            ChainStep::Backup { .. } => "backup",
            ChainStep::Cleanup { .. } => "cleanup",
            ChainStep::DeleteSource { .. } => "delete-source",
        }
    }

    /// The path this step operates on, for error reporting.
    pub fn subject(&self) -> &Path {
        match self {
            ChainStep::Stage { source, .. } | ChainStep::Backup { source, .. } => source,
            ChainStep::Parse { path } | ChainStep::DeleteSource { path } => path,
            ChainStep::Cleanup { directory } => directory,
        }
    }

    /// Run the step. `settle` is how long a source must stay unchanged
    /// before `Stage` copies it; zero skips the wait.
    pub async fn execute(
        &self,
        parser: &dyn FileParser,
        settle: Duration,
    ) -> Result<(), DispatchError> {
        let result = match self {
            ChainStep::Stage {
                source,
                destination_dir,
            } => stage(source, destination_dir, settle).await,
            ChainStep::Backup {
                source,
                destination_dir,
            } => copy_into(source, destination_dir).await.map(|_| ()),
            ChainStep::Parse { path } => parser.parse_file(path).await.map_err(|e| format!("{e:#}")),
            ChainStep::Cleanup { directory } => tokio::fs::remove_dir_all(directory)
                .await
                .map_err(|e| e.to_string()),
            ChainStep::DeleteSource { path } => tokio::fs::remove_file(path)
                .await
                .map_err(|e| e.to_string()),
        };

        result.map_err(|reason| DispatchError::StepFailed {
            step: self.name(),
            path: self.subject().to_path_buf(),
            reason,
        })
    }
}

/// Size and write time of a file, compared across the settle window.
#[derive(Debug, PartialEq, Eq)]
struct FileState {
    len: u64,
    modified: Option<SystemTime>,
}

async fn file_state(path: &Path) -> Result<FileState, String> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| e.to_string())?;
    Ok(FileState {
        len: metadata.len(),
        modified: metadata.modified().ok(),
    })
}

/// Copy `source` once it is quiet. A file still being written fails the
/// step, so the queue's retry gives the writer more time.
async fn stage(source: &Path, destination_dir: &Path, settle: Duration) -> Result<(), String> {
    let before = file_state(source).await?;

    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
        if file_state(source).await? != before {
            return Err(format!("{} is still being written", source.display()));
        }
    }

    let copied = copy_into(source, destination_dir).await?;
    if copied < before.len {
        return Err(format!(
            "short copy of {}: {copied} of {} bytes",
            source.display(),
            before.len
        ));
    }
    Ok(())
}

async fn copy_into(source: &Path, destination_dir: &Path) -> Result<u64, String> {
    let file_name = source
        .file_name()
        .ok_or_else(|| format!("{} has no file name", source.display()))?;

    tokio::fs::create_dir_all(destination_dir)
        .await
        .map_err(|e| e.to_string())?;
    tokio::fs::copy(source, destination_dir.join(file_name))
        .await
        .map_err(|e| e.to_string())
}
