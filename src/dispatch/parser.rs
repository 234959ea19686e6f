//! User supplied file parsers.

use std::path::Path;

use anyhow::{Context, bail};
use async_trait::async_trait;
use tokio::process::Command;

/// Processes one staged file.
///
/// Failures are reported to the dispatch queue, which decides whether to
/// retry. Watchers never see them.
#[async_trait]
pub trait FileParser: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &str;

    async fn parse_file(&self, path: &Path) -> anyhow::Result<()>;
}

/// Logs each file it receives and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogParser;

#[async_trait]
impl FileParser for LogParser {
    fn name(&self) -> &str {
        "log"
    }

    async fn parse_file(&self, path: &Path) -> anyhow::Result<()> {
        crate::log_event!("parser", "received", "{}", path.display());
        Ok(())
    }
}

/// Runs an external program with the staged file path as its last argument.
#[derive(Debug, Clone)]
pub struct CommandParser {
    program: String,
    args: Vec<String>,
}

impl CommandParser {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a full argv, program first. Returns `None` when empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

#[async_trait]
impl FileParser for CommandParser {
    fn name(&self) -> &str {
        &self.program
    }

    async fn parse_file(&self, path: &Path) -> anyhow::Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()
            .await
            .with_context(|| format!("failed to spawn '{}'", self.program))?;

        if !status.success() {
            bail!("'{}' exited with {status} for {}", self.program, path.display());
        }
        Ok(())
    }
}
