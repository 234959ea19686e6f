use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};

use parsewatch::config::ParserConfig;
use parsewatch::dispatch::{CommandParser, LogParser};
use parsewatch::options::CompiledOptions;
use parsewatch::scanner::DirectoryScanner;
use parsewatch::watcher::checker_for;
use parsewatch::{
    FileParser, JsonWatermarkStore, LocalFileQueue, ParserRegistry, RegistryError, Settings, Ticks,
    WatermarkStore,
};

#[derive(Parser)]
#[command(name = "parsewatch")]
#[command(about = "Poll directories and hand new files to parsers")]
#[command(version)]
struct Cli {
    /// Settings file to use instead of the discovered .parsewatch/settings.toml
    #[arg(short, long, global = true, env = "PARSEWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    Config,

    /// Watch every configured parser until interrupted
    Run,

    /// List the files the next poll of a parser would pick up
    Scan {
        /// Name of the configured parser
        parser: String,
    },

    /// Show stored watermarks
    Watermarks,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            let dir = std::env::current_dir()?;
            Settings::init_config_file(&dir, force).map_err(|e| anyhow!("{e}"))?;
            println!("Edit this file to add [[parsers]] entries.");
            Ok(())
        }
        Commands::Config => {
            let settings = load_settings(cli.config.as_ref())?;
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Run => run(&load_settings(cli.config.as_ref())?).await,
        Commands::Scan { parser } => scan(&load_settings(cli.config.as_ref())?, &parser).await,
        Commands::Watermarks => watermarks(&load_settings(cli.config.as_ref())?).await,
    }
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("Configuration error")?;

    parsewatch::logging::init_with_config(&settings.logging);
    Ok(settings)
}

async fn run(settings: &Settings) -> anyhow::Result<()> {
    if settings.parsers.is_empty() {
        bail!("No parsers configured. Add [[parsers]] entries to the settings file.");
    }

    let store = Arc::new(JsonWatermarkStore::open(settings.state_path())?);
    let queue = Arc::new(LocalFileQueue::new(settings.queue.clone()));
    let registry = ParserRegistry::builder()
        .store(store)
        .queue(queue.clone())
        .build()?;

    for parser in &settings.parsers {
        registry
            .register(parser.variant, parser.options.clone(), build_parser(parser)?)
            .with_context(|| format!("Cannot register '{}'", parser.options.parser_name))?;
    }

    match registry.start_all() {
        Ok(count) => parsewatch::log_event!("parsewatch", "started", "{count} parsers"),
        Err(RegistryError::Bulk { failures }) => {
            for (handle, e) in &failures {
                eprintln!("Failed to start {handle}: {e}");
            }
        }
        Err(e) => return Err(e.into()),
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    eprintln!("Shutting down...");

    registry.shutdown().await;
    queue.drain().await;
    Ok(())
}

async fn scan(settings: &Settings, parser_name: &str) -> anyhow::Result<()> {
    let parser = settings
        .parsers
        .iter()
        .find(|p| p.options.parser_name == parser_name)
        .ok_or_else(|| anyhow!("No parser named '{parser_name}' in the configuration"))?;

    parser.options.validate()?;
    let compiled = CompiledOptions::compile(parser.options.clone())?;

    let store = JsonWatermarkStore::open(settings.state_path())?;
    let watermark = store
        .get(parser.variant, parser_name)
        .await?
        .map(|w| w.last_seen)
        .unwrap_or(Ticks::MIN);

    let checker = checker_for(parser.variant, DirectoryScanner::local());
    let files = checker.find_candidate_files(&compiled, watermark)?;

    println!("{parser_name} ({}) watermark {watermark}", parser.variant);
    if files.is_empty() {
        println!("No new files");
    }
    for file in files {
        println!("  {}  {}", file.timestamp, file.path.display());
    }
    Ok(())
}

async fn watermarks(settings: &Settings) -> anyhow::Result<()> {
    let path = settings.state_path();
    let store = JsonWatermarkStore::open(&path)?;
    let rows = store.list().await?;

    if rows.is_empty() {
        println!("No watermarks stored in {}", path.display());
        return Ok(());
    }

    for row in rows {
        println!("{:<22} {:<14} {}", row.parser_name, row.variant, row.last_seen);
    }
    Ok(())
}

fn build_parser(config: &ParserConfig) -> anyhow::Result<Arc<dyn FileParser>> {
    match &config.command {
        Some(argv) => {
            let parser = CommandParser::from_argv(argv).ok_or_else(|| {
                anyhow!(
                    "Parser '{}' has an empty command",
                    config.options.parser_name
                )
            })?;
            Ok(Arc::new(parser))
        }
        None => Ok(Arc::new(LogParser)),
    }
}
