use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use classmerge::cache::{CacheIdentifier, CacheStore, MemoryCacheStore};
use classmerge::compose::Composer;
use classmerge::config::{ClassmergeConfig, DEFAULT_CONFIG_FILE};
use classmerge::model::ClassKey;
use classmerge::report::RebuildReport;
use classmerge::parser;

mod format;
mod telemetry;

use format::OutputFormat;

/// Compose extended classes from a base source and ordered override fragments
///
/// Every class key registered in classmerge.toml is rebuilt from the base
/// provider's source plus each override provider's class body, in the
/// configured order. Constructor bodies are merged into one constructor.
/// The merged unit is written to the cache directory; keys without any
/// override are left alone.
///
/// QUICK START:
///
///   classmerge rebuild
///   classmerge show Domain/Model/News
///   classmerge inspect ext/news/Classes/Domain/Model/News.php
///
/// Set CLASSMERGE_TRACE=text (or json) to see what the rebuild does.
#[derive(Parser)]
#[command(name = "classmerge")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(
    after_help = "See 'classmerge <command> --help' for more information on a specific command."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild merged units for every registered class key
    ///
    /// Holds the cache directory's rebuild lock for the whole run. Exits
    /// non-zero on the first missing or malformed source, or after the
    /// batch if any cache write failed.
    Rebuild {
        /// Path to the configuration file
        #[arg(long, short, env = "CLASSMERGE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Compose everything but write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the cached merged unit of a class key
    Show {
        /// Class key, e.g. Domain/Model/News
        class_key: ClassKey,

        /// Path to the configuration file
        #[arg(long, short, env = "CLASSMERGE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Print the class and method boundaries of a source file as JSON
    Inspect {
        /// Source file to inspect
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Rebuild {
            config,
            format,
            dry_run,
        } => rebuild(&config, format, dry_run),
        Commands::Show { class_key, config } => show(&class_key, &config),
        Commands::Inspect { file } => inspect(&file),
    }
}

fn rebuild(config_path: &Path, format: OutputFormat, dry_run: bool) -> Result<()> {
    let config = ClassmergeConfig::load(config_path)?;
    let registry = config.registry()?;

    let report = if dry_run {
        Composer::new(
            registry,
            config.resolver(),
            MemoryCacheStore::new(),
            config.settings(),
        )
        .rebuild()?
    } else {
        let store = config.cache_store();
        let _lock = store.lock()?;
        Composer::new(registry, config.resolver(), &store, config.settings()).rebuild()?
    };

    print_report(&report, format, dry_run)?;

    if let Some(err) = report.first_failure() {
        return Err(err).context("rebuild finished with cache write failures");
    }
    Ok(())
}

fn print_report(report: &RebuildReport, format: OutputFormat, dry_run: bool) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", OutputFormat::to_json(report)?),
        OutputFormat::Text => {
            for key in &report.keys {
                println!("{}: {}", key.class_key, key.outcome);
            }
            let suffix = if dry_run { " (dry run, nothing written)" } else { "" };
            println!(
                "{} written, {} passthrough{suffix}",
                report.written(),
                report.passthrough()
            );
        }
    }
    Ok(())
}

fn show(class_key: &ClassKey, config_path: &Path) -> Result<()> {
    let config = ClassmergeConfig::load(config_path)?;
    let identifier = CacheIdentifier::for_class(&config.cache.identifier_prefix, class_key);
    let text = config
        .cache_store()
        .get(&identifier)
        .with_context(|| format!("no merged unit for `{class_key}`; run `classmerge rebuild`"))?;
    println!("{text}");
    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let info = parser::locate(&text).with_context(|| format!("cannot inspect {}", file.display()))?;
    println!("{}", OutputFormat::to_json(&info)?);
    Ok(())
}
