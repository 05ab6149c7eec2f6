//! Command-line parsing and subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use repovault_protocol::FileEntry;
use repovault_transfer::GzipCodec;
use repovault_vault::{Phase, ProgressEvent, Vault};

use crate::config::{self, Config, Overrides, TOKEN_ENV};

/// Store large files in a GitHub repository as compressed chunks.
#[derive(Debug, Parser)]
#[command(name = "repovault", version, about)]
pub struct Cli {
    /// Repository owner.
    #[arg(long, global = true)]
    pub owner: Option<String>,

    /// Repository name.
    #[arg(long, global = true)]
    pub repo: Option<String>,

    /// Branch holding the files.
    #[arg(long, global = true)]
    pub branch: Option<String>,

    /// Access token (overrides REPOVAULT_TOKEN and the config file).
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Configuration file to use instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Do not print progress.
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write the repository settings given as flags to the config file.
    Init,
    /// Compress, chunk and upload a file.
    Upload {
        file: PathBuf,
        /// Name to register the file under (default: the file name).
        #[arg(long)]
        name: Option<String>,
    },
    /// Download a file and restore it.
    Download {
        name: String,
        /// Output path (default: the file name in the current directory).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List stored files.
    List {
        /// Print the entries as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete a file's chunks, metadata and registry entry.
    Delete { name: String },
    /// Show totals over every stored file.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

/// Runs the parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config::config_path()?,
    };
    let mut config = Config::load_from(&path)?;
    let token_flag = cli.token.is_some();
    config.apply(Overrides {
        owner: cli.owner,
        repo: cli.repo,
        branch: cli.branch,
        token: cli.token,
    });

    if let Command::Init = cli.command {
        config.save_to(&path)?;
        println!("configuration written to {}", path.display());
        return Ok(());
    }

    let env_token = if token_flag {
        None
    } else {
        std::env::var(TOKEN_ENV).ok()
    };
    let vault = Vault::builder(config.settings(env_token))
        .config(config.vault_config())
        .codec(Arc::new(GzipCodec::default()))
        .build()
        .context("could not open the vault (run `repovault init --owner .. --repo ..`)")?;

    if !cli.quiet {
        vault.on_progress(Box::new(print_progress));
    }

    match cli.command {
        Command::Init => Ok(()),
        Command::Upload { file, name } => {
            let entry = match name {
                Some(name) => {
                    let data = tokio::fs::read(&file)
                        .await
                        .with_context(|| format!("reading {}", file.display()))?;
                    vault.upload(&name, data).await?
                }
                None => vault.upload_file(&file).await?,
            };
            println!(
                "uploaded {} ({} -> {} bytes, {}% saved, {} chunks)",
                entry.name,
                entry.original_size,
                entry.compressed_size,
                entry.compression_ratio,
                entry.chunk_count
            );
            Ok(())
        }
        Command::Download { name, output } => {
            let dest = match output {
                Some(path) => path,
                None => default_destination(&name)?,
            };
            let bytes = vault.download_to(&name, &dest).await?;
            println!("downloaded {name} to {} ({bytes} bytes)", dest.display());
            Ok(())
        }
        Command::List { json } => {
            let files = vault.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                print_table(&files);
            }
            Ok(())
        }
        Command::Delete { name } => {
            let report = vault.delete(&name).await?;
            if !report.found {
                println!("{name} is not stored");
            } else if let Some(other) = &report.shared_with {
                println!("removed {name} from the registry; objects kept for {other}");
            } else if report.is_complete() {
                println!("deleted {name} ({} objects)", report.removed.len());
            } else {
                for failure in &report.failed {
                    eprintln!("  {}: {}", failure.path, failure.error);
                }
                anyhow::bail!(
                    "{} objects of {name} could not be deleted; run delete again",
                    report.failed.len()
                );
            }
            Ok(())
        }
        Command::Stats { json } => {
            let stats = vault.stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("files:       {}", stats.file_count);
                println!("original:    {} bytes", stats.total_original_size);
                println!("compressed:  {} bytes", stats.total_compressed_size);
                println!("saved:       {}%", stats.compression_ratio);
                println!("chunks:      {}", stats.total_chunks);
                for (category, count) in &stats.by_category {
                    println!("  {category:<12}{count}");
                }
            }
            Ok(())
        }
    }
}

/// Where a download lands without `--output`: the last component of the
/// stored name, in the current directory.
fn default_destination(name: &str) -> anyhow::Result<PathBuf> {
    Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .with_context(|| format!("{name} has no file name; pass --output"))
}

fn print_progress(ev: ProgressEvent) {
    let label = match ev.phase {
        Phase::Upload(state) => format!("{state:?}"),
        Phase::Download(state) => format!("{state:?}"),
        Phase::Delete => "Deleting".to_string(),
    };
    eprintln!("{} [{label}] {:.0}%", ev.file, ev.percentage);
}

fn print_table(files: &[FileEntry]) {
    if files.is_empty() {
        println!("no files stored");
        return;
    }
    println!(
        "{:<32} {:<11} {:>14} {:>14} {:>7} {:>6}",
        "NAME", "CATEGORY", "ORIGINAL", "COMPRESSED", "SAVED", "CHUNKS"
    );
    for f in files {
        println!(
            "{:<32} {:<11} {:>14} {:>14} {:>6}% {:>6}",
            f.name, f.category, f.original_size, f.compressed_size, f.compression_ratio, f.chunk_count
        );
    }
}
