//! `forge` - import assets from a directory and inspect object tables

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use forge_core::{
    AssetStore, ForgeError, FsStore, ImportOutcome, ImporterRegistry, Pipeline, PipelineConfig,
};
use forge_table::{rewrite, AssetId, ObjectTable};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forge", version, about = "Versioned asset import pipeline")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import the assets under a directory
    Import {
        /// Asset root; sources are `<id>.json` files
        root: PathBuf,
        /// Pipeline config (TOML)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Import only these assets
        #[arg(long = "id", value_name = "ID")]
        ids: Vec<String>,
    },
    /// Check the reference integrity of an object table file
    Verify {
        /// Encoded table
        file: PathBuf,
        /// Also report unreachable records
        #[arg(long)]
        strict: bool,
    },
    /// List importers and their migration steps
    Migrations,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Import { root, config, ids } => {
            let failed = import(root, config, ids).await?;
            if failed > 0 {
                bail!("{failed} assets failed to import");
            }
            Ok(())
        }
        Commands::Verify { file, strict } => verify(&file, strict),
        Commands::Migrations => migrations(),
    }
}

/// Returns the number of assets that failed
async fn import(root: PathBuf, config: Option<PathBuf>, ids: Vec<String>) -> Result<usize, ForgeError> {
    let config = match config {
        Some(path) => PipelineConfig::load(&path)?,
        None => PipelineConfig::default(),
    };
    let store = Arc::new(FsStore::new(root, &config.library_dir));
    let ids: Vec<AssetId> = if ids.is_empty() {
        store.list().await?
    } else {
        ids.into_iter().map(AssetId::from).collect()
    };
    let pipeline = Pipeline::new(store, config)?;

    let mut failed = 0usize;
    for (id, result) in pipeline.import_all(ids).await {
        match result {
            Ok(ImportOutcome::UpToDate) => println!("{id}: up to date"),
            Ok(ImportOutcome::Imported(summary)) => {
                let disconnected = summary.reconcile.as_ref().map_or(0, |r| r.disconnected);
                println!(
                    "{id}: imported by {} ({} migrations, {} instances disconnected)",
                    summary.importer,
                    summary.migrated.len(),
                    disconnected
                );
            }
            Err(err) => {
                failed += 1;
                println!("{id}: FAILED: {err}");
            }
        }
    }
    Ok(failed)
}

fn verify(file: &Path, strict: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let table = ObjectTable::decode(&bytes)?;
    let result = if strict {
        rewrite::verify_strict(&table)
    } else {
        rewrite::verify(&table)
    };
    match result {
        Ok(()) => {
            println!("{}: {} records, ok", file.display(), table.len());
            Ok(())
        }
        Err(problems) => {
            for problem in &problems {
                println!("{problem}");
            }
            bail!("{} integrity problems in {}", problems.len(), file.display())
        }
    }
}

fn migrations() -> anyhow::Result<()> {
    for importer in ImporterRegistry::builtin()?.iter() {
        println!("{} {}", importer.name(), importer.version());
        for version in importer.migrations().versions() {
            println!("  {version}");
        }
    }
    Ok(())
}
