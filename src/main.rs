//! scm-atlas - SCM/LES diagnostic atlas generator.

use anyhow::{Context, Result};
use clap::Parser;
use scm_atlas::config::AtlasConfig;
use scm_atlas::data::NetcdfProvider;
use scm_atlas::sink::JsonSink;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "scm-atlas")]
#[command(about = "Generate a diagnostic atlas from SCM and LES output", long_about = None)]
struct Args {
    /// Path to the atlas configuration file (JSON)
    config: PathBuf,

    /// Directory the atlas is written to
    #[arg(short, long, default_value = "atlas_out")]
    output: PathBuf,

    /// Enable logging to specified file
    #[arg(long)]
    log: Option<PathBuf>,

    /// Rebuild the output index from a previous run without recomputing
    #[arg(long)]
    no_compute: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging if --log option is provided
    if let Some(log_path) = &args.log {
        let log_path = log_path.clone();
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_writer(move || {
                std::fs::OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&log_path)
                    .expect("Failed to open log file")
            })
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        tracing::info!("Starting scm-atlas");
    }

    let config = AtlasConfig::from_path(&args.config)
        .with_context(|| format!("reading configuration {}", args.config.display()))?;
    let mut atlas = config.build().context("building atlas from configuration")?;

    let indexes = atlas
        .run(&NetcdfProvider, &JsonSink, &args.output, !args.no_compute)
        .with_context(|| format!("running atlas '{}'", atlas.name))?;

    let diagnostics: usize = indexes.values().map(|i| i.len()).sum();
    println!(
        "Atlas '{}': {} diagnostics in {} groups under {}",
        atlas.name,
        diagnostics,
        indexes.len(),
        args.output.display()
    );
    println!("{}", atlas.summary());

    if args.log.is_some() {
        tracing::info!("scm-atlas finished");
    }

    Ok(())
}
