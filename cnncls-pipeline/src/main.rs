//! cnncls-pipeline - Training pipeline runner
//!
//! Runs data ingestion, base model preparation, training and evaluation in
//! order, or a single stage with `--stage`.

use anyhow::{Context, Result};
use clap::Parser;
use cnncls_common::config::{CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE, DEFAULT_PARAMS_FILE, PARAMS_ENV_VAR};
use cnncls_common::logging::{LoggingConfig, LoggingContext};
use cnncls_common::ConfigResolver;
use cnncls_pipeline::{Collaborators, Pipeline, StageName};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cnncls-pipeline")]
#[command(about = "Train and evaluate the CT-scan image classifier")]
#[command(version)]
struct Args {
    /// Structural configuration document (YAML or TOML)
    #[arg(long, env = CONFIG_ENV_VAR, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Parameter document (YAML or TOML)
    #[arg(long, env = PARAMS_ENV_VAR, default_value = DEFAULT_PARAMS_FILE)]
    params: PathBuf,

    /// Run only this stage
    #[arg(long)]
    stage: Option<StageName>,

    /// Print the stage order and exit
    #[arg(long)]
    list_stages: bool,

    /// Directory for running_logs.log
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_stages {
        for (i, stage) in StageName::ALL.iter().enumerate() {
            println!("{}. {} ({})", i + 1, stage, stage.label());
        }
        return Ok(());
    }

    let _logging = LoggingContext::init(&LoggingConfig {
        log_dir: args.log_dir.clone(),
        ..LoggingConfig::default()
    })?;

    info!("Starting cnncls-pipeline v{}", env!("CARGO_PKG_VERSION"));
    info!(config = %args.config.display(), params = %args.params.display(), "Configuration sources");

    let resolver = ConfigResolver::new(&args.config, &args.params)
        .context("Failed to load pipeline configuration")?;
    let pipeline = Pipeline::standard(Collaborators::production()?);

    match args.stage {
        Some(stage) => pipeline
            .run_stage(stage, &resolver)
            .with_context(|| format!("Stage {} failed", stage))?,
        None => pipeline.run(&resolver).context("Pipeline failed")?,
    }

    Ok(())
}
