//! deployctl - run manifest deploy pipelines against Clouddriver.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clouddriver::{ArtifactFetcher, ClouddriverClient};
use colored::Colorize;
use manifest::{DeployManifestContext, ManifestEvaluator, ManifestServices};
use pipeline::{ExecutionStatus, PipelineRunner};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deployctl::config::ENV_CONFIG_PATH;
use deployctl::{summary, AppConfig, PipelineDefinition, ResolveRequest};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Run manifest deploy pipelines and resolve manifests.
#[derive(Parser)]
#[command(name = "deployctl")]
#[command(about = "Manifest deploy pipelines for Clouddriver")]
#[command(version)]
struct Cli {
    /// Path to deployctl.yaml
    #[arg(long, global = true, env = ENV_CONFIG_PATH)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline definition to completion
    Run {
        /// Pipeline definition file
        pipeline: PathBuf,
    },

    /// Resolve a deploy context and print its manifests as YAML
    Resolve {
        /// File holding `context` (and optionally `application`, `trigger`)
        stage: PathBuf,
    },

    /// Print the effective service configuration
    Config,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run { pipeline } => run_pipeline(&config, &pipeline).await,
        Commands::Resolve { stage } => resolve(&config, &stage).await,
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config.services)?);
            Ok(())
        }
    }
}

async fn run_pipeline(config: &AppConfig, path: &Path) -> Result<()> {
    let definition = PipelineDefinition::load(path)?;
    let mut execution = definition.into_execution();

    let services = ManifestServices::from_config(&config.services, Arc::new(config.dynamic_config()))
        .context("Failed to create service clients")?;
    let runner = PipelineRunner::new(manifest::registry(&services));

    info!(
        execution_id = %execution.id,
        application = %execution.application,
        clouddriver = %config.services.clouddriver_url,
        "Running pipeline"
    );
    let status = runner
        .run(&mut execution)
        .await
        .context("Pipeline could not be scheduled")?;

    summary::print(&execution);
    if status != ExecutionStatus::Succeeded {
        bail!("Pipeline finished with status {status}");
    }
    println!("{}", "Pipeline succeeded".green());
    Ok(())
}

async fn resolve(config: &AppConfig, path: &Path) -> Result<()> {
    let stage = ResolveRequest::load(path)?.into_stage();
    let context: DeployManifestContext = stage
        .context_as()
        .context("Invalid deploy manifest context")?;

    let oort = Arc::new(
        ClouddriverClient::new(&config.services).context("Failed to create Clouddriver client")?,
    );
    let evaluator = ManifestEvaluator::new(ArtifactFetcher::new(oort));
    let evaluated = evaluator.evaluate(&stage, &context).await?;

    info!(manifests = evaluated.manifests.len(), "Resolved manifests");
    for manifest in &evaluated.manifests {
        print!("---\n{}", serde_yaml::to_string(manifest)?);
    }
    Ok(())
}
