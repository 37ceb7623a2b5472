use anyhow::{Context, Result, anyhow, bail};
use catalog_pipeline::config::PipelineConfig;
use catalog_pipeline::logging::init_logging;
use catalog_pipeline::pipeline::{PipelineRunner, Stage, publish_artifacts};
use catalog_pipeline::storage::MinioStorage;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

const USAGE: &str =
    "usage: catalog-pipeline [all|clean|dedup|fuse|snapshot|aggregate|detect|report] [--config PATH]";

struct Args {
    stage: Option<Stage>,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut stage = None;
    let mut config = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or_else(|| anyhow!("--config needs a path\n{}", USAGE))?;
                config = Some(PathBuf::from(path));
            }
            "all" => stage = None,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => {
                stage = Some(other.parse::<Stage>().with_context(|| USAGE.to_string())?);
            }
        }
    }

    Ok(Args { stage, config })
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = match PipelineConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Flushes the log file when dropped at the end of main.
    let _guard = match init_logging(&config.logging, &config.paths.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config, args.stage).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: PipelineConfig, stage: Option<Stage>) -> Result<()> {
    let publish = config.publish.clone();
    let mut runner = PipelineRunner::new(config).context("Failed to open the relation store")?;

    let summary = match stage {
        None => {
            info!("🚀 Running the full catalog pipeline");
            runner.run_all()
        }
        Some(stage) => {
            info!("🚀 Running stage '{}'", stage);
            runner.run_stage(stage)
        }
    }
    .context("Pipeline run failed")?;

    if !publish.enabled {
        return Ok(());
    }

    let mut publish = publish;
    publish
        .load_credentials()
        .context("Please set the MinIO credentials to publish artifacts")?;
    let sink = MinioStorage::from_config(&publish).context("Failed to initialize MinIO storage")?;

    let keys = publish_artifacts(&sink, &summary.artifacts)
        .await
        .context("Failed to publish artifacts")?;
    if keys.len() != summary.artifacts.len() {
        bail!("Published {} of {} artifacts", keys.len(), summary.artifacts.len());
    }

    info!("✅ Run {} published to bucket '{}'", summary.run_id, sink.get_bucket_name());
    Ok(())
}
