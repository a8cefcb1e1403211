use anyhow::{Context, Result};
use common::PipelineRequest;
use data_ingestion::FixtureConnector;
use research_agents::StaticSuggester;
use signal_generation::{DecisionPipeline, PipelineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_help() {
    eprintln!(
        r#"decider - fuse technical, sentiment and social signals into a trading decision

USAGE:
    decider --request <PATH> --data <PATH> [OPTIONS]

OPTIONS:
    --request <PATH>    Request JSON ({{"crypto": "SOL", "start_date": ..., "portfolio": ...}})
    --data <PATH>       Recorded market data JSON served to every stage
    --config <PATH>     Pipeline configuration (TOML, YAML or JSON)
    --advice <PATH>     Canned suggester answer attached as an advisory
    --sentiment-feed    Use the data file's sentiment blob instead of long/short positioning
    --help              Print this help message

ENVIRONMENT VARIABLES:
    DECIDER_NEUTRAL_THRESHOLD       Override any config key, nested with "__"
    DECIDER_WEIGHTS__TECHNICAL      e.g. weight of the technical branch
    RUST_LOG                        Log level filter

EXAMPLES:
    decider --request demos/request.json --data demos/market.json
    decider --request demos/request.json --data demos/market.json --config demos/decider.toml
"#
    );
}

fn next_path(args: &[String], i: &mut usize, flag: &str) -> PathBuf {
    *i += 1;
    if *i >= args.len() {
        eprintln!("Error: {} requires a path argument", flag);
        std::process::exit(1);
    }
    PathBuf::from(&args[*i])
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signal_generation=info,research_agents=info,data_ingestion=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut request_path: Option<PathBuf> = None;
    let mut data_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut advice_path: Option<PathBuf> = None;
    let mut sentiment_feed = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--request" | "-r" => request_path = Some(next_path(&args, &mut i, "--request")),
            "--data" | "-d" => data_path = Some(next_path(&args, &mut i, "--data")),
            "--config" | "-c" => config_path = Some(next_path(&args, &mut i, "--config")),
            "--advice" => advice_path = Some(next_path(&args, &mut i, "--advice")),
            "--sentiment-feed" => sentiment_feed = true,
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let (Some(request_path), Some(data_path)) = (request_path, data_path) else {
        eprintln!("Error: --request and --data are required");
        print_help();
        std::process::exit(1);
    };

    let config = PipelineConfig::load(config_path.as_deref()).context("Failed to load pipeline configuration")?;

    let raw_request = std::fs::read_to_string(&request_path)
        .with_context(|| format!("Failed to read request {}", request_path.display()))?;
    let request: PipelineRequest = serde_json::from_str(&raw_request)
        .with_context(|| format!("Failed to parse request {}", request_path.display()))?;

    info!(request = %request_path.display(), data = %data_path.display(), "Running pipeline");
    let connector = Arc::new(FixtureConnector::from_path(&data_path)?);
    let mut pipeline = DecisionPipeline::new(config, connector.clone(), connector.clone())?;
    if sentiment_feed {
        pipeline = pipeline.with_sentiment_source(connector);
    }

    if let Some(path) = advice_path {
        let answer = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read advice {}", path.display()))?;
        pipeline = pipeline.with_suggester(Arc::new(StaticSuggester::new(answer)));
    }

    match pipeline.run(&request).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome.decision)?);
            Ok(())
        }
        Err(failure) => {
            println!("{}", serde_json::to_string_pretty(&failure.to_json())?);
            std::process::exit(2);
        }
    }
}
