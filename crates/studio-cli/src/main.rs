mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use studio_contracts::events::EventWriter;
use studio_contracts::payload::ImagePayload;
use studio_contracts::runs::{now_utc_iso, write_receipt, TransformReceipt};
use studio_engine::backends::build_http_client;
use studio_engine::download::download_result;
use studio_engine::{Orchestrator, StudioConfig};

#[derive(Debug, Parser)]
#[command(
    name = "studio-rs",
    version,
    about = "Places product photos on a studio background through Fal image-to-image endpoints"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve POST /api/process-image.
    Serve(ServeArgs),
    /// Transform one local image file.
    Process(ProcessArgs),
    /// Print the fallback chain in priority order.
    Endpoints,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: String,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Debug, Parser)]
struct ProcessArgs {
    #[arg(long)]
    input: PathBuf,
    /// File or directory for the downloaded result; a receipt is written
    /// next to it.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("studio-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = StudioConfig::from_env().map_err(anyhow::Error::msg)?;
    match cli.command {
        Command::Serve(args) => run_serve(args, &config),
        Command::Process(args) => run_process(args, &config),
        Command::Endpoints => run_endpoints(&config),
    }
}

fn build_orchestrator(
    config: &StudioConfig,
    events: Option<PathBuf>,
    session: &str,
) -> Result<Orchestrator> {
    let orchestrator = Orchestrator::from_config(config)?;
    Ok(match events {
        Some(path) => orchestrator.with_events(EventWriter::new(path, session)),
        None => orchestrator,
    })
}

fn run_serve(args: ServeArgs, config: &StudioConfig) -> Result<i32> {
    if config.credential.is_none() {
        log::warn!("FAL_API_KEY is not set; every request will fail until it is configured");
    }
    let session = format!("serve-{}", std::process::id());
    let orchestrator = build_orchestrator(config, args.events, &session)?;
    let worker_count = args.workers.unwrap_or_else(server::http_worker_count);
    let listener = server::bind(&args.bind)?;
    log::info!(
        "listening on http://{} with {} workers, {} endpoints",
        args.bind,
        worker_count,
        config.endpoints.len()
    );
    server::serve(listener, Arc::new(orchestrator), worker_count);
    Ok(0)
}

fn run_process(args: ProcessArgs, config: &StudioConfig) -> Result<i32> {
    let image = ImagePayload::from_file(&args.input)?;
    let orchestrator = build_orchestrator(config, args.events, "cli")?;
    let started_at = now_utc_iso();

    let success = match orchestrator.transform(&image) {
        Ok(success) => success,
        Err(err) => {
            eprintln!("studio-rs: {err}");
            return Ok(1);
        }
    };
    println!("{}", success.image_url);

    let Some(out) = args.out else {
        return Ok(0);
    };
    let http = build_http_client(config.http_timeout)?;
    let downloaded = download_result(&http, &success.image_url, &out)?;
    println!("saved {}", downloaded.path.display());

    let receipt = TransformReceipt {
        request_id: success.request_id,
        started_at,
        finished_at: now_utc_iso(),
        input_mime: image.mime_type().to_string(),
        input_bytes: image.len() as u64,
        input_sha256: image.sha256_hex(),
        endpoint: success.endpoint,
        image_url: success.image_url,
        output_path: Some(downloaded.path.to_string_lossy().to_string()),
        attempts: success.attempts,
    };
    let mut extra = Map::new();
    extra.insert(
        "input_path".to_string(),
        Value::String(args.input.to_string_lossy().to_string()),
    );
    let receipt_path = downloaded.path.with_extension("receipt.json");
    write_receipt(&receipt_path, &receipt, Some(&extra))
        .with_context(|| format!("failed to write {}", receipt_path.display()))?;
    Ok(0)
}

fn run_endpoints(config: &StudioConfig) -> Result<i32> {
    for (idx, endpoint) in config.endpoints.list().enumerate() {
        println!(
            "{}. {} [{}] {}",
            idx + 1,
            endpoint.name,
            endpoint.transport.as_str(),
            endpoint.url
        );
    }
    if config.credential.is_none() {
        eprintln!("warning: FAL_API_KEY is not set");
    }
    Ok(0)
}
