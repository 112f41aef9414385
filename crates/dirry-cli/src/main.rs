//! Dirry Command-Line Interface
//!
//! Host side of the worker bridge:
//! - `worker`: serve the message protocol over stdio, one JSON message per line
//! - `process`: run a single file through a computation module and print the results
//! - `inspect`: list what a computation module exports

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dirry_worker::{
    InboundMessage, ModuleLoader, Outbound, WasmConfig, WasmRuntime, Worker, WorkerConfig,
};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dirry")]
#[command(author, version, about = "Dirry worker bridge CLI", long_about = None)]
struct Cli {
    /// Enable verbose output (logs go to stderr)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Worker configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve processFile requests from stdin, write results to stdout
    Worker {
        #[command(flatten)]
        module: ModuleArgs,
    },

    /// Process one file and print every outbound message
    Process {
        /// Input file
        file: PathBuf,

        #[command(flatten)]
        module: ModuleArgs,

        /// Pretty-print messages
        #[arg(long)]
        pretty: bool,
    },

    /// List the functions a computation module exports
    Inspect {
        /// Computation module (.wasm or .wat)
        #[arg(short, long, default_value = "main.wasm")]
        module: PathBuf,
    },
}

#[derive(clap::Args)]
struct ModuleArgs {
    /// Computation module (.wasm or .wat)
    #[arg(short, long, default_value = "main.wasm")]
    module: PathBuf,

    /// Report dropped requests and undecodable chunks as error messages
    #[arg(long)]
    strict: bool,

    /// Fuel budget for each processed file
    #[arg(long)]
    fuel: Option<u64>,

    /// Name used in the not-initialized error
    #[arg(long)]
    label: Option<String>,
}

impl ModuleArgs {
    fn worker_config(&self, file: Option<&Path>) -> Result<WorkerConfig> {
        let mut config = match file {
            Some(path) => WorkerConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => WorkerConfig::default(),
        };
        if self.strict {
            config.strict_errors = true;
        }
        if let Some(fuel) = self.fuel {
            config.wasm.fuel_limit = Some(fuel);
        }
        if let Some(ref label) = self.label {
            config.module_label = label.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Worker { module } => {
            let config = module.worker_config(cli.config.as_deref())?;
            cmd_worker(config, module.module).await
        }

        Commands::Process {
            file,
            module,
            pretty,
        } => {
            let config = module.worker_config(cli.config.as_deref())?;
            cmd_process(config, module.module, file, pretty).await
        }

        Commands::Inspect { module } => {
            let config = match cli.config.as_deref() {
                Some(path) => WorkerConfig::from_file(path)?.wasm,
                None => WasmConfig::default(),
            };
            cmd_inspect(config, module)
        }
    }
}

async fn cmd_worker(config: WorkerConfig, module: PathBuf) -> Result<()> {
    info!("Starting worker with module {}", module.display());

    let loader = ModuleLoader::from_path(module, config.wasm.clone());
    let mut worker = Worker::spawn(config, loader.load());
    let sender = worker.sender().context("worker input already closed")?;
    worker.close();

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<InboundMessage>(&line) {
                Ok(msg) => {
                    if sender.send(msg).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring malformed message: {}", e),
            }
        }
        info!("Input closed");
        Ok::<_, std::io::Error>(())
    });

    let mut stdout = tokio::io::stdout();
    while let Some(msg) = worker.recv().await {
        let mut line = serde_json::to_vec(&msg)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
        stdout.flush().await?;
    }

    reader.await.context("stdin reader failed")??;
    Ok(())
}

async fn cmd_process(
    config: WorkerConfig,
    module: PathBuf,
    file: PathBuf,
    pretty: bool,
) -> Result<()> {
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("input")
        .to_string();

    let loader = ModuleLoader::from_path(&module, config.wasm.clone());
    let mut worker = Worker::spawn(config, loader.load());
    worker
        .startup()
        .await
        .with_context(|| format!("failed to start {}", module.display()))?;

    info!("Processing {} ({} bytes)", file_name, bytes.len());
    worker.send(InboundMessage::process_file(file_name, bytes))?;

    let messages = worker.finish().await;
    let (mut chunks, mut binaries, mut errors) = (0usize, 0usize, 0usize);
    for msg in &messages {
        match msg {
            Outbound::CallbackChunk { .. } => chunks += 1,
            Outbound::CallbackBinary { .. } => binaries += 1,
            Outbound::Error { .. } => errors += 1,
        }
        let text = if pretty {
            serde_json::to_string_pretty(msg)?
        } else {
            serde_json::to_string(msg)?
        };
        println!("{}", text);
    }

    info!(
        "Done: {} chunk(s), {} binary payload(s), {} error(s)",
        chunks, binaries, errors
    );
    Ok(())
}

fn cmd_inspect(config: WasmConfig, module: PathBuf) -> Result<()> {
    let runtime = WasmRuntime::new(config)?;
    let module = runtime
        .load_module(&module)
        .with_context(|| format!("failed to compile {}", module.display()))?;

    println!("Module: {}", module.name());
    println!("Exports:");
    for name in module.exports() {
        println!("  {}", name);
    }
    Ok(())
}
