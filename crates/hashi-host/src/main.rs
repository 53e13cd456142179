//! hashi host binary.
//!
//! Runs a kernel backed by a scripted engine and speaks protocol messages as
//! JSON lines over stdio.
//!
//! Usage:
//!   # Print the kernel spec / kernel info
//!   hashi kernelspec [--config hashi.ron]
//!   hashi info [--config hashi.ron]
//!
//!   # Serve requests: one Message per stdin line, frames on stdout
//!   hashi run --script demos/script.ron [--config hashi.ron]
//!
//! Each output line is `{"channel": "iopub" | "shell", "message": {...}}`.
//! Logs go to stderr; set `RUST_LOG` to adjust.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hashi_kernel::{
    EngineLoader, EngineScript, HashiConfig, HashiKernelFactory, KernelSession, KernelSpecs,
    ScriptedLoader,
};
use hashi_types::Message;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Notebook kernel bridge over stdio.
#[derive(Parser, Debug)]
#[command(name = "hashi")]
#[command(about = "Bridge notebook protocol requests to an event-driven engine")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the kernel spec as JSON
    Kernelspec {
        /// RON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print kernel info as JSON
    Info {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Serve JSON-lines requests from stdin
    Run {
        /// RON engine script
        #[arg(long)]
        script: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Serialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum Channel {
    Iopub,
    Shell,
}

#[derive(Serialize)]
struct Frame<'a> {
    channel: Channel,
    message: &'a Message,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries protocol frames; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .init();

    let args = Args::parse();

    match args.command {
        Command::Kernelspec { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config.kernel_spec)?);
        }
        Command::Info { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config.kernel_info)?);
        }
        Command::Run { script, config } => {
            let config = load_config(config.as_deref())?;
            let script = EngineScript::load(&script)
                .with_context(|| format!("failed to load engine script {}", script.display()))?;
            run(config, script).await?;
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<HashiConfig> {
    match path {
        Some(path) => HashiConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(HashiConfig::default()),
    }
}

async fn run(config: HashiConfig, script: EngineScript) -> Result<()> {
    let spec = config.kernel_spec.clone();
    let factory = HashiKernelFactory::new(config, move || {
        Box::new(ScriptedLoader::new(script.clone())) as Box<dyn EngineLoader>
    });

    let mut specs = KernelSpecs::new();
    specs.register(spec.clone(), Arc::new(factory))?;
    let kernel = specs.create(&spec.name)?;
    kernel.ready().await.context("kernel failed to start")?;
    tracing::info!(name = %spec.name, session = %kernel.session(), "kernel ready");

    let session = KernelSession::new(kernel.clone());
    let mut iopub = kernel.subscribe_iopub();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request: Message = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("skipping malformed message: {e}");
                continue;
            }
        };

        let reply = session.handle(&request).await;
        // Everything the request published precedes its reply.
        for msg in drain(&mut iopub) {
            write_frame(&mut stdout, Channel::Iopub, &msg).await?;
        }
        match reply {
            Ok(reply) => write_frame(&mut stdout, Channel::Shell, &reply).await?,
            Err(e) => {
                tracing::warn!(msg_id = %request.header.msg_id, "request not handled: {e}");
                if let Some(reply) = KernelSession::error_reply_for(&request, &e)? {
                    write_frame(&mut stdout, Channel::Shell, &reply).await?;
                }
            }
        }
    }

    tracing::info!("stdin closed, shutting down");
    kernel.shutdown();
    Ok(())
}

fn drain(rx: &mut broadcast::Receiver<Message>) -> Vec<Message> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(msg) => out.push(msg),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "iopub lagged; messages lost");
            }
            Err(_) => break,
        }
    }
    out
}

async fn write_frame(
    stdout: &mut tokio::io::Stdout,
    channel: Channel,
    message: &Message,
) -> Result<()> {
    let mut line = serde_json::to_vec(&Frame { channel, message })?;
    line.push(b'\n');
    stdout.write_all(&line).await?;
    stdout.flush().await?;
    Ok(())
}
