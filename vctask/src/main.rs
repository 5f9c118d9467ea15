pub mod config;
pub mod dedup;
pub mod emit;
pub mod model;
pub mod poll;
pub mod state;
pub mod vsphere;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "vctask",
    version,
    about = "Polls a vCenter server for task records and reports each task exactly once"
)]
struct Cli {
    /// Number of hours back to retrieve
    #[arg(short = 'r', long, default_value_t = 24)]
    hours: i64,

    /// Fixed window length in hours (window ends begin + duration instead of now)
    #[arg(short, long)]
    duration: Option<i64>,

    /// Path to config file
    #[arg(short, long, default_value = "vctask.yaml")]
    config: PathBuf,

    /// Output mode for reported tasks
    #[arg(short, long, value_enum, default_value_t = OutputMode::Log)]
    output: OutputMode,

    /// Disable TLS certificate verification
    #[arg(long)]
    no_verify: bool,

    /// Path to the persisted dedup state file
    #[arg(short, long, default_value = "vctask-state.yaml")]
    state: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    /// Human-readable log line per reported task
    Log,
    /// One JSON object per line on stdout
    Structured,
    /// POST each reported task to the configured collector URL
    Forward,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    // Logs go to stderr so structured output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::read_config(&cli.config)?;

    let credentials = vsphere::Credentials {
        username: config.auth.username.clone(),
        password: config.auth.password.clone(),
    };
    let tls = vsphere::TlsOptions {
        accept_invalid_certs: cli.no_verify,
    };
    let client = vsphere::VsphereClient::new(&config.host, credentials, tls)?;

    let emitter = match cli.output {
        OutputMode::Log => emit::Emitter::Log,
        OutputMode::Structured => emit::Emitter::Structured,
        OutputMode::Forward => {
            let url = config
                .forward_url
                .clone()
                .context("Output mode 'forward' requires forward_url in the config file")?;
            emit::Emitter::Forward {
                client: reqwest::Client::new(),
                url,
            }
        }
    };

    let filter = vsphere::TimeFilter::look_back(cli.hours, cli.duration);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(poll::run(&client, &emitter, &filter, &cli.state))?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("vctask error: {:#}", e);
        std::process::exit(1);
    }
}
