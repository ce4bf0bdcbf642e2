//! kedaflow CLI
//!
//! Connects to a Kubernetes cluster, installs Helm and KEDA when they are
//! missing, and deploys workloads with event-driven autoscaling.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use commands::{connect, deploy, install, status, Session};
use kedaflow_lib::{cancellation, FailureClass, OrchestratorMetrics, StructuredLogger};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const KEDAFLOW_VERSION: &str = env!("CARGO_PKG_VERSION");

/// kedaflow CLI
#[derive(Parser)]
#[command(name = "kedaflow")]
#[command(author, version, about = "Bootstrap Helm and KEDA on a cluster and deploy autoscaled workloads", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (uses KUBECONFIG or ~/.kube/config if not specified)
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Target namespace
    #[arg(long, short, default_value = "default", global = true)]
    pub namespace: String,

    /// Settings file (defaults to ~/.config/kedaflow/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Write Prometheus metrics to this file when done
    #[arg(long, global = true)]
    pub metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the cluster is reachable
    Connect,

    /// Install Helm and/or KEDA (no-op when already satisfied)
    #[command(group(ArgGroup::new("target").required(true).multiple(true).args(["helm", "keda"])))]
    Install {
        /// Install the Helm client
        #[arg(long)]
        helm: bool,

        /// Install the KEDA operator
        #[arg(long)]
        keda: bool,

        /// Reinstall even when the installed version already satisfies the constraint
        #[arg(long)]
        upgrade: bool,
    },

    /// Deploy a workload, optionally with KEDA autoscaling
    Deploy(deploy::DeployArgs),

    /// Show the live status of a deployed workload
    Status {
        /// Workload name
        name: String,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let json = std::env::var("KEDAFLOW_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr)))
        .init();
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Connect => "connect",
        Commands::Install { .. } => "install",
        Commands::Deploy(_) => "deploy",
        Commands::Status { .. } => "status",
    }
}

async fn run(cli: Cli, metrics: OrchestratorMetrics) -> Result<()> {
    let settings = config::load_settings(cli.config.as_deref())?;
    let logger = StructuredLogger::new(command_name(&cli.command));
    logger.log_startup(KEDAFLOW_VERSION);

    // Ctrl-C aborts at the next blocking wait
    let (cancel_handle, cancel) = cancellation();
    let signal_logger = logger.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_logger.log_shutdown("SIGINT received");
            cancel_handle.cancel();
        }
    });

    let session = Session {
        settings,
        hint: config::endpoint_hint(cli.kubeconfig.clone(), cli.context.clone()),
        namespace: cli.namespace.clone(),
        format: cli.format,
        cancel,
        logger,
        metrics,
    };

    match cli.command {
        Commands::Connect => connect::run(&session, cli.kubeconfig.as_deref()).await,
        Commands::Install { helm, keda, upgrade } => install::run(&session, helm, keda, upgrade).await,
        Commands::Deploy(args) => deploy::run(&session, args).await,
        Commands::Status { name } => status::run(&session, &name).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let metrics_file = cli.metrics_file.clone();
    let metrics = OrchestratorMetrics::new();
    let outcome = run(cli, metrics.clone()).await;

    if let Some(path) = metrics_file {
        let written = metrics
            .encode_text()
            .map_err(anyhow::Error::from)
            .and_then(|text| std::fs::write(&path, text).map_err(anyhow::Error::from));
        if let Err(e) = written {
            output::print_warning(&format!("Could not write metrics to {}: {:#}", path.display(), e));
        }
    }

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::print_error(&format!("{:#}", err));
            ExitCode::from(FailureClass::of(&*err).exit_code())
        }
    }
}
