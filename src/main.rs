// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dnsdisc::{
    catalog::YamlCatalog,
    confctl::HttpControlPlane,
    config::EngineConfig,
    constants::DEFAULT_CONFIG_PATH,
    dns::UdpResolver,
    lock::{FileLockManager, LockArgs},
    metrics,
    prompt::{FixedPrompt, OperatorPrompt, TerminalPrompt},
    reconcilers::{ReconciliationEngine, RunAction, RunReport, RunRequest},
    record::Action,
    remote::SshExecutor,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Pool and depool DNS Discovery records across datacenters.
#[derive(Debug, Parser)]
#[command(name = "dnsdisc", version)]
struct Cli {
    /// Engine configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Never wait for input: skip every record that would need a decision
    #[arg(long)]
    non_interactive: bool,

    /// Skip verification and blindly wipe the whole zone from the recursors instead
    #[arg(long)]
    emergency: bool,

    /// Print the Prometheus metrics of the run when done
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Pool all discovery records in a datacenter
    Pool(SwitchArgs),
    /// Depool all discovery records from a datacenter
    Depool(SwitchArgs),
    /// Show which records are pooled in each datacenter
    Status {
        #[arg(required = true)]
        datacenters: Vec<String>,
        /// Service or record to leave out (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Check that DNS answers match the pooled state of records
    Check {
        #[arg(required = true)]
        services: Vec<String>,
    },
    /// Pool or depool some services in one datacenter
    Route {
        #[arg(value_enum)]
        action: RouteAction,
        datacenter: String,
        #[arg(required = true)]
        services: Vec<String>,
        /// Wipe the recursor caches for the changed records
        #[arg(long)]
        wipe_cache: bool,
    },
}

#[derive(Debug, Args)]
struct SwitchArgs {
    datacenter: String,
    /// Also act on active/passive records
    #[arg(long)]
    all: bool,
    /// Service or record to leave out (repeatable)
    #[arg(long)]
    exclude: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RouteAction {
    Pool,
    Depool,
}

impl From<RouteAction> for Action {
    fn from(action: RouteAction) -> Self {
        match action {
            RouteAction::Pool => Action::Pool,
            RouteAction::Depool => Action::Depool,
        }
    }
}

impl Command {
    /// Lock protecting this command against concurrent runs.
    ///
    /// Datacenter runs on different datacenters may proceed in parallel.
    fn lock_args(&self) -> LockArgs {
        match self {
            Self::Pool(args) | Self::Depool(args) => {
                LockArgs::for_action(&format!("dnsdisc-datacenter-{}", args.datacenter), false)
            }
            Self::Status { .. } => LockArgs::for_action("dnsdisc-status", true),
            Self::Check { .. } => LockArgs::for_action("dnsdisc-check", true),
            Self::Route { .. } => LockArgs::for_action("dnsdisc-route", false),
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("dnsdisc")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

fn init_logging() {
    // Respects RUST_LOG, defaults to INFO. RUST_LOG_FORMAT=json switches to JSON lines.
    // Logs go to stderr so reports on stdout stay readable.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(cli: Cli) -> Result<ExitCode> {
    init_logging();
    debug!(config = %cli.config.display(), "Loading configuration");

    let config = Arc::new(EngineConfig::load(&cli.config)?);
    let prompt: Arc<dyn OperatorPrompt> = if cli.non_interactive {
        Arc::new(FixedPrompt::default())
    } else {
        Arc::new(TerminalPrompt::new())
    };
    let engine = ReconciliationEngine::new(
        config.clone(),
        Arc::new(
            HttpControlPlane::new(&config.control_plane_url)
                .context("Failed to create the control plane client")?,
        ),
        Arc::new(UdpResolver::new(config.authoritative_nameservers.clone())?),
        Arc::new(SshExecutor::new(config.hosts.clone())),
        Arc::new(YamlCatalog::new(&config.catalog_path)),
        prompt.clone(),
    );

    let locks = FileLockManager::new(&config.lock_dir);
    let guard = locks.acquire(&cli.command.lock_args()).await?;

    let result = execute(&cli, &config, &engine, prompt.as_ref()).await;

    if let Err(e) = guard.release().await {
        warn!(error = %e, "Failed to release the run lock");
    }
    if cli.print_metrics {
        print!("{}", metrics::gather_metrics()?);
    }
    result
}

async fn execute(
    cli: &Cli,
    config: &EngineConfig,
    engine: &ReconciliationEngine,
    prompt: &dyn OperatorPrompt,
) -> Result<ExitCode> {
    match &cli.command {
        Command::Pool(args) | Command::Depool(args) => {
            if !config.is_core(&args.datacenter) {
                anyhow::bail!(
                    "{} is not a core datacenter (one of: {})",
                    args.datacenter,
                    config.core_datacenters.join(", ")
                );
            }
            let action = if matches!(cli.command, Command::Pool(_)) {
                RunAction::Pool
            } else {
                RunAction::Depool
            };
            let request = RunRequest {
                action,
                target_datacenter: args.datacenter.clone(),
                include_active_passive: args.all,
                emergency: cli.emergency,
                exclusions: args.exclude.iter().cloned().collect(),
            };
            let report = engine.run(&request).await?;
            println!("{report}");
            if report.success() {
                return Ok(ExitCode::SUCCESS);
            }

            error!("Some records failed, they are listed above");
            if prompt
                .confirm("Do you wish to rollback to the state before the run?")
                .await
            {
                let rollback = engine.rollback(&report, cli.emergency).await;
                println!("{rollback}");
            }
            Ok(ExitCode::FAILURE)
        }
        Command::Status {
            datacenters,
            exclude,
        } => {
            let exclusions: BTreeSet<String> = exclude.iter().cloned().collect();
            let status = engine.status(datacenters, &exclusions).await?;
            print!("{status}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { services } => Ok(exit_code(&engine.check(services).await?)),
        Command::Route {
            action,
            datacenter,
            services,
            wipe_cache,
        } => {
            info!(action = ?action, datacenter = %datacenter, "Routing services");
            let report = engine
                .route_services((*action).into(), datacenter, services, *wipe_cache)
                .await?;
            Ok(exit_code(&report))
        }
    }
}

fn exit_code(report: &RunReport) -> ExitCode {
    println!("{report}");
    if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
