//! Rollout - Entry Point
//!
//! Builds the application, ships it to the configured servers, and manages
//! releases on each of them.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use rollout::app::{Orchestrator, RolloutOptions, Transport};
use rollout::config::Config;
use rollout::filesys::file::File;
use rollout::fleet::{CancelHandle, Completion, FleetReport, Outcome, TargetSelector};
use rollout::logs::{init_logging, LogLevel, LogOptions};
use rollout::migrate::MigrationSpec;
use rollout::script::ScriptName;
use rollout::session::{OutputLine, SshOptions};
use rollout::utils::long_version;

#[derive(Parser)]
#[command(name = "rollout")]
#[command(about = "Deploy an application to a fleet of servers", long_about = None)]
#[command(version, long_version = long_version())]
struct Cli {
    /// Target every server of a set (repeatable)
    #[arg(short = 's', long = "set", global = true)]
    sets: Vec<String>,

    /// Target one server, USER@HOST:PORT (repeatable)
    #[arg(long = "server", global = true)]
    servers: Vec<String>,

    /// Configuration file
    #[arg(long, global = true, default_value = "rollout.json")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// JSON log output
    #[arg(long, global = true)]
    json: bool,

    /// Use local directories under DIR instead of ssh
    #[arg(long, global = true, value_name = "DIR")]
    local: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter rollout.json
    Init {
        /// Application name; defaults to the directory name
        #[arg(long)]
        name: Option<String>,
    },

    /// Build, ship and activate a new release, then restart
    Deploy,

    /// Restart the active release
    Restart,

    /// Stop the running process
    Kill,

    /// Show the active release and whether the process runs
    Status,

    /// Follow the application log
    Log,

    /// `rollback ls` lists releases; `rollback TAG` activates TAG
    Rollback {
        /// `ls` or a release tag
        target: String,
    },

    /// Build and run migration programs: "[K=V ...] SOURCE [ARGS ...]"
    Run {
        #[arg(required = true)]
        specs: Vec<String>,
    },

    /// Print a rendered script without running it
    Inspect {
        /// deploy, restart or kill
        script: ScriptName,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_options = LogOptions {
        log_level: cli.log_level,
        json_format: cli.json,
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether every server succeeded
async fn run(cli: Cli) -> Result<bool> {
    let options = RolloutOptions {
        project_dir: PathBuf::from("."),
        config_file: cli.config.clone(),
        transport: match &cli.local {
            Some(dir) => Transport::Local(dir.clone()),
            None => Transport::Ssh(SshOptions::default()),
        },
    };
    let config_file = File::new(options.config_path());

    if let Commands::Init { name } = &cli.command {
        let name = match name {
            Some(name) => name.clone(),
            None => default_app_name()?,
        };
        config_file
            .create_json(&Config::starter(&name))
            .await
            .with_context(|| format!("unable to write {}", config_file.path().display()))?;
        info!("Wrote {}", config_file.path().display());
        return Ok(true);
    }

    let config = Config::load(&config_file).await?;

    let selectors: Vec<TargetSelector> = cli
        .sets
        .iter()
        .cloned()
        .map(TargetSelector::Set)
        .chain(cli.servers.iter().cloned().map(TargetSelector::Server))
        .collect();

    let (cancel, signal) = CancelHandle::new();
    tokio::spawn(async move {
        await_shutdown_signal().await;
        cancel.cancel();
    });

    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_output(output_rx));

    let orchestrator = Orchestrator::from_options(config, &options)
        .with_cancel(signal)
        .with_output(output_tx);

    let report = match cli.command {
        Commands::Init { .. } => return Ok(true),
        Commands::Deploy => orchestrator.deploy(&selectors).await,
        Commands::Restart => orchestrator.restart(&selectors).await,
        Commands::Kill => orchestrator.kill(&selectors).await,
        Commands::Status => orchestrator.status(&selectors).await,
        Commands::Log => orchestrator.tail_log(&selectors).await,
        Commands::Rollback { target } if target == "ls" => {
            orchestrator.rollback_list(&selectors).await
        }
        Commands::Rollback { target } => orchestrator.rollback(&selectors, &target).await,
        Commands::Run { specs } => {
            let specs = specs
                .iter()
                .map(|s| s.parse::<MigrationSpec>())
                .collect::<Result<Vec<_>, _>>()?;
            orchestrator.run(&selectors, specs).await
        }
        Commands::Inspect { script } => orchestrator.inspect(&selectors, script).await,
    }?;

    // Closing the last sender lets the printer drain and finish
    drop(orchestrator);
    let _ = printer.await;

    print_report(&report);
    Ok(report.is_success())
}

fn default_app_name() -> Result<String> {
    let dir = std::env::current_dir().context("unable to read the current directory")?;
    Ok(dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "app".to_string()))
}

async fn print_output(mut rx: mpsc::UnboundedReceiver<OutputLine>) {
    while let Some(OutputLine { server, line }) = rx.recv().await {
        println!("{} {}", format!("[{}]", server).cyan(), line);
    }
}

fn print_report(report: &FleetReport) {
    for result in &report.results {
        let server = result.server.bold();
        match &result.outcome {
            Outcome::Success(completion) => {
                println!("{} {} {}", "ok".green().bold(), server, summary(completion));
                match completion {
                    Completion::Releases { releases } => {
                        for release in releases {
                            if release.active {
                                println!("    {} {}", release.tag, "(current)".green());
                            } else {
                                println!("    {}", release.tag);
                            }
                        }
                    }
                    Completion::Script { script } => println!("{}", script),
                    _ => {}
                }
            }
            Outcome::Failed(failure) => {
                println!(
                    "{} {} [{}] {}",
                    "FAILED".red().bold(),
                    server,
                    failure.kind,
                    failure.detail
                );
            }
        }
    }

    let failed = report.failed().count();
    if failed > 0 {
        warn!("{} of {} servers failed", failed, report.results.len());
    }
}

fn summary(completion: &Completion) -> String {
    match completion {
        Completion::Deployed { tag, pruned } if pruned.is_empty() => format!("deployed {}", tag),
        Completion::Deployed { tag, pruned } => {
            format!("deployed {} (pruned {})", tag, pruned.len())
        }
        Completion::RolledBack { tag } => format!("rolled back to {}", tag),
        Completion::Releases { releases } => format!("{} releases", releases.len()),
        Completion::Script { .. } => "script:".to_string(),
        Completion::Status {
            active,
            pid,
            running,
        } => format!(
            "active {}, pid {}, {}",
            active.as_ref().map(|t| t.to_string()).unwrap_or_else(|| "none".to_string()),
            pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            if *running { "running" } else { "stopped" }
        ),
        Completion::Migrated { programs } => format!("ran {}", programs.join(", ")),
        Completion::Done => "done".to_string(),
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received, cancelling...");
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Ctrl+C received, cancelling...");
                    }
                }
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl+C received, cancelling...");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, cancelling...");
        }
    }
}
