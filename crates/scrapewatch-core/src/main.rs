//! ScrapeWatch CLI
//!
//! Command-line interface for the ScrapeWatch scrape-health monitor.

use clap::{Parser, Subcommand};
use console::style;
use scrapewatch::api::StatusServer;
use scrapewatch::collector::{NotifyOutcome, Pipeline, RunOutcome, Scheduler, StatusBoard};
use scrapewatch::config::SinkBackend;
use scrapewatch::db::{PostgresPool, RedisPool};
use scrapewatch::{telemetry, Config};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

/// ScrapeWatch - Health metrics and alerting for scrape jobs
#[derive(Parser)]
#[command(name = "scrapewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "SCRAPEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once: read, aggregate, publish, evaluate, notify
    Run,

    /// Read, aggregate and evaluate without publishing or notifying
    Check,

    /// Run the pipeline on the configured interval and serve status
    Serve {
        /// Status server address (overrides schedule.status_addr)
        #[arg(long, env = "SCRAPEWATCH_STATUS_ADDR")]
        addr: Option<String>,

        /// Interval between runs, e.g. "15m" (overrides schedule.interval)
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<std::time::Duration>,
    },

    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Run database migrations
    Migrate,

    /// Check store and sink connectivity
    Health,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the default configuration file location
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        generate_completions(shell);
        return ExitCode::SUCCESS;
    }

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; the guard flushes the file writer on exit
    let _log_guard = match telemetry::init_logging(&config.logging, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run => run_once(&config, cli.format).await,
        Commands::Check => run_check(&config, cli.format).await,
        Commands::Serve { addr, interval } => run_serve(config, addr, interval).await,
        Commands::Db { command } => run_db(&config, command, cli.format).await,
        Commands::Config { command } => run_config(&config, command, cli.format),
        Commands::Completions { .. } => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", style("Error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run_once(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config)?;
    let outcome = pipeline.run().await?;
    print_outcome(&outcome, format)
}

async fn run_check(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config)?;
    let outcome = pipeline.check().await?;
    print_outcome(&outcome, format)
}

async fn run_serve(
    config: Config,
    addr: Option<String>,
    interval: Option<std::time::Duration>,
) -> anyhow::Result<()> {
    let addr = addr.unwrap_or_else(|| config.schedule.status_addr.clone());
    let interval = interval.unwrap_or(config.schedule.interval);
    if interval.is_zero() {
        anyhow::bail!("interval must be positive");
    }

    let metrics = telemetry::install_prometheus()?;
    let pipeline = Arc::new(Pipeline::from_config(&config)?);
    let status = StatusBoard::new();
    let scheduler = Scheduler::new(pipeline, interval, status.clone());

    info!(
        "Starting ScrapeWatch scheduler every {}, status on {}",
        humantime::format_duration(interval),
        addr
    );

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let server = StatusServer::new(status, Some(metrics));
    let server_handle = tokio::spawn(async move {
        server
            .serve(&addr, async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    scheduler
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl+C received, shutting down...");
        })
        .await;

    let _ = shutdown_tx.send(true);
    server_handle.await??;

    info!("ScrapeWatch stopped");
    Ok(())
}

async fn run_db(config: &Config, command: DbCommands, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        DbCommands::Migrate => {
            let pool = PostgresPool::new(&config.store).await?;
            pool.migrate().await?;
            println!("{} Migrations applied", style("✓").green());
        }
        DbCommands::Health => {
            let store = match PostgresPool::new(&config.store).await {
                Ok(pool) => pool.health_check().await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            let sink = match &config.sink.backend {
                SinkBackend::Redis { url } => match RedisPool::new(url) {
                    Ok(pool) => Some(pool.health_check().await.map_err(|e| e.to_string())),
                    Err(e) => Some(Err(e.to_string())),
                },
                SinkBackend::Http { .. } => None,
            };

            let healthy = store.is_ok() && sink.as_ref().map_or(true, Result::is_ok);

            if format == OutputFormat::Json {
                let report = serde_json::json!({
                    "healthy": healthy,
                    "store": store.as_ref().err(),
                    "sink": sink.as_ref().and_then(|s| s.as_ref().err()),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", style("ScrapeWatch Health Check").bold());
                print_check("Store", &store);
                if let Some(sink) = &sink {
                    print_check("Sink", sink);
                }
            }

            if !healthy {
                anyhow::bail!("health check failed");
            }
        }
    }
    Ok(())
}

fn run_config(config: &Config, command: ConfigCommands, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Show => match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
            OutputFormat::Text => println!("{}", toml::to_string_pretty(config)?),
        },
        ConfigCommands::Path => match scrapewatch::config::default_config_path() {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("no home directory to derive a config path from"),
        },
    }
    Ok(())
}

fn print_check(name: &str, result: &Result<(), String>) {
    match result {
        Ok(()) => println!("  {name:<7}{}", style("ok").green()),
        Err(e) => println!("  {name:<7}{} {e}", style("unreachable").red()),
    }
}

fn print_outcome(outcome: &RunOutcome, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    let s = &outcome.snapshot;
    println!(
        "{} Run {} finished in {}",
        style("✓").green(),
        outcome.run_id,
        humantime::format_duration(std::time::Duration::from_millis(
            outcome.duration.as_millis() as u64
        ))
    );
    println!("  Records fetched:      {}", outcome.records_fetched);
    println!("  Total runs:           {}", s.total_runs);
    println!("  Successful / failed:  {} / {}", s.successful_runs, s.failed_runs);
    println!("  Success rate:         {:.1}%", s.success_rate);
    println!("  Unique owners:        {}", s.unique_owners);
    println!("  Total records:        {}", s.total_records);
    println!("  Avg records per run:  {:.1}", s.avg_records_per_run);
    println!("  Recent runs:          {}", s.recent_runs);
    println!("  Recent success rate:  {:.1}%", s.recent_success_rate);
    println!(
        "  Published:            {}",
        if outcome.published { "yes" } else { "no (dry run)" }
    );

    if outcome.alerts.is_empty() {
        println!("{}", style("No alerts").green());
    } else {
        println!("{}", style("Alerts:").yellow().bold());
        for line in &outcome.alerts {
            println!("  - {line}");
        }
    }

    match &outcome.notification {
        NotifyOutcome::Skipped => {}
        NotifyOutcome::Sent => println!("Notification sent"),
        NotifyOutcome::Failed(e) => {
            println!("{} notification not delivered: {e}", style("!").red());
        }
    }

    Ok(())
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "scrapewatch", &mut io::stdout());
}
