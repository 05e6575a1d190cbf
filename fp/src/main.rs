//! farepacer CLI entry point

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use farepacer::cache::{QueryParams, make_key};
use farepacer::cli::{Cli, Command, OutputFormat, get_log_path};
use farepacer::config::Config;
use farepacer::simulate::{SimulationOptions, SimulationReport, run_simulation};

fn setup_logging(level: &str) -> Result<()> {
    // Create log directory
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level: tracing::Level = level
        .parse()
        .map_err(|_| eyre::eyre!("Invalid log level: {}", level))?;
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Setup logging: flag, then config, then info
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    setup_logging(&level).context("Failed to setup logging")?;

    info!(
        max_concurrent = config.scheduler.max_concurrent,
        base_interval_ms = config.scheduler.pacing.base_interval_ms,
        "farepacer loaded config"
    );

    // Dispatch command
    match cli.command {
        Command::Key {
            from,
            to,
            date,
            class,
            discount,
            fast,
            earliest,
            latest,
            max_transfers,
        } => {
            let params = QueryParams {
                from_station: from,
                to_station: to,
                date,
                traveler_class: class,
                discount,
                fast_connections: fast,
                earliest_departure: earliest,
                latest_departure: latest,
                max_transfers,
            };
            println!("{}", make_key(&params));
            Ok(())
        }
        Command::Config => cmd_config(&config),
        Command::Simulate {
            sessions,
            days,
            throttle_after,
            latency_ms,
            start,
            format,
        } => {
            let options = SimulationOptions {
                sessions,
                days,
                throttle_after,
                latency: Duration::from_millis(latency_ms),
                start: start.unwrap_or_else(|| chrono::Local::now().date_naive()),
            };
            cmd_simulate(&config, &options, format).await
        }
    }
}

/// Print the effective configuration
fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

/// Run a simulation and print its report
async fn cmd_simulate(config: &Config, options: &SimulationOptions, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Text {
        println!(
            "Simulating {} sessions x {} days (upstream throttles after {} calls / 30s)...",
            options.sessions, options.days, options.throttle_after
        );
    }

    let report = run_simulation(config, options).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!();
    println!("{}", "Service order".bold());
    for (index, session) in report.service_order.iter().enumerate() {
        println!("  {:>3}. {}", index + 1, session);
    }

    println!();
    println!("{}", "Sessions".bold());
    for (session, (ok, failed)) in &report.outcomes {
        let failed = if *failed > 0 {
            failed.to_string().red()
        } else {
            failed.to_string().green()
        };
        println!("  {:<12} ok: {:<4} failed: {}", session, ok.to_string().green(), failed);
    }

    let stats = &report.stats;
    println!();
    println!("{}", "Scheduler".bold());
    println!("  Completed:        {}", stats.total_completed);
    println!("  Throttled:        {}", stats.total_throttled.to_string().yellow());
    println!("  Retried:          {}", stats.total_retried);
    println!("  Failed:           {}", stats.total_failed);
    println!("  Peak queue depth: {}", stats.peak_queue_depth);
    println!("  Peak concurrency: {}", stats.peak_concurrent);
    println!("  Final interval:   {} ms", report.final_interval_ms);
    println!("  Elapsed:          {:.1} s", report.elapsed_ms as f64 / 1000.0);
}
