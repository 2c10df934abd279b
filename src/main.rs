use clap::{Parser, Subcommand};
use rainmon_service::config::Config;
use rainmon_service::ingest::radar::HttpRadarSource;
use rainmon_service::ingest::raster::ImageCrateDecoder;
use rainmon_service::logging::{self, DataSource};
use rainmon_service::monitor::{Monitor, RunReport};
use rainmon_service::persist::PersistOutcome;
use rainmon_service::scheduler::{Cadence, Scheduler};
use rainmon_service::verify;
use serde_json::json;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// How long `quit` waits for an in-flight run before exiting anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(author, version, about = "Radar rainfall monitoring for pump stations")]
struct Cli {
    /// Service configuration file
    #[arg(long, short, default_value = "rainmon.toml")]
    config: PathBuf,
    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and accept commands on stdin (default)
    Run {
        /// Start with the scheduler stopped
        #[arg(long, default_value_t = false)]
        paused: bool,
    },
    /// Execute a single monitoring run and print its report as JSON
    Once {
        /// Alert threshold in mm/h (defaults to the configured value)
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Check the radar endpoint, image and locations without persisting
    Verify {
        /// Print the full report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ {}", e);
            return ExitCode::from(2);
        }
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    logging::init_logger(
        logging::parse_level(level),
        config.logging.file.as_deref(),
        config.logging.console_timestamps,
    );

    match cli.command.unwrap_or(Command::Run { paused: false }) {
        Command::Run { paused } => run_daemon(&config, paused),
        Command::Once { threshold } => run_once(&config, threshold),
        Command::Verify { json } => run_verify(&config, json),
    }
}

fn build_monitor(config: &Config) -> Option<Monitor> {
    match Monitor::from_config(config) {
        Ok(monitor) => Some(monitor),
        Err(e) => {
            logging::error(DataSource::System, None, &format!("Cannot build radar client: {}", e));
            None
        }
    }
}

fn run_once(config: &Config, threshold: Option<f64>) -> ExitCode {
    let Some(monitor) = build_monitor(config) else {
        return ExitCode::FAILURE;
    };
    let threshold = threshold.unwrap_or(config.monitor.threshold_mm_per_hour);

    match monitor.run_once(threshold) {
        Ok(report) => {
            println!("{}", report_json(&report));
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!(
                "{}",
                json!({ "success": false, "category": e.category(), "error": e.to_string() })
            );
            ExitCode::FAILURE
        }
    }
}

fn report_json(report: &RunReport) -> serde_json::Value {
    let persistence = match &report.persistence {
        PersistOutcome::Stored { record_id, size_bytes } => {
            json!({ "stored": true, "recordId": record_id, "sizeBytes": size_bytes })
        }
        PersistOutcome::Rejected(reason) => json!({ "stored": false, "rejected": reason.to_string() }),
    };
    json!({
        "success": true,
        "station": report.run.frame.station_id,
        "capturedAt": report.run.frame.captured_at,
        "threshold": report.run.threshold_mm_per_hour,
        "summary": report.summary,
        "readings": report.run.readings,
        "alerts": report.alerts.iter().map(|a| a.message.clone()).collect::<Vec<_>>(),
        "fallbacks": report
            .diagnostics
            .iter()
            .map(|(name, reason)| json!({ "location": name, "reason": reason.to_string() }))
            .collect::<Vec<_>>(),
        "notes": report.run.notes,
        "annotated": report.annotated,
        "persistence": persistence,
    })
}

fn run_verify(config: &Config, as_json: bool) -> ExitCode {
    let source = match HttpRadarSource::new(
        &config.radar.endpoint,
        &config.radar.station_id,
        config.fetch_timeout(),
    ) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("✗ Cannot build radar client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("Verifying {} at {}\n", source.station_id(), source.frame_url());

    let report = verify::run_verification(
        &source,
        &ImageCrateDecoder,
        &config.locations,
        config.monitor.search_radius_km,
        config.monitor.stale_after_minutes,
    );
    verify::print_summary(&report);
    if as_json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("✗ Cannot serialize report: {}", e),
        }
    }

    if report.is_ready() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_daemon(config: &Config, paused: bool) -> ExitCode {
    let Some(monitor) = build_monitor(config) else {
        return ExitCode::FAILURE;
    };
    let cadence = match config.cadence() {
        Ok(cadence) => cadence,
        Err(e) => {
            eprintln!("✗ {}", e);
            return ExitCode::from(2);
        }
    };

    logging::info(
        DataSource::System,
        None,
        &format!(
            "Monitoring {} locations on radar {}",
            monitor.locations().len(),
            config.radar.station_id
        ),
    );
    let scheduler = Scheduler::new(Arc::new(monitor), config.monitor.threshold_mm_per_hour);
    if !paused {
        scheduler.start(cadence.clone(), config.monitor.threshold_mm_per_hour);
    }

    println!("Commands: start | stop | restart | status | trigger | threshold <mm/h> | quit");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                logging::error(DataSource::System, None, &format!("Cannot read stdin: {}", e));
                break;
            }
        };
        if !handle_command(&scheduler, &cadence, line.trim()) {
            shutdown(&scheduler);
            return ExitCode::SUCCESS;
        }
    }

    // stdin closed (detached daemon): keep ticking until the process is killed
    logging::info(DataSource::System, None, "stdin closed; running until terminated");
    loop {
        std::thread::park();
    }
}

/// Applies one stdin command. Returns `false` when the service should exit.
fn handle_command(scheduler: &Scheduler, cadence: &Cadence, command: &str) -> bool {
    let mut parts = command.split_whitespace();
    let threshold = || scheduler.status().threshold_mm_per_hour;

    match parts.next() {
        None => {}
        Some("start") => {
            if !scheduler.start(cadence.clone(), threshold()) {
                println!("already running");
            }
        }
        Some("stop") => {
            if !scheduler.stop() {
                println!("not running");
            }
        }
        Some("restart") => {
            scheduler.restart(cadence.clone(), threshold());
        }
        Some("status") => match serde_json::to_string_pretty(&scheduler.status()) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("✗ Cannot serialize status: {}", e),
        },
        Some("trigger") => match scheduler.trigger_now() {
            Ok(outcome) => match serde_json::to_string_pretty(&outcome) {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("✗ Cannot serialize outcome: {}", e),
            },
            Err(busy) => println!("{}", busy),
        },
        Some("threshold") => match parts.next().map(str::parse::<f64>) {
            Some(Ok(value)) => match scheduler.set_threshold(value) {
                Ok(()) => println!("threshold set to {:.1} mm/h", value),
                Err(e) => println!("{}", e),
            },
            _ => println!("usage: threshold <mm/h>"),
        },
        Some("quit") | Some("exit") => return false,
        Some(other) => println!("unknown command '{}'", other),
    }
    true
}

fn shutdown(scheduler: &Scheduler) {
    scheduler.stop();
    if !scheduler.wait_for_idle(SHUTDOWN_GRACE) {
        logging::warn(
            DataSource::System,
            None,
            "In-flight run still executing at shutdown",
        );
    }
    logging::info(DataSource::System, None, "Shutting down");
}
