//! Pulsewatch CLI
//!
//! Runs the wearable controller against the simulated wearer rig, and shows
//! configuration and stored-record status.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Local, NaiveTime};
use clap::{Parser, Subcommand};
use pulsewatch::config::Config;
use pulsewatch::core::{Orchestrator, Peripherals};
use pulsewatch::diagnostics::create_shared_diagnostics_with_persistence;
use pulsewatch::hal::sim::{sim_motion, sim_pulse, ConsoleDisplay, SimClock, SimRig, WearerScenario};
use pulsewatch::hal::store::JsonStore;
use pulsewatch::hal::PersistentStore;
use pulsewatch::VERSION;

#[derive(Parser)]
#[command(name = "pulsewatch")]
#[command(author = "Pulsebytes")]
#[command(version = VERSION)]
#[command(about = "Wearable heart-rate controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller against the simulated wearer rig
    Run {
        /// Simulated hours to run
        #[arg(long, default_value = "2.0")]
        hours: f64,

        /// Wall-clock time at boot (HH:MM)
        #[arg(long, default_value = "05:30")]
        start: String,

        /// Minutes after boot at which the wearer starts moving
        #[arg(long, default_value = "10")]
        wake_after_mins: u64,

        /// Simulated heart rate in BPM
        #[arg(long, default_value = "72")]
        bpm: u32,
    },

    /// Show stored records and cumulative diagnostics
    Status,

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            hours,
            start,
            wake_after_mins,
            bpm,
        } => {
            cmd_run(hours, &start, wake_after_mins, bpm);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn cmd_run(hours: f64, start: &str, wake_after_mins: u64, bpm: u32) {
    println!("Pulsewatch v{VERSION}");
    println!();

    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let start_time = match NaiveTime::parse_from_str(start, "%H:%M") {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: invalid --start time {start:?}: {e}");
            std::process::exit(1);
        }
    };
    let base = Local::now().date_naive().and_time(start_time);

    let scenario = WearerScenario {
        wake_burst_start_ms: wake_after_mins * 60 * 1_000,
        heart_rate_bpm: bpm,
        pulse_sample_period_ms: 1_000 / u64::from(config.hr_sample_rate_hz.max(1)),
        ..WearerScenario::default()
    };

    println!("Starting simulated run...");
    println!("  Boot wall clock: {start}");
    println!("  Simulated hours: {hours}");
    println!("  Wearer moves after: {wake_after_mins} min");
    println!("  Wearer heart rate: {bpm} BPM");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let clock = SimClock::new(base);
    let (motion_tx, motion) = sim_motion(true);
    let (pulse_tx, pulse) = sim_pulse(true);
    let store = JsonStore::open(config.data_path.join("hr_records.jsonl"));
    println!("Device ID: {}", store.device_id());

    let diagnostics =
        create_shared_diagnostics_with_persistence(config.data_path.join("diagnostics.json"));

    let periph = Peripherals {
        motion: Box::new(motion),
        pulse: Box::new(pulse),
        clock: Box::new(clock.clone()),
        display: Box::new(ConsoleDisplay),
        store: Box::new(store),
    };

    let mut rig = SimRig::new(
        clock.clone(),
        motion_tx,
        pulse_tx,
        scenario,
        config.motion_threshold_g,
    );

    let mut orchestrator = match Orchestrator::boot(periph, config, Arc::clone(&diagnostics)) {
        Ok(orch) => orch,
        Err(e) => {
            // Fatal init: no safe degraded mode exists without both sensors.
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc_handler(r);

    let end_ms = (hours * 3_600_000.0).max(0.0) as u64;
    while running.load(Ordering::SeqCst) && clock_now(&clock) < end_ms {
        let plan = orchestrator.tick();
        rig.advance(&plan);
    }

    println!();
    println!(
        "Run finished at simulated +{:.1} min, final state: {}",
        clock_now(&clock) as f64 / 60_000.0,
        orchestrator.state().label()
    );
    println!("Records today: {}", orchestrator.daily_log().len());

    if let Err(e) = diagnostics.save() {
        eprintln!("Warning: Could not save diagnostics: {e}");
    }

    println!();
    println!("{}", diagnostics.summary());
}

fn clock_now(clock: &SimClock) -> u64 {
    use pulsewatch::hal::Clock;
    clock.now_ms()
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Pulsewatch Status");
    println!("=================");
    println!();

    println!("Configuration:");
    println!("  Motion threshold: {} g", config.motion_threshold_g);
    println!(
        "  Wake window: {:02}:00-{:02}:00 ({})",
        config.valid_wake_hour_start, config.valid_wake_hour_end, config.timezone
    );
    println!("  Beats averaged: {}", config.hr_average_samples);
    println!("  Daily record cap: {}", config.max_daily_records);
    println!();

    let mut store = JsonStore::open(config.data_path.join("hr_records.jsonl"));
    let today = Local::now().date_naive();
    match store.load_today_count(today) {
        Ok(count) => println!("Records persisted today: {count}"),
        Err(e) => println!("Store unavailable: {e}"),
    }
    match store.load_all() {
        Ok(all) => println!("Records persisted in total: {}", all.len()),
        Err(e) => println!("Store unavailable: {e}"),
    }
    println!();

    // Cumulative diagnostics from previous sessions, if present.
    let stats_path = config.data_path.join("diagnostics.json");
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                if let Some(v) = stats.get("wakes_confirmed") {
                    println!("  Wakes confirmed: {v}");
                }
                if let Some(v) = stats.get("wakes_rejected") {
                    println!("  Wakes rejected: {v}");
                }
                if let Some(v) = stats.get("measurements_completed") {
                    println!("  Measurements completed: {v}");
                }
                if let Some(v) = stats.get("records_logged") {
                    println!("  Records logged: {v}");
                }
                if let Some(v) = stats.get("samples_dropped") {
                    println!("  Samples dropped: {v}");
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
