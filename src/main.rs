use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{Datelike, Timelike, Utc};
use clap::Parser;
use parking_lot::Mutex;
use ppg_logger::args::{convert_filter, Args};
use ppg_logger::exfil::SharedStorage;
use ppg_logger::fault::{Controller, RunState};
use ppg_logger::inject::FaultInjector;
use ppg_logger::pipeline::{self, Outcome, PipelineConfig};
use ppg_logger::sensor::{LogStatus, Status, StatusSignal, SyntheticPhotodiode};
use ppg_logger::storage::{FileStorage, Storage};
use ppg_logger::watchdog::SoftwareWatchdog;
use ppg_logger::{RESTART_GRACE, WINDOW_DURATION_MS};
use tracing::{error, info, warn};

fn timestamped_output() -> PathBuf {
    let now = Utc::now();
    PathBuf::from(format!(
        "ppg-{}-{:02}-{:02}-{:02}{:02}{:02}.csv",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    ))
}

/// External reset hardware stand-in: if the watchdog runs out while the run
/// still claims to be healthy, the recovery controller itself has hung and
/// the process is reset from outside.
fn spawn_watchdog_backstop(watchdog: Arc<SoftwareWatchdog>, controller: Arc<Controller>) {
    thread::spawn(move || loop {
        thread::sleep(Duration::from_millis(500));
        match controller.state() {
            RunState::Running => {
                if watchdog.has_expired() {
                    error!("watchdog expired with no fault latched, forcing reset");
                    std::process::exit(2);
                }
            }
            _ => break,
        }
    });
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    let path = args.output.unwrap_or_else(timestamped_output);
    info!(
        windows = args.windows,
        output = %path.display(),
        period_ms = args.period_ms,
        "starting PPG recording run"
    );

    let status: Arc<dyn StatusSignal> = Arc::new(LogStatus);
    let controller = Arc::new(Controller::new(status.clone()));

    let handler_controller = controller.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_controller.interrupt()) {
        warn!(error = %e, "could not install the interrupt handler");
    }

    // probe the storage medium before sampling starts; refusing to run beats
    // discovering a missing card after a window is already full
    let mut file_storage = FileStorage::new(path.clone());
    if args.truncate {
        if let Err(e) = file_storage.truncate() {
            error!(error = %e, "could not wipe the output file");
            return ExitCode::FAILURE;
        }
        info!("previous output wiped");
    }
    if let Err(e) = file_storage.init() {
        error!(error = %e, "storage not writable, refusing to start");
        status.set_status(Status::Error);
        info!(delay = ?RESTART_GRACE, "restart requested");
        thread::sleep(RESTART_GRACE);
        return ExitCode::FAILURE;
    }
    status.set_status(Status::Ok);

    if args.warmup_secs > 0 {
        info!(secs = args.warmup_secs, "letting the photodiode settle");
        thread::sleep(Duration::from_secs(args.warmup_secs));
    }

    let config = PipelineConfig {
        sample_period: Duration::from_millis(args.period_ms),
        window_len: (WINDOW_DURATION_MS / args.period_ms) as usize,
        run_target: args.windows,
        ..PipelineConfig::default()
    };

    let watchdog = Arc::new(SoftwareWatchdog::new());
    spawn_watchdog_backstop(watchdog.clone(), controller.clone());

    let storage: SharedStorage = Arc::new(Mutex::new(Box::new(file_storage)));
    let outcome = pipeline::run(
        config,
        SyntheticPhotodiode::new(),
        storage,
        watchdog,
        controller.clone(),
        Arc::new(FaultInjector::default()),
    );

    match outcome {
        Outcome::Completed { windows } => {
            info!(windows, output = %path.display(), "sampling complete");
            controller.begin_restart();
            info!(delay = ?RESTART_GRACE, "restart requested");
            thread::sleep(RESTART_GRACE);
            ExitCode::SUCCESS
        }
        Outcome::Interrupted => {
            info!("run interrupted, partial windows discarded");
            ExitCode::SUCCESS
        }
        Outcome::Faulted(record) => {
            error!(fault = %record.kind, "run halted by fault");
            controller.begin_restart();
            info!(delay = ?RESTART_GRACE, "restart requested");
            thread::sleep(RESTART_GRACE);
            ExitCode::FAILURE
        }
    }
}
