use std::{
    io,
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Context;
use calibration::store::{CalibrationStore, FileBacking};
use clap::Parser;
use common::{error, sample::SensorSample, snapshot};
use crossbeam::channel;
use tracing::{error, info, warn};

use crate::{
    broadcast::{DebugToggle, LiveDebug},
    calibrator::Calibrator,
    config::LoggerConfig,
    console::Console,
    engine::DecoderStatus,
    fusion::Fusion,
    imu::Imu,
    logger::{CsvLogger, LocalClock},
    peripheral::isp2_uart::Isp2Uart,
    recording::{RecordingController, SessionStatus},
    threads::{isp2::Isp2Pump, recording::LogNames},
};

pub mod broadcast;
pub mod calibrator;
pub mod config;
pub mod console;
pub mod engine;
pub mod fusion;
pub mod imu;
pub mod logger;
pub mod peripheral;
pub mod position;
pub mod recording;
pub mod threads;

#[derive(Parser, Debug)]
#[command(version, about = "Vehicle telemetry datalogger")]
struct Args {
    /// TOML configuration, defaults are used if it does not exist
    #[arg(short, long, default_value = "datalogger.toml")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = LoggerConfig::load(&args.config).context("Load config")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level.level())
        .init();
    info!("Starting datalogger with {}", args.config.display());

    // Must run before any other thread exists
    let clock = LocalClock::detect();
    let started = Instant::now();

    let (errors, error_drain) = error::channel();
    let (exit_tx, exit) = threads::exit_channel();

    let imu = if config.imu.enabled {
        match Imu::new(&config.imu) {
            Ok(imu) => Some(imu),
            Err(err) => {
                error!("IMU unavailable, inertial values will read zero: {err:?}");
                None
            }
        }
    } else {
        info!("IMU disabled");
        None
    };

    let (remote_imu, imu_requests) = imu::request_channel();
    let store = CalibrationStore::new(FileBacking::new(&config.calibration.record_path));
    let mut calibrator = Calibrator::new(
        imu.is_some().then_some(remote_imu),
        store,
        config.imu.remap,
        config.calibration.procedure,
    );

    let (sample_publisher, samples) = snapshot::channel(SensorSample::default());
    let (session_publisher, sessions) = snapshot::channel(SessionStatus::default());
    let (decoder_publisher, decoders) = snapshot::channel(DecoderStatus::default());
    let (engine_tx, engine_rx) = channel::bounded(32);
    let (recording, commands) = recording::command_channel();
    let debug = DebugToggle::new(false);

    // Whatever drives the satellite receiver pushes fixes into this sender
    let (_fix_sender, fix_feed) = position::feed();

    let mut handles = Vec::new();

    match Isp2Uart::new(&config.serial.port, config.serial.baud) {
        Ok(uart) => {
            let pump = Isp2Pump::new(config.engine.clone(), engine_tx, decoder_publisher);
            handles.push(threads::isp2::start_isp2_thread(
                uart,
                pump,
                exit.clone(),
                errors.clone(),
            )?);
        }
        Err(err) => {
            error!("ISP2 serial unavailable, engine values will read zero: {err:?}");
        }
    }

    let fusion = Fusion::new(
        sample_publisher,
        engine_rx,
        imu,
        calibrator.shared_profile(),
        config.imu.remap,
        fix_feed,
        config.timing.fix_stale(),
    );
    handles.push(threads::sampling::start_sampling_thread(
        fusion,
        imu_requests,
        config.timing.sample(),
        exit.clone(),
        errors.clone(),
    )?);

    // Reads go through the sampling thread, so it has to be running first
    if calibrator.imu_ready() {
        info!("Zeroing gyro, keep the vehicle still");
        if let Err(err) = calibrator.zero_gyro() {
            warn!("Gyro zero failed, continuing without: {err}");
        }
    }

    let logger = CsvLogger::new(
        &config.recording.directory,
        clock,
        config.recording.date_line,
        config.timing.flush(),
    );
    let controller = RecordingController::new(logger, config.recording.max_write_errors);
    handles.push(threads::recording::start_recording_thread(
        controller,
        commands,
        samples.clone(),
        session_publisher,
        LogNames::new(config.recording.name_hint.clone(), clock),
        config.timing.sample(),
        exit.clone(),
        errors.clone(),
    )?);

    let live = LiveDebug::new(
        io::stdout(),
        debug.clone(),
        config.timing.live_debug(),
        started,
    );
    handles.push(threads::broadcast::start_broadcast_thread(
        live,
        samples.clone(),
        sessions.clone(),
        config.timing.broadcast(),
        exit.clone(),
        errors.clone(),
    )?);

    let console = Console::new(
        recording,
        calibrator,
        samples,
        sessions,
        decoders,
        debug,
        started,
        io::stdout(),
    );
    let input = threads::console::start_stdin_thread()?;
    handles.push(threads::console::start_console_thread(
        console,
        input,
        config.timing.console(),
        exit,
        errors,
    )?);

    let (ctrlc_tx, ctrlc_rx) = channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.try_send(());
    })
    .context("Set ctrl-c")?;

    info!("Ready, ? for commands");

    loop {
        error_drain.read_errors();

        if ctrlc_rx.recv_timeout(Duration::from_millis(100)).is_ok() {
            break;
        }
    }

    info!("Shutting down");
    drop(exit_tx);

    for handle in handles {
        if handle.join().is_err() {
            error!("Worker thread panicked");
        }
    }
    error_drain.read_errors();

    info!("Datalogger stopped");

    Ok(())
}
