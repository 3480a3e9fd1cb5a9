//! Single character operator commands

use std::{io::Write, time::Instant};

use anyhow::Context;
use calibration::{procedure::InertialSampler, store::Backing};
use common::{
    sample::{format_deg_e7, SensorSample},
    snapshot::SharedSnapshot,
};
use tracing::{info, warn};

use crate::{
    broadcast::DebugToggle,
    calibrator::Calibrator,
    engine::DecoderStatus,
    recording::{format_elapsed, RecordingControl, SessionStatus},
};

const HELP: &str = "\
--- Datalogger Commands ---
 Recording:
  r  Start recording
  s  Stop recording (prints session summary)
  k  Insert keyframe marker into log
 Display:
  d  Toggle live debug stream
  p  Sensor snapshot (all values once)
  v  System status (uptime, GPS, IMU, ISP2)
  i  ISP2 diagnostics (AFR, VSS, MAP, OIL, CLT)
 IMU Calibration:
  c  Accel, place level and still, saves calibration
  m  Mag, tumble all axes, saves calibration
  C  Show current gyro/accel/mag calibration
  E  Erase stored calibration (revert to defaults)
  ?  This help";

pub struct Console<R, S, B, W> {
    recording: R,
    calibrator: Calibrator<S, B>,

    samples: SharedSnapshot<SensorSample>,
    session: SharedSnapshot<SessionStatus>,
    decoder: SharedSnapshot<DecoderStatus>,
    debug: DebugToggle,
    /// Recording commands sent, compared against what the recording thread has applied
    sent: u64,

    started: Instant,
    out: W,
}

impl<R, S, B, W> Console<R, S, B, W>
where
    R: RecordingControl,
    S: InertialSampler,
    B: Backing,
    W: Write,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        recording: R,
        calibrator: Calibrator<S, B>,
        samples: SharedSnapshot<SensorSample>,
        session: SharedSnapshot<SessionStatus>,
        decoder: SharedSnapshot<DecoderStatus>,
        debug: DebugToggle,
        started: Instant,
        out: W,
    ) -> Self {
        Self {
            recording,
            calibrator,
            samples,
            session,
            decoder,
            debug,
            sent: 0,
            started,
            out,
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn calibrator(&self) -> &Calibrator<S, B> {
        &self.calibrator
    }

    /// Unknown characters are ignored
    pub fn handle(&mut self, command: char, now: Instant) -> anyhow::Result<()> {
        match command {
            'r' => {
                self.recording.start()?;
                self.sent += 1;
            }
            's' => {
                self.recording.stop()?;
                self.sent += 1;
            }
            'k' => {
                if self.session.read().recording {
                    self.recording.keyframe()?;
                    self.sent += 1;
                } else {
                    writeln!(self.out, "WRN: Not recording, keyframe ignored")?;
                }
            }
            'd' => {
                let enabled = self.debug.toggle();
                writeln!(self.out, "INF: Live debug {}", on_off(enabled))?;
            }
            'p' => self.print_snapshot()?,
            'v' => self.print_status(now)?,
            'i' => self.print_decoder()?,
            'c' => {
                if self.may_calibrate()? {
                    self.calibrate_accel()?;
                }
            }
            'm' => {
                if self.may_calibrate()? {
                    self.calibrate_mag()?;
                }
            }
            'C' => self.print_calibration()?,
            'E' => self.erase_calibration()?,
            '?' => writeln!(self.out, "{HELP}")?,
            _ => {}
        }

        self.out.flush().context("Flush console")
    }

    fn may_calibrate(&mut self) -> anyhow::Result<bool> {
        let session = self.session.read();

        if session.recording {
            writeln!(self.out, "WRN: Stop recording before calibrating")?;
            Ok(false)
        } else if session.commands_applied < self.sent {
            // A start may still be queued, the profile must not change under a new log
            writeln!(self.out, "WRN: Recording request pending, try again")?;
            Ok(false)
        } else if !self.calibrator.imu_ready() {
            writeln!(self.out, "ERR: IMU not available")?;
            Ok(false)
        } else {
            Ok(true)
        }
    }

    fn calibrate_accel(&mut self) -> anyhow::Result<()> {
        writeln!(
            self.out,
            "INF: Accel calibration, keep the vehicle level and still"
        )?;
        self.out.flush()?;

        match self.calibrator.level_accel() {
            Ok(profile) => {
                info!("Accelerometer calibrated");
                writeln!(self.out, "INF: Accel calibration saved\n{profile}")?;
            }
            Err(err) => {
                warn!("Accelerometer calibration failed: {err}");
                writeln!(self.out, "ERR: {err}")?;
            }
        }

        Ok(())
    }

    fn calibrate_mag(&mut self) -> anyhow::Result<()> {
        let seconds = self.calibrator.procedure().mag_duration_ms as f32 / 1000.0;
        writeln!(
            self.out,
            "INF: Mag calibration, tumble through every orientation for {seconds:.0}s"
        )?;
        self.out.flush()?;

        match self.calibrator.sweep_mag() {
            Ok(profile) => {
                info!("Magnetometer calibrated");
                writeln!(self.out, "INF: Mag calibration saved\n{profile}")?;
            }
            Err(err) => {
                warn!("Magnetometer calibration failed: {err}");
                writeln!(self.out, "ERR: {err}")?;
            }
        }

        Ok(())
    }

    fn print_calibration(&mut self) -> anyhow::Result<()> {
        let source = if self.calibrator.is_persisted() {
            "stored"
        } else {
            "defaults"
        };

        writeln!(self.out, "--- Calibration ({source}) ---")?;
        writeln!(self.out, "{}", self.calibrator.current())?;

        Ok(())
    }

    fn erase_calibration(&mut self) -> anyhow::Result<()> {
        match self.calibrator.erase() {
            Ok(_) => writeln!(self.out, "INF: Calibration erased, using defaults")?,
            Err(err) => writeln!(self.out, "ERR: {err}")?,
        }

        Ok(())
    }

    fn print_snapshot(&mut self) -> anyhow::Result<()> {
        let sample = self.samples.read();
        let (position, inertial, engine) = (&sample.position, &sample.inertial, &sample.engine);

        writeln!(self.out, "--- Sensor Snapshot ---")?;
        writeln!(
            self.out,
            "GPS: {}, {}  {:.1} mph  sats={}{}",
            format_deg_e7(position.lat_e7),
            format_deg_e7(position.lon_e7),
            position.speed.0,
            position.satellites,
            if sample.status.fix_stale { " [STALE]" } else { "" }
        )?;
        writeln!(
            self.out,
            "IMU: acc={:.2},{:.2},{:.2}  gyro={:.1},{:.1},{:.1}  temp={:.1}C",
            inertial.accel_x.0,
            inertial.accel_y.0,
            inertial.accel_z.0,
            inertial.gyro_x.0,
            inertial.gyro_y.0,
            inertial.gyro_z.0,
            inertial.temperature.0
        )?;
        writeln!(
            self.out,
            "MAG: {:.1},{:.1},{:.1} uT",
            inertial.mag_x.0, inertial.mag_y.0, inertial.mag_z.0
        )?;
        writeln!(
            self.out,
            "ENG: AFR={:.1}/{:.1}  VSS={:.1}mph  MAP={:.1}  OIL={:.0}  CLT={:.0}",
            engine.afr_bank1.0,
            engine.afr_bank2.0,
            engine.vehicle_speed.0,
            engine.manifold_pressure.0,
            engine.oil_pressure.0,
            engine.coolant.0
        )?;

        Ok(())
    }

    fn print_status(&mut self, now: Instant) -> anyhow::Result<()> {
        let sample = self.samples.read();
        let session = self.session.read();
        let decoder = self.decoder.read();

        writeln!(self.out, "--- Datalogger v{} ---", env!("CARGO_PKG_VERSION"))?;
        writeln!(
            self.out,
            "Uptime:    {}",
            format_elapsed(now.saturating_duration_since(self.started))
        )?;
        match &session.file_name {
            Some(file_name) if session.recording => writeln!(
                self.out,
                "Recording: YES, {file_name}, {} rows, {}",
                session.rows,
                format_elapsed(session.elapsed)
            )?,
            _ => writeln!(self.out, "Recording: NO")?,
        }
        writeln!(
            self.out,
            "GPS:       {}  sats={}",
            if sample.status.fix_stale { "STALE" } else { "OK" },
            sample.position.satellites
        )?;
        writeln!(
            self.out,
            "IMU:       {}  cal={}",
            if self.calibrator.imu_ready() { "OK" } else { "FAIL" },
            if self.calibrator.is_persisted() { "YES" } else { "NO" }
        )?;
        writeln!(
            self.out,
            "ISP2:      {} LC1, {} aux",
            decoder.stats.last_wideband, decoder.stats.last_aux
        )?;
        writeln!(self.out, "Debug:     {}", on_off(self.debug.is_enabled()))?;

        Ok(())
    }

    fn print_decoder(&mut self) -> anyhow::Result<()> {
        let engine = self.samples.read().engine;
        let DecoderStatus { state, stats } = self.decoder.read();

        writeln!(self.out, "ISP2 state: {state:?}")?;
        writeln!(
            self.out,
            "Packets: {} data, {} command, {} dropped, {} resyncs",
            stats.frames, stats.commands, stats.dropped, stats.resyncs
        )?;
        writeln!(self.out, "LC1 devices: {}", stats.last_wideband)?;
        writeln!(self.out, "Aux channels: {}", stats.last_aux)?;
        writeln!(
            self.out,
            "AFR: {:.1}  AFR1: {:.1}",
            engine.afr_bank1.0, engine.afr_bank2.0
        )?;
        writeln!(
            self.out,
            "VSS: {:.1}mph  MAP: {:.1}  OIL: {:.0}  CLT: {:.0}",
            engine.vehicle_speed.0,
            engine.manifold_pressure.0,
            engine.oil_pressure.0,
            engine.coolant.0
        )?;

        Ok(())
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "ON"
    } else {
        "OFF"
    }
}
