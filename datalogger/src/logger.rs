//! CSV log files

use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use common::sample::format_deg_e7;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info, instrument, warn};

use crate::recording::{Logger, Row};

pub const HEADER: [&str; 25] = [
    "time", "lat", "lon", "speed", "alt", "dir", "sats", "accx", "accy", "accz", "rotx", "roty",
    "rotz", "magx", "magy", "magz", "imuTemp", "afr", "afr1", "vss", "map", "oilp", "coolant",
    "gpsStale", "keyframe",
];

pub const UNITS: [&str; 25] = [
    "(s)", "(deg)", "(deg)", "(mph)", "(ft)", "(deg)", "(#)", "(g)", "(g)", "(g)", "(dps)",
    "(dps)", "(dps)", "(uT)", "(uT)", "(uT)", "(C)", "(afr)", "(afr)", "(mph)", "(inHgVac)",
    "(psig)", "(F)", "(flag)", "(#)",
];

/// Wall clock in the local timezone
///
/// The offset is looked up once, before any other thread exists, as the lookup is
/// refused in multithreaded processes on some platforms.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    offset: UtcOffset,
}

impl LocalClock {
    pub fn detect() -> Self {
        let offset = match UtcOffset::current_local_offset() {
            Ok(offset) => offset,
            Err(err) => {
                warn!("Could not determine local time offset, using UTC: {err}");
                UtcOffset::UTC
            }
        };

        Self { offset }
    }

    pub fn with_offset(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }

    /// Default log name base, DDHHMM
    pub fn name_hint(&self) -> anyhow::Result<String> {
        format_time(self.now(), "[day][hour][minute]")
    }

    /// `DD/MM/YY HH:MM:SS`
    pub fn date_line(&self) -> anyhow::Result<String> {
        format_time(
            self.now(),
            "[day]/[month]/[year repr:last_two] [hour]:[minute]:[second]",
        )
    }
}

fn format_time(time: OffsetDateTime, description: &str) -> anyhow::Result<String> {
    let format = time::format_description::parse(description).context("Parse time format")?;

    time.format(&format).context("Format time")
}

struct OpenLog {
    writer: csv::Writer<File>,
    path: PathBuf,
    last_flush: Instant,
}

/// [`Logger`] writing one CSV file per session into `directory`
pub struct CsvLogger {
    directory: PathBuf,
    clock: LocalClock,
    date_line: bool,
    flush_interval: Duration,

    open: Option<OpenLog>,
}

impl CsvLogger {
    pub fn new(
        directory: impl Into<PathBuf>,
        clock: LocalClock,
        date_line: bool,
        flush_interval: Duration,
    ) -> Self {
        Self {
            directory: directory.into(),
            clock,
            date_line,
            flush_interval,
            open: None,
        }
    }

    /// Path of the open log
    pub fn path(&self) -> Option<&Path> {
        self.open.as_ref().map(|it| it.path.as_path())
    }

    /// Creates `<hint>_<n>.csv` for the lowest `n` not already taken
    fn create(&self, name_hint: &str) -> anyhow::Result<(String, PathBuf, File)> {
        fs::create_dir_all(&self.directory)
            .with_context(|| format!("Create log directory {}", self.directory.display()))?;

        for idx in 0..=u16::MAX {
            let file_name = format!("{name_hint}_{idx}.csv");
            let path = self.directory.join(&file_name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file_name, path, file)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("Create {}", path.display()));
                }
            }
        }

        bail!("No free log name for {name_hint}");
    }
}

impl CsvLogger {
    /// Optional date line, then the header and units rows
    fn write_preamble(&self, file: File) -> anyhow::Result<csv::Writer<File>> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(file);

        if self.date_line {
            writer
                .write_record([self.clock.date_line()?])
                .context("Write date line")?;
        }
        writer.write_record(HEADER).context("Write header")?;
        writer.write_record(UNITS).context("Write units")?;
        writer.flush().context("Flush header")?;

        Ok(writer)
    }
}

/// Removes a log that failed part way through being set up so its name is free again
fn discard_on_error<T>(path: &Path, result: anyhow::Result<T>) -> anyhow::Result<T> {
    if result.is_err() {
        if let Err(err) = fs::remove_file(path) {
            warn!("Could not remove incomplete log {}: {err}", path.display());
        }
    }

    result
}

impl Logger for CsvLogger {
    #[instrument(level = "debug", skip(self))]
    fn open(&mut self, name_hint: &str) -> anyhow::Result<String> {
        if self.open.is_some() {
            warn!("Log already open, closing it");
            self.close()?;
        }

        let (file_name, path, file) = self.create(name_hint)?;
        let writer = discard_on_error(&path, self.write_preamble(file))?;

        info!("Opened {}", path.display());

        self.open = Some(OpenLog {
            writer,
            path,
            last_flush: Instant::now(),
        });

        Ok(file_name)
    }

    #[instrument(level = "trace", skip_all)]
    fn append(&mut self, row: &Row) -> anyhow::Result<()> {
        let Some(log) = &mut self.open else {
            bail!("No log open");
        };

        log.writer
            .write_record(format_row(row))
            .context("Write row")?;

        if log.last_flush.elapsed() >= self.flush_interval {
            log.writer.flush().context("Flush log")?;
            log.last_flush = Instant::now();
        }

        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn close(&mut self) -> anyhow::Result<()> {
        let Some(mut log) = self.open.take() else {
            return Ok(());
        };

        log.writer
            .flush()
            .with_context(|| format!("Flush {}", log.path.display()))?;
        let file = log
            .writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("Finish {}: {}", log.path.display(), err.error()))?;
        file.sync_all()
            .with_context(|| format!("Sync {}", log.path.display()))?;

        debug!("Closed {}", log.path.display());

        Ok(())
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("Could not close log: {err:?}");
        }
    }
}

/// One CSV record in [`HEADER`] order
pub fn format_row(row: &Row) -> [String; 25] {
    let position = &row.sample.position;
    let inertial = &row.sample.inertial;
    let engine = &row.sample.engine;
    let status = &row.sample.status;

    [
        format!("{:.3}", row.elapsed.as_secs_f64()),
        format_deg_e7(position.lat_e7),
        format_deg_e7(position.lon_e7),
        format!("{:.2}", position.speed.0),
        format!("{:.2}", position.altitude.0),
        format!("{:.2}", position.heading.0),
        position.satellites.to_string(),
        format!("{:.2}", inertial.accel_x.0),
        format!("{:.2}", inertial.accel_y.0),
        format!("{:.2}", inertial.accel_z.0),
        format!("{:.2}", inertial.gyro_x.0),
        format!("{:.2}", inertial.gyro_y.0),
        format!("{:.2}", inertial.gyro_z.0),
        format!("{:.2}", inertial.mag_x.0),
        format!("{:.2}", inertial.mag_y.0),
        format!("{:.2}", inertial.mag_z.0),
        format!("{:.1}", inertial.temperature.0),
        format!("{:.2}", engine.afr_bank1.0),
        format!("{:.2}", engine.afr_bank2.0),
        format!("{:.2}", engine.vehicle_speed.0),
        format!("{:.2}", engine.manifold_pressure.0),
        format!("{:.2}", engine.oil_pressure.0),
        format!("{:.2}", engine.coolant.0),
        u8::from(status.fix_stale).to_string(),
        status.keyframe.unwrap_or(0).to_string(),
    ]
}
