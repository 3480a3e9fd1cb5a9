//! Recording state machine: start, stop, keyframes and the write fault threshold

use std::time::{Duration, Instant};

use common::sample::SensorSample;
use crossbeam::channel::{self, Receiver, Sender};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Destination for log rows
pub trait Logger {
    /// Opens a new log named after `name_hint` without replacing an existing one,
    /// returns the name actually used
    fn open(&mut self, name_hint: &str) -> anyhow::Result<String>;
    fn append(&mut self, row: &Row) -> anyhow::Result<()>;
    fn close(&mut self) -> anyhow::Result<()>;
}

/// One log line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Row {
    /// Since the session started
    pub elapsed: Duration,
    /// `status.keyframe` is set on exactly one row per keyframe request
    pub sample: SensorSample,
}

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Could not open log: {0:#}")]
    Open(anyhow::Error),
    #[error("Could not write row: {0:#}")]
    Write(anyhow::Error),
    #[error("Could not close log: {0:#}")]
    Close(anyhow::Error),
    #[error("Recording stopped after {0} consecutive write errors, last: {1:#}")]
    TooManyWriteErrors(u32, anyhow::Error),
}

#[derive(Debug)]
struct RecordingSession {
    started: Instant,
    file_name: String,
    rows: u64,
    keyframes: u32,
    keyframe_pending: bool,
    write_errors: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub file_name: String,
    pub elapsed: Duration,
    pub rows: u64,
    pub keyframes: u32,
}

#[derive(Debug)]
pub enum StartOutcome {
    Started { file_name: String },
    AlreadyActive,
    /// Still idle
    Failed(RecordingError),
}

#[derive(Debug)]
pub enum StopOutcome {
    Stopped {
        summary: SessionSummary,
        close_error: Option<RecordingError>,
    },
    NotActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyframeOutcome {
    Marked { keyframe: u32 },
    NotActive,
}

#[derive(Debug)]
pub enum TickOutcome {
    Idle,
    Appended {
        rows: u64,
        keyframe: Option<u32>,
    },
    WriteFailed {
        consecutive: u32,
        error: RecordingError,
    },
    /// The session hit the write error threshold and was closed
    AutoStopped {
        summary: SessionSummary,
        error: RecordingError,
    },
}

/// Read only view of the session, published for the console and broadcast threads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatus {
    pub recording: bool,
    pub file_name: Option<String>,
    pub elapsed: Duration,
    pub rows: u64,
    pub keyframes: u32,
    pub write_errors: u32,
    /// Commands the recording thread has taken off its queue so far
    pub commands_applied: u64,
}

pub struct RecordingController<L> {
    logger: L,
    session: Option<RecordingSession>,
    max_write_errors: u32,
}

impl<L: Logger> RecordingController<L> {
    pub fn new(logger: L, max_write_errors: u32) -> Self {
        Self {
            logger,
            session: None,
            max_write_errors: max_write_errors.max(1),
        }
    }

    pub fn logger(&self) -> &L {
        &self.logger
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn start(&mut self, name_hint: &str, now: Instant) -> StartOutcome {
        if self.session.is_some() {
            return StartOutcome::AlreadyActive;
        }

        match self.logger.open(name_hint) {
            Ok(file_name) => {
                self.session = Some(RecordingSession {
                    started: now,
                    file_name: file_name.clone(),
                    rows: 0,
                    keyframes: 0,
                    keyframe_pending: false,
                    write_errors: 0,
                });

                StartOutcome::Started { file_name }
            }
            Err(err) => StartOutcome::Failed(RecordingError::Open(err)),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn stop(&mut self, now: Instant) -> StopOutcome {
        let Some(session) = self.session.take() else {
            return StopOutcome::NotActive;
        };

        let (summary, close_error) = self.end(session, now);
        StopOutcome::Stopped {
            summary,
            close_error,
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn keyframe(&mut self) -> KeyframeOutcome {
        let Some(session) = &mut self.session else {
            return KeyframeOutcome::NotActive;
        };

        session.keyframes += 1;
        session.keyframe_pending = true;

        KeyframeOutcome::Marked {
            keyframe: session.keyframes,
        }
    }

    /// Appends one row built from `sample` while active
    #[instrument(level = "trace", skip(self, sample))]
    pub fn tick(&mut self, sample: &SensorSample, now: Instant) -> TickOutcome {
        let Some(mut session) = self.session.take() else {
            return TickOutcome::Idle;
        };

        let keyframe = session.keyframe_pending.then_some(session.keyframes);

        let mut sample = *sample;
        sample.status.keyframe = keyframe;

        let row = Row {
            elapsed: now.saturating_duration_since(session.started),
            sample,
        };

        match self.logger.append(&row) {
            Ok(()) => {
                session.rows += 1;
                session.write_errors = 0;
                session.keyframe_pending = false;

                let rows = session.rows;
                self.session = Some(session);

                TickOutcome::Appended { rows, keyframe }
            }
            Err(err) => {
                session.write_errors += 1;
                let consecutive = session.write_errors;

                if consecutive < self.max_write_errors {
                    self.session = Some(session);

                    return TickOutcome::WriteFailed {
                        consecutive,
                        error: RecordingError::Write(err),
                    };
                }

                let (summary, close_error) = self.end(session, now);
                if let Some(close_error) = close_error {
                    warn!("{close_error}");
                }

                TickOutcome::AutoStopped {
                    summary,
                    error: RecordingError::TooManyWriteErrors(consecutive, err),
                }
            }
        }
    }

    pub fn status(&self, now: Instant) -> SessionStatus {
        match &self.session {
            Some(session) => SessionStatus {
                recording: true,
                file_name: Some(session.file_name.clone()),
                elapsed: now.saturating_duration_since(session.started),
                rows: session.rows,
                keyframes: session.keyframes,
                write_errors: session.write_errors,
                ..Default::default()
            },
            None => SessionStatus::default(),
        }
    }

    fn end(
        &mut self,
        session: RecordingSession,
        now: Instant,
    ) -> (SessionSummary, Option<RecordingError>) {
        let close_error = self.logger.close().err().map(RecordingError::Close);
        let summary = SessionSummary {
            file_name: session.file_name,
            elapsed: now.saturating_duration_since(session.started),
            rows: session.rows,
            keyframes: session.keyframes,
        };

        (summary, close_error)
    }
}

impl StartOutcome {
    pub fn report(&self) {
        match self {
            StartOutcome::Started { file_name } => info!("Recording to {file_name}"),
            StartOutcome::AlreadyActive => info!("Already recording"),
            StartOutcome::Failed(err) => error!("Could not start recording: {err}"),
        }
    }
}

impl StopOutcome {
    pub fn report(&self) {
        match self {
            StopOutcome::Stopped {
                summary,
                close_error,
            } => {
                if let Some(err) = close_error {
                    warn!("{err}");
                }
                info!("Recording stopped. {summary}");
            }
            StopOutcome::NotActive => info!("Not recording"),
        }
    }
}

impl KeyframeOutcome {
    pub fn report(&self) {
        match self {
            KeyframeOutcome::Marked { keyframe } => info!("Keyframe {keyframe}"),
            KeyframeOutcome::NotActive => warn!("Not recording, keyframe ignored"),
        }
    }
}

impl TickOutcome {
    pub fn report(&self) {
        match self {
            TickOutcome::Idle | TickOutcome::Appended { .. } => {}
            TickOutcome::WriteFailed { consecutive, error } => {
                warn!("Write failure #{consecutive}: {error}");
            }
            TickOutcome::AutoStopped { summary, error } => {
                error!("{error}");
                info!("Recording stopped. {summary}");
            }
        }
    }
}

impl std::fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} rows, {} keyframes in {}",
            self.file_name,
            self.rows,
            self.keyframes,
            format_elapsed(self.elapsed)
        )
    }
}

/// Compact `1h 02m 03s` style duration
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);

    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingCommand {
    Start,
    Stop,
    Keyframe,
}

/// The operations other components may trigger on the recording thread
pub trait RecordingControl {
    fn start(&self) -> anyhow::Result<()>;
    fn stop(&self) -> anyhow::Result<()>;
    fn keyframe(&self) -> anyhow::Result<()>;
}

/// Forwards requests to the recording thread
#[derive(Debug, Clone)]
pub struct RecordingHandle(Sender<RecordingCommand>);

pub fn command_channel() -> (RecordingHandle, Receiver<RecordingCommand>) {
    let (tx, rx) = channel::bounded(16);

    (RecordingHandle(tx), rx)
}

impl RecordingHandle {
    fn send(&self, command: RecordingCommand) -> anyhow::Result<()> {
        self.0
            .try_send(command)
            .map_err(|err| anyhow::anyhow!("Could not send {command:?} to recording thread: {err}"))
    }
}

impl RecordingControl for RecordingHandle {
    fn start(&self) -> anyhow::Result<()> {
        self.send(RecordingCommand::Start)
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.send(RecordingCommand::Stop)
    }

    fn keyframe(&self) -> anyhow::Result<()> {
        self.send(RecordingCommand::Keyframe)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use common::types::units::Afr;

    use super::*;

    #[derive(Default)]
    struct MemoryLogger {
        fail_open: bool,
        /// Appends fail while this is non zero, counting down
        fail_appends: u32,
        opened: Vec<String>,
        rows: Vec<Row>,
        closed: u32,
    }

    impl Logger for MemoryLogger {
        fn open(&mut self, name_hint: &str) -> anyhow::Result<String> {
            if self.fail_open {
                return Err(anyhow!("No card"));
            }

            let name = format!("{name_hint}_{}.csv", self.opened.len());
            self.opened.push(name.clone());
            Ok(name)
        }

        fn append(&mut self, row: &Row) -> anyhow::Result<()> {
            if self.fail_appends > 0 {
                self.fail_appends -= 1;
                return Err(anyhow!("Write failed"));
            }

            self.rows.push(*row);
            Ok(())
        }

        fn close(&mut self) -> anyhow::Result<()> {
            self.closed += 1;
            Ok(())
        }
    }

    fn controller() -> RecordingController<MemoryLogger> {
        RecordingController::new(MemoryLogger::default(), 3)
    }

    #[test]
    fn start_and_stop() {
        let mut recording = controller();
        let start = Instant::now();

        assert!(matches!(recording.start("CLOG", start), StartOutcome::Started { ref file_name } if file_name == "CLOG_0.csv"));
        assert!(recording.is_active());
        assert!(matches!(recording.start("CLOG", start), StartOutcome::AlreadyActive));
        assert_eq!(recording.logger().opened.len(), 1);

        let sample = SensorSample::default();
        for idx in 1..=5 {
            let now = start + Duration::from_millis(80 * idx);
            assert!(matches!(recording.tick(&sample, now), TickOutcome::Appended { rows, .. } if rows == idx));
        }

        let StopOutcome::Stopped {
            summary,
            close_error,
        } = recording.stop(start + Duration::from_secs(1))
        else {
            panic!("Expected a stop");
        };

        assert!(close_error.is_none());
        assert_eq!(summary.rows, 5);
        assert_eq!(summary.elapsed, Duration::from_secs(1));
        assert_eq!(summary.file_name, "CLOG_0.csv");
        assert_eq!(recording.logger().closed, 1);
    }

    #[test]
    fn idle_requests_are_no_ops() {
        let mut recording = controller();
        let now = Instant::now();

        assert!(matches!(recording.stop(now), StopOutcome::NotActive));
        assert_eq!(recording.keyframe(), KeyframeOutcome::NotActive);
        assert!(matches!(
            recording.tick(&SensorSample::default(), now),
            TickOutcome::Idle
        ));
        assert_eq!(recording.logger().closed, 0);
        assert!(recording.logger().rows.is_empty());
    }

    #[test]
    fn failed_open_stays_idle() {
        let mut recording = RecordingController::new(
            MemoryLogger {
                fail_open: true,
                ..Default::default()
            },
            3,
        );

        assert!(matches!(
            recording.start("CLOG", Instant::now()),
            StartOutcome::Failed(RecordingError::Open(_))
        ));
        assert!(!recording.is_active());
        assert_eq!(recording.status(Instant::now()), SessionStatus::default());
    }

    #[test]
    fn session_counters_reset() {
        let mut recording = controller();
        let now = Instant::now();

        recording.start("A", now);
        recording.keyframe();
        recording.tick(&SensorSample::default(), now);
        recording.stop(now);

        recording.start("B", now);
        let status = recording.status(now);
        assert_eq!(status.rows, 0);
        assert_eq!(status.keyframes, 0);
        assert_eq!(status.write_errors, 0);
        assert_eq!(status.file_name.as_deref(), Some("B_1.csv"));
    }

    #[test]
    fn keyframe_lands_in_one_row() {
        let mut recording = controller();
        let now = Instant::now();
        let sample = SensorSample::default();

        recording.start("CLOG", now);
        recording.tick(&sample, now);

        assert_eq!(recording.keyframe(), KeyframeOutcome::Marked { keyframe: 1 });
        for _ in 0..3 {
            recording.tick(&sample, now);
        }

        assert_eq!(recording.keyframe(), KeyframeOutcome::Marked { keyframe: 2 });
        recording.tick(&sample, now);

        let keyframes: Vec<_> = recording
            .logger()
            .rows
            .iter()
            .map(|it| it.sample.status.keyframe)
            .collect();
        assert_eq!(keyframes, vec![None, Some(1), None, None, Some(2)]);
    }

    #[test]
    fn keyframe_survives_failed_append() {
        let mut recording = controller();
        let now = Instant::now();
        let sample = SensorSample::default();

        recording.start("CLOG", now);
        recording.keyframe();

        recording.logger.fail_appends = 1;
        assert!(matches!(
            recording.tick(&sample, now),
            TickOutcome::WriteFailed { consecutive: 1, .. }
        ));
        assert!(matches!(
            recording.tick(&sample, now),
            TickOutcome::Appended {
                keyframe: Some(1),
                ..
            }
        ));
        recording.tick(&sample, now);

        let marked = recording
            .logger()
            .rows
            .iter()
            .filter(|it| it.sample.status.keyframe.is_some())
            .count();
        assert_eq!(marked, 1);
    }

    #[test]
    fn auto_stop_at_threshold() {
        let mut recording = controller();
        let now = Instant::now();
        let sample = SensorSample::default();

        recording.start("CLOG", now);
        recording.logger.fail_appends = 10;

        assert!(matches!(
            recording.tick(&sample, now),
            TickOutcome::WriteFailed { consecutive: 1, .. }
        ));
        assert!(matches!(
            recording.tick(&sample, now),
            TickOutcome::WriteFailed { consecutive: 2, .. }
        ));
        assert!(recording.is_active());

        assert!(matches!(
            recording.tick(&sample, now),
            TickOutcome::AutoStopped {
                error: RecordingError::TooManyWriteErrors(3, _),
                ..
            }
        ));
        assert!(!recording.is_active());
        assert_eq!(recording.logger().closed, 1);

        assert!(matches!(recording.tick(&sample, now), TickOutcome::Idle));
    }

    #[test]
    fn success_resets_error_count() {
        let mut recording = controller();
        let now = Instant::now();
        let sample = SensorSample::default();

        recording.start("CLOG", now);

        for _ in 0..5 {
            recording.logger.fail_appends = 2;
            recording.tick(&sample, now);
            recording.tick(&sample, now);
            assert_eq!(recording.status(now).write_errors, 2);

            assert!(matches!(
                recording.tick(&sample, now),
                TickOutcome::Appended { .. }
            ));
            assert_eq!(recording.status(now).write_errors, 0);
        }

        assert!(recording.is_active());
        assert_eq!(recording.logger().rows.len(), 5);
    }

    #[test]
    fn rows_carry_the_sample() {
        let mut recording = controller();
        let start = Instant::now();

        let mut sample = SensorSample::default();
        sample.engine.afr_bank1 = Afr(13.1);

        recording.start("CLOG", start);
        recording.tick(&sample, start + Duration::from_millis(1234));

        let row = recording.logger().rows[0];
        assert_eq!(row.elapsed, Duration::from_millis(1234));
        assert_eq!(row.sample.engine.afr_bank1, Afr(13.1));
    }

    #[test]
    fn handle_forwards_commands() {
        let (handle, rx) = command_channel();

        handle.start().expect("Start");
        handle.keyframe().expect("Keyframe");
        handle.stop().expect("Stop");

        let commands: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            commands,
            vec![
                RecordingCommand::Start,
                RecordingCommand::Keyframe,
                RecordingCommand::Stop
            ]
        );

        drop(rx);
        assert!(handle.start().is_err());
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_secs(7)), "7s");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "1h 02m 03s");
    }
}
