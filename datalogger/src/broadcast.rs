//! Consumers fed on the broadcast cadence

use std::{
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use common::sample::SensorSample;

use crate::recording::SessionStatus;

/// Ships the latest sample and session state somewhere outside the logger
pub trait Broadcast {
    fn ship(
        &mut self,
        sample: &SensorSample,
        session: &SessionStatus,
        now: Instant,
    ) -> anyhow::Result<()>;
}

/// Runtime switch for the live debug stream, shared with the console
#[derive(Debug, Clone, Default)]
pub struct DebugToggle(Arc<AtomicBool>);

impl DebugToggle {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    /// Returns the new state
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One line summary of the sample, rate limited
pub struct LiveDebug<W> {
    out: W,
    toggle: DebugToggle,
    interval: Duration,
    started: Instant,
    last: Option<Instant>,
}

impl<W: Write> LiveDebug<W> {
    pub fn new(out: W, toggle: DebugToggle, interval: Duration, started: Instant) -> Self {
        Self {
            out,
            toggle,
            interval,
            started,
            last: None,
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }
}

impl<W: Write> Broadcast for LiveDebug<W> {
    fn ship(
        &mut self,
        sample: &SensorSample,
        session: &SessionStatus,
        now: Instant,
    ) -> anyhow::Result<()> {
        if !self.toggle.is_enabled() {
            return Ok(());
        }

        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.interval {
                return Ok(());
            }
        }
        self.last = Some(now);

        let uptime = now.saturating_duration_since(self.started);
        let line = live_line(uptime, sample, session.recording);

        writeln!(self.out, "{line}").context("Write live debug")?;
        self.out.flush().context("Flush live debug")
    }
}

pub fn live_line(uptime: Duration, sample: &SensorSample, recording: bool) -> String {
    let position = &sample.position;
    let engine = &sample.engine;

    format!(
        "{:.1}s {}  {:5.1}mph {}sat{}  AFR {:4.1}/{:4.1}  {:5.1}mph {:5.1}\"Hg  OIL{:3.0} CLT{:4.0}  G {:5.2}",
        uptime.as_secs_f32(),
        if recording { "[REC]" } else { "     " },
        position.speed.0,
        position.satellites,
        if sample.status.fix_stale { "!" } else { " " },
        engine.afr_bank1.0,
        engine.afr_bank2.0,
        engine.vehicle_speed.0,
        engine.manifold_pressure.0,
        engine.oil_pressure.0,
        engine.coolant.0,
        sample.inertial.accel_y.0,
    )
}

#[cfg(test)]
mod tests {
    use common::types::units::{Afr, Fahrenheit, GForce, InHg, Mph, Psi};

    use super::*;

    fn sample() -> SensorSample {
        let mut sample = SensorSample::default();
        sample.position.speed = Mph(55.0);
        sample.position.satellites = 8;
        sample.engine.afr_bank1 = Afr(14.7);
        sample.engine.afr_bank2 = Afr(12.5);
        sample.engine.vehicle_speed = Mph(54.2);
        sample.engine.manifold_pressure = InHg(-18.0);
        sample.engine.oil_pressure = Psi(45.0);
        sample.engine.coolant = Fahrenheit(195.0);
        sample.inertial.accel_y = GForce(0.25);
        sample
    }

    #[test]
    fn line_layout() {
        let line = live_line(Duration::from_millis(12_340), &sample(), true);

        assert_eq!(
            line,
            "12.3s [REC]   55.0mph 8sat   AFR 14.7/12.5   54.2mph -18.0\"Hg  OIL 45 CLT 195  G  0.25"
        );

        let mut stale = sample();
        stale.status.fix_stale = true;
        let line = live_line(Duration::ZERO, &stale, false);
        assert!(line.starts_with("0.0s         55.0mph 8sat!  AFR"));
    }

    #[test]
    fn toggle() {
        let toggle = DebugToggle::new(false);
        let shared = toggle.clone();

        assert!(shared.toggle());
        assert!(toggle.is_enabled());
        assert!(!toggle.toggle());
        assert!(!shared.is_enabled());
    }

    #[test]
    fn rate_limited_and_switchable() {
        let toggle = DebugToggle::new(false);
        let start = Instant::now();
        let mut live = LiveDebug::new(Vec::new(), toggle.clone(), Duration::from_millis(500), start);
        let session = SessionStatus::default();

        live.ship(&sample(), &session, start).expect("Ship");
        assert!(live.output().is_empty());

        toggle.toggle();
        for idx in 0..10 {
            let now = start + Duration::from_millis(200 * idx);
            live.ship(&sample(), &session, now).expect("Ship");
        }

        // Lines at 0, 600, 1200 and 1800ms
        let output = String::from_utf8(live.output().clone()).expect("Utf8");
        assert_eq!(output.lines().count(), 4);
    }
}
