//! Positional fixes from the satellite receiver
//!
//! Receiver handling lives outside this crate, whatever owns it pushes parsed
//! fixes into a [`FixFeed`].

use std::time::{Duration, Instant};

use common::{sample::PositionGroup, types::hw::PositionFix, types::units::Mph};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};

pub trait PositionSource {
    /// The newest fix received since the last call
    fn latest_fix(&mut self) -> Option<PositionFix>;
}

/// Channel backed source, keeps only the newest fix
#[derive(Debug)]
pub struct FixFeed {
    rx: Receiver<PositionFix>,
}

/// Producer side of a [`FixFeed`]
#[derive(Debug, Clone)]
pub struct FixSender {
    tx: Sender<PositionFix>,
}

pub fn feed() -> (FixSender, FixFeed) {
    let (tx, rx) = channel::bounded(8);

    (FixSender { tx }, FixFeed { rx })
}

impl FixSender {
    /// Never blocks, fixes are dropped if the sampler is not keeping up
    pub fn send(&self, fix: PositionFix) -> bool {
        match self.tx.try_send(fix) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }
}

impl PositionSource for FixFeed {
    fn latest_fix(&mut self) -> Option<PositionFix> {
        self.rx.try_iter().last()
    }
}

/// Keeps the position group current and decides when it is stale
#[derive(Debug)]
pub struct PositionTracker {
    stale_after: Duration,
    last_valid: Option<Instant>,
}

impl PositionTracker {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            last_valid: None,
        }
    }

    /// Applies `fix` if it is valid, returns whether the position is stale
    ///
    /// Stale positions keep their last coordinates but report zero speed.
    pub fn update(&mut self, position: &mut PositionGroup, fix: Option<PositionFix>, now: Instant) -> bool {
        if let Some(fix) = fix.filter(|it| it.valid) {
            position.apply_fix(&fix);
            self.last_valid = Some(now);
        }

        let stale = self
            .last_valid
            .map_or(true, |last| now.saturating_duration_since(last) > self.stale_after);

        if stale {
            position.speed = Mph(0.0);
        }

        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lat: f64, speed: f32, valid: bool) -> PositionFix {
        PositionFix {
            lat,
            lon: -122.0,
            speed: Mph(speed),
            satellites: 8,
            valid,
            ..Default::default()
        }
    }

    #[test]
    fn no_fix_is_stale() {
        let mut tracker = PositionTracker::new(Duration::from_secs(2));
        let mut position = PositionGroup::default();

        assert!(tracker.update(&mut position, None, Instant::now()));
    }

    #[test]
    fn fix_goes_stale() {
        let mut tracker = PositionTracker::new(Duration::from_secs(2));
        let mut position = PositionGroup::default();
        let start = Instant::now();

        assert!(!tracker.update(&mut position, Some(fix(37.5, 30.0, true)), start));
        assert_eq!(position.speed, Mph(30.0));

        let later = start + Duration::from_millis(1500);
        assert!(!tracker.update(&mut position, None, later));
        assert_eq!(position.speed, Mph(30.0));

        let later = start + Duration::from_millis(2500);
        assert!(tracker.update(&mut position, None, later));
        assert_eq!(position.speed, Mph(0.0));
        assert_eq!(position.lat_e7, 375_000_000);
    }

    #[test]
    fn invalid_fix_is_ignored() {
        let mut tracker = PositionTracker::new(Duration::from_secs(2));
        let mut position = PositionGroup::default();

        assert!(tracker.update(&mut position, Some(fix(37.5, 30.0, false)), Instant::now()));
        assert_eq!(position.lat_e7, 0);
    }

    #[test]
    fn feed_keeps_newest() {
        let (sender, mut feed) = feed();

        assert!(sender.send(fix(1.0, 0.0, true)));
        assert!(sender.send(fix(2.0, 0.0, true)));

        assert_eq!(feed.latest_fix().map(|it| it.lat), Some(2.0));
        assert_eq!(feed.latest_fix(), None);
    }
}
