use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::anyhow;
use crossbeam::channel::Receiver;

use crate::error::Errors;

/// Fixed cadence loop timer using absolute deadlines so the period does not drift
#[derive(Debug, Clone)]
pub struct Ticker {
    name: &'static str,
    interval: Duration,
    deadline: Instant,
}

impl Ticker {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            deadline: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleeps until the next deadline
    ///
    /// Returns how far behind the deadline the loop was if the cycle over ran.
    /// After an over run of more than a whole period the schedule restarts from
    /// now instead of trying to catch up.
    pub fn wait(&mut self) -> Option<Duration> {
        self.deadline += self.interval;

        let now = Instant::now();
        match self.deadline.checked_duration_since(now) {
            Some(remaining) => {
                thread::sleep(remaining);
                None
            }
            None => {
                let behind = now - self.deadline;
                if behind > self.interval {
                    self.deadline = now;
                }

                Some(behind)
            }
        }
    }

    /// Like [`Ticker::wait`] but hands messages from `requests` to `serve` until the deadline
    ///
    /// Time spent serving does not count as an over run.
    pub fn wait_serving<T>(
        &mut self,
        requests: &Receiver<T>,
        mut serve: impl FnMut(T),
    ) -> Option<Duration> {
        let deadline = self.deadline + self.interval;
        if deadline <= Instant::now() {
            return self.wait();
        }

        while let Ok(request) = requests.recv_deadline(deadline) {
            serve(request);
        }

        // Disconnected senders end the loop early
        let now = Instant::now();
        if let Some(remaining) = deadline.checked_duration_since(now) {
            thread::sleep(remaining);
        }

        let late = now.saturating_duration_since(deadline);
        self.deadline = if late > self.interval { now } else { deadline };

        None
    }

    /// Like [`Ticker::wait`] but reports over runs to `errors`
    pub fn wait_or_report(&mut self, errors: &Errors) {
        let behind = self.wait();
        self.report(behind, errors);
    }

    /// Like [`Ticker::wait_serving`] but reports over runs to `errors`
    pub fn wait_serving_or_report<T>(
        &mut self,
        requests: &Receiver<T>,
        serve: impl FnMut(T),
        errors: &Errors,
    ) {
        let behind = self.wait_serving(requests, serve);
        self.report(behind, errors);
    }

    fn report(&self, behind: Option<Duration>, errors: &Errors) {
        if let Some(behind) = behind {
            errors.send(anyhow!(
                "{} loop over run. Cycle finished {:.4}s late, period is {:.4}s",
                self.name,
                behind.as_secs_f32(),
                self.interval.as_secs_f32()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_cadence() {
        let mut ticker = Ticker::new("test", Duration::from_millis(5));
        let start = Instant::now();

        for _ in 0..4 {
            assert_eq!(ticker.wait(), None);
        }

        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn detects_over_run() {
        let mut ticker = Ticker::new("test", Duration::from_millis(2));
        thread::sleep(Duration::from_millis(10));

        let behind = ticker.wait().expect("Over run");
        assert!(behind >= Duration::from_millis(7));

        // Schedule restarted, next cycle is on time again
        assert_eq!(ticker.wait(), None);
    }

    #[test]
    fn serves_until_deadline() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let mut ticker = Ticker::new("test", Duration::from_millis(20));
        let start = Instant::now();

        tx.send(1).expect("Send");
        tx.send(2).expect("Send");

        let mut served = Vec::new();
        assert_eq!(ticker.wait_serving(&rx, |it| served.push(it)), None);

        assert_eq!(served, vec![1, 2]);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn disconnected_requests_still_wait() {
        let (tx, rx) = crossbeam::channel::unbounded::<()>();
        drop(tx);

        let mut ticker = Ticker::new("test", Duration::from_millis(10));
        let start = Instant::now();

        assert_eq!(ticker.wait_serving(&rx, |_| {}), None);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
