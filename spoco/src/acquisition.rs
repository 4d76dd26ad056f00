//! The accumulation polling loop.
//!
//! After the sync fires, the gateware bumps `acc_num` once per completed
//! accumulation. We poll that counter: unchanged means wait, one ahead means
//! read out every requested baseline, anything else means we missed one (or
//! the board resynced) so we warn and fall back in step without reading.
//! Batches roll over to a new file on a fixed cadence, and whatever is
//! pending gets flushed when the loop stops.

use crate::{
    archive::{Accumulation, Archiver},
    baseline::Baseline,
    correlator::SnapPoco,
    transport::Transport,
};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant, SystemTime},
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// How long to sleep between counter polls
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Correlator(#[from] crate::correlator::Error),
    #[error(transparent)]
    Archive(#[from] crate::archive::Error),
    #[error("System clock is before the Unix epoch")]
    Clock(#[from] std::time::SystemTimeError),
}

/// What one pass of the poll loop observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// The counter hasn't moved
    Idle,
    /// One new accumulation was read out
    Captured { count: u32 },
    /// The counter moved by more than one, nothing was read
    Gap { expected: u32, got: u32 },
}

/// Polls the correlator for completed accumulations and batches them to disk
#[derive(Debug)]
pub struct Acquisition<T> {
    poco: SnapPoco<T>,
    baselines: Vec<Baseline>,
    archiver: Archiver,
    filetime: Duration,
    /// The accumulation we saw last. The counter reads one once the first
    /// accumulation after a sync completes, so that's where we start.
    current: u32,
    last_capture: Instant,
    file_started: Instant,
    batch: Vec<Accumulation>,
}

impl<T> Acquisition<T>
where
    T: Transport,
{
    #[must_use]
    pub fn new(
        poco: SnapPoco<T>,
        baselines: Vec<Baseline>,
        archiver: Archiver,
        filetime: Duration,
    ) -> Self {
        Self {
            poco,
            baselines,
            archiver,
            filetime,
            current: 1,
            last_capture: Instant::now(),
            file_started: Instant::now(),
            batch: Vec::new(),
        }
    }

    /// Number of captures waiting to be written to the next file
    #[must_use]
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Run the poll loop until `stop` is raised, then flush whatever is pending
    /// # Errors
    /// Returns the first transport or archive error encountered
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), Error> {
        self.file_started = Instant::now();
        while !stop.load(Ordering::Relaxed) {
            if matches!(self.poll_once()?, Poll::Idle) {
                thread::sleep(POLL_INTERVAL);
            }
        }
        info!("stopping capture");
        self.flush()?;
        Ok(())
    }

    /// Make one pass: read the counter and react to it
    /// # Errors
    /// Returns errors from the transport or from writing a full file
    pub fn poll_once(&mut self) -> Result<Poll, Error> {
        let latest = self.poco.accumulation_count()?;
        if latest == self.current {
            return Ok(Poll::Idle);
        }
        let next = self.current.wrapping_add(1);
        if latest == next {
            info!(
                count = latest,
                elapsed_s = self.last_capture.elapsed().as_secs_f64(),
                "got accumulation"
            );
            let time = unix_now()?;
            let spectra = self
                .baselines
                .iter()
                .map(|&b| Ok((b, self.poco.read_visibility(b)?)))
                .collect::<Result<Vec<_>, Error>>()?;
            self.batch.push(Accumulation { time, spectra });
            self.current = latest;
            self.last_capture = Instant::now();
            if self.file_started.elapsed() > self.filetime {
                self.flush()?;
            }
            Ok(Poll::Captured { count: latest })
        } else {
            warn!(
                expected = next,
                got = latest,
                "accumulation counter jumped, falling back in step without reading"
            );
            self.current = latest;
            self.last_capture = Instant::now();
            Ok(Poll::Gap {
                expected: next,
                got: latest,
            })
        }
    }

    /// Write the pending batch (if any) and restart the file clock
    /// # Errors
    /// Returns an error if the write fails
    pub fn flush(&mut self) -> Result<(), Error> {
        if self.batch.is_empty() {
            debug!("nothing captured since the last file, skipping write");
        } else {
            let start = Instant::now();
            let path = self.archiver.write(&self.batch)?;
            info!(
                path = %path.display(),
                captures = self.batch.len(),
                elapsed_s = start.elapsed().as_secs_f64(),
                "wrote visibility file"
            );
            self.batch.clear();
        }
        self.file_started = Instant::now();
        Ok(())
    }
}

fn unix_now() -> Result<f64, std::time::SystemTimeError> {
    Ok(SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)?
        .as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archive::DEFAULT_PREFIX,
        baseline,
        core::{Register, RegisterMap},
        correlator::NCHANS,
        transport::mock::Mock,
    };
    use std::{collections::HashMap, path::Path};

    fn registers() -> RegisterMap {
        HashMap::from([
            ("acc_num".into(), Register { length: 4 }),
            (
                "xengine12_muxed_aa_real".into(),
                Register { length: 4 * NCHANS },
            ),
            (
                "xengine12_muxed_ab_real".into(),
                Register { length: 4 * NCHANS },
            ),
            (
                "xengine12_muxed_ab_imag".into(),
                Register { length: 4 * NCHANS },
            ),
        ])
    }

    fn acquisition(dir: &Path, filetime: Duration) -> Acquisition<Mock> {
        let poco = SnapPoco::new(Mock::new(registers()));
        let baselines = baseline::parse_list("aa,ab").unwrap();
        let archiver = Archiver::new(dir, DEFAULT_PREFIX);
        Acquisition::new(poco, baselines, archiver, filetime)
    }

    fn set_counter(acq: &Acquisition<Mock>, value: u32) {
        let transport = acq.poco.transport();
        let mut transport = transport.lock().unwrap();
        transport.write("acc_num", 0, &value).unwrap();
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_poll_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let mut acq = acquisition(dir.path(), Duration::from_secs(600));
        // The mock counter starts at zero but we expect one, which reads as
        // a gap and resynchronizes without capturing anything
        assert_eq!(
            acq.poll_once().unwrap(),
            Poll::Gap {
                expected: 2,
                got: 0
            }
        );
        assert_eq!(acq.pending(), 0);
        set_counter(&acq, 1);
        assert_eq!(acq.poll_once().unwrap(), Poll::Captured { count: 1 });
        assert_eq!(acq.pending(), 1);
        assert_eq!(acq.poll_once().unwrap(), Poll::Idle);
        set_counter(&acq, 2);
        assert_eq!(acq.poll_once().unwrap(), Poll::Captured { count: 2 });
        assert_eq!(acq.pending(), 2);
    }

    #[test]
    fn test_gap_after_captures_keeps_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut acq = acquisition(dir.path(), Duration::from_secs(600));
        set_counter(&acq, 2);
        assert_eq!(acq.poll_once().unwrap(), Poll::Captured { count: 2 });
        // Jump the counter way ahead, the capture we already have survives
        set_counter(&acq, 7);
        assert_eq!(
            acq.poll_once().unwrap(),
            Poll::Gap {
                expected: 3,
                got: 7
            }
        );
        assert_eq!(acq.pending(), 1);
        set_counter(&acq, 8);
        assert_eq!(acq.poll_once().unwrap(), Poll::Captured { count: 8 });
        assert_eq!(acq.pending(), 2);
    }

    #[test]
    fn test_counter_wraps_through_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut acq = acquisition(dir.path(), Duration::from_secs(600));
        // A gap resynchronizes us to the top of the counter range
        set_counter(&acq, u32::MAX);
        assert_eq!(
            acq.poll_once().unwrap(),
            Poll::Gap {
                expected: 2,
                got: u32::MAX
            }
        );
        // The next accumulation wraps the hardware counter to zero
        set_counter(&acq, 0);
        assert_eq!(acq.poll_once().unwrap(), Poll::Captured { count: 0 });
        assert_eq!(acq.pending(), 1);
    }

    #[test]
    fn test_rollover_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut acq = acquisition(dir.path(), Duration::ZERO);
        set_counter(&acq, 2);
        // Zero filetime means the file rolls over on the first capture
        assert!(matches!(
            acq.poll_once().unwrap(),
            Poll::Captured { .. }
        ));
        assert_eq!(acq.pending(), 0);
        assert_eq!(file_count(dir.path()), 1);
    }

    #[test]
    fn test_run_flushes_pending_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut acq = acquisition(dir.path(), Duration::from_secs(600));
        set_counter(&acq, 2);
        acq.poll_once().unwrap();
        assert_eq!(acq.pending(), 1);
        let stop = AtomicBool::new(true);
        acq.run(&stop).unwrap();
        assert_eq!(acq.pending(), 0);
        assert_eq!(file_count(dir.path()), 1);
    }

    #[test]
    fn test_stop_with_nothing_pending_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut acq = acquisition(dir.path(), Duration::from_secs(600));
        let stop = AtomicBool::new(true);
        acq.run(&stop).unwrap();
        assert_eq!(file_count(dir.path()), 0);
    }
}
