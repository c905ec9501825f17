use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use parking_lot::Mutex;

use crate::models::config::{RecorderConfig, StorageLayout};
use crate::models::error::CaptureError;
use crate::models::session::SessionOutcome;
use crate::models::shard::{ShardName, SESSION_FORMAT};
use crate::monitor::connectivity::ConnectivityMonitor;
use crate::storage::shard_directory::list_shards;
use crate::storage::shard_file::ShardFile;
use crate::traits::capture_driver::{CaptureDriver, RotationHint};
use crate::traits::video_sink::{SharedSink, VideoSink};

/// Source of the wall-clock time used to name sessions.
pub type ClockFn = Arc<dyn Fn() -> NaiveDateTime + Send + Sync + 'static>;

/// Longest uninterrupted sleep, so shutdown is noticed promptly.
const PAUSE_SLICE: Duration = Duration::from_millis(250);

/// Captures into size-bounded shards while the device is offline.
///
/// ```text
///            ┌──────── connected ─────────┐
///            ▼                            │
/// [wait while connected] → [clock check] → [capture: split → wait → size? → online?]
///            ▲                 │ skew                        │ rotate: next index
///            └── backoff ──────┘                             └──────────┘
/// ```
///
/// Recording stops when connectivity returns so uploads can drain without
/// new shards competing for bandwidth and disk.
pub struct ShardedRecorder<D: CaptureDriver> {
    driver: D,
    layout: StorageLayout,
    config: RecorderConfig,
    connectivity: ConnectivityMonitor,
    clock: ClockFn,
    running: Arc<AtomicBool>,
}

impl<D: CaptureDriver> ShardedRecorder<D> {
    pub fn new(
        driver: D,
        layout: StorageLayout,
        config: RecorderConfig,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            driver,
            layout,
            config,
            connectivity,
            clock: Arc::new(|| chrono::Local::now().naive_local()),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    /// Share a run flag; clearing it stops the recorder at the next interval.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Record sessions until the run flag is cleared.
    ///
    /// Never returns an error: failed sessions and clock hazards are logged
    /// and retried after the restart back-off.
    pub fn run(&mut self) {
        while self.is_running() {
            match self.run_session() {
                Ok(SessionOutcome::Interrupted) => break,
                Ok(outcome) if outcome.needs_backoff() => self.pause(self.config.restart_backoff),
                Ok(outcome) => {
                    log::debug!("Session finished: {:?}", outcome);
                    log::info!("Trying to start recording again...");
                }
                Err(e) => {
                    log::error!("Recording session failed: {}", e);
                    self.pause(self.config.restart_backoff);
                }
            }
        }
        log::info!("Recorder stopped");
    }

    /// Wait for connectivity to drop, then record one session until it returns.
    pub fn run_session(&mut self) -> Result<SessionOutcome, CaptureError> {
        if !self.wait_until_disconnected() {
            return Ok(SessionOutcome::Interrupted);
        }

        let now = (self.clock)();
        if let Some(newest) = self.clock_hazard(now)? {
            log::error!(
                "CRITICAL: existing video session {} is newer than current time {}. \
                 This is likely caused by incorrect system time. Trying again shortly...",
                newest,
                now
            );
            return Ok(SessionOutcome::ClockSkew { newest });
        }

        self.record(now)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
    }

    /// Returns `false` if shutdown was requested while waiting.
    fn wait_until_disconnected(&self) -> bool {
        let mut should_log = true;
        while self.is_running() && self.connectivity.is_connected() {
            if should_log {
                log::debug!("Still connected to the network...");
                should_log = false;
            }
            self.pause(self.config.idle_poll_interval);
        }
        self.is_running()
    }

    /// A session timestamp at or after `now` that already has more than one
    /// shard means the clock is behind; starting would append to that session.
    fn clock_hazard(&self, now: NaiveDateTime) -> Result<Option<String>, CaptureError> {
        let mut per_session: BTreeMap<NaiveDateTime, usize> = BTreeMap::new();
        for shard in list_shards(&self.layout.video_dir)? {
            *per_session.entry(shard.name.session()).or_default() += 1;
        }

        Ok(per_session
            .into_iter()
            .rev()
            .find(|(session, shards)| *session >= now && *shards > 1)
            .map(|(session, _)| session.format(SESSION_FORMAT).to_string()))
    }

    fn open_shard(&self, session: NaiveDateTime, index: u32) -> Result<Arc<Mutex<ShardFile>>, CaptureError> {
        let name = ShardName::new(session, index, &self.layout.format, self.layout.index_width);
        let shard = ShardFile::create(&self.layout.video_dir, name)?;
        log::debug!("Writing into {}", shard.shard());
        Ok(Arc::new(Mutex::new(shard)))
    }

    fn record(&mut self, session: NaiveDateTime) -> Result<SessionOutcome, CaptureError> {
        let label = session.format(SESSION_FORMAT).to_string();
        let mut index = 0;
        let mut current = self.open_shard(session, index)?;
        let fresh = current.lock().shard().is_new();

        let hint = RotationHint {
            key_frame_interval: self.config.flush_interval,
        };
        let sink: SharedSink = current.clone();
        if let Err(e) = self.driver.start(sink, hint) {
            self.abandon(&current, fresh);
            return Err(e);
        }
        log::info!("Recording session {} into {}", label, self.layout.video_dir.display());

        let mut shards = 1;
        let mut intervals = 0;
        let mut retired: Option<Arc<Mutex<ShardFile>>> = None;
        loop {
            if let Err(e) = self.capture_interval(&current, retired.take()) {
                if let Err(stop_err) = self.driver.stop() {
                    log::error!("Failed to stop capture driver: {}", stop_err);
                }
                close_logged(&current);
                return Err(e);
            }
            intervals += 1;
            if intervals % 10 == 0 {
                log::debug!("Recorded {} intervals...", intervals);
            }

            // Rotation is decided here but only takes effect at the next split.
            if current.lock().current_size() > self.config.max_shard_bytes {
                index += 1;
                log::debug!("Using next shard {} for video file", index);
            }

            let shutdown = !self.is_running();
            if shutdown || self.connectivity.is_connected() {
                if shutdown {
                    log::info!("Shutdown requested. Not recording anymore.");
                } else {
                    log::info!("Connected to network. Not recording anymore.");
                }
                self.driver.stop()?;
                current.lock().close()?;

                if shutdown {
                    return Ok(SessionOutcome::Interrupted);
                }
                if fresh && shards == 1 && intervals < self.config.min_session_intervals {
                    let guard = current.lock();
                    log::debug!("Cleaning up short video {} ({} intervals)", guard.shard(), intervals);
                    guard
                        .shard()
                        .remove()
                        .map_err(|e| CaptureError::StorageError(format!("failed to remove short video: {}", e)))?;
                    return Ok(SessionOutcome::Discarded {
                        session: label,
                        intervals,
                    });
                }
                return Ok(SessionOutcome::Recorded {
                    session: label,
                    shards,
                    intervals,
                });
            }

            if index != current.lock().shard().name().index() {
                let next = self.open_shard(session, index)?;
                retired = Some(std::mem::replace(&mut current, next));
                shards += 1;
            }
        }
    }

    /// Split into `current`, then close the shard it replaced, if any.
    fn capture_interval(
        &mut self,
        current: &Arc<Mutex<ShardFile>>,
        retired: Option<Arc<Mutex<ShardFile>>>,
    ) -> Result<(), CaptureError> {
        let sink: SharedSink = current.clone();
        self.driver.split_to(sink)?;
        if let Some(previous) = retired {
            close_logged(&previous);
        }
        self.driver.wait_flush_interval()
    }

    /// Undo the first shard of a session that never started.
    fn abandon(&self, current: &Arc<Mutex<ShardFile>>, fresh: bool) {
        let mut guard = current.lock();
        if let Err(e) = guard.close() {
            log::error!("Failed to close {}: {}", guard.shard(), e);
        }
        if fresh {
            if let Err(e) = guard.shard().remove() {
                log::warn!("Failed to remove empty {}: {}", guard.shard(), e);
            }
        }
    }
}

fn close_logged(shard: &Arc<Mutex<ShardFile>>) {
    let mut guard = shard.lock();
    if let Err(e) = guard.close() {
        log::error!("Failed to close {}: {}", guard.shard(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use chrono::NaiveDate;

    use crate::testing::{write_shard, DriverEvent, ScriptedDriver, ScriptedProbe};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(13, 45, 27)
            .unwrap()
    }

    fn layout(dir: &Path) -> StorageLayout {
        StorageLayout {
            video_dir: dir.join("video"),
            uploads_dir: dir.join("uploads"),
            credentials_path: dir.join(".credentials"),
            ..StorageLayout::default()
        }
    }

    fn config(max_shard_bytes: u64, min_session_intervals: u32) -> RecorderConfig {
        RecorderConfig {
            flush_interval: Duration::from_millis(1),
            max_shard_bytes,
            min_session_intervals,
            idle_poll_interval: Duration::ZERO,
            restart_backoff: Duration::ZERO,
        }
    }

    /// Offline for `offline_intervals` flush intervals, then online.
    fn probe(offline_intervals: usize) -> ConnectivityMonitor {
        let script = std::iter::repeat(false)
            .take(offline_intervals)
            .chain(std::iter::once(true));
        // The first `false` is consumed by the wait-while-connected check.
        let script = std::iter::once(false).chain(script);
        ConnectivityMonitor::new(Box::new(ScriptedProbe::new(script)), Duration::ZERO)
    }

    fn recorder(
        dir: &Path,
        driver: ScriptedDriver,
        config: RecorderConfig,
        connectivity: ConnectivityMonitor,
    ) -> ShardedRecorder<ScriptedDriver> {
        ShardedRecorder::new(driver, layout(dir), config, connectivity).with_clock(Arc::new(now))
    }

    fn shard_sizes(dir: &Path) -> Vec<(String, u64)> {
        list_shards(&dir.join("video"))
            .unwrap()
            .into_iter()
            .map(|s| (s.name.file_name().to_string(), s.size()))
            .collect()
    }

    #[test]
    fn short_session_is_discarded_on_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), ScriptedDriver::new(Vec::new(), 10), config(500, 60), probe(3));

        let outcome = recorder.run_session().unwrap();

        assert_eq!(
            outcome,
            SessionOutcome::Discarded {
                session: "2024-05-01_13-45".into(),
                intervals: 4,
            }
        );
        assert!(shard_sizes(dir.path()).is_empty());
    }

    #[test]
    fn long_enough_session_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), ScriptedDriver::new(Vec::new(), 10), config(500, 4), probe(3));

        let outcome = recorder.run_session().unwrap();

        assert_eq!(
            outcome,
            SessionOutcome::Recorded {
                session: "2024-05-01_13-45".into(),
                shards: 1,
                intervals: 4,
            }
        );
        assert_eq!(shard_sizes(dir.path()), vec![("2024-05-01_13-45.000.h264".into(), 40)]);
    }

    #[test]
    fn shard_below_maximum_does_not_rotate() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), ScriptedDriver::new([200, 100], 0), config(500, 0), probe(1));

        recorder.run_session().unwrap();

        assert_eq!(shard_sizes(dir.path()), vec![("2024-05-01_13-45.000.h264".into(), 300)]);
    }

    #[test]
    fn oversized_shard_rotates_next_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), ScriptedDriver::new([501, 10, 7], 0), config(500, 0), probe(2));

        let outcome = recorder.run_session().unwrap();

        // The 501 byte write stays in shard 0; only the following split lands in shard 1.
        assert_eq!(
            shard_sizes(dir.path()),
            vec![
                ("2024-05-01_13-45.000.h264".into(), 501),
                ("2024-05-01_13-45.001.h264".into(), 17),
            ]
        );
        assert_eq!(
            outcome,
            SessionOutcome::Recorded {
                session: "2024-05-01_13-45".into(),
                shards: 2,
                intervals: 3,
            }
        );
    }

    #[test]
    fn rotated_session_is_never_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), ScriptedDriver::new([501, 10], 0), config(500, 60), probe(1));

        let outcome = recorder.run_session().unwrap();

        assert!(matches!(outcome, SessionOutcome::Recorded { shards: 2, .. }));
        assert_eq!(shard_sizes(dir.path()).len(), 2);
    }

    #[test]
    fn session_appending_to_existing_shard_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        write_shard(&dir.path().join("video"), "2024-05-01_13-45.000.h264", 5);
        let mut recorder = recorder(dir.path(), ScriptedDriver::new(Vec::new(), 10), config(500, 60), probe(0));

        let outcome = recorder.run_session().unwrap();

        assert!(matches!(outcome, SessionOutcome::Recorded { intervals: 1, .. }));
        assert_eq!(shard_sizes(dir.path()), vec![("2024-05-01_13-45.000.h264".into(), 15)]);
    }

    #[test]
    fn future_session_with_several_shards_is_a_clock_hazard() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("video");
        write_shard(&video, "2099-01-01_00-00.000.h264", 1);
        write_shard(&video, "2099-01-01_00-00.001.h264", 1);
        let driver = ScriptedDriver::new(Vec::new(), 10);
        let events = driver.events();
        let mut recorder = recorder(dir.path(), driver, config(500, 0), probe(1));

        let outcome = recorder.run_session().unwrap();

        assert_eq!(
            outcome,
            SessionOutcome::ClockSkew {
                newest: "2099-01-01_00-00".into()
            }
        );
        assert!(events.lock().is_empty());
        assert_eq!(shard_sizes(dir.path()).len(), 2);
    }

    #[test]
    fn single_future_shard_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        write_shard(&dir.path().join("video"), "2099-01-01_00-00.000.h264", 1);
        let mut recorder = recorder(dir.path(), ScriptedDriver::new(Vec::new(), 10), config(500, 0), probe(0));

        let outcome = recorder.run_session().unwrap();

        assert!(matches!(outcome, SessionOutcome::Recorded { .. }));
    }

    #[test]
    fn driver_is_split_then_waited_every_interval() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::new(Vec::new(), 1);
        let events = driver.events();
        let mut recorder = recorder(dir.path(), driver, config(500, 0), probe(1));

        recorder.run_session().unwrap();

        assert_eq!(
            *events.lock(),
            vec![
                DriverEvent::Start,
                DriverEvent::Split,
                DriverEvent::Wait,
                DriverEvent::Split,
                DriverEvent::Wait,
                DriverEvent::Stop,
            ]
        );
    }

    #[test]
    fn failed_start_leaves_no_empty_shard() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), ScriptedDriver::failing_start(), config(500, 0), probe(1));

        assert!(matches!(recorder.run_session(), Err(CaptureError::DriverFailed(_))));
        assert!(shard_sizes(dir.path()).is_empty());
    }

    #[test]
    fn cleared_run_flag_interrupts_without_recording() {
        let dir = tempfile::tempdir().unwrap();
        let running = Arc::new(AtomicBool::new(false));
        let mut recorder = recorder(dir.path(), ScriptedDriver::new(Vec::new(), 1), config(500, 0), probe(1))
            .with_running_flag(Arc::clone(&running));

        assert_eq!(recorder.run_session().unwrap(), SessionOutcome::Interrupted);
        recorder.run();
        assert!(!dir.path().join("video").exists() || shard_sizes(dir.path()).is_empty());
    }

    #[test]
    fn run_restarts_after_clock_hazard_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("video");
        write_shard(&video, "2099-01-01_00-00.000.h264", 1);
        write_shard(&video, "2099-01-01_00-00.001.h264", 1);

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        // Stop after a few clock readings, i.e. a few restarts.
        let clock: ClockFn = Arc::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) >= 2 {
                flag.store(false, Ordering::SeqCst);
            }
            now()
        });

        let offline = ConnectivityMonitor::new(Box::new(ScriptedProbe::new([false])), Duration::ZERO);
        let mut recorder = recorder(dir.path(), ScriptedDriver::new(Vec::new(), 1), config(500, 0), offline)
            .with_clock(clock)
            .with_running_flag(running);
        recorder.run();

        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(fs::read_dir(&video).unwrap().count(), 2);
    }
}
