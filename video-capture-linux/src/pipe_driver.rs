//! Capture driver backed by an external camera process.
//!
//! The configured command writes the encoded stream to stdout. A pump thread
//! copies it into whichever shard is the current target; `split_to` swaps
//! the target between reads, so no byte is written to two shards or lost.

use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use video_capture_core::models::error::CaptureError;
use video_capture_core::traits::capture_driver::{CaptureDriver, RotationHint};
use video_capture_core::traits::video_sink::SharedSink;

/// Read size of the pump thread.
const PUMP_BUFFER_SIZE: usize = 64 * 1024;

/// Placeholder in the command line replaced with the key-frame period in frames.
pub const INTRA_PERIOD_PLACEHOLDER: &str = "{intra_period}";

type Target = Arc<Mutex<Option<SharedSink>>>;

/// Runs `command` and streams its stdout into shards.
pub struct PipeCaptureDriver {
    command: Vec<String>,
    framerate: u32,
    flush_interval: Duration,
    target: Target,
    child: Option<Child>,
    pump: Option<thread::JoinHandle<()>>,
}

impl PipeCaptureDriver {
    pub fn new(command: Vec<String>, framerate: u32, flush_interval: Duration) -> Self {
        Self {
            command,
            framerate,
            flush_interval,
            target: Arc::new(Mutex::new(None)),
            child: None,
            pump: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    fn spawn_child(&self, hint: RotationHint) -> Result<Child, CaptureError> {
        let intra_period = (hint.key_frame_interval.as_secs_f64() * f64::from(self.framerate)).round() as u64;
        let argv = expand_command(&self.command, intra_period);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CaptureError::ConfigurationFailed("capture command is empty".into()))?;

        log::debug!("Starting capture process: {}", argv.join(" "));
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| CaptureError::DriverFailed(format!("failed to start {}: {}", program, e)))
    }

    fn flush_target(&self) -> Result<(), CaptureError> {
        if let Some(sink) = self.target.lock().as_ref() {
            sink.lock().flush()?;
        }
        Ok(())
    }
}

impl CaptureDriver for PipeCaptureDriver {
    fn start(&mut self, sink: SharedSink, hint: RotationHint) -> Result<(), CaptureError> {
        if self.child.is_some() {
            return Err(CaptureError::ConfigurationFailed("capture already running".into()));
        }

        *self.target.lock() = Some(sink);
        let mut child = match self.spawn_child(hint) {
            Ok(child) => child,
            Err(e) => {
                *self.target.lock() = None;
                return Err(e);
            }
        };

        let Some(stdout) = child.stdout.take() else {
            reap(&mut child);
            *self.target.lock() = None;
            return Err(CaptureError::DriverFailed("capture process has no stdout".into()));
        };

        let target = Arc::clone(&self.target);
        let pump = thread::Builder::new()
            .name("capture-pump".into())
            .spawn(move || {
                if let Err(e) = pump_stream(stdout, &target) {
                    log::error!("Capture stream error: {}", e);
                }
            });
        match pump {
            Ok(handle) => {
                self.pump = Some(handle);
                self.child = Some(child);
                Ok(())
            }
            Err(e) => {
                reap(&mut child);
                *self.target.lock() = None;
                Err(CaptureError::Unknown(format!("failed to spawn pump thread: {}", e)))
            }
        }
    }

    fn split_to(&mut self, sink: SharedSink) -> Result<(), CaptureError> {
        let mut target = self.target.lock();
        if let Some(previous) = target.as_ref() {
            previous.lock().flush()?;
        }
        sink.lock().flush()?;
        *target = Some(sink);
        Ok(())
    }

    fn wait_flush_interval(&mut self) -> Result<(), CaptureError> {
        thread::sleep(self.flush_interval);
        self.flush_target()?;

        if self.pump.as_ref().is_some_and(|pump| pump.is_finished()) {
            return Err(CaptureError::DriverFailed("capture process stopped streaming".into()));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(mut child) = self.child.take() {
            reap(&mut child);
        }
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                log::error!("Capture pump thread panicked");
            }
        }
        let result = self.flush_target();
        *self.target.lock() = None;
        result
    }
}

impl Drop for PipeCaptureDriver {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.stop() {
                log::error!("Failed to stop capture: {}", e);
            }
        }
    }
}

/// Substitute the key-frame period into the configured command line.
pub fn expand_command(command: &[String], intra_period: u64) -> Vec<String> {
    command
        .iter()
        .map(|arg| arg.replace(INTRA_PERIOD_PLACEHOLDER, &intra_period.to_string()))
        .collect()
}

fn pump_stream(mut stdout: ChildStdout, target: &Target) -> Result<(), CaptureError> {
    let mut buffer = vec![0u8; PUMP_BUFFER_SIZE];
    loop {
        let read = match stdout.read(&mut buffer) {
            Ok(0) => {
                log::info!("Capture stream ended");
                return Ok(());
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CaptureError::DriverFailed(format!("read failed: {}", e))),
        };

        let guard = target.lock();
        match guard.as_ref() {
            Some(sink) => sink.lock().write(&buffer[..read])?,
            None => log::warn!("Dropping {} bytes with no open shard", read),
        }
    }
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        // Already exited.
        if e.kind() != io::ErrorKind::InvalidInput {
            log::warn!("Failed to kill capture process: {}", e);
        }
    }
    match child.wait() {
        Ok(status) => log::debug!("Capture process exited: {}", status),
        Err(e) => log::warn!("Failed to reap capture process: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Instant;

    use video_capture_core::traits::video_sink::VideoSink;

    #[derive(Default)]
    struct MemorySink {
        data: Vec<u8>,
        flushes: usize,
    }

    impl VideoSink for MemorySink {
        fn open(&mut self, _path: &Path) -> Result<(), CaptureError> {
            Ok(())
        }

        fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
            self.data.extend_from_slice(data);
            Ok(())
        }

        fn flush(&mut self) -> Result<(), CaptureError> {
            self.flushes += 1;
            Ok(())
        }

        fn close(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }

        fn current_size(&self) -> u64 {
            self.data.len() as u64
        }
    }

    fn hint() -> RotationHint {
        RotationHint {
            key_frame_interval: Duration::from_secs(5),
        }
    }

    fn shell(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    fn wait_for(sink: &Arc<Mutex<MemorySink>>, len: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.lock().data.len() < len && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn expands_intra_period() {
        let command: Vec<String> = ["raspivid", "-g", "{intra_period}", "-o", "-"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(expand_command(&command, 150), vec!["raspivid", "-g", "150", "-o", "-"]);
    }

    #[cfg(unix)]
    #[test]
    fn pumps_stdout_into_sink() {
        let sink = Arc::new(Mutex::new(MemorySink::default()));
        let mut driver = PipeCaptureDriver::new(shell("printf 0123456789"), 30, Duration::ZERO);

        driver.start(sink.clone(), hint()).unwrap();
        wait_for(&sink, 10);
        driver.stop().unwrap();

        assert_eq!(sink.lock().data, b"0123456789");
        assert!(!driver.is_running());
    }

    #[cfg(unix)]
    #[test]
    fn split_retargets_later_bytes() {
        let first = Arc::new(Mutex::new(MemorySink::default()));
        let second = Arc::new(Mutex::new(MemorySink::default()));
        let mut driver = PipeCaptureDriver::new(shell("printf abc; sleep 1; printf def"), 30, Duration::ZERO);

        driver.start(first.clone(), hint()).unwrap();
        wait_for(&first, 3);
        driver.split_to(second.clone()).unwrap();
        wait_for(&second, 3);
        driver.stop().unwrap();

        assert_eq!(first.lock().data, b"abc");
        assert_eq!(second.lock().data, b"def");
        assert!(first.lock().flushes >= 1);
    }

    #[cfg(unix)]
    #[test]
    fn exited_process_fails_the_interval() {
        let sink = Arc::new(Mutex::new(MemorySink::default()));
        let mut driver = PipeCaptureDriver::new(shell("exit 0"), 30, Duration::from_millis(10));
        driver.start(sink, hint()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut result = Ok(());
        while result.is_ok() && Instant::now() < deadline {
            result = driver.wait_flush_interval();
        }

        assert!(matches!(result, Err(CaptureError::DriverFailed(_))));
        driver.stop().unwrap();
    }

    #[test]
    fn missing_program_fails_to_start() {
        let sink = Arc::new(Mutex::new(MemorySink::default()));
        let mut driver = PipeCaptureDriver::new(
            vec!["/nonexistent/video-capture-camera".into()],
            30,
            Duration::ZERO,
        );

        assert!(matches!(driver.start(sink, hint()), Err(CaptureError::DriverFailed(_))));
        assert!(!driver.is_running());
    }
}
