//! Paced host loop for headless hosts.
//!
//! Renderers with their own frame loop call the two session phases
//! themselves. `FrameDriver` is for hosts without one (tools, services,
//! tests): it runs update, the caller's frame body and end-of-frame
//! presentation in order at a target rate until stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::{DuplicationError, DuplicationResult};
use crate::session::{DuplicationSession, TickReport};

#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Target frames per second. `0` runs uncapped.
    pub target_fps: u32,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            max_frames: None,
        }
    }
}

/// Live counters, updated by the running loop and readable from any
/// thread through [`FrameDriver::stats`].
#[derive(Debug, Default)]
pub struct DriverStats {
    pub frames: AtomicU64,
    /// End-of-frame blits issued across all monitors.
    pub renders: AtomicU64,
    pub reinitializations: AtomicU64,
    /// Effective FPS over the last second, stored as `f64` bits.
    pub current_fps: AtomicU64,
}

impl DriverStats {
    pub fn snapshot(&self) -> DriverStatsSnapshot {
        DriverStatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            renders: self.renders.load(Ordering::Relaxed),
            reinitializations: self.reinitializations.load(Ordering::Relaxed),
            current_fps: f64::from_bits(self.current_fps.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DriverStatsSnapshot {
    pub frames: u64,
    pub renders: u64,
    pub reinitializations: u64,
    pub current_fps: f64,
}

/// Passed to the frame body between the two phases.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext {
    pub index: u64,
    pub dt: Duration,
    pub report: TickReport,
}

/// Cloneable stop signal for a running [`FrameDriver`].
#[derive(Clone, Debug)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// The loop exits before starting its next frame.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct FrameDriver {
    config: DriverConfig,
    stop_flag: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    stats: Arc<DriverStats>,
}

/// Clears the running flag however the loop exits.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FrameDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            stop_flag: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(DriverStats::default()),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop_flag.clone())
    }

    pub fn stats(&self) -> &Arc<DriverStats> {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run frames until stopped, `max_frames` is reached or `frame`
    /// returns `false`. Only one loop may run per driver at a time; a
    /// second `run` while one is active fails without touching the
    /// session. A finished driver can be run again.
    pub fn run<F>(
        &self,
        session: &mut DuplicationSession,
        mut frame: F,
    ) -> DuplicationResult<DriverStatsSnapshot>
    where
        F: FnMut(&mut DuplicationSession, &FrameContext) -> bool,
    {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(DuplicationError::InvalidConfig(
                "frame driver is already running".into(),
            ));
        }
        let _guard = RunningGuard(&self.running);
        self.stop_flag.store(false, Ordering::Release);

        let interval = (self.config.target_fps > 0)
            .then(|| Duration::from_secs_f64(1.0 / self.config.target_fps as f64));
        let mut index: u64 = 0;
        let mut last_tick: Option<Instant> = None;
        let mut fps_counter: u64 = 0;
        let mut fps_epoch = Instant::now();

        tracing::debug!(target_fps = self.config.target_fps, "frame driver started");
        loop {
            if self.stop_flag.load(Ordering::Acquire) {
                break;
            }
            if self.config.max_frames.is_some_and(|max| index >= max) {
                break;
            }

            let frame_start = Instant::now();
            let dt = last_tick
                .map(|last| frame_start.saturating_duration_since(last))
                .unwrap_or(Duration::ZERO);
            last_tick = Some(frame_start);

            let report = session.poll_and_reconcile(dt);
            if report.reinitialized.is_some() {
                self.stats.reinitializations.fetch_add(1, Ordering::Relaxed);
            }
            let context = FrameContext { index, dt, report };
            let keep_going = frame(session, &context);
            let rendered = session.present_dirty_textures();

            self.stats.frames.fetch_add(1, Ordering::Relaxed);
            self.stats
                .renders
                .fetch_add(rendered as u64, Ordering::Relaxed);
            index += 1;

            fps_counter += 1;
            let fps_elapsed = fps_epoch.elapsed();
            if fps_elapsed >= Duration::from_secs(1) {
                let fps = fps_counter as f64 / fps_elapsed.as_secs_f64();
                self.stats.current_fps.store(fps.to_bits(), Ordering::Relaxed);
                fps_counter = 0;
                fps_epoch = Instant::now();
            }

            if !keep_going {
                break;
            }

            if let Some(interval) = interval {
                let elapsed = frame_start.elapsed();
                if elapsed < interval {
                    spin_sleep(interval - elapsed);
                }
            }
        }
        tracing::debug!(frames = index, "frame driver stopped");

        Ok(self.stats.snapshot())
    }
}

/// Sleep that spins for the final sub-millisecond portion, since OS timer
/// resolution is too coarse for frame pacing.
fn spin_sleep(duration: Duration) {
    const SPIN_THRESHOLD: Duration = Duration::from_micros(1500);

    let target = Instant::now() + duration;
    if duration > SPIN_THRESHOLD {
        std::thread::sleep(duration - SPIN_THRESHOLD);
    }
    while Instant::now() < target {
        std::hint::spin_loop();
    }
}
