//! Interactive recorder front-end.
//!
//! [`RecordingController`] is what a capture loop or UI talks to: it owns the
//! per-stream toggles and the save rate, starts and stops sessions, and keeps
//! stopped sessions around until their writers have drained.
//!
//! ```no_run
//! use rgbd_recorder::{CaptureSource, PatternSource, PinholeProjection, RecordingController, SessionConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut source = PatternSource::new(Default::default());
//! let mut recorder = RecordingController::new(SessionConfig::default())
//!     .with_projection(PinholeProjection::default());
//! recorder.set_save_fps(10);
//!
//! recorder.start_recording("recordings")?;
//! for _ in 0..90 {
//!     if let Some(frame) = source.next_frame()? {
//!         recorder.on_frame(&frame)?;
//!     }
//! }
//! recorder.stop_recording()?;
//! while recorder.is_saving() {
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::capture::CaptureFrame;
use crate::config::{ActiveStreams, SessionConfig, StreamKind};
use crate::error::{RecorderError, Result};
use crate::projection::DepthToColorProjection;
use crate::session::{RecordingSession, SessionSummary};

/// Default rate at which frames are handed to the writers.
pub const DEFAULT_SAVE_FPS: u32 = 10;
/// Default rate at which the capture source delivers frames.
pub const DEFAULT_CAPTURE_FPS: u32 = 30;

type ProjectionFactory = Box<dyn Fn() -> Box<dyn DepthToColorProjection> + Send>;

/// Starts, feeds and drains recording sessions.
pub struct RecordingController {
    template: SessionConfig,
    streams: ActiveStreams,
    projection: Option<ProjectionFactory>,
    save_fps: u32,
    capture_fps: u32,
    frame_counter: u64,
    active: Option<RecordingSession>,
    draining: Vec<RecordingSession>,
    completed: Vec<SessionSummary>,
}

impl RecordingController {
    /// `template` supplies geometry, pool sizes and the initial toggles; its
    /// base path is replaced by the one given to [`start_recording`](Self::start_recording).
    pub fn new(template: SessionConfig) -> Self {
        Self {
            streams: template.streams,
            template,
            projection: None,
            save_fps: DEFAULT_SAVE_FPS,
            capture_fps: DEFAULT_CAPTURE_FPS,
            frame_counter: 0,
            active: None,
            draining: Vec::new(),
            completed: Vec::new(),
        }
    }

    /// Projection used by the tracked color stream of every session.
    #[must_use]
    pub fn with_projection<P>(mut self, projection: P) -> Self
    where
        P: DepthToColorProjection + Clone + 'static,
    {
        self.projection = Some(Box::new(move || Box::new(projection.clone())));
        self
    }

    pub fn streams(&self) -> ActiveStreams {
        self.streams
    }

    /// Flip a stream. Takes effect for the running session's next frame and
    /// for the writer set of the next session.
    pub fn toggle(&mut self, stream: StreamKind) -> bool {
        let enabled = self.streams.toggle(stream);
        tracing::info!("{} stream {}", stream, if enabled { "enabled" } else { "disabled" });
        enabled
    }

    pub fn toggle_color(&mut self) -> bool {
        self.toggle(StreamKind::Color)
    }

    pub fn toggle_depth(&mut self) -> bool {
        self.toggle(StreamKind::Depth)
    }

    pub fn toggle_index(&mut self) -> bool {
        self.toggle(StreamKind::Index)
    }

    pub fn toggle_tracked_color(&mut self) -> bool {
        self.toggle(StreamKind::TrackedColor)
    }

    /// Frames per second to keep, clamped to the capture rate. Zero keeps none.
    pub fn set_save_fps(&mut self, fps: u32) {
        self.save_fps = fps.min(self.capture_fps);
    }

    pub fn save_fps(&self) -> u32 {
        self.save_fps
    }

    pub fn set_capture_fps(&mut self, fps: u32) {
        self.capture_fps = fps.max(1);
        self.save_fps = self.save_fps.min(self.capture_fps);
    }

    pub fn capture_fps(&self) -> u32 {
        self.capture_fps
    }

    /// Whether the `counter`-th captured frame (1-based) is kept.
    fn keeps(&self, counter: u64) -> bool {
        if self.save_fps == 0 {
            return false;
        }
        let every = (self.capture_fps / self.save_fps).max(1) as u64;
        counter % every == 0
    }

    /// Start a session under `base_path` with the current toggles.
    ///
    /// Returns the new session directory.
    pub fn start_recording(&mut self, base_path: impl AsRef<Path>) -> Result<PathBuf> {
        if self.active.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        let config = self
            .template
            .clone()
            .streams(self.streams)
            .base_path(base_path.as_ref());
        let projection = match &self.projection {
            Some(factory) if self.streams.tracked_color => Some(factory()),
            _ => None,
        };
        let session = RecordingSession::start(config, projection)?;
        let directory = session.directory().to_path_buf();
        self.active = Some(session);
        Ok(directory)
    }

    /// Soft-stop the running session. It keeps writing its backlog; see
    /// [`is_saving`](Self::is_saving).
    pub fn stop_recording(&mut self) -> Result<()> {
        let mut session = self.active.take().ok_or(RecorderError::NotRecording)?;
        session.soft_stop();
        self.draining.push(session);
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// True while a stopped session is still writing. Reaps finished sessions.
    pub fn is_saving(&mut self) -> bool {
        self.reap();
        !self.draining.is_empty()
    }

    fn reap(&mut self) {
        let (finished, pending): (Vec<_>, Vec<_>) =
            self.draining.drain(..).partition(RecordingSession::is_finished);
        self.draining = pending;
        for session in finished {
            let summary = session.finish();
            for (stream, message) in &summary.failures {
                tracing::error!(
                    "Recording {}: {} writer failed: {}",
                    summary.directory.display(),
                    stream,
                    message
                );
            }
            tracing::info!(
                "Finished saving {} ({} frames)",
                summary.directory.display(),
                summary.frames_added
            );
            self.completed.push(summary);
        }
    }

    /// Wait for every stopped session to finish writing. Returns false on timeout.
    pub fn wait_until_saved(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_saving() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }

    /// Summaries of sessions that finished saving, oldest first.
    pub fn completed(&self) -> &[SessionSummary] {
        &self.completed
    }

    /// The running session, if any.
    pub fn session(&self) -> Option<&RecordingSession> {
        self.active.as_ref()
    }

    /// Capture callback. Returns whether the frame was handed to the writers.
    ///
    /// Every call advances the frame counter, recording or not, so the kept
    /// frames stay evenly spaced across start and stop.
    pub fn on_frame(&mut self, frame: &CaptureFrame<'_>) -> Result<bool> {
        self.frame_counter += 1;
        if !self.keeps(self.frame_counter) {
            return Ok(false);
        }
        let Some(session) = self.active.as_mut() else {
            return Ok(false);
        };

        let streams = self.streams;
        let color = (streams.color || streams.tracked_color).then_some(frame.color);
        let depth = (streams.depth || streams.tracked_color).then_some(frame.depth);
        let index = frame.index.filter(|_| streams.index);
        if streams.index && frame.index.is_none() {
            tracing::trace!("Frame {} has no body index", self.frame_counter);
        }

        session.add_frame(color, depth, index)?;
        Ok(true)
    }

    /// Hard-stop the running session and every draining one. Does not wait.
    pub fn shutdown(&mut self) {
        if let Some(mut session) = self.active.take() {
            session.hard_stop();
            self.draining.push(session);
        }
        for session in &mut self.draining {
            session.hard_stop();
        }
    }
}
