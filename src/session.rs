//! Recording session: one producer, one writer per active stream.
//!
//! A session is the single entry point for the capture callback. Each call to
//! [`RecordingSession::add_frame`] copies every needed buffer into a pool entry
//! exactly once and hands that entry to every writer that consumes it: the
//! raw color writer and the aligned writer share one color entry, the raw
//! depth writer and the aligned writer share one depth entry.
//!
//! `add_frame` takes `&mut self`, which is what makes the pools' scan-and-claim
//! safe. Callers that feed a session from several threads must serialise the
//! calls themselves (see [`RecordingController`](crate::RecordingController)).

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::aligned::{AlignedFrame, AlignedSink};
use crate::config::{SessionConfig, StreamKind};
use crate::error::{RecorderError, Result};
use crate::pool::FramePool;
use crate::projection::DepthToColorProjection;
use crate::raw::RawSink;
use crate::writer::{FrameSink, StreamWriter, WriterState, WriterSummary};

#[derive(Default)]
struct Pools {
    color: Option<FramePool<u8>>,
    depth: Option<FramePool<u16>>,
    index: Option<FramePool<u8>>,
}

impl Pools {
    fn teardown(self) {
        if let Some(pool) = self.color {
            pool.teardown();
        }
        if let Some(pool) = self.depth {
            pool.teardown();
        }
        if let Some(pool) = self.index {
            pool.teardown();
        }
    }
}

/// Totals of a joined session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub directory: PathBuf,
    /// `add_frame` calls accepted while the session was active.
    pub frames_added: u64,
    pub writers: Vec<WriterSummary>,
    /// Writers that stopped on an error, with the error message.
    pub failures: Vec<(StreamKind, String)>,
}

impl SessionSummary {
    /// Files written for `stream`, or `None` if the stream was not recorded.
    pub fn frames_written(&self, stream: StreamKind) -> Option<u64> {
        self.writers
            .iter()
            .find(|w| w.stream == stream)
            .map(|w| w.frames_written)
    }
}

/// A running (or stopping) recording.
pub struct RecordingSession {
    config: SessionConfig,
    directory: PathBuf,
    pools: Option<Pools>,
    color: Option<StreamWriter<RawSink<u8>>>,
    depth: Option<StreamWriter<RawSink<u16>>>,
    index: Option<StreamWriter<RawSink<u8>>>,
    tracked: Option<StreamWriter<AlignedSink>>,
    active: bool,
    frames_added: u64,
}

impl RecordingSession {
    /// Create `<base>/<timestamp>/<STREAM>/` and start one writer per active stream.
    ///
    /// `projection` is required when the tracked color stream is enabled. On
    /// error every writer that was already started is hard-stopped.
    pub fn start(
        config: SessionConfig,
        projection: Option<Box<dyn DepthToColorProjection>>,
    ) -> Result<Self> {
        config.validate()?;
        if config.streams.tracked_color && projection.is_none() {
            return Err(RecorderError::MissingProjection);
        }

        std::fs::create_dir_all(&config.base_path)
            .map_err(|e| RecorderError::io(&config.base_path, e))?;
        let directory = create_session_dir(&config.base_path)?;

        let mut session = Self {
            config,
            directory,
            pools: None,
            color: None,
            depth: None,
            index: None,
            tracked: None,
            active: false,
            frames_added: 0,
        };
        if let Err(e) = session.spawn_writers(projection) {
            session.hard_stop();
            return Err(e);
        }
        session.pools = Some(session.allocate_pools());
        session.active = true;

        tracing::info!(
            "Recording to {} ({})",
            session.directory.display(),
            session
                .config
                .streams
                .iter()
                .map(|s| s.dir_name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(session)
    }

    fn spawn_writers(&mut self, projection: Option<Box<dyn DepthToColorProjection>>) -> Result<()> {
        let streams = self.config.streams;
        let poll = self.config.poll_interval;
        if streams.color {
            self.color = Some(StreamWriter::spawn(
                StreamKind::Color,
                self.stream_dir(StreamKind::Color),
                RawSink::new(),
                poll,
            )?);
        }
        if streams.depth {
            self.depth = Some(StreamWriter::spawn(
                StreamKind::Depth,
                self.stream_dir(StreamKind::Depth),
                RawSink::new(),
                poll,
            )?);
        }
        if streams.index {
            self.index = Some(StreamWriter::spawn(
                StreamKind::Index,
                self.stream_dir(StreamKind::Index),
                RawSink::new(),
                poll,
            )?);
        }
        if let (true, Some(projection)) = (streams.tracked_color, projection) {
            self.tracked = Some(StreamWriter::spawn(
                StreamKind::TrackedColor,
                self.stream_dir(StreamKind::TrackedColor),
                AlignedSink::new(projection, self.config.geometry),
                poll,
            )?);
        }
        Ok(())
    }

    fn allocate_pools(&self) -> Pools {
        let streams = self.config.streams;
        let geometry = self.config.geometry;
        Pools {
            color: streams.needs_color().then(|| {
                FramePool::new("color", geometry.color_len(), self.config.color_pool)
            }),
            depth: streams.needs_depth().then(|| {
                FramePool::new("depth", geometry.depth_len(), self.config.depth_pool)
            }),
            index: streams.index.then(|| {
                FramePool::new("index", geometry.depth_len(), self.config.index_pool)
            }),
        }
    }

    fn stream_dir(&self, stream: StreamKind) -> PathBuf {
        self.directory.join(stream.dir_name())
    }

    /// Hand one captured frame to every interested writer. Never blocks.
    ///
    /// Buffers nobody consumes are ignored and never copied. The tracked
    /// color stream only receives a frame when both color and depth are given.
    /// Sizes are checked against the configured geometry before anything is
    /// acquired.
    pub fn add_frame(
        &mut self,
        color: Option<&[u8]>,
        depth: Option<&[u16]>,
        index: Option<&[u8]>,
    ) -> Result<()> {
        if !self.active {
            return Err(RecorderError::NotRecording);
        }
        let Some(pools) = self.pools.as_mut() else {
            return Err(RecorderError::NotRecording);
        };
        let geometry = self.config.geometry;

        let color = color.filter(|_| self.color.is_some() || self.tracked.is_some());
        let depth = depth.filter(|_| self.depth.is_some() || self.tracked.is_some());
        let index = index.filter(|_| self.index.is_some());
        let tracked = self.tracked.is_some() && color.is_some() && depth.is_some();

        check_len(StreamKind::Color, color.map(<[u8]>::len), geometry.color_len())?;
        check_len(StreamKind::Depth, depth.map(<[u16]>::len), geometry.depth_len())?;
        check_len(StreamKind::Index, index.map(<[u8]>::len), geometry.depth_len())?;

        let color_holds = usize::from(self.color.is_some() && color.is_some()) + usize::from(tracked);
        let depth_holds = usize::from(self.depth.is_some() && depth.is_some()) + usize::from(tracked);

        let color_entry = match (color, pools.color.as_mut()) {
            (Some(data), Some(pool)) if color_holds > 0 => {
                let entry = pool.acquire(color_holds);
                entry.copy_from(data);
                Some(entry)
            }
            _ => None,
        };
        let depth_entry = match (depth, pools.depth.as_mut()) {
            (Some(data), Some(pool)) if depth_holds > 0 => {
                let entry = pool.acquire(depth_holds);
                entry.copy_from(data);
                Some(entry)
            }
            _ => None,
        };

        if let (Some(writer), Some(entry)) = (&self.color, &color_entry) {
            writer.enqueue(entry.clone());
        }
        if let (Some(writer), Some(entry)) = (&self.depth, &depth_entry) {
            writer.enqueue(entry.clone());
        }
        if let (Some(writer), Some(depth), Some(color)) = (&self.tracked, depth_entry, color_entry) {
            writer.enqueue(AlignedFrame { depth, color });
        }

        if let (Some(writer), Some(data), Some(pool)) = (&self.index, index, pools.index.as_mut()) {
            let entry = pool.acquire(1);
            entry.copy_from(data);
            writer.enqueue(entry);
        }

        self.frames_added += 1;
        tracing::trace!("Frame {} queued", self.frames_added);
        Ok(())
    }

    /// Let every writer finish its backlog, then stop. Does not wait.
    pub fn soft_stop(&mut self) {
        for writer in self.writers() {
            writer.request_soft_stop();
        }
        self.end();
    }

    /// Stop every writer at its next iteration, discarding queued frames. Does not wait.
    pub fn hard_stop(&mut self) {
        for writer in self.writers() {
            writer.request_hard_stop();
        }
        self.end();
    }

    fn end(&mut self) {
        if let Some(pools) = self.pools.take() {
            pools.teardown();
        }
        if self.active {
            self.active = false;
            tracing::info!(
                "Recording stopped after {} frames: {}",
                self.frames_added,
                self.directory.display()
            );
        }
    }

    fn writers(&self) -> Vec<&dyn WriterControl> {
        let mut writers: Vec<&dyn WriterControl> = Vec::with_capacity(4);
        if let Some(w) = &self.color {
            writers.push(w);
        }
        if let Some(w) = &self.depth {
            writers.push(w);
        }
        if let Some(w) = &self.index {
            writers.push(w);
        }
        if let Some(w) = &self.tracked {
            writers.push(w);
        }
        writers
    }

    /// True between `start` and the first stop request.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True once every writer thread has stopped.
    pub fn is_finished(&self) -> bool {
        self.writer_states()
            .iter()
            .all(|(_, state)| *state == WriterState::Stopped)
    }

    /// Wait until every writer has stopped. Returns false on timeout.
    ///
    /// Only returns early after a stop was requested or every writer failed.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_finished() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(5)));
        }
    }

    /// Current state of every writer, in stream order.
    pub fn writer_states(&self) -> Vec<(StreamKind, WriterState)> {
        self.writers()
            .into_iter()
            .map(|w| (w.stream(), w.state()))
            .collect()
    }

    /// Streams whose writer stopped on a write error, with the error message.
    pub fn failures(&self) -> Vec<(StreamKind, String)> {
        self.writers()
            .into_iter()
            .filter_map(|w| w.failure().map(|message| (w.stream(), message)))
            .collect()
    }

    /// Files written so far for `stream`, or `None` if it is not recorded.
    pub fn frames_written(&self, stream: StreamKind) -> Option<u64> {
        match stream {
            StreamKind::Color => self.color.as_ref().map(|w| w.frames_written()),
            StreamKind::Depth => self.depth.as_ref().map(|w| w.frames_written()),
            StreamKind::Index => self.index.as_ref().map(|w| w.frames_written()),
            StreamKind::TrackedColor => self.tracked.as_ref().map(|w| w.frames_written()),
        }
    }

    /// `<base>/<timestamp>` directory of this session.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn frames_added(&self) -> u64 {
        self.frames_added
    }

    /// Wait for every writer thread and collect the totals.
    ///
    /// An active session is soft-stopped first. All writers are joined even
    /// if one failed; the first failure is returned. Use [`finish`](Self::finish)
    /// to keep the totals of a session with failed writers.
    pub fn join(mut self) -> Result<SessionSummary> {
        let (summary, first_error) = self.join_writers();
        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Like [`join`](Self::join), but failed writers are listed in
    /// [`SessionSummary::failures`] instead of replacing the summary.
    pub fn finish(mut self) -> SessionSummary {
        self.join_writers().0
    }

    fn join_writers(&mut self) -> (SessionSummary, Option<RecorderError>) {
        if self.active {
            self.soft_stop();
        }
        let mut writers = Vec::new();
        let mut failures = Vec::new();
        let mut first_error = None;
        let mut collect = |writer: &mut dyn JoinWriter| match writer.join_summary() {
            Ok(summary) => writers.push(summary),
            Err(e) => {
                let message = match &e {
                    RecorderError::Writer { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                writers.push(writer.partial_summary());
                failures.push((writer.stream_kind(), message));
                first_error.get_or_insert(e);
            }
        };
        if let Some(w) = self.color.as_mut() {
            collect(w);
        }
        if let Some(w) = self.depth.as_mut() {
            collect(w);
        }
        if let Some(w) = self.index.as_mut() {
            collect(w);
        }
        if let Some(w) = self.tracked.as_mut() {
            collect(w);
        }
        let summary = SessionSummary {
            directory: self.directory.clone(),
            frames_added: self.frames_added,
            writers,
            failures,
        };
        (summary, first_error)
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.active {
            self.soft_stop();
        }
    }
}

/// Object-safe view of a writer, independent of its sink type.
trait WriterControl {
    fn request_soft_stop(&self);
    fn request_hard_stop(&self);
    fn state(&self) -> WriterState;
    fn stream(&self) -> StreamKind;
    fn failure(&self) -> Option<String>;
}

impl<S: FrameSink> WriterControl for StreamWriter<S> {
    fn request_soft_stop(&self) {
        StreamWriter::request_soft_stop(self)
    }

    fn request_hard_stop(&self) {
        StreamWriter::request_hard_stop(self)
    }

    fn state(&self) -> WriterState {
        StreamWriter::state(self)
    }

    fn stream(&self) -> StreamKind {
        StreamWriter::stream(self)
    }

    fn failure(&self) -> Option<String> {
        StreamWriter::failure(self)
    }
}

/// Joinable view of a writer, independent of its sink type.
trait JoinWriter {
    fn join_summary(&mut self) -> Result<WriterSummary>;
    /// Totals of a writer whose join reported an error.
    fn partial_summary(&self) -> WriterSummary;
    fn stream_kind(&self) -> StreamKind;
}

impl<S: FrameSink> JoinWriter for StreamWriter<S> {
    fn join_summary(&mut self) -> Result<WriterSummary> {
        self.join()
    }

    fn partial_summary(&self) -> WriterSummary {
        WriterSummary {
            stream: self.stream(),
            directory: self.directory().to_path_buf(),
            frames_written: self.frames_written(),
        }
    }

    fn stream_kind(&self) -> StreamKind {
        self.stream()
    }
}

fn check_len(stream: StreamKind, actual: Option<usize>, expected: usize) -> Result<()> {
    match actual {
        Some(actual) if actual != expected => Err(RecorderError::FrameSize {
            stream,
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

/// Create a fresh `<base>/<local timestamp>` directory, suffixing `_N` on collision.
fn create_session_dir(base: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            stamp.clone()
        } else {
            format!("{}_{}", stamp, attempt)
        };
        let path = base.join(name);
        match std::fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(RecorderError::io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActiveStreams, FrameGeometry, PoolConfig};
    use crate::projection::ColorSpacePoint;

    fn geometry() -> FrameGeometry {
        FrameGeometry::new(4, 2, 2, 2)
    }

    fn config(base: &Path, streams: ActiveStreams) -> SessionConfig {
        SessionConfig::new(base)
            .streams(streams)
            .geometry(geometry())
            .color_pool(PoolConfig::new(2))
            .depth_pool(PoolConfig::new(2))
            .index_pool(PoolConfig::new(2))
            .poll_interval(Duration::from_millis(2))
    }

    /// Depth pixel i maps to color pixel (i, 0).
    fn diagonal() -> Box<dyn DepthToColorProjection> {
        Box::new(|depth: &[u16], points: &mut [ColorSpacePoint]| {
            for (i, (p, _)) in points.iter_mut().zip(depth).enumerate() {
                *p = ColorSpacePoint::new(i as f32, 0.0);
            }
        })
    }

    fn color_frame(seed: u8) -> Vec<u8> {
        (0..geometry().color_len()).map(|i| seed.wrapping_add(i as u8)).collect()
    }

    #[test]
    fn test_color_shared_with_tracked_writer() {
        let tmp = tempfile::tempdir().unwrap();
        let streams = ActiveStreams::from_kinds(&[StreamKind::Color, StreamKind::TrackedColor]);
        let mut session = RecordingSession::start(config(tmp.path(), streams), Some(diagonal())).unwrap();

        session
            .add_frame(Some(&color_frame(0)), Some(&[1, 2, 3, 4]), Some(&[0; 4]))
            .unwrap();

        let pools = session.pools.as_ref().unwrap();
        assert!(pools.index.is_none());
        let color = pools.color.as_ref().unwrap().entry(0).unwrap();
        let depth = pools.depth.as_ref().unwrap().entry(0).unwrap();
        assert_eq!(color.last_hold_count(), 2);
        assert_eq!(depth.last_hold_count(), 1);

        let summary = session.join().unwrap();
        assert_eq!(color.reference_count(), 0);
        assert_eq!(depth.reference_count(), 0);
        assert_eq!(summary.frames_written(StreamKind::Color), Some(1));
        assert_eq!(summary.frames_written(StreamKind::TrackedColor), Some(1));
        assert_eq!(summary.frames_written(StreamKind::Depth), None);

        let dir = &summary.directory;
        assert!(dir.join("COLOR/0.uint8").is_file());
        assert!(dir.join("TRACKEDCOLOR/0.uint8").is_file());
        assert!(!dir.join("DEPTH").exists());
        assert!(!dir.join("INDEX").exists());

        let tracked = std::fs::read(dir.join("TRACKEDCOLOR/0.uint8")).unwrap();
        let expected: Vec<u8> = (0..4u8)
            .flat_map(|i| [4 * i, 4 * i + 1, 4 * i + 2, 255])
            .collect();
        assert_eq!(tracked, expected);
    }

    #[test]
    fn test_depth_only_holds_once() {
        let tmp = tempfile::tempdir().unwrap();
        let streams = ActiveStreams::from_kinds(&[StreamKind::Depth]);
        let mut session = RecordingSession::start(config(tmp.path(), streams), None).unwrap();

        session.add_frame(None, Some(&[0x0102, 0, 0, 0xFFFF]), None).unwrap();
        let depth = session
            .pools
            .as_ref()
            .and_then(|p| p.depth.as_ref())
            .and_then(|p| p.entry(0))
            .unwrap();
        assert_eq!(depth.last_hold_count(), 1);
        assert!(session.pools.as_ref().unwrap().color.is_none());

        let summary = session.join().unwrap();
        let bytes = std::fs::read(summary.directory.join("DEPTH/0.uint16")).unwrap();
        assert_eq!(bytes, vec![0x02, 0x01, 0, 0, 0, 0, 0xFF, 0xFF]);
        assert!(depth.is_free());
    }

    #[test]
    fn test_tracked_needs_both_buffers() {
        let tmp = tempfile::tempdir().unwrap();
        let streams = ActiveStreams::from_kinds(&[StreamKind::TrackedColor]);
        let mut session = RecordingSession::start(config(tmp.path(), streams), Some(diagonal())).unwrap();

        // Color alone has no consumer, so nothing is acquired.
        session.add_frame(Some(&color_frame(0)), None, None).unwrap();
        assert_eq!(session.pools.as_ref().unwrap().color.as_ref().unwrap().held_count(), 0);

        session.add_frame(Some(&color_frame(1)), Some(&[1; 4]), None).unwrap();
        let summary = session.join().unwrap();
        assert_eq!(summary.frames_added, 2);
        assert_eq!(summary.frames_written(StreamKind::TrackedColor), Some(1));
    }

    #[test]
    fn test_frame_size_mismatch_acquires_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session =
            RecordingSession::start(config(tmp.path(), ActiveStreams::all()), Some(diagonal())).unwrap();

        let err = session
            .add_frame(Some(&color_frame(0)), Some(&[1; 4]), Some(&[0; 3]))
            .unwrap_err();
        assert!(matches!(
            err,
            RecorderError::FrameSize {
                stream: StreamKind::Index,
                expected: 4,
                actual: 3
            }
        ));
        let pools = session.pools.as_ref().unwrap();
        assert_eq!(pools.color.as_ref().unwrap().held_count(), 0);
        assert_eq!(pools.depth.as_ref().unwrap().held_count(), 0);

        let summary = session.join().unwrap();
        assert_eq!(summary.frames_added, 0);
        assert_eq!(summary.frames_written(StreamKind::Color), Some(0));
    }

    #[test]
    fn test_write_failure_is_confined_to_its_writer() {
        let tmp = tempfile::tempdir().unwrap();
        let streams = ActiveStreams::from_kinds(&[StreamKind::Color, StreamKind::Index]);
        let mut session = RecordingSession::start(config(tmp.path(), streams), None).unwrap();
        std::fs::remove_dir_all(session.directory().join("COLOR")).unwrap();

        for n in 0..5u8 {
            session
                .add_frame(Some(&color_frame(n)), None, Some(&[n; 4]))
                .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        let color_stopped = |s: &RecordingSession| {
            s.writer_states()
                .contains(&(StreamKind::Color, WriterState::Stopped))
        };
        while !(color_stopped(&session) && session.frames_written(StreamKind::Index) == Some(5)) {
            assert!(Instant::now() < deadline, "writers did not settle");
            std::thread::sleep(Duration::from_millis(2));
        }

        let failures = session.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, StreamKind::Color);
        assert_eq!(session.frames_written(StreamKind::Color), Some(0));
        assert!(session.is_active());
        let color_pool = session.pools.as_ref().unwrap().color.as_ref().unwrap();
        assert_eq!(color_pool.free_count(), color_pool.len());

        // The producer is not affected.
        session
            .add_frame(Some(&color_frame(5)), None, Some(&[5; 4]))
            .unwrap();
        let err = session.join().unwrap_err();
        assert!(matches!(
            err,
            RecorderError::Writer {
                stream: StreamKind::Color,
                ..
            }
        ));
    }

    #[test]
    fn test_finish_keeps_totals_of_failed_writers() {
        let tmp = tempfile::tempdir().unwrap();
        let streams = ActiveStreams::from_kinds(&[StreamKind::Depth, StreamKind::Index]);
        let mut session = RecordingSession::start(config(tmp.path(), streams), None).unwrap();
        std::fs::remove_dir_all(session.directory().join("DEPTH")).unwrap();

        for n in 0..3u8 {
            session.add_frame(None, Some(&[1; 4]), Some(&[n; 4])).unwrap();
        }
        let summary = session.finish();
        assert_eq!(summary.frames_added, 3);
        assert_eq!(summary.frames_written(StreamKind::Index), Some(3));
        assert_eq!(summary.frames_written(StreamKind::Depth), Some(0));
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, StreamKind::Depth);
        assert!(summary.failures[0].1.contains("0.uint16"));
    }

    #[test]
    fn test_unusable_base_path_starts_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("takes");
        std::fs::write(&file, b"not a directory").unwrap();

        let streams = ActiveStreams::from_kinds(&[StreamKind::Depth]);
        let result = RecordingSession::start(config(&file, streams), None);
        assert!(matches!(result, Err(RecorderError::Io { .. })));
        assert!(file.is_file());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_tracked_without_projection_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let result = RecordingSession::start(config(tmp.path(), ActiveStreams::all()), None);
        assert!(matches!(result, Err(RecorderError::MissingProjection)));
        // Nothing was created.
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_add_after_stop_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let streams = ActiveStreams::from_kinds(&[StreamKind::Index]);
        let mut session = RecordingSession::start(config(tmp.path(), streams), None).unwrap();

        session.add_frame(None, None, Some(&[1, 2, 3, 4])).unwrap();
        session.soft_stop();
        assert!(!session.is_active());
        assert!(matches!(
            session.add_frame(None, None, Some(&[1, 2, 3, 4])),
            Err(RecorderError::NotRecording)
        ));
        assert!(session.wait_until_stopped(Duration::from_secs(5)));
        assert!(session.is_finished());
        assert_eq!(session.frames_written(StreamKind::Index), Some(1));
        assert!(session.failures().is_empty());
    }

    #[test]
    fn test_hard_stop_stops_every_writer() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session =
            RecordingSession::start(config(tmp.path(), ActiveStreams::all()), Some(diagonal())).unwrap();
        for seed in 0..5 {
            session
                .add_frame(Some(&color_frame(seed)), Some(&[1; 4]), Some(&[0; 4]))
                .unwrap();
        }
        session.hard_stop();
        assert!(session.wait_until_stopped(Duration::from_secs(5)));
        assert!(session
            .writer_states()
            .iter()
            .all(|(_, s)| *s == WriterState::Stopped));
        session.join().unwrap();
    }

    #[test]
    fn test_session_dirs_never_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let streams = ActiveStreams::from_kinds(&[StreamKind::Index]);
        let a = RecordingSession::start(config(tmp.path(), streams), None).unwrap();
        let b = RecordingSession::start(config(tmp.path(), streams), None).unwrap();
        assert_ne!(a.directory(), b.directory());
        assert!(a.directory().join("INDEX").is_dir());
        assert!(b.directory().join("INDEX").is_dir());
        a.join().unwrap();
        b.join().unwrap();
    }
}
