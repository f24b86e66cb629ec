//! Stream, geometry and session configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RecorderError, Result};

/// Default number of color buffers allocated up front.
pub const COLOR_POOL_SIZE: usize = 30;
/// Default number of depth buffers allocated up front.
pub const DEPTH_POOL_SIZE: usize = 10;
/// Default number of body-index buffers allocated up front.
pub const INDEX_POOL_SIZE: usize = 10;
/// Entries added to a pool each time it runs dry.
pub const DEFAULT_GROW_STEP: usize = 10;
/// How long an idle writer waits on its queue before re-checking stop requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One output stream of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// RGBA8 color at color resolution.
    Color,
    /// u16 depth samples at depth resolution.
    Depth,
    /// u8 body-segmentation mask at depth resolution.
    Index,
    /// RGBA8 color resampled into the depth pixel grid.
    TrackedColor,
}

impl StreamKind {
    /// All streams, in output order.
    pub const ALL: [StreamKind; 4] = [
        StreamKind::Color,
        StreamKind::Depth,
        StreamKind::Index,
        StreamKind::TrackedColor,
    ];

    /// Subdirectory name inside a session directory.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Color => "COLOR",
            Self::Depth => "DEPTH",
            Self::Index => "INDEX",
            Self::TrackedColor => "TRACKEDCOLOR",
        }
    }

    /// File extension of each frame file (without the dot).
    pub fn extension(self) -> &'static str {
        match self {
            Self::Depth => "uint16",
            Self::Color | Self::Index | Self::TrackedColor => "uint8",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Which streams a session records. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveStreams {
    pub color: bool,
    pub depth: bool,
    pub index: bool,
    pub tracked_color: bool,
}

impl Default for ActiveStreams {
    fn default() -> Self {
        Self::all()
    }
}

impl ActiveStreams {
    /// Every stream enabled.
    pub fn all() -> Self {
        Self {
            color: true,
            depth: true,
            index: true,
            tracked_color: true,
        }
    }

    /// Every stream disabled.
    pub fn none() -> Self {
        Self {
            color: false,
            depth: false,
            index: false,
            tracked_color: false,
        }
    }

    /// Build a set from a list of stream kinds.
    pub fn from_kinds(kinds: &[StreamKind]) -> Self {
        let mut set = Self::none();
        for &kind in kinds {
            set.set(kind, true);
        }
        set
    }

    pub fn contains(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Color => self.color,
            StreamKind::Depth => self.depth,
            StreamKind::Index => self.index,
            StreamKind::TrackedColor => self.tracked_color,
        }
    }

    pub fn set(&mut self, kind: StreamKind, enabled: bool) {
        match kind {
            StreamKind::Color => self.color = enabled,
            StreamKind::Depth => self.depth = enabled,
            StreamKind::Index => self.index = enabled,
            StreamKind::TrackedColor => self.tracked_color = enabled,
        }
    }

    /// Flip one stream on or off, returning its new state.
    pub fn toggle(&mut self, kind: StreamKind) -> bool {
        let enabled = !self.contains(kind);
        self.set(kind, enabled);
        enabled
    }

    pub fn is_empty(&self) -> bool {
        !(self.color || self.depth || self.index || self.tracked_color)
    }

    /// Enabled streams, in output order.
    pub fn iter(&self) -> impl Iterator<Item = StreamKind> + '_ {
        StreamKind::ALL.into_iter().filter(|k| self.contains(*k))
    }

    /// Whether a color buffer is needed at all (raw color or aligned output).
    pub fn needs_color(&self) -> bool {
        self.color || self.tracked_color
    }

    /// Whether a depth buffer is needed at all (raw depth or aligned output).
    pub fn needs_depth(&self) -> bool {
        self.depth || self.tracked_color
    }
}

/// Fixed sensor resolutions. Files carry no header, so readers need the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub color_width: usize,
    pub color_height: usize,
    /// Depth and body-index share this resolution.
    pub depth_width: usize,
    pub depth_height: usize,
}

impl Default for FrameGeometry {
    /// Kinect v2: 1920x1080 color, 512x424 depth and body index.
    fn default() -> Self {
        Self {
            color_width: 1920,
            color_height: 1080,
            depth_width: 512,
            depth_height: 424,
        }
    }
}

impl FrameGeometry {
    pub fn new(color_width: usize, color_height: usize, depth_width: usize, depth_height: usize) -> Self {
        Self {
            color_width,
            color_height,
            depth_width,
            depth_height,
        }
    }

    /// Color pixel count.
    pub fn color_pixels(&self) -> usize {
        self.color_width * self.color_height
    }

    /// RGBA color buffer length in bytes.
    pub fn color_len(&self) -> usize {
        self.color_pixels() * 4
    }

    /// Depth (and index) pixel count.
    pub fn depth_len(&self) -> usize {
        self.depth_width * self.depth_height
    }

    /// Tracked-color buffer length in bytes (RGBA at depth resolution).
    pub fn tracked_color_len(&self) -> usize {
        self.depth_len() * 4
    }

    /// Number of samples one frame of `stream` holds.
    pub fn samples(&self, stream: StreamKind) -> usize {
        match stream {
            StreamKind::Color => self.color_len(),
            StreamKind::Depth | StreamKind::Index => self.depth_len(),
            StreamKind::TrackedColor => self.tracked_color_len(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.color_pixels() == 0 || self.depth_len() == 0 {
            return Err(RecorderError::invalid_config(format!(
                "frame dimensions must be non-zero (color {}x{}, depth {}x{})",
                self.color_width, self.color_height, self.depth_width, self.depth_height
            )));
        }
        Ok(())
    }
}

/// Sizing of one buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Entries allocated when the pool is created.
    pub pre_alloc_count: usize,
    /// Entries added when no free entry is found. Must be at least 1.
    pub grow_step: usize,
}

impl PoolConfig {
    pub fn new(pre_alloc_count: usize) -> Self {
        Self {
            pre_alloc_count,
            grow_step: DEFAULT_GROW_STEP,
        }
    }

    #[must_use]
    pub fn grow_step(mut self, grow_step: usize) -> Self {
        self.grow_step = grow_step;
        self
    }
}

/// Configuration for a [`RecordingSession`](crate::RecordingSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory under which the timestamped session directory is created.
    pub base_path: PathBuf,
    pub streams: ActiveStreams,
    pub geometry: FrameGeometry,
    pub color_pool: PoolConfig,
    pub depth_pool: PoolConfig,
    pub index_pool: PoolConfig,
    /// Maximum time an idle writer sleeps before re-checking for stop requests.
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("recordings"),
            streams: ActiveStreams::all(),
            geometry: FrameGeometry::default(),
            color_pool: PoolConfig::new(COLOR_POOL_SIZE),
            depth_pool: PoolConfig::new(DEPTH_POOL_SIZE),
            index_pool: PoolConfig::new(INDEX_POOL_SIZE),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl SessionConfig {
    /// Create a configuration recording into `base_path` with default settings.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = base_path.into();
        self
    }

    #[must_use]
    pub fn streams(mut self, streams: ActiveStreams) -> Self {
        self.streams = streams;
        self
    }

    #[must_use]
    pub fn geometry(mut self, geometry: FrameGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    #[must_use]
    pub fn color_pool(mut self, pool: PoolConfig) -> Self {
        self.color_pool = pool;
        self
    }

    #[must_use]
    pub fn depth_pool(mut self, pool: PoolConfig) -> Self {
        self.depth_pool = pool;
        self
    }

    #[must_use]
    pub fn index_pool(mut self, pool: PoolConfig) -> Self {
        self.index_pool = pool;
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Check the configuration before any directory or thread is created.
    pub fn validate(&self) -> Result<()> {
        if self.streams.is_empty() {
            return Err(RecorderError::NoActiveStreams);
        }
        self.geometry.validate()?;
        for (name, pool) in [
            ("color", &self.color_pool),
            ("depth", &self.depth_pool),
            ("index", &self.index_pool),
        ] {
            if pool.grow_step == 0 {
                return Err(RecorderError::invalid_config(format!(
                    "{} pool grow step must be at least 1",
                    name
                )));
            }
        }
        if self.poll_interval.is_zero() {
            return Err(RecorderError::invalid_config("poll interval must be non-zero"));
        }
        Ok(())
    }
}
