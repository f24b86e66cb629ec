//! Non-blocking multi-stream RGB-D recorder.
//!
//! Records synchronized color, depth, body-index and depth-aligned color
//! ("tracked color") frames to disk without ever blocking the capture
//! callback. Frames are copied once into reference-counted pooled buffers and
//! handed to one background writer thread per stream.
//!
//! # Quick Start
//!
//! ```no_run
//! use rgbd_recorder::{ActiveStreams, PinholeProjection, RecordingSession, SessionConfig, StreamKind};
//!
//! # fn main() -> rgbd_recorder::Result<()> {
//! let config = SessionConfig::new("recordings")
//!     .streams(ActiveStreams::from_kinds(&[StreamKind::Depth, StreamKind::TrackedColor]));
//! let mut session = RecordingSession::start(config, Some(Box::new(PinholeProjection::default())))?;
//!
//! let color = vec![0u8; 1920 * 1080 * 4];
//! let depth = vec![1500u16; 512 * 424];
//! session.add_frame(Some(&color), Some(&depth), None)?;
//!
//! let summary = session.join()?;
//! println!("{} frames in {}", summary.frames_added, summary.directory.display());
//! # Ok(())
//! # }
//! ```
//!
//! # Output layout
//!
//! ```text
//! <base>/<YYYY-MM-DD_HH-MM-SS>/COLOR/<n>.uint8         RGBA8, color resolution
//!                             /DEPTH/<n>.uint16        u16 little-endian
//!                             /INDEX/<n>.uint8         u8 body mask, 255 = no body
//!                             /TRACKEDCOLOR/<n>.uint8  RGBA8, depth resolution
//! ```
//!
//! # Feature Flags
//!
//! - `image` - PNG export of recorded frames ([`export`])
//! - `realsense` - Intel RealSense capture source (requires librealsense2-dev)

pub mod aligned;
pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod playback;
pub mod pool;
pub mod projection;
pub mod raw;
pub mod session;
pub mod writer;

#[cfg(feature = "image")]
pub mod export;

#[cfg(feature = "realsense")]
pub mod realsense;

pub use aligned::{align_color_to_depth, AlignedFrame, AlignedSink};
pub use capture::{CaptureFrame, CaptureSource, PatternSource};
pub use config::{ActiveStreams, FrameGeometry, PoolConfig, SessionConfig, StreamKind};
pub use controller::RecordingController;
pub use error::{RecorderError, Result};
pub use playback::RecordingReader;
pub use pool::{FramePool, PoolEntry};
pub use projection::{ColorSpacePoint, DepthToColorProjection, Extrinsics, Intrinsics, PinholeProjection};
pub use raw::{RawSample, RawSink};
pub use session::{RecordingSession, SessionSummary};
pub use writer::{FrameSink, Releasable, StreamWriter, WriterState, WriterSummary};

#[cfg(feature = "realsense")]
pub use realsense::RealSenseSource;
