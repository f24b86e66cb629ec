//! Frame sources feeding a recorder.
//!
//! A [`CaptureSource`] lends out its latest frame; the recorder copies what it
//! needs into pooled buffers before asking for the next one.

use std::time::{Duration, Instant};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::FrameGeometry;

/// Body-index value for pixels that belong to no tracked body.
pub const NO_BODY: u8 = 255;

/// One multi-source frame, borrowed from its source.
#[derive(Debug, Clone, Copy)]
pub struct CaptureFrame<'a> {
    /// RGBA8 at color resolution.
    pub color: &'a [u8],
    /// Depth in millimeters at depth resolution.
    pub depth: &'a [u16],
    /// Body-index mask at depth resolution, if the device produces one.
    pub index: Option<&'a [u8]>,
}

/// A device or generator producing RGB-D frames.
pub trait CaptureSource {
    /// Resolutions of the frames this source produces.
    fn geometry(&self) -> FrameGeometry;

    /// Block until the next frame is available. `None` means the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<CaptureFrame<'_>>>;
}

/// Deterministic synthetic RGB-D source.
///
/// Renders a color gradient, a left-to-right depth ramp (1500 to 4000 mm) and a
/// "body" disc at 1200 mm that drifts across the scene. The disc is body 0 in
/// the index mask; everything else is [`NO_BODY`].
pub struct PatternSource {
    geometry: FrameGeometry,
    fps: u32,
    noise_mm: u16,
    frame_limit: Option<u64>,
    rng: StdRng,
    frame_number: u64,
    next_deadline: Option<Instant>,
    color: Vec<u8>,
    depth: Vec<u16>,
    index: Vec<u8>,
}

impl PatternSource {
    pub fn new(geometry: FrameGeometry) -> Self {
        let mut color = vec![0u8; geometry.color_len()];
        let (w, h) = (geometry.color_width.max(1), geometry.color_height.max(1));
        for (i, px) in color.chunks_exact_mut(4).enumerate() {
            let (x, y) = (i % w, i / w);
            px[0] = (x * 255 / w) as u8;
            px[1] = (y * 255 / h) as u8;
            px[3] = 0xFF;
        }
        Self {
            geometry,
            fps: 30,
            noise_mm: 0,
            frame_limit: None,
            rng: StdRng::seed_from_u64(0),
            frame_number: 0,
            next_deadline: None,
            color,
            depth: vec![0; geometry.depth_len()],
            index: vec![NO_BODY; geometry.depth_len()],
        }
    }

    /// Target frame rate. Zero renders as fast as possible.
    #[must_use]
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Add uniform noise of up to `amplitude_mm` to every valid depth sample.
    #[must_use]
    pub fn noise(mut self, amplitude_mm: u16) -> Self {
        self.noise_mm = amplitude_mm;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Stop after `frames` frames.
    #[must_use]
    pub fn frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Frames produced so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    fn pace(&mut self) {
        if self.fps == 0 {
            return;
        }
        let period = Duration::from_secs_f64(1.0 / self.fps as f64);
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Don't try to catch up after a stall.
        self.next_deadline = Some(deadline.max(now) + period);
    }

    fn render(&mut self) {
        let (w, h) = (self.geometry.depth_width, self.geometry.depth_height);
        let radius = (h / 5).max(1);
        let span = (w / 2).max(1);
        let cx = w / 4 + (self.frame_number as usize * 2) % span;
        let cy = h / 2;

        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let (dx, dy) = (x.abs_diff(cx), y.abs_diff(cy));
                let on_body = dx * dx + dy * dy <= radius * radius;
                let mut depth = if on_body {
                    1200
                } else {
                    1500 + (x * 2500 / w.max(1)) as u16
                };
                if self.noise_mm > 0 {
                    let n = self.noise_mm as i32;
                    depth = (depth as i32 + self.rng.random_range(-n..=n)).clamp(1, u16::MAX as i32) as u16;
                }
                self.depth[i] = depth;
                self.index[i] = if on_body { 0 } else { NO_BODY };
            }
        }

        let blue = (self.frame_number % 256) as u8;
        for px in self.color.chunks_exact_mut(4) {
            px[2] = blue;
        }
    }
}

impl CaptureSource for PatternSource {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn next_frame(&mut self) -> Result<Option<CaptureFrame<'_>>> {
        if self.frame_limit.is_some_and(|limit| self.frame_number >= limit) {
            return Ok(None);
        }
        self.pace();
        self.render();
        self.frame_number += 1;
        Ok(Some(CaptureFrame {
            color: &self.color,
            depth: &self.depth,
            index: Some(&self.index),
        }))
    }
}
