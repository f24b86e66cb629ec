//! Depth-aligned color ("tracked color") sink.
//!
//! For each (depth, color) pair the sink asks the projection where every depth
//! pixel lands in the color image and samples that color pixel, producing an
//! RGBA image in the depth sensor's pixel grid. Sampling is nearest-pixel;
//! depth pixels that land outside the color image stay transparent black.

use std::io::Write;

use crate::config::FrameGeometry;
use crate::pool::PoolEntry;
use crate::projection::{ColorSpacePoint, DepthToColorProjection};
use crate::writer::{FrameSink, Releasable};

/// A depth buffer and the color buffer captured with it.
#[derive(Debug)]
pub struct AlignedFrame {
    pub depth: PoolEntry<u16>,
    pub color: PoolEntry<u8>,
}

impl Releasable for AlignedFrame {
    fn release(self) {
        self.depth.release();
        self.color.release();
    }
}

/// Resample RGBA `color` into the depth grid described by `points`.
///
/// `output` must hold `points.len() * 4` bytes; it is cleared first. A point
/// maps to color pixel `(floor(x + 0.5), floor(y + 0.5))`; non-finite or
/// out-of-image points leave the output pixel at `(0, 0, 0, 0)`. Alpha of
/// mapped pixels is always 255.
pub fn align_color_to_depth(
    points: &[ColorSpacePoint],
    color: &[u8],
    color_width: usize,
    color_height: usize,
    output: &mut [u8],
) {
    debug_assert_eq!(output.len(), points.len() * 4);
    debug_assert!(color.len() >= color_width * color_height * 4);
    output.fill(0);

    let (w, h) = (color_width as f32, color_height as f32);
    for (dst, point) in output.chunks_exact_mut(4).zip(points) {
        let cx = (point.x + 0.5).floor();
        let cy = (point.y + 0.5).floor();
        // NaN fails every comparison, infinities fail the range checks.
        if !(cx >= 0.0 && cx < w && cy >= 0.0 && cy < h) {
            continue;
        }
        let src = (cy as usize * color_width + cx as usize) * 4;
        dst[..3].copy_from_slice(&color[src..src + 3]);
        dst[3] = 0xFF;
    }
}

/// Writes depth-aligned RGBA frames at depth resolution.
pub struct AlignedSink {
    projection: Box<dyn DepthToColorProjection>,
    geometry: FrameGeometry,
    points: Vec<ColorSpacePoint>,
    output: Vec<u8>,
}

impl AlignedSink {
    /// Scratch buffers are allocated here, once per writer.
    pub fn new(projection: Box<dyn DepthToColorProjection>, geometry: FrameGeometry) -> Self {
        Self {
            projection,
            geometry,
            points: vec![ColorSpacePoint::default(); geometry.depth_len()],
            output: vec![0; geometry.tracked_color_len()],
        }
    }

    /// Compute the aligned image for one pair into the internal output buffer.
    pub fn render(&mut self, frame: &AlignedFrame) -> &[u8] {
        {
            let depth = frame.depth.read();
            self.projection
                .map_depth_frame_to_color_space(&depth, &mut self.points);
        }
        let color = frame.color.read();
        align_color_to_depth(
            &self.points,
            &color,
            self.geometry.color_width,
            self.geometry.color_height,
            &mut self.output,
        );
        &self.output
    }
}

impl FrameSink for AlignedSink {
    type Item = AlignedFrame;

    fn write_frame(&mut self, item: &Self::Item, out: &mut dyn Write) -> std::io::Result<()> {
        let image = self.render(item);
        out.write_all(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::FramePool;

    /// 3x2 color image, pixel i = (10*i, 10*i+1, 10*i+2, 7).
    fn color_3x2() -> Vec<u8> {
        (0..6u8)
            .flat_map(|i| [10 * i, 10 * i + 1, 10 * i + 2, 7])
            .collect()
    }

    #[test]
    fn test_in_bounds_copies_rgb_and_forces_alpha() {
        let color = color_3x2();
        let points = [ColorSpacePoint::new(1.0, 1.0), ColorSpacePoint::new(0.2, 0.0)];
        let mut out = vec![0xAA; 8];
        align_color_to_depth(&points, &color, 3, 2, &mut out);
        assert_eq!(&out[0..4], &[40, 41, 42, 255]);
        assert_eq!(&out[4..8], &[0, 1, 2, 255]);
    }

    #[test]
    fn test_out_of_bounds_is_transparent_black() {
        let color = color_3x2();
        let points = [
            ColorSpacePoint::new(-0.6, 0.0),
            ColorSpacePoint::new(2.5, 0.0),
            ColorSpacePoint::new(0.0, 1.5),
            ColorSpacePoint::INVALID,
            ColorSpacePoint::new(f32::NAN, 0.0),
            ColorSpacePoint::new(f32::INFINITY, 1.0),
        ];
        let mut out = vec![0xAA; points.len() * 4];
        align_color_to_depth(&points, &color, 3, 2, &mut out);
        assert!(out.iter().all(|&b| b == 0), "got {:?}", out);
    }

    #[test]
    fn test_round_half_up() {
        let color = color_3x2();
        let points = [
            // -0.5 rounds up to 0
            ColorSpacePoint::new(-0.5, -0.5),
            // 1.49 rounds to 1, 0.5 rounds to 1
            ColorSpacePoint::new(1.49, 0.5),
            // 1.5 rounds to 2
            ColorSpacePoint::new(1.5, 0.0),
        ];
        let mut out = vec![0; 12];
        align_color_to_depth(&points, &color, 3, 2, &mut out);
        assert_eq!(&out[0..4], &[0, 1, 2, 255]);
        assert_eq!(&out[4..8], &[40, 41, 42, 255]);
        assert_eq!(&out[8..12], &[20, 21, 22, 255]);
    }

    #[test]
    fn test_sink_uses_projection_and_depth() {
        let geometry = FrameGeometry::new(3, 2, 2, 1);
        // Depth value picks the color column; zero depth is unmapped.
        let projection = |depth: &[u16], points: &mut [ColorSpacePoint]| {
            for (p, &d) in points.iter_mut().zip(depth) {
                *p = if d == 0 {
                    ColorSpacePoint::INVALID
                } else {
                    ColorSpacePoint::new(d as f32 - 1.0, 0.0)
                };
            }
        };
        let mut sink = AlignedSink::new(Box::new(projection), geometry);

        let mut depth_pool = FramePool::<u16>::new("depth", 2, PoolConfig::new(1));
        let mut color_pool = FramePool::<u8>::new("color", geometry.color_len(), PoolConfig::new(1));
        let frame = AlignedFrame {
            depth: depth_pool.acquire(1),
            color: color_pool.acquire(1),
        };
        frame.depth.copy_from(&[3, 0]);
        frame.color.copy_from(&color_3x2());

        let mut out = Vec::new();
        sink.write_frame(&frame, &mut out).unwrap();
        assert_eq!(out, vec![20, 21, 22, 255, 0, 0, 0, 0]);

        frame.release();
        assert_eq!(depth_pool.free_count(), 1);
        assert_eq!(color_pool.free_count(), 1);
    }
}
