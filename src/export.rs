//! PNG export of recorded frames (feature `image`).

use std::path::{Path, PathBuf};

use anyhow::Result;
use image::{ImageBuffer, Rgb, RgbImage, RgbaImage};

use crate::capture::NO_BODY;
use crate::config::StreamKind;
use crate::playback::RecordingReader;

/// Closest reliable depth of the sensor, in millimeters.
pub const MIN_RELIABLE_DEPTH: u16 = 500;
/// Farthest reliable depth of the sensor, in millimeters.
pub const MAX_RELIABLE_DEPTH: u16 = 4500;

/// Colors of bodies 0..=7. Any other index value renders black.
pub const BODY_PALETTE: [[u8; 3]; 8] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [0, 255, 255],
    [255, 0, 255],
    [255, 255, 0],
    [255, 119, 0],
    [255, 255, 255],
];

pub fn color_image(rgba: &[u8], width: u32, height: u32) -> Result<RgbaImage> {
    ImageBuffer::from_raw(width, height, rgba.to_vec())
        .ok_or_else(|| anyhow::anyhow!("RGBA buffer of {} bytes is not {}x{}", rgba.len(), width, height))
}

/// Heat color for depth `mm` over the reliable range. Zero depth is black.
pub fn heat(mm: u16) -> [u8; 3] {
    if mm == 0 {
        return [0, 0, 0];
    }
    let span = (MAX_RELIABLE_DEPTH - MIN_RELIABLE_DEPTH) as f32;
    let t = (mm.clamp(MIN_RELIABLE_DEPTH, MAX_RELIABLE_DEPTH) - MIN_RELIABLE_DEPTH) as f32 / span;
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    [channel(1.5 * t), channel(2.0 * t - 1.0), channel(4.0 * t - 3.0)]
}

pub fn depth_image(depth: &[u16], width: u32, height: u32) -> Result<RgbImage> {
    if depth.len() != (width * height) as usize {
        anyhow::bail!("depth buffer of {} samples is not {}x{}", depth.len(), width, height);
    }
    Ok(ImageBuffer::from_fn(width, height, |x, y| {
        Rgb(heat(depth[(y * width + x) as usize]))
    }))
}

pub fn index_image(index: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    if index.len() != (width * height) as usize {
        anyhow::bail!("index buffer of {} bytes is not {}x{}", index.len(), width, height);
    }
    Ok(ImageBuffer::from_fn(width, height, |x, y| {
        let body = index[(y * width + x) as usize];
        match BODY_PALETTE.get(body as usize) {
            Some(color) if body != NO_BODY => Rgb(*color),
            _ => Rgb([0, 0, 0]),
        }
    }))
}

/// Write frame `n` of every recorded stream to `out_dir` as `<STREAM>_<n>.png`.
///
/// Streams with fewer than `n + 1` frames are skipped.
pub fn export_frame(reader: &RecordingReader, n: u64, out_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;
    let g = reader.geometry();
    let (cw, ch) = (g.color_width as u32, g.color_height as u32);
    let (dw, dh) = (g.depth_width as u32, g.depth_height as u32);

    let mut written = Vec::new();
    for stream in reader.streams() {
        if reader.frame_count(stream) <= n {
            tracing::warn!("{} has only {} frames, skipping", stream, reader.frame_count(stream));
            continue;
        }
        let path = out_dir.join(format!("{}_{}.png", stream, n));
        match stream {
            StreamKind::Color => color_image(&reader.color(n)?, cw, ch)?.save(&path)?,
            StreamKind::Depth => depth_image(&reader.depth(n)?, dw, dh)?.save(&path)?,
            StreamKind::Index => index_image(&reader.index(n)?, dw, dh)?.save(&path)?,
            StreamKind::TrackedColor => color_image(&reader.tracked_color(n)?, dw, dh)?.save(&path)?,
        }
        tracing::info!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}
