//! Intel RealSense capture source (feature `realsense`).
//!
//! Streams unaligned RGBA8 color and Z16 depth. Alignment happens in the
//! recorder's tracked color writer, driven by the [`PinholeProjection`] built
//! from the device calibration. RealSense has no body tracking, so frames carry
//! no index mask.

use std::collections::HashSet;
use std::ffi::CString;
use std::time::Duration;

use anyhow::Result;
use realsense_rust::{
    config::Config,
    context::Context,
    frame::{ColorFrame, CompositeFrame, DepthFrame, FrameEx},
    kind::{Rs2CameraInfo, Rs2Format, Rs2Option, Rs2ProductLine, Rs2StreamKind},
    pipeline::{ActivePipeline, InactivePipeline},
};

use crate::capture::{CaptureFrame, CaptureSource};
use crate::config::FrameGeometry;
use crate::projection::{Extrinsics, Intrinsics, PinholeProjection};

/// RealSense camera delivering color + depth frames.
pub struct RealSenseSource {
    pipeline: ActivePipeline,
    geometry: FrameGeometry,
    /// Meters per raw Z16 unit.
    depth_scale: f32,
    projection: PinholeProjection,
    color: Vec<u8>,
    depth_mm: Vec<u16>,
}

impl RealSenseSource {
    /// List connected RealSense devices as (name, serial).
    pub fn list_devices() -> Result<Vec<(String, String)>> {
        let context = Context::new()?;
        let mut product_lines = HashSet::new();
        product_lines.insert(Rs2ProductLine::AnyIntel);
        let devices = context.query_devices(product_lines);
        let mut result = Vec::new();
        for device in &devices {
            let name = device
                .info(Rs2CameraInfo::Name)
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            let serial = device
                .info(Rs2CameraInfo::SerialNumber)
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            result.push((name, serial));
        }
        Ok(result)
    }

    /// Open a camera with the given color and depth resolutions.
    /// If `serial` is Some, opens the device with that serial number.
    pub fn open(geometry: FrameGeometry, fps: u32, serial: Option<&str>) -> Result<Self> {
        let context = Context::new()?;
        let pipeline = InactivePipeline::try_from(&context)?;
        let mut config = Config::new();
        if let Some(sn) = serial {
            config.enable_device_from_serial(&CString::new(sn)?)?;
        }
        config.enable_stream(
            Rs2StreamKind::Color,
            None,
            geometry.color_width,
            geometry.color_height,
            Rs2Format::Rgba8,
            fps as usize,
        )?;
        config.enable_stream(
            Rs2StreamKind::Depth,
            None,
            geometry.depth_width,
            geometry.depth_height,
            Rs2Format::Z16,
            fps as usize,
        )?;
        let pipeline = pipeline.start(Some(config))?;

        let mut depth_scale = 0.001f32;
        for sensor in pipeline.profile().device().sensors() {
            if let Some(val) = sensor.get_option(Rs2Option::DepthUnits) {
                depth_scale = val;
                break;
            }
        }

        let projection = read_calibration(&pipeline, geometry)?;
        tracing::info!(
            "RealSense opened: color {}x{}, depth {}x{} @ {} fps, depth scale {}",
            geometry.color_width,
            geometry.color_height,
            geometry.depth_width,
            geometry.depth_height,
            fps,
            depth_scale
        );

        Ok(Self {
            pipeline,
            geometry,
            depth_scale,
            projection,
            color: vec![0; geometry.color_len()],
            depth_mm: vec![0; geometry.depth_len()],
        })
    }

    /// Calibrated depth-to-color projection for millimeter depth.
    pub fn projection(&self) -> PinholeProjection {
        self.projection
    }

    /// Meters per raw Z16 unit reported by the sensor.
    pub fn depth_scale(&self) -> f32 {
        self.depth_scale
    }
}

impl CaptureSource for RealSenseSource {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn next_frame(&mut self) -> Result<Option<CaptureFrame<'_>>> {
        let composite: CompositeFrame = self.pipeline.wait(Some(Duration::from_secs(5)))?;

        let color_frames: Vec<ColorFrame> = composite.frames_of_type();
        let color_frame = color_frames
            .first()
            .ok_or_else(|| anyhow::anyhow!("No color frame in composite"))?;
        let color_size = color_frame.get_data_size();
        if color_size != self.color.len() {
            anyhow::bail!("color frame is {} bytes, expected {}", color_size, self.color.len());
        }
        let color = unsafe {
            let ptr = color_frame.get_data() as *const std::ffi::c_void as *const u8;
            std::slice::from_raw_parts(ptr, color_size)
        };
        self.color.copy_from_slice(color);

        let depth_frames: Vec<DepthFrame> = composite.frames_of_type();
        let depth_frame = depth_frames
            .first()
            .ok_or_else(|| anyhow::anyhow!("No depth frame in composite"))?;
        let count = depth_frame.get_data_size() / 2;
        if count != self.depth_mm.len() {
            anyhow::bail!("depth frame has {} samples, expected {}", count, self.depth_mm.len());
        }
        let raw = unsafe {
            let ptr = depth_frame.get_data() as *const std::ffi::c_void as *const u16;
            std::slice::from_raw_parts(ptr, count)
        };
        let scale_to_mm = self.depth_scale * 1000.0;
        for (dst, &v) in self.depth_mm.iter_mut().zip(raw) {
            *dst = (v as f32 * scale_to_mm) as u16;
        }

        Ok(Some(CaptureFrame {
            color: &self.color,
            depth: &self.depth_mm,
            index: None,
        }))
    }
}

/// Build the depth-to-color projection from the active stream profiles.
fn read_calibration(pipeline: &ActivePipeline, geometry: FrameGeometry) -> Result<PinholeProjection> {
    let streams = pipeline.profile().streams();
    let color = streams
        .iter()
        .find(|s| s.kind() == Rs2StreamKind::Color)
        .ok_or_else(|| anyhow::anyhow!("Pipeline has no color stream"))?;
    let depth = streams
        .iter()
        .find(|s| s.kind() == Rs2StreamKind::Depth)
        .ok_or_else(|| anyhow::anyhow!("Pipeline has no depth stream"))?;

    let intrinsics = |profile: &realsense_rust::stream_profile::StreamProfile| -> Result<Intrinsics> {
        let intr = profile.intrinsics()?;
        Ok(Intrinsics {
            fx: intr.fx(),
            fy: intr.fy(),
            ppx: intr.ppx(),
            ppy: intr.ppy(),
        })
    };
    let extr = depth.extrinsics(color)?;
    // librealsense stores the rotation column-major.
    let r = extr.rotation();
    let rotation = [r[0], r[3], r[6], r[1], r[4], r[7], r[2], r[5], r[8]];

    Ok(PinholeProjection {
        depth_width: geometry.depth_width,
        depth_intrinsics: intrinsics(depth)?,
        color_intrinsics: intrinsics(color)?,
        depth_to_color: Extrinsics {
            rotation,
            translation: extr.translation(),
        },
        depth_scale: 0.001,
    })
}
