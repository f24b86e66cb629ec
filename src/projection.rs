//! Depth-to-color coordinate projection.
//!
//! The aligned stream needs, for every depth pixel, the color-image location
//! that sees the same point in space. Sensor platforms usually ship this as a
//! "coordinate mapper"; [`DepthToColorProjection`] is the seam for it.
//! [`PinholeProjection`] is a calibrated pinhole model for sources that only
//! expose intrinsics and extrinsics.

/// A (sub-pixel) location in the color image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorSpacePoint {
    pub x: f32,
    pub y: f32,
}

impl ColorSpacePoint {
    /// Marker for depth pixels without a valid mapping.
    pub const INVALID: ColorSpacePoint = ColorSpacePoint {
        x: f32::NEG_INFINITY,
        y: f32::NEG_INFINITY,
    };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Maps a full depth frame into color-image coordinates.
///
/// Implemented for closures of the same shape, which is convenient for tests
/// and for wrapping a vendor mapper.
pub trait DepthToColorProjection: Send {
    /// Fill `points[i]` with the color-space location of depth pixel `i`.
    ///
    /// `points.len() == depth.len()`. Pixels without a mapping get a
    /// non-finite or out-of-image coordinate.
    fn map_depth_frame_to_color_space(&self, depth: &[u16], points: &mut [ColorSpacePoint]);
}

impl<F> DepthToColorProjection for F
where
    F: Fn(&[u16], &mut [ColorSpacePoint]) + Send,
{
    fn map_depth_frame_to_color_space(&self, depth: &[u16], points: &mut [ColorSpacePoint]) {
        self(depth, points)
    }
}

/// Camera intrinsics for pixel <-> ray conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub ppx: f32,
    pub ppy: f32,
}

/// Rigid transform from the depth camera frame to the color camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrinsics {
    /// Row-major 3x3 rotation.
    pub rotation: [f32; 9],
    /// Translation in meters.
    pub translation: [f32; 3],
}

impl Extrinsics {
    pub fn identity() -> Self {
        Self {
            rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            translation: [0.0; 3],
        }
    }

    fn apply(&self, p: [f32; 3]) -> [f32; 3] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            r[0] * p[0] + r[1] * p[1] + r[2] * p[2] + t[0],
            r[3] * p[0] + r[4] * p[1] + r[5] * p[2] + t[1],
            r[6] * p[0] + r[7] * p[1] + r[8] * p[2] + t[2],
        ]
    }
}

/// Pinhole depth-to-color projection (no lens distortion).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeProjection {
    pub depth_width: usize,
    pub depth_intrinsics: Intrinsics,
    pub color_intrinsics: Intrinsics,
    pub depth_to_color: Extrinsics,
    /// Meters per raw depth unit.
    pub depth_scale: f32,
}

impl Default for PinholeProjection {
    /// Approximate Kinect v2 calibration (512x424 depth, 1920x1080 color, 1 mm units).
    fn default() -> Self {
        Self {
            depth_width: 512,
            depth_intrinsics: Intrinsics {
                fx: 365.5,
                fy: 365.5,
                ppx: 255.5,
                ppy: 211.5,
            },
            color_intrinsics: Intrinsics {
                fx: 1081.4,
                fy: 1081.4,
                ppx: 959.5,
                ppy: 539.5,
            },
            depth_to_color: Extrinsics {
                translation: [0.052, 0.0, 0.0],
                ..Extrinsics::identity()
            },
            depth_scale: 0.001,
        }
    }
}

impl PinholeProjection {
    /// Project one depth pixel. Zero depth or a point behind the color camera is invalid.
    pub fn project_pixel(&self, x: usize, y: usize, raw_depth: u16) -> ColorSpacePoint {
        if raw_depth == 0 {
            return ColorSpacePoint::INVALID;
        }
        let d = &self.depth_intrinsics;
        let z = raw_depth as f32 * self.depth_scale;
        let point = [
            (x as f32 - d.ppx) / d.fx * z,
            (y as f32 - d.ppy) / d.fy * z,
            z,
        ];
        let [cx, cy, cz] = self.depth_to_color.apply(point);
        if cz <= 0.0 {
            return ColorSpacePoint::INVALID;
        }
        let c = &self.color_intrinsics;
        ColorSpacePoint::new(cx / cz * c.fx + c.ppx, cy / cz * c.fy + c.ppy)
    }
}

impl DepthToColorProjection for PinholeProjection {
    fn map_depth_frame_to_color_space(&self, depth: &[u16], points: &mut [ColorSpacePoint]) {
        let width = self.depth_width.max(1);
        for (i, (point, &raw)) in points.iter_mut().zip(depth).enumerate() {
            *point = self.project_pixel(i % width, i / width, raw);
        }
    }
}
