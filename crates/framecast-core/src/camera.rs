//! Camera poses and gesture-driven camera control
//!
//! Poses follow a look-at convention: the camera sits at `position`, looks at
//! `lookat`, and `up` is kept orthogonal to the viewing direction. Pixel rays
//! use the pinhole convention of the render engines we drive: image x grows to
//! the right, image y grows downwards, and the camera looks along +z.
//!
//! Rotation orbits the camera about its look-at target. The polar angle is
//! measured from the controller's world-up axis and kept away from both poles,
//! so a drag can never flip the view upside down.

use glam::Vec3;
use serde::Serialize;
use std::f32::consts::PI;
use thiserror::Error;

use crate::frame::Resolution;
use crate::gesture::GestureEvent;

/// Minimum angular distance (radians) between the orbit direction and either pole
pub const POLE_MARGIN: f32 = 0.1;

const EPSILON: f32 = 1e-6;

/// Keeps clamped polar angles strictly inside the margin after round-off
const POLE_GUARD: f32 = 1e-3;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseError {
    #[error("Camera position coincides with its look-at target")]
    Degenerate,
    #[error("Up vector is parallel to the viewing direction")]
    UpParallel,
    #[error("Pose contains non-finite components")]
    NonFinite,
}

/// Camera position, look-at target, and up vector
///
/// A `CameraPose` can only be built through [`CameraPose::new`], which rejects
/// degenerate poses and re-orthogonalizes `up` against the forward vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraPose {
    position: Vec3,
    lookat: Vec3,
    up: Vec3,
}

impl CameraPose {
    pub fn new(position: Vec3, lookat: Vec3, up: Vec3) -> Result<Self, PoseError> {
        if !(position.is_finite() && lookat.is_finite() && up.is_finite()) {
            return Err(PoseError::NonFinite);
        }
        let offset = lookat - position;
        if offset.length_squared() < EPSILON * EPSILON {
            return Err(PoseError::Degenerate);
        }
        let forward = offset.normalize();
        let right = forward.cross(up);
        if right.length_squared() < EPSILON {
            return Err(PoseError::UpParallel);
        }
        let right = right.normalize();
        let up = right.cross(forward).normalize();
        Ok(Self {
            position,
            lookat,
            up,
        })
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn lookat(&self) -> Vec3 {
        self.lookat
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Unit vector from position towards the look-at target
    pub fn forward(&self) -> Vec3 {
        (self.lookat - self.position).normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize()
    }

    /// Orthonormal camera basis as (right, up, forward)
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = self.forward();
        let right = forward.cross(self.up).normalize();
        let up = right.cross(forward).normalize();
        (right, up, forward)
    }

    /// Distance between the camera and its target
    pub fn distance(&self) -> f32 {
        (self.lookat - self.position).length()
    }

    /// Translate both position and target, keeping orientation
    pub fn translated(&self, delta: Vec3) -> Result<Self, PoseError> {
        Self::new(self.position + delta, self.lookat + delta, self.up)
    }

    /// World-space unit ray through pixel (px, py)
    pub fn pixel_ray(&self, intrinsics: &Intrinsics, px: f32, py: f32) -> Vec3 {
        let (right, up, forward) = self.basis();
        let local = intrinsics.unproject(px, py);
        (right * local.x - up * local.y + forward * local.z).normalize()
    }
}

/// Pinhole camera intrinsics in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl Intrinsics {
    /// Square-pixel intrinsics from a vertical field of view
    pub fn from_fov(resolution: Resolution, fov_deg: f32) -> Self {
        let half = (fov_deg.to_radians() * 0.5).tan();
        let fy = resolution.height as f32 * 0.5 / half;
        Self {
            fx: fy,
            fy,
            cx: resolution.width as f32 * 0.5,
            cy: resolution.height as f32 * 0.5,
        }
    }

    /// Normalized camera-space ray (x right, y down, z forward) through a pixel
    pub fn unproject(&self, px: f32, py: f32) -> Vec3 {
        Vec3::new((px - self.cx) / self.fx, (py - self.cy) / self.fy, 1.0).normalize()
    }
}

/// Multipliers turning raw client deltas into camera motion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureScales {
    /// Degrees of orbit per pixel of drag
    pub rotate: f32,
    /// World units per pixel of horizontal pan drag
    pub pan_x: f32,
    /// World units per pixel of vertical pan drag
    pub pan_y: f32,
    /// World units per wheel unit
    pub zoom: f32,
}

impl Default for GestureScales {
    fn default() -> Self {
        Self {
            rotate: 0.5,
            pan_x: -0.002,
            pan_y: 0.002,
            zoom: -0.001,
        }
    }
}

/// Stateless camera controller
///
/// Holds only configuration (intrinsics, world up, gesture scales); every
/// method maps an input pose to a new pose.
#[derive(Debug, Clone)]
pub struct CameraController {
    intrinsics: Intrinsics,
    world_up: Vec3,
    scales: GestureScales,
}

impl CameraController {
    pub fn new(intrinsics: Intrinsics, world_up: Vec3, scales: GestureScales) -> Self {
        let world_up = world_up.try_normalize().unwrap_or(Vec3::Z);
        Self {
            intrinsics,
            world_up,
            scales,
        }
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// Orbit about the look-at target
    ///
    /// `angle_x` pitches (changes the polar angle from world up), `angle_y`
    /// yaws (changes the azimuth around world up). The radius is preserved.
    pub fn rotate(
        &self,
        pose: &CameraPose,
        angle_x: f32,
        angle_y: f32,
        degrees: bool,
    ) -> Result<CameraPose, PoseError> {
        let (angle_x, angle_y) = if degrees {
            (angle_x.to_radians(), angle_y.to_radians())
        } else {
            (angle_x, angle_y)
        };
        let up = self.world_up;
        let (e1, e2) = up.any_orthonormal_pair();

        let offset = pose.position - pose.lookat;
        let radius = offset.length();
        let (polar, azimuth) = self.spherical(pose);

        let polar = (polar - angle_x)
            .clamp(POLE_MARGIN + POLE_GUARD, PI - POLE_MARGIN - POLE_GUARD);
        let azimuth = azimuth - angle_y;

        let direction = e1 * (polar.sin() * azimuth.cos())
            + e2 * (polar.sin() * azimuth.sin())
            + up * polar.cos();
        CameraPose::new(pose.lookat + direction * radius, pose.lookat, up)
    }

    /// Polar and azimuth angles of the camera around its target
    pub fn spherical(&self, pose: &CameraPose) -> (f32, f32) {
        let up = self.world_up;
        let (e1, e2) = up.any_orthonormal_pair();
        let offset = pose.position - pose.lookat;
        let radius = offset.length();
        let polar = (offset.dot(up) / radius).clamp(-1.0, 1.0).acos();
        let azimuth = offset.dot(e2).atan2(offset.dot(e1));
        (polar, azimuth)
    }

    /// Translate camera and target in the image plane
    pub fn pan(&self, pose: &CameraPose, dx: f32, dy: f32) -> Result<CameraPose, PoseError> {
        let (right, up, _) = pose.basis();
        pose.translated(right * dx + up * dy)
    }

    /// Move camera and target along the ray through a pixel
    pub fn zoom(
        &self,
        pose: &CameraPose,
        pixel_x: f32,
        pixel_y: f32,
        amount: f32,
    ) -> Result<CameraPose, PoseError> {
        let ray = pose.pixel_ray(&self.intrinsics, pixel_x, pixel_y);
        pose.translated(ray * amount)
    }

    /// Restore the initial pose verbatim
    pub fn reset(_pose: &CameraPose, default_pose: &CameraPose) -> CameraPose {
        *default_pose
    }

    /// Apply a raw client gesture, scaling deltas by the configured gains
    pub fn apply(
        &self,
        pose: &CameraPose,
        default_pose: &CameraPose,
        gesture: &GestureEvent,
    ) -> Result<CameraPose, PoseError> {
        match *gesture {
            GestureEvent::Rotate { dx, dy } => {
                self.rotate(pose, dy * self.scales.rotate, dx * self.scales.rotate, true)
            }
            GestureEvent::Pan { dx, dy } => {
                self.pan(pose, dx * self.scales.pan_x, dy * self.scales.pan_y)
            }
            GestureEvent::Zoom { x, y, amount } => self.zoom(pose, x, y, amount * self.scales.zoom),
            GestureEvent::Reset => Ok(Self::reset(pose, default_pose)),
        }
    }
}
