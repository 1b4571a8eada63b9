//! Configuration loading and validation

use anyhow::{bail, Result};
use framecast_core::{CameraPose, GestureScales, ImageFormat, Intrinsics, Resolution};
use framecast_sim::{Body, SceneConfig};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::session::SessionSettings;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub controls: ControlsConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// TLS configuration (optional - enables HTTPS when present)
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// Directory with the browser viewer, served at the root
    #[serde(default = "default_web_root")]
    pub web_root: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tls: None,
            web_root: default_web_root(),
        }
    }
}

/// TLS/HTTPS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format)
    pub cert: String,
    /// Path to private key file (PEM format)
    pub key: String,
}

fn default_bind() -> String {
    "0.0.0.0:5001".to_string()
}

fn default_web_root() -> String {
    "web".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Target frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Frames per simulation cycle before it restarts (0 = never)
    #[serde(default = "default_max_frames")]
    pub max_frames: u64,
    /// Placeholder publish interval while the simulation builds
    #[serde(default = "default_placeholder_interval")]
    pub placeholder_interval_ms: u64,
    /// Frames buffered per viewer before older ones are dropped
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Wire image format
    #[serde(default)]
    pub format: ImageFormat,
    /// JPEG quality (1-100)
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            max_frames: default_max_frames(),
            placeholder_interval_ms: default_placeholder_interval(),
            channel_capacity: default_channel_capacity(),
            format: ImageFormat::default(),
            quality: default_quality(),
        }
    }
}

fn default_fps() -> u32 {
    40
}

fn default_max_frames() -> u64 {
    200
}

fn default_placeholder_interval() -> u64 {
    100
}

fn default_channel_capacity() -> usize {
    4
}

fn default_quality() -> u8 {
    80
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Image width in pixels
    #[serde(default = "default_width")]
    pub width: u32,
    /// Image height in pixels
    #[serde(default = "default_height")]
    pub height: u32,
    /// Vertical field of view in degrees
    #[serde(default = "default_fov")]
    pub fov_deg: f32,
    #[serde(default = "default_position")]
    pub position: [f32; 3],
    #[serde(default = "default_lookat")]
    pub lookat: [f32; 3],
    #[serde(default = "default_up")]
    pub up: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fov_deg: default_fov(),
            position: default_position(),
            lookat: default_lookat(),
            up: default_up(),
        }
    }
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_fov() -> f32 {
    40.0
}

fn default_position() -> [f32; 3] {
    [3.5, 1.0, 2.5]
}

fn default_lookat() -> [f32; 3] {
    [0.0, 0.0, 0.5]
}

fn default_up() -> [f32; 3] {
    [0.0, 0.0, 1.0]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlsConfig {
    /// Orbit degrees per pixel of drag
    #[serde(default = "default_rotate_scale")]
    pub rotate_scale: f32,
    /// Pan world units per pixel, horizontal
    #[serde(default = "default_pan_scale_x")]
    pub pan_scale_x: f32,
    /// Pan world units per pixel, vertical
    #[serde(default = "default_pan_scale_y")]
    pub pan_scale_y: f32,
    /// Zoom world units per wheel unit
    #[serde(default = "default_zoom_scale")]
    pub zoom_scale: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            rotate_scale: default_rotate_scale(),
            pan_scale_x: default_pan_scale_x(),
            pan_scale_y: default_pan_scale_y(),
            zoom_scale: default_zoom_scale(),
        }
    }
}

fn default_rotate_scale() -> f32 {
    GestureScales::default().rotate
}

fn default_pan_scale_x() -> f32 {
    GestureScales::default().pan_x
}

fn default_pan_scale_y() -> f32 {
    GestureScales::default().pan_y
}

fn default_zoom_scale() -> f32 {
    GestureScales::default().zoom
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Physics substeps per frame
    #[serde(default = "default_substeps")]
    pub substeps: u32,
    #[serde(default = "default_gravity")]
    pub gravity: [f32; 3],
    #[serde(default = "default_restitution")]
    pub restitution: f32,
    /// Half width of the square arena
    #[serde(default = "default_half_extent")]
    pub half_extent: f32,
    /// Artificial build latency in milliseconds
    #[serde(default)]
    pub build_delay_ms: u64,
    #[serde(default = "default_bodies", rename = "body")]
    pub bodies: Vec<Body>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            substeps: default_substeps(),
            gravity: default_gravity(),
            restitution: default_restitution(),
            half_extent: default_half_extent(),
            build_delay_ms: 0,
            bodies: default_bodies(),
        }
    }
}

fn default_substeps() -> u32 {
    10
}

fn default_gravity() -> [f32; 3] {
    [0.0, 0.0, -9.8]
}

fn default_restitution() -> f32 {
    SceneConfig::default().restitution
}

fn default_half_extent() -> f32 {
    SceneConfig::default().half_extent
}

fn default_bodies() -> Vec<Body> {
    SceneConfig::default().bodies
}

impl Config {
    /// Reject configurations the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.stream.fps == 0 {
            bail!("stream.fps must be greater than 0");
        }
        if !(1..=100).contains(&self.stream.quality) {
            bail!("stream.quality must be between 1 and 100");
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            bail!(
                "camera resolution {}x{} is empty",
                self.camera.width,
                self.camera.height
            );
        }
        if !(self.camera.fov_deg > 0.0 && self.camera.fov_deg < 180.0) {
            bail!("camera.fov_deg must be within (0, 180)");
        }
        if let Err(e) = self.default_pose() {
            bail!("camera pose is invalid: {}", e);
        }
        Ok(())
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.camera.width, self.camera.height)
    }

    pub fn intrinsics(&self) -> Intrinsics {
        Intrinsics::from_fov(self.resolution(), self.camera.fov_deg)
    }

    /// Construction-time camera pose
    pub fn default_pose(&self) -> Result<CameraPose, framecast_core::PoseError> {
        CameraPose::new(
            Vec3::from_array(self.camera.position),
            Vec3::from_array(self.camera.lookat),
            Vec3::from_array(self.camera.up),
        )
    }

    pub fn world_up(&self) -> Vec3 {
        Vec3::from_array(self.camera.up)
    }

    pub fn gesture_scales(&self) -> GestureScales {
        GestureScales {
            rotate: self.controls.rotate_scale,
            pan_x: self.controls.pan_scale_x,
            pan_y: self.controls.pan_scale_y,
            zoom: self.controls.zoom_scale,
        }
    }

    /// Convert to SessionSettings
    pub fn to_session_settings(&self) -> SessionSettings {
        SessionSettings {
            fps: self.stream.fps,
            max_frames: self.stream.max_frames,
            placeholder_interval: Duration::from_millis(self.stream.placeholder_interval_ms),
            channel_capacity: self.stream.channel_capacity.max(1),
            resolution: self.resolution(),
        }
    }

    /// Convert to SceneConfig; one simulation step per rendered frame
    pub fn to_scene_config(&self) -> SceneConfig {
        SceneConfig {
            bodies: self.sim.bodies.clone(),
            gravity: Vec3::from_array(self.sim.gravity),
            restitution: self.sim.restitution,
            half_extent: self.sim.half_extent,
            dt: 1.0 / self.stream.fps.max(1) as f32,
            substeps: self.sim.substeps,
            build_delay: Duration::from_millis(self.sim.build_delay_ms),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(())
}
