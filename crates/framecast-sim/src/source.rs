//! `FrameSource` implementation over the sphere world

use framecast_core::{CameraPose, Frame, FrameSource, Intrinsics, Resolution, SourceError};
use glam::Vec3;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::raster;
use crate::world::{Body, World};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Substeps must be at least 1")]
    NoSubsteps,
    #[error("Time step must be positive, got {0}")]
    InvalidTimeStep(f32),
    #[error("Body {index} is invalid: {reason}")]
    InvalidBody { index: usize, reason: String },
}

/// Scene construction parameters
#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub bodies: Vec<Body>,
    pub gravity: Vec3,
    pub restitution: f32,
    pub half_extent: f32,
    /// Simulated seconds per rendered frame
    pub dt: f32,
    pub substeps: u32,
    /// Extra startup latency, to exercise the not-ready path of clients
    pub build_delay: Duration,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            bodies: vec![
                Body {
                    position: Vec3::new(0.0, 0.0, 1.2),
                    velocity: Vec3::new(0.6, 0.2, 0.0),
                    radius: 0.25,
                    color: Vec3::new(0.85, 0.25, 0.2),
                },
                Body {
                    position: Vec3::new(0.5, -0.4, 0.8),
                    velocity: Vec3::new(-0.4, 0.7, 1.0),
                    radius: 0.18,
                    color: Vec3::new(0.2, 0.55, 0.85),
                },
                Body {
                    position: Vec3::new(-0.6, 0.5, 1.6),
                    velocity: Vec3::new(0.1, -0.5, 0.0),
                    radius: 0.3,
                    color: Vec3::new(0.95, 0.8, 0.25),
                },
            ],
            gravity: Vec3::new(0.0, 0.0, -9.8),
            restitution: 0.85,
            half_extent: 1.5,
            dt: 1.0 / 40.0,
            substeps: 10,
            build_delay: Duration::ZERO,
        }
    }
}

/// Sphere scene rendered through a movable pinhole camera
pub struct SimSource {
    initial: World,
    world: World,
    camera: CameraPose,
    intrinsics: Intrinsics,
    resolution: Resolution,
    closed: bool,
}

impl SimSource {
    /// Validate the scene and build the world
    ///
    /// Blocks for `config.build_delay`; run it off the async runtime.
    pub fn build(
        config: &SceneConfig,
        camera: CameraPose,
        intrinsics: Intrinsics,
        resolution: Resolution,
    ) -> Result<Self, SimError> {
        if config.substeps == 0 {
            return Err(SimError::NoSubsteps);
        }
        if !(config.dt > 0.0) {
            return Err(SimError::InvalidTimeStep(config.dt));
        }
        for (index, body) in config.bodies.iter().enumerate() {
            if !(body.radius > 0.0) {
                return Err(SimError::InvalidBody {
                    index,
                    reason: format!("radius {} is not positive", body.radius),
                });
            }
            if !(body.position.is_finite() && body.velocity.is_finite()) {
                return Err(SimError::InvalidBody {
                    index,
                    reason: "non-finite position or velocity".to_string(),
                });
            }
        }

        if !config.build_delay.is_zero() {
            std::thread::sleep(config.build_delay);
        }

        let world = World {
            bodies: config.bodies.clone(),
            gravity: config.gravity,
            restitution: config.restitution.clamp(0.0, 1.0),
            half_extent: config.half_extent,
            dt: config.dt,
            substeps: config.substeps,
        };

        info!(
            bodies = world.bodies.len(),
            substeps = world.substeps,
            resolution = %resolution,
            "Simulation scene built"
        );

        Ok(Self {
            initial: world.clone(),
            world,
            camera,
            intrinsics,
            resolution,
            closed: false,
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn camera(&self) -> &CameraPose {
        &self.camera
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl FrameSource for SimSource {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn render(&mut self) -> Result<Frame, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        raster::render(&self.world, &self.camera, &self.intrinsics, self.resolution)
            .map_err(|e| SourceError::Render(e.to_string()))
    }

    fn step(&mut self) -> Result<(), SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        self.world.step();
        Ok(())
    }

    fn restart(&mut self) -> Result<(), SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        self.world = self.initial.clone();
        Ok(())
    }

    fn set_camera(&mut self, pose: &CameraPose) -> Result<(), SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        self.camera = *pose;
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.world.bodies.clear();
            info!("Simulation scene released");
        }
    }
}
