//! Application state management

use anyhow::{Context, Result};
use framecast_core::{BuildError, CameraController, ImageEncoder};
use framecast_sim::SimSource;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::frame_loop::FrameLoop;
use crate::session::{BoxedSource, Session};

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// The streaming session
    pub session: Arc<Session>,
}

impl AppState {
    /// Create the session without starting any background work
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let encoder = ImageEncoder::new(config.stream.format, config.stream.quality)
            .context("invalid stream encoder settings")?;
        let controller = CameraController::new(
            config.intrinsics(),
            config.world_up(),
            config.gesture_scales(),
        );
        let default_pose = config.default_pose().context("invalid camera pose")?;
        let session = Session::new(
            config.to_session_settings(),
            controller,
            default_pose,
            Arc::new(encoder),
        )?;

        Ok(Arc::new(Self { config, session }))
    }

    /// Kick off the frame source build and the frame loop
    pub fn start(&self) -> JoinHandle<()> {
        let scene = self.config.to_scene_config();
        let intrinsics = self.config.intrinsics();
        let resolution = self.config.resolution();
        let camera = self.session.default_pose();

        info!(
            resolution = %resolution,
            fps = self.config.stream.fps,
            format = ?self.config.stream.format,
            "Starting session"
        );

        self.session.spawn_build(move || {
            SimSource::build(&scene, camera, intrinsics, resolution)
                .map(|source| Box::new(source) as BoxedSource)
                .map_err(|e| BuildError(e.to_string()))
        });
        FrameLoop::spawn(self.session.clone())
    }

    /// Tear the session down; safe to call more than once
    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }
}
