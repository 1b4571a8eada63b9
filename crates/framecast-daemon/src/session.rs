//! Streaming session: readiness, shared state, and teardown
//!
//! A session owns everything that is mutable and shared between the frame
//! loop and the viewers' control channels:
//! - The frame source, reachable only once it has been built (`Stage::Live`)
//! - The pause flag, current camera pose, and the last captured frame
//!
//! All of it sits behind one async mutex, so a camera update can never land
//! in the middle of a render or step. Readiness is published separately on a
//! watch channel so HTTP handlers never wait on that lock.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use framecast_core::{
    CameraController, CameraPose, EncodeError, Frame, FrameCycle, FrameEncoder, FrameSource,
    GestureEvent, PoseError, Resolution, SourceError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Frame source is not ready")]
    NotReady,
    #[error("Session has been torn down")]
    Terminated,
    #[error("Invalid camera pose: {0}")]
    Pose(#[from] PoseError),
    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),
    #[error("Frame encoding error: {0}")]
    Encode(#[from] EncodeError),
}

/// Frame source build state, observable without taking the session lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Readiness {
    Pending,
    Ready,
    Failed { error: String },
    Terminated,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Readiness::Pending => "pending",
            Readiness::Ready => "ready",
            Readiness::Failed { .. } => "failed",
            Readiness::Terminated => "terminated",
        }
    }
}

pub type BoxedSource = Box<dyn FrameSource>;

/// Session settings, fixed at construction
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub fps: u32,
    pub max_frames: u64,
    pub placeholder_interval: Duration,
    pub channel_capacity: usize,
    pub resolution: Resolution,
}

impl SessionSettings {
    /// Wait between two captures
    pub fn pacing_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.fps.max(1)))
    }
}

pub(crate) enum Stage {
    Building,
    Live(FrameCycle<BoxedSource>),
    Failed,
    Terminated,
}

/// Mutable session state, only touched under the session lock
pub struct SessionState {
    pub(crate) stage: Stage,
    pub(crate) paused: bool,
    pub(crate) pose: CameraPose,
    /// Most recent capture, kept for replay while paused
    pub(crate) last_frame: Option<Arc<Frame>>,
    pub(crate) last_encoded: Option<Bytes>,
}

impl SessionState {
    pub fn frame_index(&self) -> u64 {
        match &self.stage {
            Stage::Live(cycle) => cycle.frame_index(),
            _ => 0,
        }
    }
}

/// Session status report
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: &'static str,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub paused: bool,
    pub frame_index: u64,
    pub max_frames: u64,
    pub fps: u32,
    pub resolution: Resolution,
    /// MIME type of binary frame messages
    pub format: &'static str,
    pub viewers: usize,
    pub started_at: DateTime<Utc>,
}

/// One simulation streamed to any number of viewers
pub struct Session {
    settings: SessionSettings,
    controller: CameraController,
    default_pose: CameraPose,
    encoder: Arc<dyn FrameEncoder>,
    placeholder: Bytes,
    state: Arc<Mutex<SessionState>>,
    readiness: watch::Sender<Readiness>,
    frames: broadcast::Sender<Bytes>,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Create a session in the `Pending` state
    ///
    /// The placeholder frame is encoded once here, so a broken encoder fails
    /// construction instead of every cycle.
    pub fn new(
        settings: SessionSettings,
        controller: CameraController,
        default_pose: CameraPose,
        encoder: Arc<dyn FrameEncoder>,
    ) -> Result<Arc<Self>, SessionError> {
        let placeholder = Bytes::from(encoder.encode(&Frame::blank(settings.resolution))?);
        let (readiness, _) = watch::channel(Readiness::Pending);
        let (frames, _) = broadcast::channel(settings.channel_capacity.max(1));

        Ok(Arc::new(Self {
            settings,
            controller,
            default_pose,
            encoder,
            placeholder,
            state: Arc::new(Mutex::new(SessionState {
                stage: Stage::Building,
                paused: false,
                pose: default_pose,
                last_frame: None,
                last_encoded: None,
            })),
            readiness,
            frames,
            started_at: Utc::now(),
        }))
    }

    /// Build the frame source on the blocking pool and install it
    pub fn spawn_build<F>(self: &Arc<Self>, build: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Result<BoxedSource, framecast_core::BuildError> + Send + 'static,
    {
        let session = self.clone();
        tokio::spawn(async move {
            info!("Building frame source");
            let started = Instant::now();
            match tokio::task::spawn_blocking(build).await {
                Ok(Ok(source)) => {
                    info!(elapsed_ms = started.elapsed().as_millis() as u64, "Frame source built");
                    session.install_source(source).await;
                }
                Ok(Err(e)) => session.fail_build(e.to_string()).await,
                Err(e) => session.fail_build(format!("build task aborted: {}", e)).await,
            }
        })
    }

    /// Move the session from `Pending` to `Ready`
    ///
    /// A source that finishes after teardown is closed immediately.
    pub async fn install_source(&self, mut source: BoxedSource) {
        let mut state = self.state.lock().await;
        if !matches!(state.stage, Stage::Building) {
            warn!("Frame source arrived after the session left the building stage, releasing it");
            source.close();
            return;
        }
        if source.resolution() != self.settings.resolution {
            warn!(
                source = %source.resolution(),
                configured = %self.settings.resolution,
                "Frame source resolution differs from the placeholder"
            );
        }
        if let Err(e) = source.set_camera(&state.pose) {
            warn!(error = %e, "Failed to apply initial camera pose");
        }
        state.stage = Stage::Live(FrameCycle::new(source, self.settings.max_frames));
        self.readiness.send_replace(Readiness::Ready);
        info!("Session ready");
    }

    /// Record a build failure; the session stays not-ready for good
    pub async fn fail_build(&self, reason: String) {
        let mut state = self.state.lock().await;
        if !matches!(state.stage, Stage::Building) {
            return;
        }
        state.stage = Stage::Failed;
        error!(error = %reason, "Frame source build failed");
        self.readiness.send_replace(Readiness::Failed { error: reason });
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.borrow().is_ready()
    }

    pub fn watch_readiness(&self) -> watch::Receiver<Readiness> {
        self.readiness.subscribe()
    }

    /// Subscribe to encoded frames
    ///
    /// The channel is bounded; a viewer that falls behind skips frames.
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.frames.subscribe()
    }

    pub fn viewer_count(&self) -> usize {
        self.frames.receiver_count()
    }

    /// Fan a frame out to every subscribed viewer
    pub(crate) fn publish(&self, frame: Bytes) -> usize {
        self.frames.send(frame).unwrap_or(0)
    }

    pub fn placeholder(&self) -> Bytes {
        self.placeholder.clone()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn default_pose(&self) -> CameraPose {
        self.default_pose
    }

    pub(crate) fn encoder(&self) -> &dyn FrameEncoder {
        self.encoder.as_ref()
    }

    pub(crate) fn state(&self) -> &Arc<Mutex<SessionState>> {
        &self.state
    }

    /// Set the pause flag, returns false if it was already in that state
    pub async fn set_paused(&self, paused: bool) -> bool {
        let mut state = self.state.lock().await;
        if state.paused == paused {
            return false;
        }
        state.paused = paused;
        info!(paused, frame_index = state.frame_index(), "Playback {}", if paused { "paused" } else { "resumed" });
        true
    }

    pub async fn is_paused(&self) -> bool {
        self.state.lock().await.paused
    }

    pub async fn pose(&self) -> CameraPose {
        self.state.lock().await.pose
    }

    #[cfg(test)]
    pub async fn frame_index(&self) -> u64 {
        self.state.lock().await.frame_index()
    }

    /// Apply a gesture to the camera and push the pose to the source
    ///
    /// Rejected with `NotReady` until the source exists. The pose is only
    /// committed once the source has accepted it.
    pub async fn apply_gesture(&self, gesture: &GestureEvent) -> Result<CameraPose, SessionError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let cycle = match &mut state.stage {
            Stage::Live(cycle) => cycle,
            Stage::Terminated => return Err(SessionError::Terminated),
            Stage::Building | Stage::Failed => return Err(SessionError::NotReady),
        };

        let pose = self.controller.apply(&state.pose, &self.default_pose, gesture)?;
        cycle.source_mut().set_camera(&pose)?;
        state.pose = pose;
        debug!(gesture = gesture.name(), "Camera updated");
        Ok(pose)
    }

    /// Frame a newly connected viewer should see first
    pub async fn current_frame(&self) -> Bytes {
        if !self.is_ready() {
            return self.placeholder();
        }
        let state = self.state.lock().await;
        state
            .last_encoded
            .clone()
            .unwrap_or_else(|| self.placeholder())
    }

    pub async fn status(&self) -> SessionStatus {
        let readiness = self.readiness();
        let state = self.state.lock().await;
        SessionStatus {
            state: readiness.name(),
            ready: readiness.is_ready(),
            error: match readiness {
                Readiness::Failed { error } => Some(error),
                _ => None,
            },
            paused: state.paused,
            frame_index: state.frame_index(),
            max_frames: self.settings.max_frames,
            fps: self.settings.fps,
            resolution: self.settings.resolution,
            format: self.encoder.format().mime_type(),
            viewers: self.viewer_count(),
            started_at: self.started_at,
        }
    }

    /// Tear the session down, closing the frame source
    ///
    /// Idempotent: returns true only for the call that performed the teardown.
    pub async fn shutdown(&self) -> bool {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut state.stage, Stage::Terminated);
        match previous {
            Stage::Terminated => return false,
            Stage::Live(cycle) => {
                let mut source = cycle.into_source();
                source.close();
            }
            Stage::Building | Stage::Failed => {}
        }
        state.last_frame = None;
        self.readiness.send_replace(Readiness::Terminated);
        info!("Session terminated");
        true
    }
}
