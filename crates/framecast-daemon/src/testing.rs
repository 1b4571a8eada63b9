//! Scripted frame source and encoder shared by the daemon tests

use framecast_core::{
    CameraController, CameraPose, EncodeError, Frame, FrameEncoder, FrameSource, GestureScales,
    ImageFormat, Intrinsics, Resolution, SourceError,
};
use glam::Vec3;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::session::{BoxedSource, Session, SessionSettings};

#[derive(Default)]
struct ProbeInner {
    closes: AtomicUsize,
    restarts: AtomicUsize,
    fail_render: AtomicBool,
    fail_encode: AtomicBool,
    reject_camera: AtomicBool,
    camera: Mutex<Option<CameraPose>>,
}

/// Test-side handle observing and steering a `ProbeSource`
#[derive(Clone, Default)]
pub(crate) struct Probe {
    inner: Arc<ProbeInner>,
}

impl Probe {
    pub fn source(&self) -> BoxedSource {
        Box::new(ProbeSource {
            steps: 0,
            probe: self.inner.clone(),
        })
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> usize {
        self.inner.restarts.load(Ordering::SeqCst)
    }

    pub fn last_camera(&self) -> Option<CameraPose> {
        *self.inner.camera.lock().unwrap()
    }

    pub fn fail_render(&self, fail: bool) {
        self.inner.fail_render.store(fail, Ordering::SeqCst);
    }

    pub fn fail_encode(&self, fail: bool) {
        self.inner.fail_encode.store(fail, Ordering::SeqCst);
    }

    pub fn reject_camera(&self, reject: bool) {
        self.inner.reject_camera.store(reject, Ordering::SeqCst);
    }
}

/// Renders its step counter into every pixel's red channel
pub(crate) struct ProbeSource {
    steps: u8,
    probe: Arc<ProbeInner>,
}

impl ProbeSource {
    pub const RESOLUTION: Resolution = Resolution::new(2, 1);
}

impl FrameSource for ProbeSource {
    fn resolution(&self) -> Resolution {
        Self::RESOLUTION
    }

    fn render(&mut self) -> Result<Frame, SourceError> {
        if self.probe.fail_render.load(Ordering::SeqCst) {
            return Err(SourceError::Render("scripted failure".to_string()));
        }
        Frame::from_rgb(Self::RESOLUTION, vec![self.steps, 0, 0, self.steps, 0, 0])
            .map_err(|e| SourceError::Render(e.to_string()))
    }

    fn step(&mut self) -> Result<(), SourceError> {
        self.steps = self.steps.wrapping_add(1);
        Ok(())
    }

    fn restart(&mut self) -> Result<(), SourceError> {
        self.steps = 0;
        self.probe.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_camera(&mut self, pose: &CameraPose) -> Result<(), SourceError> {
        if self.probe.reject_camera.load(Ordering::SeqCst) {
            return Err(SourceError::Camera("scripted rejection".to_string()));
        }
        *self.probe.camera.lock().unwrap() = Some(*pose);
        Ok(())
    }

    fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Passes raw RGB bytes through, so tests can read frame content back
struct RawEncoder {
    probe: Arc<ProbeInner>,
}

impl FrameEncoder for RawEncoder {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError> {
        if self.probe.fail_encode.load(Ordering::SeqCst) {
            return Err(EncodeError::InvalidQuality(0));
        }
        Ok(frame.as_bytes().to_vec())
    }

    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }
}

pub(crate) fn default_pose() -> CameraPose {
    CameraPose::new(Vec3::new(3.5, 1.0, 2.5), Vec3::new(0.0, 0.0, 0.5), Vec3::Z).unwrap()
}

/// Session over a `ProbeSource` resolution with a raw encoder
pub(crate) fn test_session(max_frames: u64) -> (Arc<Session>, Probe) {
    let probe = Probe::default();
    let settings = SessionSettings {
        fps: 40,
        max_frames,
        placeholder_interval: Duration::from_millis(100),
        channel_capacity: 4,
        resolution: ProbeSource::RESOLUTION,
    };
    let controller = CameraController::new(
        Intrinsics::from_fov(Resolution::new(1280, 720), 40.0),
        Vec3::Z,
        GestureScales::default(),
    );
    let encoder = Arc::new(RawEncoder {
        probe: probe.inner.clone(),
    });
    let session = Session::new(settings, controller, default_pose(), encoder).unwrap();
    (session, probe)
}
