//! Frame source contract and the pull-based frame cycle
//!
//! A [`FrameSource`] is the simulation/render engine: slow, stateful, and
//! single-producer. [`FrameCycle`] wraps one and hands out frames on demand,
//! restarting the underlying simulation every `max_frames` frames.

use thiserror::Error;
use tracing::debug;

use crate::camera::CameraPose;
use crate::frame::{Frame, Resolution};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Render failed: {0}")]
    Render(String),
    #[error("Simulation step failed: {0}")]
    Step(String),
    #[error("Restart failed: {0}")]
    Restart(String),
    #[error("Camera update rejected: {0}")]
    Camera(String),
    #[error("Frame source is closed")]
    Closed,
}

/// Frame source construction failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to build frame source: {0}")]
pub struct BuildError(pub String);

/// Simulation/render engine driven by the frame loop
///
/// Implementations are only ever called from one place at a time; the session
/// serializes camera updates against `render`/`step`.
pub trait FrameSource: Send {
    /// Fixed output resolution
    fn resolution(&self) -> Resolution;

    /// Capture the current scene from the current camera
    fn render(&mut self) -> Result<Frame, SourceError>;

    /// Advance the simulation by one frame
    fn step(&mut self) -> Result<(), SourceError>;

    /// Return the simulation to its initial state
    fn restart(&mut self) -> Result<(), SourceError>;

    /// Move the render camera
    fn set_camera(&mut self, pose: &CameraPose) -> Result<(), SourceError>;

    /// Release engine resources. Called at most once.
    fn close(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn resolution(&self) -> Resolution {
        (**self).resolution()
    }

    fn render(&mut self) -> Result<Frame, SourceError> {
        (**self).render()
    }

    fn step(&mut self) -> Result<(), SourceError> {
        (**self).step()
    }

    fn restart(&mut self) -> Result<(), SourceError> {
        (**self).restart()
    }

    fn set_camera(&mut self, pose: &CameraPose) -> Result<(), SourceError> {
        (**self).set_camera(pose)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// A frame pulled from a [`FrameCycle`]
#[derive(Debug, Clone)]
pub struct CycleFrame {
    pub frame: Frame,
    /// Position of this frame within the current cycle
    pub index: u64,
    /// The source was restarted right after this frame was captured
    pub restarted: bool,
}

/// Pull-based frame iterator with cyclic replay
///
/// Each `next_frame` renders the current state and then steps the simulation.
/// After `max_frames` frames the source is restarted and the index goes back
/// to zero. A `max_frames` of zero disables the restart.
pub struct FrameCycle<S> {
    source: S,
    frame_index: u64,
    max_frames: u64,
}

impl<S: FrameSource> FrameCycle<S> {
    pub fn new(source: S, max_frames: u64) -> Self {
        Self {
            source,
            frame_index: 0,
            max_frames,
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Render, step, and advance the cycle
    ///
    /// On error the index is left untouched so the same frame is attempted
    /// again on the next call.
    pub fn next_frame(&mut self) -> Result<CycleFrame, SourceError> {
        let frame = self.source.render()?;
        self.source.step()?;

        let index = self.frame_index;
        self.frame_index += 1;

        let restarted = self.max_frames > 0 && self.frame_index >= self.max_frames;
        if restarted {
            self.source.restart()?;
            debug!(frames = self.frame_index, "Frame cycle restarted");
            self.frame_index = 0;
        }

        Ok(CycleFrame {
            frame,
            index,
            restarted,
        })
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encodes its step counter into the first pixel
    struct Counter {
        steps: u8,
        restarts: usize,
        fail_render: bool,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                steps: 0,
                restarts: 0,
                fail_render: false,
            }
        }
    }

    impl FrameSource for Counter {
        fn resolution(&self) -> Resolution {
            Resolution::new(1, 1)
        }

        fn render(&mut self) -> Result<Frame, SourceError> {
            if self.fail_render {
                return Err(SourceError::Render("boom".to_string()));
            }
            Ok(Frame::from_rgb(self.resolution(), vec![self.steps, 0, 0]).unwrap())
        }

        fn step(&mut self) -> Result<(), SourceError> {
            self.steps += 1;
            Ok(())
        }

        fn restart(&mut self) -> Result<(), SourceError> {
            self.steps = 0;
            self.restarts += 1;
            Ok(())
        }

        fn set_camera(&mut self, _pose: &CameraPose) -> Result<(), SourceError> {
            Ok(())
        }
    }

    #[test]
    fn test_frames_render_before_step() {
        let mut cycle = FrameCycle::new(Counter::new(), 0);
        let first = cycle.next_frame().unwrap();
        let second = cycle.next_frame().unwrap();
        assert_eq!(first.frame.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(second.frame.pixel(0, 0), Some([1, 0, 0]));
        assert_eq!((first.index, second.index), (0, 1));
        assert_eq!(cycle.frame_index(), 2);
    }

    #[test]
    fn test_cycle_restarts_at_max_frames() {
        let mut cycle = FrameCycle::new(Counter::new(), 3);
        let frames: Vec<CycleFrame> = (0..4).map(|_| cycle.next_frame().unwrap()).collect();

        assert_eq!(
            frames.iter().map(|f| f.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 0]
        );
        assert!(frames[2].restarted);
        assert!(!frames[3].restarted);
        // first frame after the restart is the initial state again
        assert_eq!(frames[3].frame, frames[0].frame);
        assert_eq!(cycle.source().restarts, 1);
        assert_eq!(cycle.frame_index(), 1);
    }

    #[test]
    fn test_failed_render_keeps_index() {
        let mut cycle = FrameCycle::new(Counter::new(), 10);
        cycle.next_frame().unwrap();
        cycle.source_mut().fail_render = true;
        assert!(matches!(cycle.next_frame(), Err(SourceError::Render(_))));
        assert_eq!(cycle.frame_index(), 1);

        cycle.source_mut().fail_render = false;
        assert_eq!(cycle.next_frame().unwrap().index, 1);
    }
}
