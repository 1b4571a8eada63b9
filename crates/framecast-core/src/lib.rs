//! Framecast Core - Frames, camera geometry, and the frame source contract
//!
//! This crate provides the foundational types for the Framecast system:
//! - RGB frames and their resolution
//! - Camera poses, pinhole intrinsics, and the gesture-driven camera controller
//! - The `FrameSource` trait implemented by simulation/render engines
//! - `FrameCycle`, a pull-based frame iterator with cyclic restart
//! - Image encoders used to put frames on the wire

pub mod camera;
pub mod encode;
pub mod frame;
pub mod gesture;
pub mod source;

pub use camera::{CameraController, CameraPose, GestureScales, Intrinsics, PoseError};
pub use encode::{EncodeError, FrameEncoder, ImageFormat, ImageEncoder};
pub use frame::{Frame, FrameError, Resolution};
pub use gesture::GestureEvent;
pub use source::{BuildError, CycleFrame, FrameCycle, FrameSource, SourceError};
