//! Framecast Sim - Reference frame source
//!
//! A deliberately small scene used by the daemon when no other engine is
//! plugged in:
//! - Rigid spheres under gravity bouncing off the ground, the arena walls,
//!   and each other
//! - A CPU ray caster that renders the scene through the Framecast pinhole
//!   camera model
//!
//! Physical accuracy is not a goal; the scene exists so there is something
//! moving to stream.

pub mod raster;
pub mod source;
pub mod world;

pub use source::{SceneConfig, SimError, SimSource};
pub use world::{Body, World};
