//! CPU ray caster
//!
//! One primary ray per pixel through the pinhole model, intersected with the
//! spheres and the ground plane. Ground hits get a checkerboard and a hard
//! shadow from a single directional light.

use framecast_core::{CameraPose, Frame, FrameError, Intrinsics, Resolution};
use glam::Vec3;

use crate::world::{Body, World};

const AMBIENT: f32 = 0.25;
const SKY_HORIZON: Vec3 = Vec3::new(0.75, 0.82, 0.92);
const SKY_ZENITH: Vec3 = Vec3::new(0.35, 0.5, 0.78);
const GROUND_LIGHT: Vec3 = Vec3::new(0.78, 0.78, 0.75);
const GROUND_DARK: Vec3 = Vec3::new(0.45, 0.45, 0.47);

fn light_dir() -> Vec3 {
    Vec3::new(0.4, 0.3, 1.0).normalize()
}

/// Render the world as seen from `pose`
pub fn render(
    world: &World,
    pose: &CameraPose,
    intrinsics: &Intrinsics,
    resolution: Resolution,
) -> Result<Frame, FrameError> {
    let (right, up, forward) = pose.basis();
    let origin = pose.position();
    let mut data = Vec::with_capacity(resolution.rgb_len());

    for py in 0..resolution.height {
        let y = (py as f32 + 0.5 - intrinsics.cy) / intrinsics.fy;
        for px in 0..resolution.width {
            let x = (px as f32 + 0.5 - intrinsics.cx) / intrinsics.fx;
            let dir = (right * x - up * y + forward).normalize();
            let color = trace(world, origin, dir);
            data.extend_from_slice(&to_rgb(color));
        }
    }

    Frame::from_rgb(resolution, data)
}

fn trace(world: &World, origin: Vec3, dir: Vec3) -> Vec3 {
    let sphere_hit = nearest_sphere(&world.bodies, origin, dir);
    let ground_t = if dir.z < -1e-6 && origin.z > 0.0 {
        Some(-origin.z / dir.z)
    } else {
        None
    };

    match (sphere_hit, ground_t) {
        (Some((t, body)), g) if g.map_or(true, |g| t < g) => {
            let point = origin + dir * t;
            let normal = (point - body.position) / body.radius;
            let diffuse = normal.dot(light_dir()).max(0.0);
            body.color * (AMBIENT + (1.0 - AMBIENT) * diffuse)
        }
        (_, Some(t)) => {
            let point = origin + dir * t;
            let checker = (point.x.floor() as i64 + point.y.floor() as i64).rem_euclid(2) == 0;
            let base = if checker { GROUND_LIGHT } else { GROUND_DARK };
            let lit = if nearest_sphere(&world.bodies, point, light_dir()).is_some() {
                AMBIENT
            } else {
                1.0
            };
            // fade the floor into the sky towards the horizon
            let fog = (t / 40.0).min(1.0);
            base * lit * (1.0 - fog) + SKY_HORIZON * fog
        }
        _ => {
            let k = dir.z.clamp(0.0, 1.0);
            SKY_HORIZON.lerp(SKY_ZENITH, k)
        }
    }
}

fn nearest_sphere(bodies: &[Body], origin: Vec3, dir: Vec3) -> Option<(f32, &Body)> {
    let mut best: Option<(f32, &Body)> = None;
    for body in bodies {
        let oc = origin - body.position;
        let b = oc.dot(dir);
        let c = oc.length_squared() - body.radius * body.radius;
        let disc = b * b - c;
        if disc < 0.0 {
            continue;
        }
        let t = -b - disc.sqrt();
        if t > 1e-4 && best.map_or(true, |(bt, _)| t < bt) {
            best = Some((t, body));
        }
    }
    best
}

fn to_rgb(color: Vec3) -> [u8; 3] {
    let c = color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
    [c.x.round() as u8, c.y.round() as u8, c.z.round() as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> World {
        World {
            bodies: vec![Body {
                position: Vec3::new(0.0, 0.0, 0.5),
                velocity: Vec3::ZERO,
                radius: 0.5,
                color: Vec3::new(1.0, 0.0, 0.0),
            }],
            gravity: Vec3::ZERO,
            restitution: 0.5,
            half_extent: 5.0,
            dt: 0.025,
            substeps: 1,
        }
    }

    fn camera() -> (CameraPose, Intrinsics, Resolution) {
        let res = Resolution::new(64, 48);
        let pose = CameraPose::new(Vec3::new(4.0, 0.0, 0.5), Vec3::new(0.0, 0.0, 0.5), Vec3::Z)
            .unwrap();
        (pose, Intrinsics::from_fov(res, 40.0), res)
    }

    #[test]
    fn test_sphere_in_center() {
        let (pose, k, res) = camera();
        let frame = render(&scene(), &pose, &k, res).unwrap();
        assert_eq!(frame.resolution(), res);
        let [r, g, b] = frame.pixel(32, 24).unwrap();
        assert!(r > 0 && g == 0 && b == 0, "center pixel {:?}", [r, g, b]);
    }

    #[test]
    fn test_sky_and_ground() {
        let (pose, k, res) = camera();
        let frame = render(&scene(), &pose, &k, res).unwrap();
        // top row looks above the horizon, bottom row hits the floor
        let sky = frame.pixel(0, 0).unwrap();
        let floor = frame.pixel(0, 47).unwrap();
        assert!(sky[2] > sky[0]);
        assert_ne!(sky, floor);
    }

    #[test]
    fn test_camera_moves_image() {
        let (pose, k, res) = camera();
        let moved = pose.translated(Vec3::new(0.0, 1.5, 0.0)).unwrap();
        let a = render(&scene(), &pose, &k, res).unwrap();
        let b = render(&scene(), &moved, &k, res).unwrap();
        assert_ne!(a, b);
    }
}
