//! Sphere physics

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A rigid sphere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub position: Vec3,
    #[serde(default)]
    pub velocity: Vec3,
    pub radius: f32,
    /// Albedo, 0-1 per channel
    pub color: Vec3,
}

impl Body {
    /// Mass proportional to volume, unit density
    fn inv_mass(&self) -> f32 {
        1.0 / self.radius.powi(3)
    }
}

/// Sphere world on a ground plane at z = 0, enclosed by square walls
#[derive(Debug, Clone, PartialEq)]
pub struct World {
    pub bodies: Vec<Body>,
    pub gravity: Vec3,
    /// Fraction of normal velocity kept after a contact
    pub restitution: f32,
    /// Walls sit at x, y = +-half_extent
    pub half_extent: f32,
    /// Seconds advanced per `step`
    pub dt: f32,
    pub substeps: u32,
}

impl World {
    /// Advance by `dt`, split into `substeps` semi-implicit Euler updates
    pub fn step(&mut self) {
        let substeps = self.substeps.max(1);
        let h = self.dt / substeps as f32;
        for _ in 0..substeps {
            for body in &mut self.bodies {
                body.velocity += self.gravity * h;
                body.position += body.velocity * h;
            }
            self.resolve_bounds();
            self.resolve_pairs();
        }
    }

    fn resolve_bounds(&mut self) {
        let e = self.restitution;
        for body in &mut self.bodies {
            let r = body.radius;
            if body.position.z < r {
                body.position.z = r;
                if body.velocity.z < 0.0 {
                    body.velocity.z = -body.velocity.z * e;
                }
            }
            let limit = (self.half_extent - r).max(0.0);
            for axis in 0..2 {
                if body.position[axis] > limit {
                    body.position[axis] = limit;
                    if body.velocity[axis] > 0.0 {
                        body.velocity[axis] = -body.velocity[axis] * e;
                    }
                } else if body.position[axis] < -limit {
                    body.position[axis] = -limit;
                    if body.velocity[axis] < 0.0 {
                        body.velocity[axis] = -body.velocity[axis] * e;
                    }
                }
            }
        }
    }

    fn resolve_pairs(&mut self) {
        let e = self.restitution;
        let n = self.bodies.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let (head, tail) = self.bodies.split_at_mut(j);
                let a = &mut head[i];
                let b = &mut tail[0];

                let delta = b.position - a.position;
                let dist = delta.length();
                let overlap = a.radius + b.radius - dist;
                if overlap <= 0.0 || dist < 1e-6 {
                    continue;
                }
                let normal = delta / dist;
                let (wa, wb) = (a.inv_mass(), b.inv_mass());
                let total = wa + wb;

                a.position -= normal * overlap * (wa / total);
                b.position += normal * overlap * (wb / total);

                let closing = (b.velocity - a.velocity).dot(normal);
                if closing < 0.0 {
                    let impulse = -(1.0 + e) * closing / total;
                    a.velocity -= normal * impulse * wa;
                    b.velocity += normal * impulse * wb;
                }
            }
        }
    }
}
