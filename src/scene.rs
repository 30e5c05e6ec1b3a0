//! The sphere field scene.
//!
//! A square grid of identical spheres on the XZ plane. Each sphere carries
//! its own translation and a slowly advancing Y rotation; visibility is not
//! stored here — the occlusion tracker owns that — so the scene stays a pure
//! description of transforms.

use glam::{Mat4, Vec3};

/// Default grid dimension (dim x dim spheres).
pub const DEFAULT_GRID_DIM: usize = 10;

/// Distance between neighbouring sphere centers.
pub const SPHERE_SPACING: f32 = 35.0;

/// Sphere radius. Deliberately large relative to the spacing so the field is
/// dense and most of it occludes itself from a low camera angle.
pub const SPHERE_RADIUS: f32 = 20.0;

/// Per-frame Y rotation increment.
pub const SPIN_STEP: f32 = 0.003;

/// One sphere instance.
#[derive(Clone, Debug)]
pub struct Sphere {
    pub position: Vec3,
    /// Accumulated Y rotation in radians.
    pub spin: f32,
}

impl Sphere {
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position) * Mat4::from_rotation_y(self.spin)
    }
}

/// The full grid of spheres.
pub struct SphereField {
    spheres: Vec<Sphere>,
    radius: f32,
}

impl SphereField {
    /// Build a dim x dim grid centered on the origin.
    pub fn grid(dim: usize) -> Self {
        let offset = dim as f32 / 2.0 - 0.5;
        let mut spheres = Vec::with_capacity(dim * dim);
        for i in 0..dim * dim {
            let x = (i / dim.max(1)) as f32 - offset;
            let z = (i % dim.max(1)) as f32 - offset;
            spheres.push(Sphere {
                position: Vec3::new(x * SPHERE_SPACING, 0.0, z * SPHERE_SPACING),
                spin: 0.0,
            });
        }
        Self {
            spheres,
            radius: SPHERE_RADIUS,
        }
    }

    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    /// Advance every sphere's spin by one step.
    pub fn advance(&mut self) {
        for sphere in &mut self.spheres {
            sphere.spin = (sphere.spin + SPIN_STEP) % std::f32::consts::TAU;
        }
    }

    /// Indices of all spheres ordered nearest-first in view space.
    ///
    /// The proxy/query pass walks this order so that near geometry is
    /// rasterised before the boxes it may occlude.
    pub fn depth_order(&self, view: &Mat4) -> Vec<usize> {
        let mut order: Vec<(usize, f32)> = self
            .spheres
            .iter()
            .enumerate()
            .map(|(i, sphere)| (i, view.transform_point3(sphere.position).z))
            .collect();
        // View space looks down -Z, so the nearest sphere has the largest Z.
        order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        order.into_iter().map(|(i, _)| i).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;

    #[test]
    fn test_grid_count_and_spacing() {
        let field = SphereField::grid(10);
        assert_eq!(field.len(), 100);

        // Neighbours along Z are exactly one spacing apart.
        let a = field.spheres()[0].position;
        let b = field.spheres()[1].position;
        assert!((b.z - a.z - SPHERE_SPACING).abs() < 1e-4);
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn test_grid_is_centered() {
        let field = SphereField::grid(10);
        let sum: Vec3 = field.spheres().iter().map(|s| s.position).sum();
        assert!(sum.length() < 1e-3);
    }

    #[test]
    fn test_depth_order_nearest_first() {
        let field = SphereField::grid(4);
        let camera = Camera::field_view(1.0);
        let view = camera.view_matrix();
        let order = field.depth_order(&view);

        assert_eq!(order.len(), field.len());
        let depths: Vec<f32> = order
            .iter()
            .map(|&i| view.transform_point3(field.spheres()[i].position).z)
            .collect();
        // Largest view-space Z (nearest) first, monotonically decreasing.
        for pair in depths.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn test_advance_spins_and_wraps() {
        let mut field = SphereField::grid(2);
        field.advance();
        assert!((field.spheres()[0].spin - SPIN_STEP).abs() < 1e-7);

        // Spin stays bounded no matter how long we run.
        for _ in 0..10_000 {
            field.advance();
        }
        for sphere in field.spheres() {
            assert!(sphere.spin >= 0.0 && sphere.spin < std::f32::consts::TAU);
        }
    }

    #[test]
    fn test_empty_grid() {
        let field = SphereField::grid(0);
        assert!(field.is_empty());
        let camera = Camera::field_view(1.0);
        assert!(field.depth_order(&camera.view_matrix()).is_empty());
    }

    #[test]
    fn test_model_matrix_translates() {
        let sphere = Sphere {
            position: Vec3::new(35.0, 0.0, -70.0),
            spin: 0.0,
        };
        let origin = sphere.model_matrix().transform_point3(Vec3::ZERO);
        assert!((origin - sphere.position).length() < 1e-5);
    }
}
