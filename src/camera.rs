//! Perspective camera and orbit control.
//!
//! The camera is a plain position + look-at target pair; view and projection
//! matrices are derived on demand. `OrbitController` turns mouse drags and
//! scroll wheel input into yaw/pitch orbits around the target, matching the
//! feel of the usual demo orbit controls (drag to rotate, wheel to dolly,
//! a minimum distance so you cannot zoom through the target).

use glam::{Mat4, Vec3};

/// Minimum dolly distance for orbit control.
pub const MIN_ORBIT_DISTANCE: f32 = 3.0;

/// Perspective look-at camera.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Eye position in world space.
    pub eye: Vec3,
    /// Look-at target in world space.
    pub target: Vec3,
    /// Up vector (world Y unless you have a reason otherwise).
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Aspect ratio (width / height).
    pub aspect: f32,
    /// Near clip plane distance.
    pub near: f32,
    /// Far clip plane distance.
    pub far: f32,
}

impl Camera {
    /// Camera framing the sphere field: 70 degree fov, eye slightly above and
    /// behind the origin, looking at the grid center.
    pub fn field_view(aspect: f32) -> Self {
        Self {
            eye: Vec3::new(0.0, 5.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: 70f32.to_radians(),
            aspect,
            near: 1.0,
            far: 10_000.0,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Normalized direction from eye to target.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.eye).normalize_or_zero()
    }

    /// Update aspect ratio (call on resize).
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }
}

/// Mouse-driven orbit around the camera target.
///
/// Keeps the orbit state (yaw, pitch, distance) authoritative and writes the
/// derived eye position back into the camera via [`OrbitController::apply`].
pub struct OrbitController {
    yaw: f32,
    pitch: f32,
    distance: f32,
    rotate_speed: f32,
    zoom_speed: f32,
    dragging: bool,
    last_cursor: Option<(f64, f64)>,
}

impl OrbitController {
    /// Initialise orbit state from the camera's current eye/target.
    pub fn from_camera(camera: &Camera) -> Self {
        let offset = camera.eye - camera.target;
        let distance = offset.length().max(MIN_ORBIT_DISTANCE);
        let pitch = (offset.y / distance).clamp(-1.0, 1.0).asin();
        let yaw = offset.x.atan2(offset.z);
        Self {
            yaw,
            pitch,
            distance,
            rotate_speed: 0.005,
            zoom_speed: 0.1,
            dragging: false,
            last_cursor: None,
        }
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
        if !dragging {
            self.last_cursor = None;
        }
    }

    /// Feed an absolute cursor position; rotates only while dragging.
    pub fn on_cursor_moved(&mut self, x: f64, y: f64) {
        if !self.dragging {
            return;
        }
        if let Some((last_x, last_y)) = self.last_cursor {
            let dx = (x - last_x) as f32;
            let dy = (y - last_y) as f32;
            self.rotate(dx, dy);
        }
        self.last_cursor = Some((x, y));
    }

    /// Rotate by raw pixel deltas.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * self.rotate_speed;
        self.pitch += dy * self.rotate_speed;

        // Clamp pitch shy of the poles so look_at keeps a well-defined up.
        let max_pitch = std::f32::consts::FRAC_PI_2 - 0.01;
        self.pitch = self.pitch.clamp(-max_pitch, max_pitch);
    }

    /// Dolly in/out; positive steps move closer.
    pub fn dolly(&mut self, steps: f32) {
        self.distance *= 1.0 - steps * self.zoom_speed;
        self.distance = self.distance.max(MIN_ORBIT_DISTANCE);
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Write the orbit state back into the camera eye position.
    pub fn apply(&self, camera: &mut Camera) {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let offset = Vec3::new(
            cos_pitch * sin_yaw,
            sin_pitch,
            cos_pitch * cos_yaw,
        ) * self.distance;
        camera.eye = camera.target + offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_matrix_faces_target() {
        let camera = Camera::field_view(4.0 / 3.0);
        let view = camera.view_matrix();
        // The target should land in front of the camera (negative Z in view space).
        let target_in_view = view.transform_point3(camera.target);
        assert!(target_in_view.z < 0.0);
    }

    #[test]
    fn test_forward_points_at_target() {
        let camera = Camera::field_view(1.0);
        let fwd = camera.forward();
        let expected = (camera.target - camera.eye).normalize();
        assert!((fwd - expected).length() < 1e-6);
    }

    #[test]
    fn test_orbit_roundtrip_preserves_eye() {
        let mut camera = Camera::field_view(1.0);
        let eye_before = camera.eye;
        let orbit = OrbitController::from_camera(&camera);
        orbit.apply(&mut camera);
        assert!((camera.eye - eye_before).length() < 1e-4);
    }

    #[test]
    fn test_orbit_pitch_clamped() {
        let mut camera = Camera::field_view(1.0);
        let mut orbit = OrbitController::from_camera(&camera);
        orbit.set_dragging(true);
        orbit.rotate(0.0, 1e6);
        orbit.apply(&mut camera);
        // Even after an absurd drag, the eye stays a well-defined distance
        // away and never flips past the pole.
        let offset = camera.eye - camera.target;
        assert!(offset.length() > 0.0);
        assert!(offset.y < offset.length());
    }

    #[test]
    fn test_dolly_respects_min_distance() {
        let camera = Camera::field_view(1.0);
        let mut orbit = OrbitController::from_camera(&camera);
        for _ in 0..100 {
            orbit.dolly(5.0);
        }
        assert!(orbit.distance() >= MIN_ORBIT_DISTANCE);
    }

    #[test]
    fn test_set_aspect_ignores_zero() {
        let mut camera = Camera::field_view(2.0);
        camera.set_aspect(0, 600);
        assert_eq!(camera.aspect, 2.0);
        camera.set_aspect(800, 600);
        assert!((camera.aspect - 800.0 / 600.0).abs() < 1e-6);
    }
}
