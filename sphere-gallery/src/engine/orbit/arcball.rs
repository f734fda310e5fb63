use bevy::prelude::*;
use constants::orbit::DRAG_ROTATION_GAIN;

/// Virtual trackball over the viewport.
///
/// Pointer positions map onto a unit hemisphere near the centre and onto a
/// hyperbolic sheet further out, so drags that leave the ball keep rotating
/// smoothly instead of snapping to the rim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trackball {
    viewport: Vec2,
}

impl Default for Trackball {
    fn default() -> Self {
        Self {
            viewport: Vec2::new(1280.0, 720.0),
        }
    }
}

impl Trackball {
    pub fn new(viewport: Vec2) -> Self {
        let mut trackball = Self::default();
        trackball.set_viewport(viewport);
        trackball
    }

    pub fn set_viewport(&mut self, viewport: Vec2) {
        self.viewport = viewport.max(Vec2::ONE);
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    /// Pixel position (origin top-left, y down) to a unit vector on the ball.
    pub fn project(&self, pos_px: Vec2) -> Vec3 {
        let min_dim = self.viewport.min_element();
        let x = (2.0 * pos_px.x - self.viewport.x) / min_dim;
        let y = (self.viewport.y - 2.0 * pos_px.y) / min_dim;

        let d2 = x * x + y * y;
        let z = if d2 <= 0.5 { (1.0 - d2).sqrt() } else { 0.5 / d2.sqrt() };
        Vec3::new(x, y, z).normalize()
    }

    /// World rotation dragging from `from_px` to `to_px`, scaled by the drag gain.
    pub fn rotation(&self, from_px: Vec2, to_px: Vec2) -> Quat {
        let from = self.project(from_px);
        let to = self.project(to_px);

        let axis = from.cross(to);
        if axis.length_squared() < 1.0e-12 {
            return Quat::IDENTITY;
        }
        let angle = from.dot(to).clamp(-1.0, 1.0).acos() * DRAG_ROTATION_GAIN;
        Quat::from_axis_angle(axis.normalize(), angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_projects_to_the_front_pole() {
        let ball = Trackball::new(Vec2::new(800.0, 600.0));
        let centre = ball.project(Vec2::new(400.0, 300.0));
        assert!(centre.abs_diff_eq(Vec3::Z, 1e-6));
    }

    #[test]
    fn far_positions_stay_on_the_hyperbolic_sheet() {
        let ball = Trackball::new(Vec2::new(800.0, 600.0));
        let corner = ball.project(Vec2::new(800.0, 0.0));
        assert!(corner.z > 0.0);
        assert!((corner.length() - 1.0).abs() < 1e-5);
        assert!(corner.x > 0.0 && corner.y > 0.0);
    }

    #[test]
    fn dragging_right_turns_the_front_toward_plus_x() {
        let ball = Trackball::new(Vec2::new(800.0, 600.0));
        let rotation = ball.rotation(Vec2::new(400.0, 300.0), Vec2::new(430.0, 300.0));
        let front = rotation * Vec3::Z;
        assert!(front.x > 0.0);
        assert!(front.y.abs() < 1e-6);
    }

    #[test]
    fn full_width_drag_is_about_half_a_turn() {
        let ball = Trackball::new(Vec2::new(1000.0, 1000.0));
        let mut total = 0.0;
        let mut x = 0.0;
        while x < 1000.0 {
            let (angle_axis, angle) = ball
                .rotation(Vec2::new(x, 500.0), Vec2::new(x + 10.0, 500.0))
                .to_axis_angle();
            assert!(angle_axis.y > 0.0);
            total += angle;
            x += 10.0;
        }
        assert!(total > 0.4 * std::f32::consts::TAU && total < 0.6 * std::f32::consts::TAU);
    }

    #[test]
    fn stationary_pointer_is_identity() {
        let ball = Trackball::default();
        let p = Vec2::new(12.0, 99.0);
        assert_eq!(ball.rotation(p, p), Quat::IDENTITY);
    }
}
