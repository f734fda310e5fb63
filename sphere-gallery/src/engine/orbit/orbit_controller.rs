use super::arcball::Trackball;
use crate::engine::layout::sphere_layout::SphereState;
use bevy::prelude::*;
use constants::orbit::{
    MAX_FRAME_DELTA, MOMENTUM_DAMPING, MOMENTUM_REST_EPSILON, MOVING_THRESHOLD, SNAP_BASE_RATE,
    SNAP_DISTANCE_GAIN, SNAP_EPSILON, SNAP_MOMENTUM_THRESHOLD, VELOCITY_SMOOTHING_RATE,
};

/// Momentum is stored as the rotation applied over one reference frame.
const REFERENCE_FRAME_SECONDS: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrbitMode {
    Dragging,
    Settling,
}

/// What one tick changed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrbitTick {
    /// Slot that finished snapping to the camera this tick.
    pub settled_slot: Option<usize>,
    /// Rotation angle applied this tick, in radians.
    pub applied_angle: f32,
}

/// Pointer-driven sphere orientation with fling momentum and snap-to-item.
#[derive(Resource, Debug, Clone)]
pub struct OrbitController {
    orientation: Quat,
    mode: OrbitMode,
    trackball: Trackball,
    pointer: Option<Vec2>,
    last_applied_pointer: Option<Vec2>,
    momentum: Quat,
    velocity: f32,
    motion_axis: Vec3,
    snap_slot: Option<usize>,
    converged: bool,
}

impl Default for OrbitController {
    fn default() -> Self {
        Self::with_orientation(Quat::IDENTITY)
    }
}

impl OrbitController {
    pub fn with_orientation(orientation: Quat) -> Self {
        Self {
            orientation: orientation.normalize(),
            mode: OrbitMode::Settling,
            trackball: Trackball::default(),
            pointer: None,
            last_applied_pointer: None,
            momentum: Quat::IDENTITY,
            velocity: 0.0,
            motion_axis: Vec3::Y,
            snap_slot: None,
            converged: false,
        }
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn mode(&self) -> OrbitMode {
        self.mode
    }

    /// Smoothed angular velocity in rad/s.
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    /// World axis of the most recent rotation.
    pub fn motion_axis(&self) -> Vec3 {
        self.motion_axis
    }

    pub fn is_dragging(&self) -> bool {
        self.mode == OrbitMode::Dragging
    }

    pub fn is_moving(&self) -> bool {
        self.is_dragging() || self.velocity > MOVING_THRESHOLD
    }

    /// Whether the last settle landed exactly on a slot.
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    pub fn momentum_angle(&self) -> f32 {
        quat_angle(self.momentum)
    }

    pub fn set_viewport(&mut self, viewport: Vec2) {
        self.trackball.set_viewport(viewport);
    }

    pub fn pointer_down(&mut self, pos_px: Vec2) {
        self.mode = OrbitMode::Dragging;
        self.pointer = Some(pos_px);
        self.last_applied_pointer = Some(pos_px);
        self.momentum = Quat::IDENTITY;
        self.snap_slot = None;
        self.converged = false;
    }

    pub fn pointer_move(&mut self, pos_px: Vec2) {
        if self.is_dragging() {
            self.pointer = Some(pos_px);
        }
    }

    /// Pointer released or left the surface. Momentum from the last drag
    /// increment carries on.
    pub fn pointer_up(&mut self) {
        if !self.is_dragging() {
            return;
        }
        self.mode = OrbitMode::Settling;
        self.pointer = None;
        self.last_applied_pointer = None;
    }

    /// The layout was rebuilt; the orientation stays but the snap target is
    /// chosen again against the new slots.
    pub fn layout_changed(&mut self) {
        self.snap_slot = None;
        self.converged = false;
    }

    /// Advances one frame. Relayout must already have happened for this frame.
    pub fn tick(&mut self, dt: f32, sphere: &SphereState) -> OrbitTick {
        let dt = dt.clamp(0.0, MAX_FRAME_DELTA);
        let mut tick = OrbitTick::default();

        match self.mode {
            OrbitMode::Dragging => self.drag(dt, &mut tick),
            OrbitMode::Settling => {
                if self.momentum_angle() >= SNAP_MOMENTUM_THRESHOLD {
                    self.coast(dt, &mut tick);
                } else {
                    self.momentum = Quat::IDENTITY;
                    self.snap(dt, sphere, &mut tick);
                }
            }
        }

        if dt > 0.0 {
            let alpha = 1.0 - (-VELOCITY_SMOOTHING_RATE * dt).exp();
            self.velocity += (tick.applied_angle / dt - self.velocity) * alpha;
        }
        tick
    }

    fn drag(&mut self, dt: f32, tick: &mut OrbitTick) {
        let (Some(from), Some(to)) = (self.last_applied_pointer, self.pointer) else {
            return;
        };
        self.last_applied_pointer = Some(to);

        let delta = self.trackball.rotation(from, to);
        self.apply(delta, tick);

        // Normalise the increment to one reference frame so release speed does
        // not depend on the frame rate.
        self.momentum = if dt > 0.0 {
            Quat::IDENTITY.slerp(delta, REFERENCE_FRAME_SECONDS / dt).normalize()
        } else {
            Quat::IDENTITY
        };
    }

    fn coast(&mut self, dt: f32, tick: &mut OrbitTick) {
        let keep = (-MOMENTUM_DAMPING * dt).exp();
        self.momentum = Quat::IDENTITY.slerp(self.momentum, keep).normalize();
        if self.momentum_angle() < MOMENTUM_REST_EPSILON {
            self.momentum = Quat::IDENTITY;
            return;
        }
        let step = Quat::IDENTITY.slerp(self.momentum, dt / REFERENCE_FRAME_SECONDS);
        self.apply(step, tick);
    }

    fn snap(&mut self, dt: f32, sphere: &SphereState, tick: &mut OrbitTick) {
        if self.converged {
            return;
        }
        let slot = match self.snap_slot {
            Some(slot) if slot < sphere.points.len() => slot,
            _ => match sphere.active_slot(self.orientation) {
                Some(slot) => {
                    self.snap_slot = Some(slot);
                    slot
                }
                None => return,
            },
        };
        let Some(direction) = sphere.direction(slot) else {
            return;
        };

        let world = self.orientation * direction;
        let remaining = arc_between(world, Vec3::Z);
        let to_camera = Quat::from_rotation_arc(world, Vec3::Z);

        if remaining < SNAP_EPSILON {
            self.apply(to_camera, tick);
            self.converged = true;
            self.snap_slot = None;
            tick.settled_slot = Some(slot);
            return;
        }

        let fraction = 1.0 - (-(SNAP_BASE_RATE + SNAP_DISTANCE_GAIN * remaining) * dt).exp();
        self.apply(Quat::IDENTITY.slerp(to_camera, fraction.clamp(0.0, 1.0)), tick);
    }

    fn apply(&mut self, delta: Quat, tick: &mut OrbitTick) {
        let (axis, angle) = delta.to_axis_angle();
        if angle > 0.0 && axis.is_finite() {
            self.motion_axis = axis;
        }
        tick.applied_angle += quat_angle(delta);
        self.orientation = (delta * self.orientation).normalize();
    }
}

/// Rotation angle of a unit quaternion in [0, π]. Stays accurate for tiny
/// rotations where `acos(w)` loses all precision in f32.
fn quat_angle(q: Quat) -> f32 {
    2.0 * q.xyz().length().atan2(q.w.abs())
}

/// Angle between two unit vectors, accurate near zero.
pub fn arc_between(a: Vec3, b: Vec3) -> f32 {
    a.cross(b).length().atan2(a.dot(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::layout::sphere_layout::layout;

    const DT: f32 = 1.0 / 60.0;
    const VIEWPORT: Vec2 = Vec2::new(800.0, 600.0);

    fn controller() -> OrbitController {
        let mut orbit = OrbitController::default();
        orbit.set_viewport(VIEWPORT);
        orbit
    }

    /// Drags horizontally at a steady pixel rate, one move per tick.
    fn steady_drag(orbit: &mut OrbitController, sphere: &SphereState, frames: usize, px_per_frame: f32) {
        let mut pos = VIEWPORT / 2.0 - Vec2::new(px_per_frame * frames as f32 / 2.0, 0.0);
        orbit.pointer_down(pos);
        orbit.tick(DT, sphere);
        for _ in 0..frames {
            pos.x += px_per_frame;
            orbit.pointer_move(pos);
            orbit.tick(DT, sphere);
        }
        orbit.pointer_up();
    }

    #[test]
    fn orientation_stays_normalised_under_long_random_drags() {
        let sphere = layout(0);
        let mut orbit = controller();
        let mut seed: u32 = 12345;
        let mut next = || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (seed >> 8) as f32 / (1u32 << 24) as f32
        };

        orbit.pointer_down(Vec2::new(400.0, 300.0));
        for frame in 0..10_000 {
            orbit.pointer_move(Vec2::new(next() * 800.0, next() * 600.0));
            orbit.tick(DT * (0.5 + next()), &sphere);
            if frame % 97 == 0 {
                orbit.pointer_up();
                orbit.tick(DT, &sphere);
                orbit.pointer_down(Vec2::new(next() * 800.0, next() * 600.0));
            }
        }
        assert!((orbit.orientation().length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn momentum_decays_to_rest_after_a_fling() {
        let sphere = layout(0);
        let mut orbit = controller();
        steady_drag(&mut orbit, &sphere, 120, 4.0);
        assert!(orbit.is_moving());
        assert!(orbit.momentum_angle() > 0.0);

        let mut previous = orbit.velocity();
        let mut rest_frame = None;
        for frame in 0..600 {
            orbit.tick(DT, &sphere);
            assert!(orbit.velocity() <= previous + 1e-6, "velocity rose at frame {frame}");
            previous = orbit.velocity();
            if rest_frame.is_none() && !orbit.is_moving() {
                rest_frame = Some(frame);
            }
        }
        let rest_frame = rest_frame.expect("sphere never came to rest");
        assert!(rest_frame < 200, "took {rest_frame} frames to rest");
        assert_eq!(orbit.momentum_angle(), 0.0);
    }

    #[test]
    fn holding_still_before_release_leaves_no_fling() {
        let sphere = layout(0);
        let mut orbit = controller();
        orbit.pointer_down(Vec2::new(400.0, 300.0));
        orbit.pointer_move(Vec2::new(420.0, 300.0));
        orbit.tick(DT, &sphere);
        orbit.tick(DT, &sphere);
        orbit.pointer_up();
        assert_eq!(orbit.momentum_angle(), 0.0);
    }

    #[test]
    fn release_near_an_item_snaps_to_it_without_overshoot() {
        let sphere = layout(42);
        let target = 7;
        let facing = Quat::from_rotation_arc(sphere.points[target].direction, Vec3::Z);
        let offset = Quat::from_axis_angle(Vec3::new(1.0, 1.0, 0.0).normalize(), 0.1);
        let mut orbit = OrbitController::with_orientation(offset * facing);
        orbit.set_viewport(VIEWPORT);

        orbit.pointer_down(Vec2::new(400.0, 300.0));
        orbit.tick(DT, &sphere);
        orbit.pointer_move(Vec2::new(401.0, 300.0));
        orbit.tick(DT, &sphere);
        orbit.pointer_up();

        let remaining = |orbit: &OrbitController| {
            arc_between(orbit.orientation() * sphere.points[target].direction, Vec3::Z)
        };

        let mut settled = None;
        let mut snapping_distance: Option<f32> = None;
        for frame in 0..600 {
            let tick = orbit.tick(DT, &sphere);
            assert_eq!(sphere.active_slot(orbit.orientation()), Some(target));
            if orbit.momentum_angle() == 0.0 {
                let now = remaining(&orbit);
                if let Some(before) = snapping_distance {
                    assert!(now <= before + 1e-5, "snap overshot at frame {frame}");
                }
                snapping_distance = Some(now);
            }
            if let Some(slot) = tick.settled_slot {
                settled = Some((slot, frame));
                break;
            }
        }

        let (slot, frame) = settled.expect("snap never converged");
        assert_eq!(slot, target);
        assert!(frame < 300, "snap took {frame} frames");
        assert!(remaining(&orbit) < 1e-3);
        assert!(orbit.is_converged());
    }

    #[test]
    fn settle_fires_once_until_the_next_interaction() {
        let sphere = layout(12);
        let mut orbit = controller();
        let mut settles = 0;
        for _ in 0..600 {
            if orbit.tick(DT, &sphere).settled_slot.is_some() {
                settles += 1;
            }
        }
        assert_eq!(settles, 1);

        orbit.layout_changed();
        let mut again = 0;
        for _ in 0..600 {
            if orbit.tick(DT, &sphere).settled_slot.is_some() {
                again += 1;
            }
        }
        assert_eq!(again, 1);
    }

    #[test]
    fn empty_layout_never_settles() {
        let sphere = layout(0);
        let mut orbit = controller();
        for _ in 0..120 {
            assert_eq!(orbit.tick(DT, &sphere).settled_slot, None);
        }
        assert!(!orbit.is_moving());
    }

    #[test]
    fn dragging_counts_as_moving_even_when_still() {
        let sphere = layout(5);
        let mut orbit = controller();
        orbit.pointer_down(Vec2::new(10.0, 10.0));
        for _ in 0..30 {
            orbit.tick(DT, &sphere);
        }
        assert!(orbit.is_moving());
        assert_eq!(orbit.mode(), OrbitMode::Dragging);
    }
}
