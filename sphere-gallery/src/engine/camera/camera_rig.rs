use bevy::math::FloatExt;
use bevy::prelude::*;
use constants::camera::{
    CAMERA_SMOOTHING_RATE, DRAG_DISTANCE_MAX_MULTIPLIER, DRAG_DISTANCE_MIN_MULTIPLIER,
    DRAG_VELOCITY_SATURATION, LONG_AXIS_ALLOWANCE, MAX_TILE_SHORT_AXIS_FILL, MAX_VERTICAL_FOV,
    REFERENCE_HALF_HEIGHT, SURFACE_OFFSET,
};
use constants::layout::{ITEM_DIAMETER, TILE_SCALE};

/// Distance and vertical field of view the camera is converging toward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTarget {
    pub distance: f32,
    pub fov: f32,
}

/// Camera resting position: the surface offset is added, not scaled, so the
/// active tile keeps its on-screen size for any sphere radius.
pub fn rest_distance(radius: f32) -> f32 {
    radius + SURFACE_OFFSET
}

/// Pulled-back distance while the sphere is moving, scaled by radius.
pub fn moving_distance(radius: f32, velocity: f32) -> f32 {
    let factor = (velocity / DRAG_VELOCITY_SATURATION).clamp(0.0, 1.0);
    radius * DRAG_DISTANCE_MIN_MULTIPLIER.lerp(DRAG_DISTANCE_MAX_MULTIPLIER, factor)
}

/// Vertical field of view for a viewport aspect (width / height).
///
/// Derived from the reference half height at the resting surface gap, never
/// from the current radius. The long axis may open up by a bounded allowance;
/// past that the short axis narrows, but never so far that the active tile
/// stops fitting.
pub fn vertical_fov(aspect: f32) -> f32 {
    let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
    let reference = REFERENCE_HALF_HEIGHT / SURFACE_OFFSET;
    let tile = tile_half_tan();

    let ratio = aspect.max(1.0 / aspect);
    let long = reference * ratio.min(LONG_AXIS_ALLOWANCE);
    let short = (long / ratio).max(tile / MAX_TILE_SHORT_AXIS_FILL);
    let half_tan = if aspect >= 1.0 { short } else { short * ratio };

    (2.0 * half_tan.atan()).min(MAX_VERTICAL_FOV)
}

/// Tangent of the active tile's half extent seen from the resting camera.
fn tile_half_tan() -> f32 {
    TILE_SCALE * ITEM_DIAMETER * 0.5 / SURFACE_OFFSET
}

pub fn camera_target(radius: f32, velocity: f32, moving: bool, aspect: f32) -> CameraTarget {
    CameraTarget {
        distance: if moving {
            moving_distance(radius, velocity)
        } else {
            rest_distance(radius)
        },
        fov: vertical_fov(aspect),
    }
}

/// Low-pass filtered camera distance and field of view.
#[derive(Resource, Debug, Clone, Default)]
pub struct CameraRig {
    current: Option<CameraTarget>,
}

impl CameraRig {
    /// Moves toward `target`; the first call lands on it directly.
    pub fn update(&mut self, target: CameraTarget, dt: f32) -> CameraTarget {
        let alpha = 1.0 - (-CAMERA_SMOOTHING_RATE * dt.max(0.0)).exp();
        let next = match self.current {
            None => target,
            Some(current) => CameraTarget {
                distance: current.distance.lerp(target.distance, alpha),
                fov: current.fov.lerp(target.fov, alpha),
            },
        };
        self.current = Some(next);
        next
    }

    pub fn current(&self) -> Option<CameraTarget> {
        self.current
    }
}
