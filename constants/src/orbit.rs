/// Rotation gain applied to trackball increments. A full-width drag turns the
/// sphere by about half a revolution.
pub const DRAG_ROTATION_GAIN: f32 = 1.42;

/// Decay rate (1/s) of the momentum increment toward identity.
pub const MOMENTUM_DAMPING: f32 = 5.0;

/// Momentum increments smaller than this (radians per frame) are dropped.
pub const MOMENTUM_REST_EPSILON: f32 = 1.0e-5;

/// Snap engages once the momentum increment falls below this (radians per frame).
pub const SNAP_MOMENTUM_THRESHOLD: f32 = 2.0e-3;

/// Snap approach rate (1/s) applied at any distance.
pub const SNAP_BASE_RATE: f32 = 4.0;

/// Extra snap rate (1/s per radian of remaining arc).
pub const SNAP_DISTANCE_GAIN: f32 = 6.0;

/// Remaining arc (radians) below which the snap lands exactly.
pub const SNAP_EPSILON: f32 = 1.0e-3;

/// Exponential filter rate (1/s) for the angular velocity signal.
pub const VELOCITY_SMOOTHING_RATE: f32 = 12.0;

/// Angular velocity (rad/s) above which the sphere counts as moving.
pub const MOVING_THRESHOLD: f32 = 0.05;

/// Elastic stretch per rad/s of angular velocity, clamped to `MAX_STRETCH`.
pub const STRETCH_PER_VELOCITY: f32 = 0.04;
pub const MAX_STRETCH: f32 = 0.25;

/// Frame step clamp; long stalls are replayed as one short frame.
pub const MAX_FRAME_DELTA: f32 = 0.1;
