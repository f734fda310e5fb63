/// Gap between the camera and the sphere surface at rest.
pub const SURFACE_OFFSET: f32 = 1.5;

/// Half the visible frame height at `SURFACE_OFFSET` in the reference configuration.
/// Sized so the active tile covers roughly a third of a square viewport.
pub const REFERENCE_HALF_HEIGHT: f32 = 0.6;

/// Camera distance while dragging, as multiples of the sphere radius.
pub const DRAG_DISTANCE_MIN_MULTIPLIER: f32 = 2.4;
pub const DRAG_DISTANCE_MAX_MULTIPLIER: f32 = 3.2;

/// Angular velocity (rad/s) at which the drag pull-back saturates.
pub const DRAG_VELOCITY_SATURATION: f32 = 6.0;

/// Exponential approach rate (1/s) for distance and field of view.
pub const CAMERA_SMOOTHING_RATE: f32 = 10.0;

/// Upper bound for the vertical field of view on tall viewports, in radians.
pub const MAX_VERTICAL_FOV: f32 = 1.9;

/// How far the long viewport axis may widen past the reference framing before
/// the short axis is narrowed instead. Kept small so wide viewports never show
/// a neighbour; on 16:9 this leaves the active tile at about 90% of the frame
/// height, roughly 46% of its area, against about a third on a square view.
pub const LONG_AXIS_ALLOWANCE: f32 = 1.15;

/// The active tile never fills more than this share of the short viewport axis.
pub const MAX_TILE_SHORT_AXIS_FILL: f32 = 0.95;
