/// Diameter of one tile's footprint on the sphere surface, in world units.
pub const ITEM_DIAMETER: f32 = 1.0;

/// Surface area reserved per item, as a multiple of `ITEM_DIAMETER²`.
pub const PADDING_FACTOR: f32 = 3.5;

/// Item count of the reference full-sphere configuration.
pub const REFERENCE_ITEM_COUNT: usize = 42;

/// Sphere radius used for every count up to `REFERENCE_ITEM_COUNT`.
pub const REFERENCE_RADIUS: f32 = 2.6;

/// Rendered tile edge as a fraction of `ITEM_DIAMETER`.
pub const TILE_SCALE: f32 = 0.7;

/// How strongly tiles shrink toward the horizon (0 disables it).
pub const HORIZON_FADE_INTENSITY: f32 = 0.5;

/// Largest count laid out on icosahedron vertices.
pub const ICOSAHEDRON_MAX_COUNT: usize = 12;

/// Largest count laid out on the half-offset golden spiral.
pub const SPIRAL_MAX_COUNT: usize = 42;
