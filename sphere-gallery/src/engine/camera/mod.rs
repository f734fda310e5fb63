/// Camera distance and field of view derived from sphere radius and viewport.
pub mod camera_rig;
