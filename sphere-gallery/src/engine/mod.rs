pub mod assets;
pub mod atlas;
pub mod camera;
pub mod core;
pub mod events;
pub mod instances;
pub mod layout;
pub mod loading;
pub mod orbit;
pub mod render;
pub mod systems;
