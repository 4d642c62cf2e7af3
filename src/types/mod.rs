//! Value types for bridge and zone parameters.

mod generation;
mod light_mode;
mod scene;
mod zone_type;

pub use generation::Generation;
pub use light_mode::LightMode;
pub use scene::SceneId;
pub use zone_type::ZoneType;
