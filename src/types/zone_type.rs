//! Zone type catalog.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The kinds of zones a Milight bridge can address.
///
/// Each bridge generation exposes a fixed catalog of zones per type; which
/// capability operations are legal depends on the zone type (e.g. only
/// color-capable types accept a hue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString)]
pub enum ZoneType {
    /// Single-channel RGB strip controller, relative dimming only.
    #[strum(serialize = "RGB")]
    #[serde(rename = "RGB")]
    Rgb,
    /// RGB + white bulbs, four zones per bridge.
    #[strum(serialize = "RGBW")]
    #[serde(rename = "RGBW")]
    Rgbw,
    /// Dual-white bulbs, relative dimming and temperature stepping.
    #[strum(serialize = "White")]
    #[serde(rename = "White")]
    White,
    /// RGB + tunable white bulbs (iBox only).
    #[strum(serialize = "RGBWW")]
    #[serde(rename = "RGBWW")]
    Rgbww,
    /// The iBox's own built-in light.
    #[strum(serialize = "Bridge")]
    #[serde(rename = "Bridge")]
    Bridge,
    /// RGB+CCT controller addressing eight zones (iBox only).
    #[strum(serialize = "8-Zone Controller")]
    #[serde(rename = "8-Zone Controller")]
    EightZoneController,
}
