//! Color / temperature mode tracking.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Which of the two exclusive output modes a zone was last driven in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum LightMode {
    /// The zone is rendering a hue (and optionally saturation).
    #[strum(serialize = "color")]
    #[serde(rename = "color")]
    Color,
    /// The zone is rendering white at some color temperature.
    #[strum(serialize = "temperature")]
    #[serde(rename = "temperature")]
    Temperature,
}
