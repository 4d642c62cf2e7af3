//! Bridge protocol generations.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The two wire protocol generations spoken by Milight bridges.
///
/// Legacy bridges (v1-v5) accept short broadcast-style packets and only
/// support relative dimming on some zone types. The iBox (v6) speaks a
/// session-based protocol with absolute brightness, temperature and hue,
/// and exposes additional zone types.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use milight_rs::Generation;
///
/// assert_eq!(Generation::from_str("legacy").unwrap(), Generation::Legacy);
/// assert_eq!(Generation::from_str("v6").unwrap(), Generation::IBox);
/// assert_eq!(Generation::IBox.to_string(), "iBox");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString)]
pub enum Generation {
    /// First generation protocol (wifi bridges v1-v5).
    #[strum(serialize = "legacy")]
    #[serde(rename = "legacy")]
    Legacy,
    /// iBox / v6 protocol.
    #[strum(serialize = "iBox", serialize = "v6")]
    #[serde(rename = "iBox", alias = "v6")]
    IBox,
}

impl Generation {
    /// UDP port the bridge listens on for commands.
    pub fn command_port(&self) -> u16 {
        match self {
            Generation::Legacy => 8899,
            Generation::IBox => 5987,
        }
    }
}
