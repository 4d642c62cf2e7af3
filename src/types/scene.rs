//! Scene effect identifiers.

use serde::{Deserialize, Serialize};

/// A discrete effect mode index on iBox hardware.
///
/// The v6 protocol addresses its built-in animations by index; legacy
/// bridges only know "advance to the next effect".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneId {
    pub(crate) value: u8,
}

impl SceneId {
    const MIN: u8 = 1;
    const MAX: u8 = 9;

    /// Get the raw scene index.
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Returns `None` if the index is outside the hardware's range (1-9).
    ///
    /// # Examples
    ///
    /// ```
    /// use milight_rs::SceneId;
    ///
    /// assert!(SceneId::create(0).is_none());
    /// assert!(SceneId::create(1).is_some());
    /// assert!(SceneId::create(9).is_some());
    /// assert!(SceneId::create(10).is_none());
    /// ```
    pub fn create(value: u8) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Some(SceneId { value })
        } else {
            None
        }
    }
}
