//! Device-adapter boundary consumed by the smart-home platform glue.
//!
//! The platform reports capability changes; this module routes them onto
//! zone operations through one exhaustively-matched enum, and carries the
//! loosely-typed device identity the platform persists for pairing.

use log::debug;
use serde::Deserialize;

use crate::errors::Error;
use crate::types::{SceneId, ZoneType};
use crate::zone::Zone;

type Result<T> = std::result::Result<T, Error>;

/// Identity of one platform device bound to a bridge zone.
///
/// Platform device data arrives as JSON whose fields may be absent, so
/// every field is optional; [`DeviceIdentity::key`] validates.
///
/// # Examples
///
/// ```
/// use milight_rs::{DeviceIdentity, ZoneType};
///
/// let identity = DeviceIdentity::new("ACCF23A20164", 2, ZoneType::Rgbw);
/// assert_eq!(identity.key().unwrap(), "ACCF23A201642RGBW");
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceIdentity {
    #[serde(rename = "bridgeMacAddress")]
    pub bridge_mac: Option<String>,
    #[serde(rename = "zoneNumber")]
    pub zone_number: Option<u8>,
    #[serde(rename = "driverType")]
    pub driver_type: Option<ZoneType>,
}

impl DeviceIdentity {
    pub fn new(mac: &str, zone_number: u8, driver_type: ZoneType) -> Self {
        DeviceIdentity {
            bridge_mac: Some(mac.to_string()),
            zone_number: Some(zone_number),
            driver_type: Some(driver_type),
        }
    }

    /// Parse raw platform device data.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use milight_rs::{DeviceIdentity, ZoneType};
    ///
    /// let identity = DeviceIdentity::from_json(json!({
    ///     "bridgeMacAddress": "ACCF23A20164",
    ///     "zoneNumber": 3,
    ///     "driverType": "8-Zone Controller",
    /// })).unwrap();
    /// assert_eq!(identity.driver_type, Some(ZoneType::EightZoneController));
    /// ```
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(Error::JsonLoad)
    }

    /// The refcount key a bridge tracks this device under:
    /// MAC + zone number + driver type.
    pub fn key(&self) -> Result<String> {
        let mac = self
            .bridge_mac
            .as_deref()
            .ok_or(Error::MissingField("bridgeMacAddress"))?;
        let zone_number = self.zone_number.ok_or(Error::MissingField("zoneNumber"))?;
        let driver_type = self.driver_type.ok_or(Error::MissingField("driverType"))?;
        Ok(format!("{mac}{zone_number}{driver_type}"))
    }
}

/// Mode change requested through the platform's light-mode capability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModeRequest {
    /// Back to color output at the zone's current hue.
    Color,
    /// White output at the zone's current temperature.
    Temperature,
    /// Dim night light.
    Night,
    /// Advance the effect carousel.
    Disco,
    /// Jump to a specific effect.
    Scene(SceneId),
}

/// One capability intent reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Capability {
    TurnOn,
    TurnOff,
    Dim(f64),
    Hue(f64),
    HueAndSaturation { hue: f64, saturation: f64 },
    Temperature(f64),
    Mode(ModeRequest),
    SceneSpeedUp,
    SceneSpeedDown,
}

/// Route one capability intent onto the matching zone operation(s).
pub async fn apply_capability(zone: &Zone, capability: Capability) -> Result<()> {
    debug!(
        "apply_capability() -> zone {} {} <- {capability:?}",
        zone.number(),
        zone.zone_type()
    );
    match capability {
        Capability::TurnOn => zone.turn_on().await,
        Capability::TurnOff => zone.turn_off().await,
        Capability::Dim(level) => zone.set_brightness(level).await,
        Capability::Hue(hue) => zone.set_hue(hue).await,
        Capability::HueAndSaturation { hue, saturation } => {
            zone.set_hue_and_saturation(hue, saturation).await
        }
        Capability::Temperature(temperature) => zone.set_temperature(temperature).await,
        Capability::Mode(ModeRequest::Color) => zone.set_hue(zone.hue()).await,
        Capability::Mode(ModeRequest::Temperature) => {
            zone.enable_white_mode(Some(zone.temperature())).await
        }
        Capability::Mode(ModeRequest::Night) => zone.enable_night_mode().await,
        Capability::Mode(ModeRequest::Disco) => {
            // Restore color output first so the effect starts from the
            // zone's current hue.
            zone.set_hue(zone.hue()).await?;
            zone.toggle_scene(None).await
        }
        Capability::Mode(ModeRequest::Scene(id)) => zone.toggle_scene(Some(id)).await,
        Capability::SceneSpeedUp => zone.set_scene_speed_up().await,
        Capability::SceneSpeedDown => zone.set_scene_speed_down().await,
    }
}

/// Apply a user hue-calibration offset, wrapping back into the unit
/// interval.
///
/// # Examples
///
/// ```
/// use milight_rs::calibrate_hue;
///
/// assert!((calibrate_hue(0.9, 0.2) - 0.1).abs() < 1e-9);
/// assert!((calibrate_hue(0.1, -0.2) - 0.9).abs() < 1e-9);
/// assert_eq!(calibrate_hue(0.5, 0.0), 0.5);
/// ```
pub fn calibrate_hue(hue: f64, offset: f64) -> f64 {
    let hue = hue + offset;
    if hue > 1.0 {
        return hue - 1.0;
    }
    if hue < 0.0 {
        return hue + 1.0;
    }
    hue
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use futures::FutureExt;
    use serde_json::json;

    use crate::commands::Command;
    use crate::transport::SendCommands;
    use crate::types::{Generation, LightMode};

    fn test_zone(zone_type: ZoneType) -> (Zone, Arc<Mutex<Vec<Vec<Command>>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&sent);
        let send: SendCommands = Arc::new(move |commands| {
            let inner = Arc::clone(&inner);
            async move {
                inner.lock().unwrap().push(commands);
                Ok(())
            }
            .boxed()
        });
        let zone = Zone::new(
            format!("ACCF23A201641{zone_type}"),
            1,
            zone_type,
            Generation::IBox,
            send,
        );
        (zone, sent)
    }

    #[test]
    fn test_identity_key_requires_all_fields() {
        let identity = DeviceIdentity {
            zone_number: Some(1),
            driver_type: Some(ZoneType::White),
            ..Default::default()
        };
        assert_eq!(
            identity.key().unwrap_err(),
            Error::MissingField("bridgeMacAddress")
        );

        let identity = DeviceIdentity::new("ACCF23A20164", 4, ZoneType::White);
        assert_eq!(identity.key().unwrap(), "ACCF23A201644White");
    }

    #[test]
    fn test_identity_from_partial_json() {
        let identity = DeviceIdentity::from_json(json!({
            "bridgeMacAddress": "ACCF23A20164",
        }))
        .unwrap();
        assert_eq!(identity.key().unwrap_err(), Error::MissingField("zoneNumber"));
    }

    #[tokio::test]
    async fn test_dim_routes_to_brightness() {
        let (zone, sent) = test_zone(ZoneType::Rgbww);
        apply_capability(&zone, Capability::Dim(0.4)).await.unwrap();
        assert_eq!(zone.brightness(), 0.4);
        assert!(!sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mode_temperature_uses_current_value() {
        let (zone, _) = test_zone(ZoneType::Rgbww);
        zone.set_temperature(0.3).await.unwrap();

        // White mode on a tunable type needs the stored temperature.
        apply_capability(&zone, Capability::Mode(ModeRequest::Temperature))
            .await
            .unwrap();
        assert_eq!(zone.mode(), LightMode::Temperature);
    }

    #[tokio::test]
    async fn test_disco_restores_color_then_toggles() {
        let (zone, sent) = test_zone(ZoneType::Rgbw);
        apply_capability(&zone, Capability::Mode(ModeRequest::Disco))
            .await
            .unwrap();
        assert_eq!(zone.mode(), LightMode::Color);
        // One hue batch and one scene batch.
        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_illegal_capability_propagates() {
        let (zone, _) = test_zone(ZoneType::White);
        assert_eq!(
            apply_capability(&zone, Capability::Hue(0.5)).await.unwrap_err(),
            Error::unsupported(ZoneType::White, "set hue")
        );
    }
}
