//! Wire command construction for both bridge generations.
//!
//! [`ZoneCommands`] is a pure lookup from `(generation, zone type)` to the
//! primitive operations the hardware understands. Every operation returns
//! `Option<Command>`; `None` means the operation does not exist for that
//! combination. Legality errors are surfaced by [`crate::Zone`], never here.

use crate::types::{Generation, SceneId, ZoneType};

/// An opaque wire command packet.
///
/// Built by [`ZoneCommands`] and handed to the transport as-is; nothing
/// outside the transport inspects the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    bytes: Vec<u8>,
}

impl Command {
    /// Legacy dialect: a three byte `[code, argument, 0x55]` packet.
    fn legacy(code: u8, argument: u8) -> Self {
        Command {
            bytes: vec![code, argument, 0x55],
        }
    }

    /// v6 dialect: a `0x31` set-packet carrying the device type, a command
    /// category with four argument bytes, and the target zone.
    fn v6(device_type: u8, body: [u8; 5], zone: u8) -> Self {
        let mut bytes = vec![0x31, 0x00, 0x00, device_type];
        bytes.extend_from_slice(&body);
        bytes.push(zone);
        Command { bytes }
    }

    /// Raw packet bytes, for the transport.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

// Legacy RGBW group codes, index 0 = all zones.
const RGBW_ON: [u8; 5] = [0x42, 0x45, 0x47, 0x49, 0x4B];
const RGBW_OFF: [u8; 5] = [0x41, 0x46, 0x48, 0x4A, 0x4C];
const RGBW_WHITE: [u8; 5] = [0xC2, 0xC5, 0xC7, 0xC9, 0xCB];
const RGBW_NIGHT: [u8; 5] = [0xC1, 0xC6, 0xC8, 0xCA, 0xCC];
const RGBW_HUE: u8 = 0x40;
const RGBW_BRIGHTNESS: u8 = 0x4E;
const RGBW_EFFECT_NEXT: u8 = 0x4D;
const RGBW_EFFECT_FASTER: u8 = 0x44;
const RGBW_EFFECT_SLOWER: u8 = 0x43;

// Legacy dual-white group codes, index 0 = all zones.
const WHITE_ON: [u8; 5] = [0x35, 0x38, 0x3D, 0x37, 0x32];
const WHITE_OFF: [u8; 5] = [0x39, 0x3B, 0x33, 0x3A, 0x36];
const WHITE_MAX_BRIGHT: [u8; 5] = [0xB5, 0xB8, 0xBD, 0xB7, 0xB2];
const WHITE_NIGHT: [u8; 5] = [0xB9, 0xBB, 0xB3, 0xBA, 0xB6];
const WHITE_BRIGHT_UP: u8 = 0x3C;
const WHITE_BRIGHT_DOWN: u8 = 0x34;
const WHITE_WARMER: u8 = 0x3E;
const WHITE_COOLER: u8 = 0x3F;

// Legacy RGB strip controller codes; the controller has a single channel,
// so none of these carry a zone.
const RGB_ON: u8 = 0x22;
const RGB_OFF: u8 = 0x21;
const RGB_BRIGHT_UP: u8 = 0x23;
const RGB_BRIGHT_DOWN: u8 = 0x24;
const RGB_EFFECT_FASTER: u8 = 0x25;
const RGB_EFFECT_SLOWER: u8 = 0x26;
const RGB_EFFECT_NEXT: u8 = 0x27;
const RGB_HUE: u8 = 0x20;

// v6 device type bytes.
const V6_BRIDGE: u8 = 0x00;
const V6_WHITE: u8 = 0x01;
const V6_RGB: u8 = 0x03;
const V6_RGBW: u8 = 0x07;
const V6_FULL_COLOR: u8 = 0x08;

// v6 command categories.
const V6_CAT_HUE: u8 = 0x01;
const V6_CAT_SATURATION: u8 = 0x02;
const V6_CAT_BRIGHTNESS: u8 = 0x03;
const V6_CAT_STATUS: u8 = 0x04;
const V6_CAT_KELVIN: u8 = 0x05;
const V6_CAT_MODE: u8 = 0x06;
const V6_CAT_EFFECT: u8 = 0x07;
const V6_CAT_STEP: u8 = 0x08;

const V6_STATUS_ON: u8 = 0x01;
const V6_STATUS_OFF: u8 = 0x02;
const V6_STATUS_NIGHT: u8 = 0x05;
const V6_STATUS_WHITE: u8 = 0x64;
const V6_EFFECT_NEXT: u8 = 0x01;
const V6_EFFECT_FASTER: u8 = 0x02;
const V6_EFFECT_SLOWER: u8 = 0x03;
const V6_STEP_BRIGHT_UP: u8 = 0x01;
const V6_STEP_BRIGHT_DOWN: u8 = 0x02;
const V6_STEP_WARMER: u8 = 0x03;
const V6_STEP_COOLER: u8 = 0x04;
const V6_STEP_MAX_BRIGHT: u8 = 0x05;

/// The primitive operation set of one `(generation, zone type)` pair.
///
/// # Examples
///
/// ```
/// use milight_rs::{Generation, ZoneCommands, ZoneType};
///
/// let rgbw = ZoneCommands::for_zone(Generation::Legacy, ZoneType::Rgbw);
/// assert!(rgbw.on(2).is_some());
/// // Dual-white bulbs have no hue channel.
/// let white = ZoneCommands::for_zone(Generation::Legacy, ZoneType::White);
/// assert!(white.hue(2, 128).is_none());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ZoneCommands {
    generation: Generation,
    zone_type: ZoneType,
}

impl ZoneCommands {
    pub fn for_zone(generation: Generation, zone_type: ZoneType) -> Self {
        ZoneCommands {
            generation,
            zone_type,
        }
    }

    fn v6_device_type(&self) -> u8 {
        match self.zone_type {
            ZoneType::Bridge => V6_BRIDGE,
            ZoneType::White => V6_WHITE,
            ZoneType::Rgb => V6_RGB,
            ZoneType::Rgbw => V6_RGBW,
            ZoneType::Rgbww | ZoneType::EightZoneController => V6_FULL_COLOR,
        }
    }

    fn v6_status(&self, status: u8, zone: u8) -> Command {
        Command::v6(self.v6_device_type(), [V6_CAT_STATUS, status, 0, 0, 0], zone)
    }

    fn v6_step(&self, step: u8, zone: u8) -> Option<Command> {
        Some(Command::v6(
            self.v6_device_type(),
            [V6_CAT_STEP, step, 0, 0, 0],
            zone,
        ))
    }

    /// Whether this pair speaks the v6 packet format. The full-color
    /// types only exist behind an iBox and always use its dialect; the
    /// three legacy groups switch dialect with the bridge generation.
    fn uses_v6_dialect(&self) -> bool {
        self.generation == Generation::IBox
            || matches!(
                self.zone_type,
                ZoneType::Rgbww | ZoneType::Bridge | ZoneType::EightZoneController
            )
    }

    pub fn on(&self, zone: u8) -> Option<Command> {
        if self.uses_v6_dialect() {
            return Some(self.v6_status(V6_STATUS_ON, zone));
        }
        match self.zone_type {
            ZoneType::Rgb => Some(Command::legacy(RGB_ON, 0x00)),
            ZoneType::Rgbw => group_code(&RGBW_ON, zone),
            ZoneType::White => group_code(&WHITE_ON, zone),
            _ => None,
        }
    }

    pub fn off(&self, zone: u8) -> Option<Command> {
        if self.uses_v6_dialect() {
            return Some(self.v6_status(V6_STATUS_OFF, zone));
        }
        match self.zone_type {
            ZoneType::Rgb => Some(Command::legacy(RGB_OFF, 0x00)),
            ZoneType::Rgbw => group_code(&RGBW_OFF, zone),
            ZoneType::White => group_code(&WHITE_OFF, zone),
            _ => None,
        }
    }

    pub fn hue(&self, zone: u8, value: u8) -> Option<Command> {
        match (self.uses_v6_dialect(), self.zone_type) {
            (true, ZoneType::Rgb | ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::Bridge | ZoneType::EightZoneController) => {
                Some(Command::v6(
                    self.v6_device_type(),
                    [V6_CAT_HUE, value, value, value, value],
                    zone,
                ))
            }
            (false, ZoneType::Rgb) => Some(Command::legacy(RGB_HUE, value)),
            // The legacy hue command addresses the last switched-on group.
            (false, ZoneType::Rgbw) => Some(Command::legacy(RGBW_HUE, value)),
            _ => None,
        }
    }

    pub fn brightness(&self, zone: u8, value: u8) -> Option<Command> {
        match (self.uses_v6_dialect(), self.zone_type) {
            (true, ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::Bridge | ZoneType::EightZoneController) => {
                Some(Command::v6(
                    self.v6_device_type(),
                    [V6_CAT_BRIGHTNESS, value, 0, 0, 0],
                    zone,
                ))
            }
            (false, ZoneType::Rgbw) => Some(Command::legacy(RGBW_BRIGHTNESS, value)),
            _ => None,
        }
    }

    pub fn saturation(&self, zone: u8, value: u8) -> Option<Command> {
        match self.zone_type {
            ZoneType::Rgbww | ZoneType::Bridge | ZoneType::EightZoneController if self.uses_v6_dialect() => {
                Some(Command::v6(
                    self.v6_device_type(),
                    [V6_CAT_SATURATION, value, 0, 0, 0],
                    zone,
                ))
            }
            _ => None,
        }
    }

    pub fn white_mode(&self, zone: u8) -> Option<Command> {
        match self.zone_type {
            ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::Bridge | ZoneType::EightZoneController => {
                if self.uses_v6_dialect() {
                    Some(self.v6_status(V6_STATUS_WHITE, zone))
                } else if self.zone_type == ZoneType::Rgbw {
                    group_code(&RGBW_WHITE, zone)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn white_temperature(&self, zone: u8, value: u8) -> Option<Command> {
        match self.zone_type {
            ZoneType::Rgbww | ZoneType::EightZoneController if self.uses_v6_dialect() => Some(Command::v6(
                self.v6_device_type(),
                [V6_CAT_KELVIN, value, 0, 0, 0],
                zone,
            )),
            _ => None,
        }
    }

    pub fn night_mode(&self, zone: u8) -> Option<Command> {
        match self.zone_type {
            ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::White | ZoneType::Bridge | ZoneType::EightZoneController => {
                if self.uses_v6_dialect() {
                    Some(self.v6_status(V6_STATUS_NIGHT, zone))
                } else if self.zone_type == ZoneType::Rgbw {
                    group_code(&RGBW_NIGHT, zone)
                } else if self.zone_type == ZoneType::White {
                    group_code(&WHITE_NIGHT, zone)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn effect_mode(&self, zone: u8, id: SceneId) -> Option<Command> {
        match self.zone_type {
            ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::EightZoneController if self.uses_v6_dialect() => {
                Some(Command::v6(
                    self.v6_device_type(),
                    [V6_CAT_MODE, id.value(), 0, 0, 0],
                    zone,
                ))
            }
            _ => None,
        }
    }

    pub fn effect_mode_next(&self, zone: u8) -> Option<Command> {
        match self.zone_type {
            ZoneType::Rgb if !self.uses_v6_dialect() => Some(Command::legacy(RGB_EFFECT_NEXT, 0x00)),
            ZoneType::Rgbw if !self.uses_v6_dialect() => Some(Command::legacy(RGBW_EFFECT_NEXT, 0x00)),
            ZoneType::Rgb | ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::EightZoneController
                if self.uses_v6_dialect() =>
            {
                Some(Command::v6(
                    self.v6_device_type(),
                    [V6_CAT_EFFECT, V6_EFFECT_NEXT, 0, 0, 0],
                    zone,
                ))
            }
            _ => None,
        }
    }

    pub fn effect_speed_up(&self, zone: u8) -> Option<Command> {
        match self.zone_type {
            ZoneType::Rgb if !self.uses_v6_dialect() => Some(Command::legacy(RGB_EFFECT_FASTER, 0x00)),
            ZoneType::Rgbw if !self.uses_v6_dialect() => Some(Command::legacy(RGBW_EFFECT_FASTER, 0x00)),
            ZoneType::Rgb | ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::EightZoneController
                if self.uses_v6_dialect() =>
            {
                Some(Command::v6(
                    self.v6_device_type(),
                    [V6_CAT_EFFECT, V6_EFFECT_FASTER, 0, 0, 0],
                    zone,
                ))
            }
            _ => None,
        }
    }

    pub fn effect_speed_down(&self, zone: u8) -> Option<Command> {
        match self.zone_type {
            ZoneType::Rgb if !self.uses_v6_dialect() => Some(Command::legacy(RGB_EFFECT_SLOWER, 0x00)),
            ZoneType::Rgbw if !self.uses_v6_dialect() => Some(Command::legacy(RGBW_EFFECT_SLOWER, 0x00)),
            ZoneType::Rgb | ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::EightZoneController
                if self.uses_v6_dialect() =>
            {
                Some(Command::v6(
                    self.v6_device_type(),
                    [V6_CAT_EFFECT, V6_EFFECT_SLOWER, 0, 0, 0],
                    zone,
                ))
            }
            _ => None,
        }
    }

    pub fn bright_up(&self, zone: u8) -> Option<Command> {
        match self.zone_type {
            ZoneType::Rgb if !self.uses_v6_dialect() => Some(Command::legacy(RGB_BRIGHT_UP, 0x00)),
            ZoneType::White if !self.uses_v6_dialect() => Some(Command::legacy(WHITE_BRIGHT_UP, 0x00)),
            ZoneType::Rgb | ZoneType::White if self.uses_v6_dialect() => self.v6_step(V6_STEP_BRIGHT_UP, zone),
            _ => None,
        }
    }

    pub fn bright_down(&self, zone: u8) -> Option<Command> {
        match self.zone_type {
            ZoneType::Rgb if !self.uses_v6_dialect() => Some(Command::legacy(RGB_BRIGHT_DOWN, 0x00)),
            ZoneType::White if !self.uses_v6_dialect() => Some(Command::legacy(WHITE_BRIGHT_DOWN, 0x00)),
            ZoneType::Rgb | ZoneType::White if self.uses_v6_dialect() => self.v6_step(V6_STEP_BRIGHT_DOWN, zone),
            _ => None,
        }
    }

    pub fn max_bright(&self, zone: u8) -> Option<Command> {
        match self.zone_type {
            ZoneType::White if !self.uses_v6_dialect() => group_code(&WHITE_MAX_BRIGHT, zone),
            ZoneType::White if self.uses_v6_dialect() => self.v6_step(V6_STEP_MAX_BRIGHT, zone),
            _ => None,
        }
    }

    pub fn warmer(&self, zone: u8) -> Option<Command> {
        match self.zone_type {
            ZoneType::White if !self.uses_v6_dialect() => Some(Command::legacy(WHITE_WARMER, 0x00)),
            ZoneType::White if self.uses_v6_dialect() => self.v6_step(V6_STEP_WARMER, zone),
            _ => None,
        }
    }

    pub fn cooler(&self, zone: u8) -> Option<Command> {
        match self.zone_type {
            ZoneType::White if !self.uses_v6_dialect() => Some(Command::legacy(WHITE_COOLER, 0x00)),
            ZoneType::White if self.uses_v6_dialect() => self.v6_step(V6_STEP_COOLER, zone),
            _ => None,
        }
    }
}

/// Look up a per-zone code in a legacy group table (index 0 = all zones).
fn group_code(codes: &[u8; 5], zone: u8) -> Option<Command> {
    codes
        .get(zone as usize)
        .map(|&code| Command::legacy(code, 0x00))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_legacy_rgbw_codes() {
        let rgbw = ZoneCommands::for_zone(Generation::Legacy, ZoneType::Rgbw);
        assert_eq!(rgbw.on(2).unwrap().as_bytes(), &[0x47, 0x00, 0x55]);
        assert_eq!(rgbw.off(2).unwrap().as_bytes(), &[0x48, 0x00, 0x55]);
        assert_eq!(rgbw.brightness(2, 80).unwrap().as_bytes(), &[0x4E, 80, 0x55]);
    }

    #[test]
    fn test_legality_is_encoded_as_absence() {
        for generation in Generation::iter() {
            // Dual-white bulbs never expose a hue channel.
            let white = ZoneCommands::for_zone(generation, ZoneType::White);
            assert!(white.hue(1, 100).is_none());
            // Only full-color types on the iBox expose saturation.
            let rgbw = ZoneCommands::for_zone(generation, ZoneType::Rgbw);
            assert!(rgbw.saturation(1, 50).is_none());
        }
        let rgbww = ZoneCommands::for_zone(Generation::IBox, ZoneType::Rgbww);
        assert!(rgbww.saturation(1, 50).is_some());
        assert!(rgbww.white_temperature(1, 30).is_some());
    }

    #[test]
    fn test_v6_packets_carry_zone_byte() {
        let rgbww = ZoneCommands::for_zone(Generation::IBox, ZoneType::Rgbww);
        let packet = rgbww.brightness(3, 55).unwrap();
        assert_eq!(packet.as_bytes()[0], 0x31);
        assert_eq!(*packet.as_bytes().last().unwrap(), 3);
    }

    #[test]
    fn test_zone_out_of_group_range() {
        let rgbw = ZoneCommands::for_zone(Generation::Legacy, ZoneType::Rgbw);
        assert!(rgbw.on(5).is_none());
    }
}
