//! Zone capability control.
//!
//! A [`Zone`] turns one capability intent ("set hue to 0.62") into the
//! ordered command sequence its zone type understands, enforcing legality,
//! applying per-type hue calibration, and dispatching through the send
//! function its bridge bound to the current transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;

use crate::commands::{Command, ZoneCommands};
use crate::errors::Error;
use crate::transport::SendCommands;
use crate::types::{Generation, LightMode, SceneId, ZoneType};

type Result<T> = std::result::Result<T, Error>;

/// Delay before the redundant duplicate of a retryable command batch.
///
/// Commands are fire-and-forget UDP, so retryable operations are sent
/// twice. For the relative step commands on RGB and White zones a second
/// landing applies the step twice; that risk is accepted rather than
/// silently deduplicating, since suppressing it would change
/// device-visible behavior.
const RETRY_DELAY: Duration = Duration::from_millis(100);

// Hue calibration offsets, measured against physical bulbs.
const BRIDGE_HUE_CORRECTION: f64 = 0.015;
const FULL_COLOR_HUE_CORRECTION: f64 = 0.045;
const IBOX_RGBW_HUE_CORRECTION: f64 = 0.115;

#[derive(Debug, Clone)]
struct ZoneState {
    brightness: f64,
    hue: f64,
    saturation: f64,
    temperature: f64,
    mode: LightMode,
}

impl Default for ZoneState {
    fn default() -> Self {
        ZoneState {
            brightness: 1.0,
            hue: 1.0,
            saturation: 1.0,
            temperature: 1.0,
            mode: LightMode::Color,
        }
    }
}

/// One addressable group of bulbs behind a bridge.
///
/// Zones are built by their bridge from the generation's static zone table
/// and survive IP changes on that bridge; they are not persisted
/// independently.
pub struct Zone {
    id: String,
    number: u8,
    zone_type: ZoneType,
    generation: Generation,
    commands: ZoneCommands,
    send: SendCommands,
    state: Mutex<ZoneState>,
}

impl std::fmt::Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("id", &self.id)
            .field("number", &self.number)
            .field("zone_type", &self.zone_type)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Zone {
    pub(crate) fn new(
        id: String,
        number: u8,
        zone_type: ZoneType,
        generation: Generation,
        send: SendCommands,
    ) -> Self {
        debug!("created zone {number} {zone_type} ({generation})");
        Zone {
            id,
            number,
            zone_type,
            generation,
            commands: ZoneCommands::for_zone(generation, zone_type),
            send,
            state: Mutex::new(ZoneState::default()),
        }
    }

    /// Stable zone identity: bridge MAC + zone number + zone type.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn zone_type(&self) -> ZoneType {
        self.zone_type
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Last brightness this zone was driven to.
    pub fn brightness(&self) -> f64 {
        self.state.lock().unwrap().brightness
    }

    /// Last hue this zone was driven to.
    pub fn hue(&self) -> f64 {
        self.state.lock().unwrap().hue
    }

    /// Last saturation this zone was driven to.
    pub fn saturation(&self) -> f64 {
        self.state.lock().unwrap().saturation
    }

    /// Last color temperature this zone was driven to.
    pub fn temperature(&self) -> f64 {
        self.state.lock().unwrap().temperature
    }

    /// Which output mode the zone was last driven in.
    pub fn mode(&self) -> LightMode {
        self.state.lock().unwrap().mode
    }

    /// Turn on all lights in this zone.
    pub async fn turn_on(&self) -> Result<()> {
        debug!("turn_on() -> zone {} {}", self.number, self.zone_type);
        let command = self.require(self.commands.on(self.number), "turn on")?;
        self.dispatch_with_retry(vec![command]).await
    }

    /// Turn off all lights in this zone.
    pub async fn turn_off(&self) -> Result<()> {
        debug!("turn_off() -> zone {} {}", self.number, self.zone_type);
        let command = self.require(self.commands.off(self.number), "turn off")?;
        self.dispatch_with_retry(vec![command]).await
    }

    /// Set brightness on all lights in this zone.
    ///
    /// Absolute-brightness types get `[on, brightness]` (or `[off]` below
    /// 0.01). RGB and White bulbs only step relative to their previous
    /// level, so the command list is a run of up/down pulses sized by the
    /// tenth-step difference against the last known value.
    pub async fn set_brightness(&self, brightness: f64) -> Result<()> {
        check_unit("brightness", brightness)?;
        debug!(
            "set_brightness() -> zone {} {} to {brightness}",
            self.number, self.zone_type
        );

        let commands = {
            let mut state = self.state.lock().unwrap();
            let commands = self.brightness_commands(brightness, &state)?;
            // Stored only after the command list is built; the relative
            // diff must be computed against the previous value.
            state.brightness = brightness;
            commands
        };
        self.dispatch_with_retry(commands).await
    }

    /// Set the hue of all lights in this zone.
    pub async fn set_hue(&self, hue: f64) -> Result<()> {
        check_unit("hue", hue)?;
        self.ensure(self.supports_hue(), "set hue")?;
        debug!(
            "set_hue() -> zone {} {} to {hue}",
            self.number, self.zone_type
        );

        let commands = self.hue_commands(hue)?;
        {
            let mut state = self.state.lock().unwrap();
            state.hue = hue;
            state.mode = LightMode::Color;
        }
        self.dispatch_with_retry(commands).await
    }

    /// Set hue and saturation in one batch.
    pub async fn set_hue_and_saturation(&self, hue: f64, saturation: f64) -> Result<()> {
        check_unit("hue", hue)?;
        check_unit("saturation", saturation)?;
        self.ensure(
            matches!(
                self.zone_type,
                ZoneType::Rgbww | ZoneType::Bridge | ZoneType::EightZoneController
            ),
            "set hue and saturation",
        )?;
        debug!(
            "set_hue_and_saturation() -> zone {} {} to {hue}/{saturation}",
            self.number, self.zone_type
        );

        let mut commands = self.hue_commands(hue)?;
        commands.extend(self.saturation_commands(saturation)?);
        {
            let mut state = self.state.lock().unwrap();
            state.hue = hue;
            state.saturation = saturation;
            state.mode = LightMode::Color;
        }
        self.dispatch_with_retry(commands).await
    }

    /// Set the color temperature of all white-capable lights in this zone.
    ///
    /// White bulbs only step relative to their previous temperature; the
    /// tunable full-color types take an absolute value.
    pub async fn set_temperature(&self, temperature: f64) -> Result<()> {
        check_unit("temperature", temperature)?;
        self.ensure(
            matches!(
                self.zone_type,
                ZoneType::White | ZoneType::Rgbww | ZoneType::EightZoneController
            ),
            "set temperature",
        )?;
        debug!(
            "set_temperature() -> zone {} {} to {temperature}",
            self.number, self.zone_type
        );

        let commands = {
            let mut state = self.state.lock().unwrap();
            let commands = self.temperature_commands(temperature, &state)?;
            state.temperature = temperature;
            state.mode = LightMode::Temperature;
            commands
        };
        self.dispatch(commands).await
    }

    /// Switch the zone to white mode.
    ///
    /// Tunable full-color types on the iBox have no bare white-mode
    /// command; they require the absolute `temperature` to jump to.
    pub async fn enable_white_mode(&self, temperature: Option<f64>) -> Result<()> {
        self.ensure(
            matches!(
                self.zone_type,
                ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::Bridge | ZoneType::EightZoneController
            ),
            "enable white mode",
        )?;
        debug!(
            "enable_white_mode() -> zone {} {}",
            self.number, self.zone_type
        );

        let commands = self.white_mode_commands(temperature)?;
        self.state.lock().unwrap().mode = LightMode::Temperature;
        self.dispatch_with_retry(commands).await
    }

    /// Switch the zone to its dim night light mode.
    pub async fn enable_night_mode(&self) -> Result<()> {
        self.ensure(
            matches!(
                self.zone_type,
                ZoneType::Rgbww
                    | ZoneType::Rgbw
                    | ZoneType::White
                    | ZoneType::Bridge
                    | ZoneType::EightZoneController
            ),
            "enable night mode",
        )?;
        debug!(
            "enable_night_mode() -> zone {} {}",
            self.number, self.zone_type
        );

        // The iBox's own light has no dedicated night command.
        let commands = if self.zone_type == ZoneType::Bridge {
            self.white_mode_commands(None)?
        } else if self.generation == Generation::IBox {
            vec![self.require(self.commands.night_mode(self.number), "enable night mode")?]
        } else {
            vec![
                self.require(self.commands.on(self.number), "enable night mode")?,
                self.require(self.commands.night_mode(self.number), "enable night mode")?,
            ]
        };
        self.state.lock().unwrap().mode = LightMode::Temperature;
        self.dispatch_with_retry(commands).await
    }

    /// Activate a scene effect, or advance to the next one.
    ///
    /// Discrete scene indexes only exist on the iBox; legacy bridges fall
    /// back to advancing the effect carousel.
    pub async fn toggle_scene(&self, scene: Option<SceneId>) -> Result<()> {
        self.ensure(
            matches!(
                self.zone_type,
                ZoneType::Rgbww | ZoneType::Rgbw | ZoneType::EightZoneController
            ),
            "toggle scene",
        )?;
        debug!(
            "toggle_scene() -> zone {} {} scene {scene:?}",
            self.number, self.zone_type
        );

        let commands = match scene {
            Some(id) if self.generation == Generation::IBox => {
                vec![self.require(self.commands.effect_mode(self.number, id), "toggle scene")?]
            }
            _ => vec![
                self.require(self.commands.on(self.number), "toggle scene")?,
                self.require(self.commands.effect_mode_next(self.number), "toggle scene")?,
            ],
        };
        self.dispatch(commands).await
    }

    /// Speed up the running scene effect.
    pub async fn set_scene_speed_up(&self) -> Result<()> {
        self.ensure(
            matches!(
                self.zone_type,
                ZoneType::Rgbww | ZoneType::Rgbw | ZoneType::EightZoneController
            ),
            "set scene speed up",
        )?;
        let command = self.require(
            self.commands.effect_speed_up(self.number),
            "set scene speed up",
        )?;
        self.dispatch(vec![command]).await
    }

    /// Slow down the running scene effect.
    pub async fn set_scene_speed_down(&self) -> Result<()> {
        self.ensure(
            matches!(
                self.zone_type,
                ZoneType::Rgbww | ZoneType::Rgbw | ZoneType::EightZoneController
            ),
            "set scene speed down",
        )?;
        let command = self.require(
            self.commands.effect_speed_down(self.number),
            "set scene speed down",
        )?;
        self.dispatch(vec![command]).await
    }

    fn supports_hue(&self) -> bool {
        matches!(
            self.zone_type,
            ZoneType::Rgb
                | ZoneType::Rgbw
                | ZoneType::Rgbww
                | ZoneType::Bridge
                | ZoneType::EightZoneController
        )
    }

    fn brightness_commands(&self, brightness: f64, state: &ZoneState) -> Result<Vec<Command>> {
        match self.zone_type {
            ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::Bridge | ZoneType::EightZoneController => {
                if brightness < 0.01 {
                    return Ok(vec![
                        self.require(self.commands.off(self.number), "set brightness")?,
                    ]);
                }
                let level = (brightness * 100.0).round() as u8;
                Ok(vec![
                    self.require(self.commands.on(self.number), "set brightness")?,
                    self.require(self.commands.brightness(self.number, level), "set brightness")?,
                ])
            }
            ZoneType::Rgb => self.rgb_brightness_commands(brightness, state.brightness),
            ZoneType::White => self.white_brightness_commands(brightness, state.brightness),
        }
    }

    fn rgb_brightness_commands(&self, brightness: f64, previous: f64) -> Result<Vec<Command>> {
        let diff = ((brightness - previous) * 10.0).round() as i32;
        let mut commands = Vec::new();

        if brightness > 0.95 {
            if self.generation != Generation::IBox {
                // activate
                commands.push(self.require(self.commands.on(self.number), "set brightness")?);
            }
            for _ in 0..5 {
                commands
                    .push(self.require(self.commands.bright_up(self.number), "set brightness")?);
            }
            return Ok(commands);
        }
        if brightness < 0.01 {
            return Ok(vec![
                self.require(self.commands.off(self.number), "set brightness")?,
            ]);
        }
        if diff != 0 {
            if self.generation != Generation::IBox {
                // activate
                commands.push(self.require(self.commands.on(self.number), "set brightness")?);
            }
            let step = if diff > 0 {
                self.require(self.commands.bright_up(self.number), "set brightness")?
            } else {
                self.require(self.commands.bright_down(self.number), "set brightness")?
            };
            for _ in 0..diff.abs() {
                commands.push(step.clone());
            }
        }
        Ok(commands)
    }

    fn white_brightness_commands(&self, brightness: f64, previous: f64) -> Result<Vec<Command>> {
        let diff = ((brightness - previous) * 10.0).round() as i32;

        if brightness < 0.01 {
            return Ok(vec![
                self.require(self.commands.off(self.number), "set brightness")?,
            ]);
        }
        if brightness > 0.95 {
            return Ok(vec![
                self.require(self.commands.on(self.number), "set brightness")?,
                self.require(self.commands.max_bright(self.number), "set brightness")?,
            ]);
        }

        let mut commands = Vec::new();
        if diff != 0 {
            // activate
            commands.push(self.require(self.commands.on(self.number), "set brightness")?);
            let step = if diff > 0 {
                self.require(self.commands.bright_up(self.number), "set brightness")?
            } else {
                self.require(self.commands.bright_down(self.number), "set brightness")?
            };
            for _ in 0..diff.abs() {
                commands.push(step.clone());
            }
        }
        Ok(commands)
    }

    fn hue_commands(&self, hue: f64) -> Result<Vec<Command>> {
        let hue = match self.zone_type {
            ZoneType::Bridge => hue + BRIDGE_HUE_CORRECTION,
            ZoneType::Rgbww | ZoneType::EightZoneController => hue + FULL_COLOR_HUE_CORRECTION,
            ZoneType::Rgbw if self.generation == Generation::IBox => {
                hue + IBOX_RGBW_HUE_CORRECTION
            }
            _ => hue,
        };
        // Some bulbs don't accept a hue of zero
        let hue = if hue == 0.0 { 0.01 } else { hue };

        match self.zone_type {
            ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::EightZoneController => {
                let value = scale(0.0, 1.0, 0.0, 255.0, hue).round() as u8;
                Ok(vec![
                    self.require(self.commands.on(self.number), "set hue")?,
                    self.require(self.commands.hue(self.number, value), "set hue")?,
                ])
            }
            // RGB and the iBox's own light use the 1-256 hue wheel.
            _ => {
                let value = (scale(0.0, 1.0, 1.0, 256.0, hue).round() as u16 % 256) as u8;
                Ok(vec![
                    self.require(self.commands.hue(self.number, value), "set hue")?,
                ])
            }
        }
    }

    fn saturation_commands(&self, saturation: f64) -> Result<Vec<Command>> {
        // The hardware scale runs opposite to the capability: 1.0 maps to
        // 0 on the wire. Unverified against vendor documentation, but kept
        // as the devices have always been driven this way.
        let value = scale(0.0, 1.0, 100.0, 0.0, saturation).round() as u8;
        Ok(vec![
            self.require(self.commands.on(self.number), "set saturation")?,
            self.require(
                self.commands.saturation(self.number, value),
                "set saturation",
            )?,
        ])
    }

    fn temperature_commands(&self, temperature: f64, state: &ZoneState) -> Result<Vec<Command>> {
        if self.zone_type == ZoneType::White {
            let mut commands = vec![
                self.require(self.commands.on(self.number), "set temperature")?,
            ];
            let diff = ((temperature - state.temperature) * 10.0).round() as i32;
            let step = if diff > 0 {
                self.require(self.commands.warmer(self.number), "set temperature")?
            } else {
                self.require(self.commands.cooler(self.number), "set temperature")?
            };
            for _ in 0..diff.abs() {
                commands.push(step.clone());
            }
            return Ok(commands);
        }

        let value = (100.0 - temperature * 100.0).round() as u8;
        Ok(vec![
            self.require(self.commands.on(self.number), "set temperature")?,
            self.require(
                self.commands.white_temperature(self.number, value),
                "set temperature",
            )?,
        ])
    }

    fn white_mode_commands(&self, temperature: Option<f64>) -> Result<Vec<Command>> {
        if self.generation == Generation::IBox {
            if matches!(
                self.zone_type,
                ZoneType::Rgbww | ZoneType::EightZoneController
            ) {
                let temperature = temperature.ok_or(Error::MissingArgument {
                    name: "temperature",
                })?;
                check_unit("temperature", temperature)?;
                let value = (100.0 - temperature * 100.0).round() as u8;
                return Ok(vec![
                    self.require(self.commands.on(self.number), "enable white mode")?,
                    self.require(
                        self.commands.white_temperature(self.number, value),
                        "enable white mode",
                    )?,
                ]);
            }
            return Ok(vec![
                self.require(self.commands.white_mode(self.number), "enable white mode")?,
            ]);
        }

        Ok(vec![
            self.require(self.commands.on(self.number), "enable white mode")?,
            self.require(self.commands.white_mode(self.number), "enable white mode")?,
        ])
    }

    /// Send the batch once now and once more after [`RETRY_DELAY`], as a
    /// best-effort duplicate against UDP loss. The duplicate is detached;
    /// only the immediate send's result is returned.
    async fn dispatch_with_retry(&self, commands: Vec<Command>) -> Result<()> {
        let send = Arc::clone(&self.send);
        let delayed = commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RETRY_DELAY).await;
            if let Err(err) = send(delayed).await {
                debug!("duplicate send failed: {err}");
            }
        });
        self.dispatch(commands).await
    }

    async fn dispatch(&self, commands: Vec<Command>) -> Result<()> {
        (self.send)(commands).await
    }

    fn require(&self, command: Option<Command>, operation: &'static str) -> Result<Command> {
        command.ok_or_else(|| Error::unsupported(self.zone_type, operation))
    }

    fn ensure(&self, legal: bool, operation: &'static str) -> Result<()> {
        if legal {
            Ok(())
        } else {
            Err(Error::unsupported(self.zone_type, operation))
        }
    }
}

/// Map a range of values to a different range of values.
fn scale(input_start: f64, input_end: f64, output_start: f64, output_end: f64, input: f64) -> f64 {
    output_start
        + ((output_end - output_start) / (input_end - input_start)) * (input - input_start)
}

fn check_unit(name: &'static str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::out_of_range(name, value));
    }
    Ok(())
}
