//! ITE 8291 lighting effects and their parameters.

use std::fmt::{self, Display, Formatter};

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Effect command report ID.
pub const SET_EFFECT_COMMAND: u8 = 0x08;

/// Length of every effect command.
pub const EFFECT_COMMAND_LEN: usize = 8;

// Effect control operations.
const SET_EFFECT_OP: u8 = 0x02;
const SET_OFF_OP: u8 = 0x01;

// Effect codes.
const BREATHING_EFFECT: u8 = 0x02;
const WAVE_EFFECT: u8 = 0x03;
const RANDOM_EFFECT: u8 = 0x04;
const RAINBOW_EFFECT: u8 = 0x05;
const RIPPLE_EFFECT: u8 = 0x06;
const MARQUEE_EFFECT: u8 = 0x09;
const RAINDROP_EFFECT: u8 = 0x0a;
const AURORA_EFFECT: u8 = 0x0e;
const FIREWORKS_EFFECT: u8 = 0x11;
const USER_EFFECT: u8 = 0x33;

/// Animation speed.
///
/// Higher values are faster. The controller expects the inverse, so the
/// encoded value is `Speed::MAX - speed`.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct Speed(u8);

impl Speed {
    pub const MAX: u8 = 10;
    pub const DEFAULT: Self = Self(5);

    /// Speed in `0..=10`.
    pub fn new(speed: u8) -> Result<Self> {
        if speed > Self::MAX {
            return Err(Error::out_of_range("speed", speed, 0, Self::MAX.into()));
        }

        Ok(Self(speed))
    }

    /// Speed as written to the controller.
    pub fn wire(self) -> u8 {
        Self::MAX - self.0
    }
}

impl Display for Speed {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// LED brightness.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct Brightness(u8);

impl Brightness {
    pub const MAX: u8 = 50;
    pub const DEFAULT: Self = Self(25);

    /// Brightness in `0..=50`.
    pub fn new(brightness: u8) -> Result<Self> {
        if brightness > Self::MAX {
            return Err(Error::out_of_range("brightness", brightness, 0, Self::MAX.into()));
        }

        Ok(Self(brightness))
    }

    /// Brightness as written to the controller.
    pub fn value(self) -> u8 {
        self.0
    }
}

impl Display for Brightness {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Predefined color used by an effect.
///
/// `0` disables the color, `1..=7` select a customizable slot and `8` picks
/// random colors.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct ColorNum(u8);

impl ColorNum {
    pub const RANDOM: Self = Self(8);

    /// Color number in `0..=8`.
    pub fn new(color_num: u8) -> Result<Self> {
        if color_num > Self::RANDOM.0 {
            return Err(Error::out_of_range("color-num", color_num, 0, Self::RANDOM.0.into()));
        }

        Ok(Self(color_num))
    }

    /// Color number as written to the controller.
    pub fn value(self) -> u8 {
        self.0
    }
}

/// One of the seven customizable predefined color registers.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct ColorSlot(u8);

impl ColorSlot {
    pub const COUNT: usize = 7;

    /// Slot in `1..=7`.
    pub fn new(slot: u8) -> Result<Self> {
        if !(1..=Self::COUNT as u8).contains(&slot) {
            return Err(Error::out_of_range("color-num", slot, 1, Self::COUNT as u64));
        }

        Ok(Self(slot))
    }

    /// All slots in register order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=Self::COUNT as u8).map(Self)
    }

    /// Slot number as written to the controller.
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Wave direction.
#[derive(ValueEnum, Deserialize, Default, PartialEq, Eq, Debug, Copy, Clone)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    None,
    Right,
    Left,
    Up,
    Down,
}

impl Direction {
    fn byte(self) -> u8 {
        match self {
            Direction::None => 0x00,
            Direction::Right => 0x01,
            Direction::Left => 0x02,
            Direction::Up => 0x03,
            Direction::Down => 0x04,
        }
    }
}

/// Controller lighting effect.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Effect {
    Off,
    Aurora { speed: Speed, brightness: Brightness, color: ColorNum, reactive: bool },
    Breathing { speed: Speed, brightness: Brightness, color: ColorNum },
    Fireworks { speed: Speed, brightness: Brightness, color: ColorNum, reactive: bool },
    Marquee { speed: Speed, brightness: Brightness },
    Rainbow { brightness: Brightness },
    Raindrop { speed: Speed, brightness: Brightness, color: ColorNum },
    Random { speed: Speed, brightness: Brightness, color: ColorNum, reactive: bool },
    Ripple { speed: Speed, brightness: Brightness, color: ColorNum, reactive: bool },
    Wave { speed: Speed, brightness: Brightness, direction: Direction },
    /// Per-key colors written through the bulk endpoint.
    User { brightness: Brightness },
}

impl Effect {
    /// Convert the effect to its controller command.
    ///
    /// Layout: `[command, control, effect, speed, brightness, color, reactive/direction, save]`,
    /// fields the effect doesn't use are zero.
    pub fn command(&self, save: bool) -> [u8; EFFECT_COMMAND_LEN] {
        let (effect, speed, brightness, color, modifier) = match *self {
            Effect::Off => return [SET_EFFECT_COMMAND, SET_OFF_OP, 0, 0, 0, 0, 0, 0],
            Effect::Aurora { speed, brightness, color, reactive } => {
                (AURORA_EFFECT, speed.wire(), brightness.0, color.0, u8::from(reactive))
            },
            Effect::Breathing { speed, brightness, color } => {
                (BREATHING_EFFECT, speed.wire(), brightness.0, color.0, 0)
            },
            Effect::Fireworks { speed, brightness, color, reactive } => {
                (FIREWORKS_EFFECT, speed.wire(), brightness.0, color.0, u8::from(reactive))
            },
            Effect::Marquee { speed, brightness } => {
                (MARQUEE_EFFECT, speed.wire(), brightness.0, 0, 0)
            },
            Effect::Rainbow { brightness } => (RAINBOW_EFFECT, 0, brightness.0, 0, 0),
            Effect::Raindrop { speed, brightness, color } => {
                (RAINDROP_EFFECT, speed.wire(), brightness.0, color.0, 0)
            },
            Effect::Random { speed, brightness, color, reactive } => {
                (RANDOM_EFFECT, speed.wire(), brightness.0, color.0, u8::from(reactive))
            },
            Effect::Ripple { speed, brightness, color, reactive } => {
                (RIPPLE_EFFECT, speed.wire(), brightness.0, color.0, u8::from(reactive))
            },
            Effect::Wave { speed, brightness, direction } => {
                (WAVE_EFFECT, speed.wire(), brightness.0, 0, direction.byte())
            },
            Effect::User { brightness } => (USER_EFFECT, 0, brightness.0, 0, 0),
        };

        let save = u8::from(save);
        [SET_EFFECT_COMMAND, SET_EFFECT_OP, effect, speed, brightness, color, modifier, save]
    }
}
