//! Command line parameter resolution.
//!
//! Every value is taken from its flag or environment variable first, then
//! from the configuration file and finally from the built-in default.

use std::time::Duration;

use clap::parser::ValueSource;
use clap::ArgMatches;

use crate::color::Rgb;
use crate::config::Config;
use crate::effect::{Brightness, ColorNum, ColorSlot, Direction, Effect, Speed};
use crate::error::{Error, Result};
use crate::locator::{Poll, Target};

/// Device selection and lookup settings.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct Connection {
    pub target: Target,
    pub poll: Poll,
}

/// Resolve the device connection parameters.
pub fn connection(matches: &ArgMatches, config: &Config) -> Result<Connection> {
    let bus = replace_from_cli(config.device.bus, matches, "device-bus").unwrap_or(0);
    let address = replace_from_cli(config.device.address, matches, "device-address").unwrap_or(0);

    let target = match (bus, address) {
        (0, 0) => Target::Auto,
        (0, _) => return Err(missing_location("device-bus", "device-address")),
        (_, 0) => return Err(missing_location("device-address", "device-bus")),
        (bus, address) => Target::Address { bus, address },
    };

    let default_poll = Poll::default();
    let interval = replace_from_cli(config.poll.interval_ms, matches, "poll-interval")
        .map_or(default_poll.interval, Duration::from_millis);
    let timeout = replace_from_cli(config.poll.timeout_ms, matches, "poll-timeout")
        .map_or(default_poll.timeout, Duration::from_millis);

    if interval.is_zero() {
        return Err(Error::InvalidOption {
            name: "poll-interval",
            value: interval.as_millis().to_string(),
            expected: "must be greater than 0".into(),
        });
    }

    if !timeout.is_zero() && interval >= timeout {
        return Err(Error::InvalidOption {
            name: "poll-interval",
            value: interval.as_millis().to_string(),
            expected: format!("must be less than poll-timeout ({} ms)", timeout.as_millis()),
        });
    }

    Ok(Connection { target, poll: Poll { interval, timeout } })
}

/// One half of an explicit device location without the other.
fn missing_location(name: &'static str, other: &str) -> Error {
    Error::InvalidOption {
        name,
        value: "missing".into(),
        expected: format!("required together with {other}"),
    }
}

/// Build the effect of a mode subcommand.
pub fn effect(mode: &str, matches: &ArgMatches, config: &Config) -> Result<Effect> {
    let effect = match mode {
        "off-mode" => Effect::Off,
        "aurora-mode" => Effect::Aurora {
            speed: speed(matches, config)?,
            brightness: brightness(matches, config)?,
            color: color_num(matches, config)?,
            reactive: reactive(matches, config),
        },
        "breath-mode" => Effect::Breathing {
            speed: speed(matches, config)?,
            brightness: brightness(matches, config)?,
            color: color_num(matches, config)?,
        },
        "fireworks-mode" => Effect::Fireworks {
            speed: speed(matches, config)?,
            brightness: brightness(matches, config)?,
            color: color_num(matches, config)?,
            reactive: reactive(matches, config),
        },
        "marquee-mode" => Effect::Marquee {
            speed: speed(matches, config)?,
            brightness: brightness(matches, config)?,
        },
        "rainbow-mode" => Effect::Rainbow { brightness: brightness(matches, config)? },
        "raindrop-mode" => Effect::Raindrop {
            speed: speed(matches, config)?,
            brightness: brightness(matches, config)?,
            color: color_num(matches, config)?,
        },
        "random-mode" => Effect::Random {
            speed: speed(matches, config)?,
            brightness: brightness(matches, config)?,
            color: color_num(matches, config)?,
            reactive: reactive(matches, config),
        },
        "ripple-mode" => Effect::Ripple {
            speed: speed(matches, config)?,
            brightness: brightness(matches, config)?,
            color: color_num(matches, config)?,
            reactive: reactive(matches, config),
        },
        "wave-mode" => Effect::Wave {
            speed: speed(matches, config)?,
            brightness: brightness(matches, config)?,
            direction: direction(matches, config),
        },
        _ => {
            return Err(Error::InvalidOption {
                name: "mode",
                value: mode.into(),
                expected: "unknown mode".into(),
            })
        },
    };

    Ok(effect)
}

/// Effect speed, default 5.
pub fn speed(matches: &ArgMatches, config: &Config) -> Result<Speed> {
    match replace_from_cli(config.speed, matches, "speed") {
        Some(speed) => Speed::new(speed),
        None => Ok(Speed::DEFAULT),
    }
}

/// LED brightness, default 25.
pub fn brightness(matches: &ArgMatches, config: &Config) -> Result<Brightness> {
    match replace_from_cli(config.brightness, matches, "brightness") {
        Some(brightness) => Brightness::new(brightness),
        None => Ok(Brightness::DEFAULT),
    }
}

/// Predefined effect color, random by default.
pub fn color_num(matches: &ArgMatches, config: &Config) -> Result<ColorNum> {
    match replace_from_cli(config.color_num, matches, "color-num") {
        Some(color_num) => ColorNum::new(color_num),
        None => Ok(ColorNum::RANDOM),
    }
}

/// Predefined color slot targeted by `set-color`.
pub fn color_slot(matches: &ArgMatches) -> Result<ColorSlot> {
    match matches.get_one::<u8>("color-num") {
        Some(slot) => ColorSlot::new(*slot),
        None => Err(Error::InvalidOption {
            name: "color-num",
            value: String::new(),
            expected: "required".into(),
        }),
    }
}

/// Wave direction, none by default.
pub fn direction(matches: &ArgMatches, config: &Config) -> Direction {
    replace_from_cli(config.direction, matches, "direction").unwrap_or_default()
}

/// Whether the effect only reacts to key presses.
pub fn reactive(matches: &ArgMatches, config: &Config) -> bool {
    flag(matches, "reactive").or(config.reactive).unwrap_or(false)
}

/// Whether the effect is persisted in the controller.
pub fn save(matches: &ArgMatches, config: &Config) -> bool {
    flag(matches, "save").or(config.save).unwrap_or(false)
}

/// Colors to write to the predefined slots before the mode, if requested.
pub fn reset_colors(
    matches: &ArgMatches,
    config: &Config,
) -> Result<Option<[Rgb; ColorSlot::COUNT]>> {
    match flag(matches, "reset") {
        Some(true) => config.predefined_colors().map(Some),
        _ => Ok(None),
    }
}

/// Color given on the command line, if any.
pub fn color(matches: &ArgMatches, config: &Config) -> Result<Option<Rgb>> {
    if let Some(rgb) = matches.get_one::<String>("rgb") {
        return rgb.parse().map(Some);
    }

    if let Some(name) = matches.get_one::<String>("color-name") {
        return config.named_color(name).map(Some);
    }

    let channels = ["red", "green", "blue"].map(|name| matches.get_one::<u8>(name).copied());
    if channels.iter().all(Option::is_none) {
        return Ok(None);
    }

    let [r, g, b] = channels.map(Option::unwrap_or_default);
    Ok(Some(Rgb::new(r, g, b)))
}

/// Prefer the CLI parameter over the configured value if it is present.
#[inline]
fn replace_from_cli<T>(option: Option<T>, matches: &ArgMatches, name: &str) -> Option<T>
where
    T: Clone + Send + Sync + 'static,
{
    matches.get_one::<T>(name).cloned().or(option)
}

/// Value of a boolean switch, if it was explicitly set.
fn flag(matches: &ArgMatches, name: &str) -> Option<bool> {
    match matches.value_source(name) {
        Some(ValueSource::CommandLine | ValueSource::EnvVariable) => Some(matches.get_flag(name)),
        _ => None,
    }
}
