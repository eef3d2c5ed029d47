//! Configuration file.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::color::Rgb;
use crate::effect::{ColorSlot, Direction};
use crate::error::{Error, Result};

/// Factory colors of the customizable predefined color slots.
pub const DEFAULT_PREDEFINED_COLORS: [Rgb; ColorSlot::COUNT] = [
    Rgb::new(0xff, 0xff, 0xff),
    Rgb::new(0xff, 0x00, 0x00),
    Rgb::new(0xff, 0xff, 0x00),
    Rgb::new(0x00, 0xff, 0x00),
    Rgb::new(0x00, 0x00, 0xff),
    Rgb::new(0x00, 0xff, 0xff),
    Rgb::new(0xff, 0x00, 0xff),
];

/// User configuration.
///
/// Every value is optional, command line flags take precedence over it.
#[derive(Deserialize, Default, PartialEq, Eq, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Mode applied when no subcommand is given, like `wave`.
    pub mode: Option<String>,
    pub speed: Option<u8>,
    pub brightness: Option<u8>,
    pub color_num: Option<u8>,
    pub direction: Option<Direction>,
    pub reactive: Option<bool>,
    pub save: Option<bool>,
    /// Color name or RGB text used by the single color mode.
    pub single_mode_color: Option<String>,
    /// Color names usable instead of RGB text.
    pub named_colors: HashMap<String, String>,
    /// Colors written to the predefined slots by `--reset`.
    pub predefined_colors: Option<Vec<String>>,
    pub poll: PollConfig,
    pub device: DeviceConfig,
}

/// Device lookup retry settings.
#[derive(Deserialize, Default, PartialEq, Eq, Debug, Copy, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PollConfig {
    pub interval_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

/// Explicit device location.
#[derive(Deserialize, Default, PartialEq, Eq, Debug, Copy, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    pub bus: Option<u8>,
    pub address: Option<u8>,
}

impl Config {
    /// Load the configuration.
    ///
    /// An explicitly requested file must exist and be valid. Problems with the
    /// default file only produce a warning and fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::read(path);
        }

        let Some(path) = default_path() else {
            debug!("No configuration directory available");
            return Ok(Self::default());
        };

        match Self::read(&path) {
            Ok(config) => Ok(config),
            Err(Error::Io(err)) if err.kind() == ErrorKind::NotFound => {
                debug!(?path, "Config file not found, using defaults");
                Ok(Self::default())
            },
            Err(err) => {
                warn!(?path, "Ignoring config file: {err}");
                Ok(Self::default())
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)
            .map_err(|err| Error::Config(format!("{}: {}", path.display(), err.message())))?;

        debug!(?path, "Loaded config file");

        Ok(config)
    }

    /// Look up a color by its configured name.
    pub fn named_color(&self, name: &str) -> Result<Rgb> {
        let value = self.named_colors.get(name).ok_or_else(|| Error::InvalidOption {
            name: "color-name",
            value: name.into(),
            expected: "unknown color name".into(),
        })?;

        value.parse()
    }

    /// Resolve text which is either a configured color name or RGB text.
    pub fn resolve_color(&self, text: &str) -> Result<Rgb> {
        if self.named_colors.contains_key(text) {
            self.named_color(text)
        } else {
            text.parse()
        }
    }

    /// Color of the single color mode when none is given on the command line.
    pub fn single_mode_color(&self) -> Result<Rgb> {
        match &self.single_mode_color {
            Some(text) => self.resolve_color(text),
            None => Ok(Rgb::WHITE),
        }
    }

    /// Colors written to the predefined color slots on reset.
    pub fn predefined_colors(&self) -> Result<[Rgb; ColorSlot::COUNT]> {
        let Some(texts) = &self.predefined_colors else {
            return Ok(DEFAULT_PREDEFINED_COLORS);
        };

        if texts.len() != ColorSlot::COUNT {
            return Err(Error::InvalidOption {
                name: "predefined-colors",
                value: texts.join(","),
                expected: format!("expected {} colors", ColorSlot::COUNT),
            });
        }

        let mut colors = DEFAULT_PREDEFINED_COLORS;
        for (color, text) in colors.iter_mut().zip(texts) {
            *color = self.resolve_color(text)?;
        }

        Ok(colors)
    }
}

/// Location of the default configuration file.
pub fn default_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", env!("CARGO_PKG_NAME"))?;
    Some(dirs.config_dir().join("config.toml"))
}
