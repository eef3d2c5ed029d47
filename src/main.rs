//! ITE 8291 keyboard backlight CLI tool
//!
//! Controls the per-key RGB backlight controller built into many Tongfang
//! based laptops (ITE 8291, firmware revision 0.03).

use std::env;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process;

use clap::builder::EnumValueParser;
use clap::{
    crate_description, crate_name, crate_version, value_parser, Arg, ArgAction, ArgGroup,
    ArgMatches, Command,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::controller::Controller;
use crate::effect::{Brightness, ColorNum, Direction, Speed};
use crate::error::{Error, Result};
use crate::params::Connection;
use crate::usb::UsbDevice;

mod color;
mod config;
mod controller;
mod effect;
mod error;
mod locator;
mod params;
mod usb;

fn main() {
    if let Err(err) = run() {
        eprintln!("\x1b[31mError:\x1b[0m {err}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = cli().get_matches();

    init_logging(matches.get_count("verbose"));

    let config = Config::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

    match matches.subcommand() {
        Some((name, sub_matches)) => dispatch(name, sub_matches, &config),
        None => default_mode(&config),
    }
}

/// Run the configured mode when no subcommand was given.
fn default_mode(config: &Config) -> Result<()> {
    let Some(mode) = &config.mode else {
        cli().print_help()?;
        return Ok(());
    };

    let name = format!("{mode}-mode");
    if cli().find_subcommand(&name).is_none() {
        return Err(Error::InvalidOption {
            name: "mode",
            value: mode.clone(),
            expected: "unknown mode".into(),
        });
    }

    debug!(mode = %name, "Running default mode");

    // Parse again with the mode inserted, so global flags still apply.
    let mut args: Vec<OsString> = env::args_os().collect();
    args.insert(1.min(args.len()), name.into());
    let matches = cli().get_matches_from(args);

    match matches.subcommand() {
        Some((name, sub_matches)) => dispatch(name, sub_matches, config),
        None => Ok(()),
    }
}

/// Execute a subcommand.
///
/// All parameters are validated before the device is opened.
fn dispatch(name: &str, matches: &ArgMatches, config: &Config) -> Result<()> {
    if name == "list-devices" {
        return list_devices();
    }

    let connection = params::connection(matches, config)?;

    match name {
        "state" => {
            let on = with_controller(connection, Controller::state)?;
            println!("{}", if on { "On" } else { "Off" });
        },
        "brightness" => println!("{}", with_controller(connection, Controller::brightness)?),
        "firmware-version" => {
            println!("{}", with_controller(connection, Controller::firmware_version)?);
        },
        "set-brightness" => {
            let brightness = params::brightness(matches, config)?;
            with_controller(connection, |controller| controller.set_brightness(brightness))?;
        },
        "set-color" => {
            let slot = params::color_slot(matches)?;
            let color = params::color(matches, config)?.ok_or_else(|| Error::InvalidOption {
                name: "rgb",
                value: String::new(),
                expected: "a color is required".into(),
            })?;
            with_controller(connection, |controller| controller.set_color(slot, color))?;
        },
        "single-color-mode" => {
            let brightness = params::brightness(matches, config)?;
            let color = match params::color(matches, config)? {
                Some(color) => color,
                None => config.single_mode_color()?,
            };
            let save = params::save(matches, config);
            let reset = params::reset_colors(matches, config)?;

            with_controller(connection, |controller| {
                if let Some(colors) = &reset {
                    controller.set_colors(colors)?;
                }
                controller.set_single_color_mode(brightness, color, save)
            })?;
        },
        "off-mode" => with_controller(connection, Controller::set_off_mode)?,
        mode => {
            let effect = params::effect(mode, matches, config)?;
            let save = params::save(matches, config);
            let reset = params::reset_colors(matches, config)?;

            with_controller(connection, |controller| {
                if let Some(colors) = &reset {
                    controller.set_colors(colors)?;
                }
                controller.set_mode(&effect, save)
            })?;
        },
    }

    Ok(())
}

/// Open the device, run `f` and release the device again.
fn with_controller<T, F>(connection: Connection, f: F) -> Result<T>
where
    F: FnOnce(&mut Controller<UsbDevice>) -> Result<T>,
{
    let device = UsbDevice::open(connection.target, connection.poll)?;
    Controller::new(device).run_and_close(f)
}

/// Print all connected supported devices.
fn list_devices() -> Result<()> {
    let devices = usb::list_devices()?;

    if devices.is_empty() {
        println!("No supported devices found");
    }

    for device in devices {
        println!("{device}");
    }

    Ok(())
}

/// Setup log output on STDERR.
///
/// `RUST_LOG` is used unless the verbosity was raised on the command line.
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Get clap CLI definition.
fn cli() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .after_help("Running without a subcommand applies the mode set in the configuration file.")
        .arg(
            Arg::new("config")
                .help("Configuration file [default: $XDG_CONFIG_HOME/itectl/config.toml]")
                .long("config")
                .value_name("FILE")
                .env("ITECTL_CONFIG")
                .global(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("device-bus")
                .help("USB bus of the controller, requires --device-address")
                .long("device-bus")
                .value_name("BUS")
                .env("ITECTL_DEVICE_BUS")
                .global(true)
                .value_parser(value_parser!(u8)),
        )
        .arg(
            Arg::new("device-address")
                .help("USB address of the controller, requires --device-bus")
                .long("device-address")
                .value_name("ADDRESS")
                .env("ITECTL_DEVICE_ADDRESS")
                .global(true)
                .value_parser(value_parser!(u8)),
        )
        .arg(
            Arg::new("poll-interval")
                .help("Delay between device lookups in milliseconds [default: 200]")
                .long("poll-interval")
                .value_name("MS")
                .env("ITECTL_POLL_INTERVAL")
                .global(true)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("poll-timeout")
                .help("Time to wait for the device in milliseconds, 0 searches once [default: 0]")
                .long("poll-timeout")
                .value_name("MS")
                .env("ITECTL_POLL_TIMEOUT")
                .global(true)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("verbose")
                .help("Increase log verbosity")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count),
        )
        .subcommand(Command::new("off-mode").about("Turn the keyboard backlight off"))
        .subcommand(mode_command("aurora-mode", "Aurora effect").args(reactive_args()))
        .subcommand(
            mode_command("breath-mode", "Breathing effect").args([speed_arg(), color_num_arg()]),
        )
        .subcommand(mode_command("fireworks-mode", "Fireworks effect").args(reactive_args()))
        .subcommand(mode_command("marquee-mode", "Marquee effect").arg(speed_arg()))
        .subcommand(mode_command("rainbow-mode", "Rainbow effect"))
        .subcommand(
            mode_command("raindrop-mode", "Raindrop effect").args([speed_arg(), color_num_arg()]),
        )
        .subcommand(mode_command("random-mode", "Random effect").args(reactive_args()))
        .subcommand(mode_command("ripple-mode", "Ripple effect").args(reactive_args()))
        .subcommand(mode_command("wave-mode", "Wave effect").args([speed_arg(), direction_arg()]))
        .subcommand(
            mode_command("single-color-mode", "Set every key to the same color")
                .args(color_args())
                .group(
                    ArgGroup::new("color")
                        .args(["rgb", "color-name", "red", "green", "blue"])
                        .multiple(true),
                ),
        )
        .subcommand(Command::new("brightness").about("Print the current brightness"))
        .subcommand(
            Command::new("set-brightness")
                .about("Change brightness without changing the effect")
                .arg(
                    Arg::new("brightness")
                        .help("LED brightness [possible values: 0..=50]")
                        .long("brightness")
                        .short('b')
                        .required(true)
                        .value_parser(value_parser!(u8)),
                ),
        )
        .subcommand(Command::new("state").about("Print whether the backlight is on"))
        .subcommand(Command::new("firmware-version").about("Print the controller firmware version"))
        .subcommand(
            Command::new("set-color")
                .about("Change one of the predefined effect colors")
                .arg(
                    Arg::new("color-num")
                        .help("Predefined color slot [possible values: 1..=7]")
                        .long("color-num")
                        .short('c')
                        .required(true)
                        .value_parser(value_parser!(u8)),
                )
                .args(color_args())
                .group(
                    ArgGroup::new("color")
                        .args(["rgb", "color-name", "red", "green", "blue"])
                        .multiple(true)
                        .required(true),
                ),
        )
        .subcommand(Command::new("list-devices").about("List connected supported devices"))
}

/// Subcommand applying a lighting effect.
fn mode_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name).about(about).args([brightness_arg(), save_arg(), reset_arg()])
}

/// Flags of effects which can react to key presses.
fn reactive_args() -> [Arg; 3] {
    [speed_arg(), color_num_arg(), reactive_arg()]
}

fn speed_arg() -> Arg {
    Arg::new("speed")
        .help(format!(
            "Effect speed [possible values: 0..={}] [default: {}]",
            Speed::MAX,
            Speed::DEFAULT
        ))
        .long("speed")
        .short('s')
        .env("ITECTL_SPEED")
        .value_parser(value_parser!(u8))
}

fn brightness_arg() -> Arg {
    Arg::new("brightness")
        .help(format!(
            "LED brightness [possible values: 0..={}] [default: {}]",
            Brightness::MAX,
            Brightness::DEFAULT
        ))
        .long("brightness")
        .short('b')
        .env("ITECTL_BRIGHTNESS")
        .value_parser(value_parser!(u8))
}

fn color_num_arg() -> Arg {
    Arg::new("color-num")
        .help(format!(
            "Predefined color, 0 for none and 8 for random [possible values: 0..=8] [default: {}]",
            ColorNum::RANDOM.value()
        ))
        .long("color-num")
        .short('c')
        .env("ITECTL_COLOR_NUM")
        .value_parser(value_parser!(u8))
}

fn reactive_arg() -> Arg {
    Arg::new("reactive")
        .help("Only light up keys when they are pressed")
        .long("reactive")
        .env("ITECTL_REACTIVE")
        .action(ArgAction::SetTrue)
}

fn direction_arg() -> Arg {
    Arg::new("direction")
        .help("Wave direction")
        .long("direction")
        .short('d')
        .env("ITECTL_DIRECTION")
        .ignore_case(true)
        .value_parser(EnumValueParser::<Direction>::new())
}

fn save_arg() -> Arg {
    Arg::new("save")
        .help("Persist the effect in the controller")
        .long("save")
        .env("ITECTL_SAVE")
        .action(ArgAction::SetTrue)
}

fn reset_arg() -> Arg {
    Arg::new("reset")
        .help("Restore the configured predefined colors before applying the effect")
        .long("reset")
        .env("ITECTL_RESET")
        .action(ArgAction::SetTrue)
}

/// Mutually exclusive ways to specify a color.
fn color_args() -> [Arg; 5] {
    let channel = |name: &'static str| {
        Arg::new(name)
            .help(format!("{} channel, missing channels are 0", name.to_uppercase()))
            .long(name)
            .value_name("0-255")
            .conflicts_with_all(["rgb", "color-name"])
            .value_parser(value_parser!(u8))
    };

    [
        Arg::new("rgb")
            .help("Color as hex RGB, like #FF8000 or #F80")
            .long("rgb")
            .value_name("COLOR")
            .conflicts_with("color-name"),
        Arg::new("color-name")
            .help("Color name from the configuration file")
            .long("color-name")
            .value_name("NAME"),
        channel("red"),
        channel("green"),
        channel("blue"),
    ]
}
