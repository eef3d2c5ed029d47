//! RGB color text codec.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Accepted color text formats.
pub const SUPPORTED_FORMATS: [&str; 8] =
    ["0xHHHHHH", "0XHHHHHH", "#xHHHHHH", "#XHHHHHH", "#HHHHHH", "HHHHHH", "#HHH", "HHH"];

/// RGB color.
#[derive(Default, PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Self = Self::new(0xff, 0xff, 0xff);

    /// Color from its channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<u32> for Rgb {
    fn from(rgb: u32) -> Self {
        let [_, r, g, b] = rgb.to_be_bytes();
        Self { r, g, b }
    }
}

impl FromStr for Rgb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Rgb> {
        let invalid = || Error::InvalidColor { value: s.to_string() };

        // Strip the optional prefix, leaving only the hex digits.
        let digits = match s.as_bytes() {
            [b'0' | b'#', b'x' | b'X', digits @ ..] if digits.len() == 6 => digits,
            [b'#', digits @ ..] if digits.len() == 6 || digits.len() == 3 => digits,
            digits if digits.len() == 6 || digits.len() == 3 => digits,
            _ => return Err(invalid()),
        };

        let mut nibbles = [0; 6];
        for (nibble, digit) in nibbles.iter_mut().zip(digits) {
            *nibble = hex_value(*digit).ok_or_else(invalid)?;
        }

        match digits.len() {
            6 => Ok(Rgb {
                r: nibbles[0] << 4 | nibbles[1],
                g: nibbles[2] << 4 | nibbles[3],
                b: nibbles[4] << 4 | nibbles[5],
            }),
            // Shorthand duplicates every nibble, `#abc` is `#aabbcc`.
            _ => Ok(Rgb { r: nibbles[0] * 17, g: nibbles[1] * 17, b: nibbles[2] * 17 }),
        }
    }
}

impl Display for Rgb {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_prefix() {
        let expected = Rgb::new(0x12, 0xab, 0xef);
        for text in ["0x12abef", "0X12ABEF", "#x12abEF", "#X12abef", "#12ABef", "12abef"] {
            assert_eq!(text.parse::<Rgb>().unwrap(), expected, "{text}");
        }
    }

    #[test]
    fn expands_shorthand() {
        assert_eq!("#fA0".parse::<Rgb>().unwrap(), Rgb::new(0xff, 0xaa, 0x00));
        assert_eq!("123".parse::<Rgb>().unwrap(), Rgb::new(0x11, 0x22, 0x33));
    }

    #[test]
    fn renders_canonical_uppercase() {
        assert_eq!(Rgb::new(0x0a, 0xbc, 0xde).to_string(), "#0ABCDE");
        assert_eq!("0xff00aa".parse::<Rgb>().unwrap().to_string(), "#FF00AA");
        assert_eq!("#abc".parse::<Rgb>().unwrap().to_string(), "#AABBCC");
    }

    #[test]
    fn round_trips_all_channel_values() {
        for value in 0..=255u8 {
            let color = Rgb::new(value, 255 - value, value / 2);
            assert_eq!(color.to_string().parse::<Rgb>().unwrap(), color);
        }

        for nibble in 0..16u8 {
            let color = Rgb::new(nibble * 17, nibble * 17, (15 - nibble) * 17);
            let short = format!("#{:X}{:X}{:X}", nibble, nibble, 15 - nibble);
            assert_eq!(short.parse::<Rgb>().unwrap(), color);
        }
    }

    #[test]
    fn rejects_invalid_text() {
        let invalid = [
            "", "12", "#12", "1234", "12345", "#1234", "0x123", "#12345g", "0y123456", "#x12",
            "ggg", "0x1234567",
        ];

        for text in invalid {
            match text.parse::<Rgb>() {
                Err(Error::InvalidColor { value }) => assert_eq!(value, text),
                other => panic!("{text:?} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn error_lists_formats() {
        let err = "nope".parse::<Rgb>().unwrap_err().to_string();
        assert!(err.contains("\"nope\""));
        assert!(err.contains("#HHH"));
        assert!(err.contains("0xHHHHHH"));
    }

    #[test]
    fn converts_from_u32() {
        assert_eq!(Rgb::from(0x00ff_8001), Rgb::new(0xff, 0x80, 0x01));
    }
}
