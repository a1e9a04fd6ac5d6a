//! Audio formats offered by Deezer's media delivery.
//!
//! Each format has a fixed numeric code. The code, not the name, goes into
//! the download URL token, so the mapping must match the service exactly:
//!
//! | Format    | Code | Extension |
//! |-----------|------|-----------|
//! | `FLAC`    | 9    | `flac`    |
//! | `MP3_320` | 3    | `mp3`     |
//! | `MP3_256` | 5    | `mp3`     |
//!
//! Configuration files and the command line refer to formats by name.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Audio format and quality level.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash,
)]
#[expect(non_camel_case_types)]
#[repr(u8)]
pub enum Format {
    /// FLAC lossless (9)
    FLAC = 9,
    /// 320 kbps MP3 (3, default)
    #[default]
    MP3_320 = 3,
    /// 256 kbps MP3 (5)
    MP3_256 = 5,
}

impl Format {
    /// All formats, from highest to lowest quality.
    pub const ALL: [Format; 3] = [Self::FLAC, Self::MP3_320, Self::MP3_256];

    /// The protocol code of this format.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// File extension for this format, without leading dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::FLAC => "flac",
            Self::MP3_320 | Self::MP3_256 => "mp3",
        }
    }
}

impl fmt::Display for Format {
    /// Shows the format name (e.g., "`MP3_320`", "FLAC").
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl FromStr for Format {
    type Err = Error;

    /// Parses a format name, ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for names other than `FLAC`,
    /// `MP3_320` and `MP3_256`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "invalid format: {s} (expected one of FLAC, MP3_320, MP3_256)"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn protocol_codes() {
        assert_eq!(Format::FLAC.code(), 9);
        assert_eq!(Format::MP3_320.code(), 3);
        assert_eq!(Format::MP3_256.code(), 5);
    }

    #[test]
    fn parse_names() {
        assert_eq!("FLAC".parse::<Format>().unwrap(), Format::FLAC);
        assert_eq!("mp3_320".parse::<Format>().unwrap(), Format::MP3_320);
        assert_eq!(" MP3_256 ".parse::<Format>().unwrap(), Format::MP3_256);

        let err = "MP3_128".parse::<Format>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn display_matches_parse() {
        for format in Format::ALL {
            assert_eq!(format.to_string().parse::<Format>().unwrap(), format);
        }
    }

    #[test]
    fn extensions() {
        assert_eq!(Format::FLAC.extension(), "flac");
        assert_eq!(Format::MP3_320.extension(), "mp3");
        assert_eq!(Format::MP3_256.extension(), "mp3");
    }
}
