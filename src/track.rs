use std::{fmt, num::NonZeroU64, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    protocol::{gateway::SongData, media::Format},
};

/// Characters that cannot appear in file names on this platform.
#[cfg(windows)]
const RESERVED_CHARS: &[char] = &['/', '<', '>', ':', '"', '\\', '|', '?', '*'];
#[cfg(not(windows))]
const RESERVED_CHARS: &[char] = &['/'];

/// Replaces characters that are reserved in file names with `-`.
///
/// `/` is always replaced. On Windows, `< > : " \ | ? *` are too.
#[must_use]
pub fn escape_filename(name: &str) -> String {
    name.replace(RESERVED_CHARS, "-")
}

/// Stable identifier of a track, assigned by Deezer.
///
/// Track IDs are always positive. Their decimal rendering (no sign, no
/// leading zeros) is what goes into key and URL derivation.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct TrackId(NonZeroU64);

impl TrackId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl From<NonZeroU64> for TrackId {
    fn from(id: NonZeroU64) -> Self {
        Self(id)
    }
}

impl TryFrom<u64> for TrackId {
    type Error = Error;

    fn try_from(id: u64) -> Result<Self> {
        NonZeroU64::new(id)
            .map(Self)
            .ok_or_else(|| Error::out_of_range("track id must not be zero"))
    }
}

impl FromStr for TrackId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id = s.parse::<u64>()?;
        Self::try_from(id)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A track as known to the media delivery protocol.
///
/// The identity fields (`id`, `content_hash` and `media_version`) are the
/// inputs of key and URL derivation. The content hash starts out empty for
/// some tracks and must be resolved through the gateway before a download
/// URL can be derived.
///
/// Title, artist and track number are only used for naming files.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Track {
    id: TrackId,
    content_hash: String,
    media_version: u64,
    title: String,
    artist: String,
    track_number: Option<u32>,
}

impl Track {
    /// Creates a track from its protocol identity only.
    #[must_use]
    pub fn new(id: TrackId, content_hash: impl Into<String>, media_version: u64) -> Self {
        Self {
            id,
            content_hash: content_hash.into(),
            media_version,
            title: String::new(),
            artist: String::new(),
            track_number: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    #[must_use]
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// The "MD5 origin" tag of the encoded rendition: 32 lowercase hex
    /// characters, or empty when not resolved yet.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    #[must_use]
    pub fn has_content_hash(&self) -> bool {
        !self.content_hash.is_empty()
    }

    pub fn set_content_hash(&mut self, content_hash: impl Into<String>) {
        self.content_hash = content_hash.into();
    }

    /// Encoding revision tag. Opaque; only used as a URL token input.
    #[must_use]
    pub fn media_version(&self) -> u64 {
        self.media_version
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn artist(&self) -> &str {
        &self.artist
    }

    #[must_use]
    pub fn track_number(&self) -> Option<u32> {
        self.track_number
    }

    /// File name for this track in `format`: the escaped title, or the
    /// track ID for tracks without a title.
    #[must_use]
    pub fn file_name(&self, format: Format) -> String {
        let stem = if self.title.is_empty() {
            self.id.to_string()
        } else {
            escape_filename(&self.title)
        };
        format!("{stem}.{}", format.extension())
    }
}

impl From<SongData> for Track {
    fn from(song: SongData) -> Self {
        Self {
            id: song.id,
            content_hash: song.content_hash,
            media_version: song.media_version,
            title: song.title,
            artist: song.artist,
            track_number: song.track_number,
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.title.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}: \"{} - {}\"", self.id, self.artist, self.title)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn track_id_parsing() {
        let id: TrackId = "3135553".parse().unwrap();
        assert_eq!(id.get(), 3_135_553);
        assert_eq!(id.to_string(), "3135553");

        assert_eq!("0".parse::<TrackId>().unwrap_err().kind, ErrorKind::OutOfRange);
        assert_eq!(
            "-1".parse::<TrackId>().unwrap_err().kind,
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn content_hash_resolution() {
        let id = TrackId::try_from(3_135_553).unwrap();
        let mut track = Track::new(id, "", 7);
        assert!(!track.has_content_hash());

        track.set_content_hash("43808a3ac856cc117362ab94718603ba");
        assert!(track.has_content_hash());
        assert_eq!(track.content_hash(), "43808a3ac856cc117362ab94718603ba");
    }

    #[test]
    fn display() {
        let id = TrackId::try_from(3_135_553).unwrap();
        let track = Track::new(id, "", 7);
        assert_eq!(track.to_string(), "3135553");

        let track = track.with_title("One More Time").with_artist("Daft Punk");
        assert_eq!(track.to_string(), "3135553: \"Daft Punk - One More Time\"");
    }

    #[test]
    fn file_names() {
        let id = TrackId::try_from(3_135_553).unwrap();
        let track = Track::new(id, "", 7);
        assert_eq!(track.file_name(Format::FLAC), "3135553.flac");

        let track = track.with_title("AC/DC Live");
        assert_eq!(track.file_name(Format::MP3_320), "AC-DC Live.mp3");
    }

    #[test]
    fn escaping() {
        assert_eq!(escape_filename("a/b/c"), "a-b-c");
        assert_eq!(escape_filename("plain name"), "plain name");

        #[cfg(windows)]
        assert_eq!(escape_filename(r#"a<b>c:"d\e|f?g*"#), "a-b-c--d-e-f-g-");
        #[cfg(not(windows))]
        assert_eq!(escape_filename("what?"), "what?");
    }
}
