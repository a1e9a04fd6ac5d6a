//! Song metadata from Deezer's gateways.
//!
//! # Wire Format
//!
//! Web gateway, method `song.getData`:
//! ```json
//! {
//!     "SNG_ID": "3135553",
//!     "SNG_TITLE": "One More Time",
//!     "ART_NAME": "Daft Punk",
//!     "TRACK_NUMBER": "1",
//!     "GAIN": "-12.3",
//!     "MD5_ORIGIN": "43808a3ac856cc117362ab94718603ba",
//!     "MEDIA_VERSION": "7"
//! }
//! ```
//!
//! `MD5_ORIGIN` can be empty or absent, depending on the session. The
//! mobile gateway, method `song_getData`, returns the same field and is
//! used as a fallback.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::track::TrackId;

use super::Method;

impl Method for SongData {
    const METHOD: &'static str = "song.getData";
}

impl Method for SongMd5 {
    const METHOD: &'static str = "song_getData";
}

/// Song metadata.
#[serde_as]
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct SongData {
    #[serde(rename = "SNG_ID")]
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub id: TrackId,

    #[serde(rename = "SNG_TITLE")]
    pub title: String,

    #[serde(default)]
    #[serde(rename = "ART_NAME")]
    pub artist: String,

    #[serde(default)]
    #[serde(rename = "TRACK_NUMBER")]
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub track_number: Option<u32>,

    /// Volume normalization in decibels
    #[serde(default)]
    #[serde(rename = "GAIN")]
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub gain: Option<f32>,

    /// Content hash of the encoded rendition, empty when not provided
    #[serde(default)]
    #[serde(rename = "MD5_ORIGIN")]
    pub content_hash: String,

    #[serde(default)]
    #[serde(rename = "MEDIA_VERSION")]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub media_version: u64,
}

/// Content hash lookup on the mobile gateway.
#[derive(Clone, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct SongMd5 {
    #[serde(default)]
    #[serde(rename = "MD5_ORIGIN")]
    pub content_hash: String,
}

/// Request body for both song methods.
#[derive(Copy, Clone, Eq, PartialEq, Serialize, Debug, Hash)]
pub struct Request {
    #[serde(rename = "SNG_ID")]
    pub song_id: TrackId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::gateway::Response;

    #[test]
    fn song_with_string_numbers() {
        let response: Response = serde_json::from_str(
            r#"{
                "error": [],
                "results": {
                    "SNG_ID": "3135553",
                    "SNG_TITLE": "One More Time",
                    "ART_NAME": "Daft Punk",
                    "TRACK_NUMBER": "1",
                    "GAIN": "-12.3",
                    "MD5_ORIGIN": "43808a3ac856cc117362ab94718603ba",
                    "MEDIA_VERSION": "7"
                }
            }"#,
        )
        .unwrap();
        let song: SongData = response.into_result().unwrap();

        assert_eq!(song.id.get(), 3_135_553);
        assert_eq!(song.title, "One More Time");
        assert_eq!(song.artist, "Daft Punk");
        assert_eq!(song.track_number, Some(1));
        assert_eq!(song.gain, Some(-12.3));
        assert_eq!(song.content_hash, "43808a3ac856cc117362ab94718603ba");
        assert_eq!(song.media_version, 7);
    }

    #[test]
    fn song_without_content_hash() {
        let song: SongData = serde_json::from_str(
            r#"{"SNG_ID": 3135553, "SNG_TITLE": "One More Time", "MEDIA_VERSION": 0}"#,
        )
        .unwrap();

        assert!(song.content_hash.is_empty());
        assert_eq!(song.media_version, 0);
        assert_eq!(song.track_number, None);
    }

    #[test]
    fn mobile_content_hash() {
        let response: Response = serde_json::from_str(
            r#"{"error": [], "results": {"MD5_ORIGIN": "43808a3ac856cc117362ab94718603ba"}}"#,
        )
        .unwrap();
        let md5: SongMd5 = response.into_result().unwrap();
        assert_eq!(md5.content_hash, "43808a3ac856cc117362ab94718603ba");
    }

    #[test]
    fn request_body() {
        let request = Request {
            song_id: "3135553".parse().unwrap(),
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"SNG_ID":3135553}"#
        );
    }
}
