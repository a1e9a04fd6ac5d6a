//! Public REST API types.
//!
//! The public API at `api.deezer.com` needs no session. It is used to list
//! the tracks of an album; the tracks themselves are then resolved through
//! the gateway.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "id": 2795561,
//!     "title": "Drukqs",
//!     "link": "https://www.deezer.com/album/2795561",
//!     "cover": "https://api.deezer.com/album/2795561/image",
//!     "cover_small": "https://...",
//!     "cover_medium": "https://...",
//!     "cover_big": "https://...",
//!     "cover_xl": "https://...",
//!     "release_date": "2001-10-22",
//!     "tracks": {
//!         "data": [{"id": 27957191, "title": "Jynweythek", "link": "https://..."}]
//!     }
//! }
//! ```
//!
//! Failures are reported in-band:
//!
//! ```json
//! {"error": {"type": "DataException", "message": "no data", "code": 800}}
//! ```

use serde::Deserialize;
use time::{macros::format_description, Date};

use crate::{
    error::{Error, Result},
    track::TrackId,
};

/// Response of the public API: either the payload or an in-band error.
#[derive(Clone, PartialEq, Deserialize, Debug)]
#[serde(untagged)]
pub enum Response<T> {
    Error { error: ApiError },
    Ok(T),
}

impl<T> Response<T> {
    /// Converts the in-band error into an [`Error`].
    ///
    /// # Errors
    ///
    /// * `NotFound` for data exceptions (code 800)
    /// * `ResourceExhausted` for quota exceptions (code 4)
    /// * `Unknown` otherwise
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Ok(data) => Ok(data),
            Self::Error { error } => {
                let message = format!("{} ({}): {}", error.typ, error.code, error.message);
                Err(match error.code {
                    800 => Error::not_found(message),
                    4 => Error::resource_exhausted(message),
                    _ => Error::unknown(message),
                })
            }
        }
    }
}

/// In-band error of the public API.
#[derive(Clone, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub typ: String,
    pub message: String,
    #[serde(default)]
    pub code: i64,
}

/// Album with its track listing.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct Album {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default, rename = "cover")]
    pub cover_url: String,
    #[serde(flatten)]
    pub covers: Covers,
    #[serde(default)]
    pub release_date: String,
    pub tracks: Tracks,
}

impl Album {
    /// Parses the release date, formatted as `YYYY-MM-DD`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the date is missing or malformed.
    pub fn release_date(&self) -> Result<Date> {
        Date::parse(&self.release_date, format_description!("[year]-[month]-[day]"))
            .map_err(|e| Error::invalid_argument(format!("release date {}: {e}", self.release_date)))
    }

    /// Track IDs in album order.
    #[must_use]
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.data.iter().map(|track| track.id).collect()
    }
}

/// Album cover URLs in the available sizes.
#[derive(Clone, Default, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct Covers {
    #[serde(default, rename = "cover_small")]
    pub small: String,
    #[serde(default, rename = "cover_medium")]
    pub medium: String,
    #[serde(default, rename = "cover_big")]
    pub big: String,
    #[serde(default, rename = "cover_xl")]
    pub xl: String,
}

#[derive(Clone, Default, PartialEq, Deserialize, Debug)]
pub struct Tracks {
    #[serde(default)]
    pub data: Vec<AlbumTrack>,
}

/// Track entry of an album listing.
#[derive(Clone, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct AlbumTrack {
    pub id: TrackId,
    pub title: String,
    #[serde(default)]
    pub link: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use time::Month;

    const ALBUM: &str = r#"{
        "id": 2795561,
        "title": "Drukqs",
        "link": "https://www.deezer.com/album/2795561",
        "cover": "https://api.deezer.com/album/2795561/image",
        "cover_small": "https://e-cdns-images.dzcdn.net/images/cover/small.jpg",
        "cover_medium": "https://e-cdns-images.dzcdn.net/images/cover/medium.jpg",
        "cover_big": "https://e-cdns-images.dzcdn.net/images/cover/big.jpg",
        "cover_xl": "https://e-cdns-images.dzcdn.net/images/cover/xl.jpg",
        "release_date": "2001-10-22",
        "tracks": {
            "data": [
                {"id": 27957191, "title": "Jynweythek", "link": "https://www.deezer.com/track/27957191"},
                {"id": 27957201, "title": "Vordhosbn"}
            ]
        }
    }"#;

    #[test]
    fn album_listing() {
        let response: Response<Album> = serde_json::from_str(ALBUM).unwrap();
        let album = response.into_result().unwrap();

        assert_eq!(album.id, 2_795_561);
        assert_eq!(album.title, "Drukqs");
        assert!(album.covers.small.ends_with("small.jpg"));
        assert!(album.covers.xl.ends_with("xl.jpg"));

        let date = album.release_date().unwrap();
        assert_eq!(date.year(), 2001);
        assert_eq!(date.month(), Month::October);
        assert_eq!(date.day(), 22);

        let ids: Vec<u64> = album.track_ids().into_iter().map(TrackId::get).collect();
        assert_eq!(ids, [27_957_191, 27_957_201]);
    }

    #[test]
    fn in_band_error() {
        let response: Response<Album> = serde_json::from_str(
            r#"{"error": {"type": "DataException", "message": "no data", "code": 800}}"#,
        )
        .unwrap();
        assert_eq!(response.into_result().unwrap_err().kind, ErrorKind::NotFound);
    }
}
