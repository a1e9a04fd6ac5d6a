//! Download URL derivation for protected tracks.
//!
//! The CDN does not accept plain track IDs. Instead every download URL
//! carries an opaque token that encodes the track identity and the
//! requested format:
//!
//! 1. Join content hash, format code, track ID and media version with the
//!    byte `0xA4`
//! 2. Prefix the lowercase hex MD5 of that with another separator, and
//!    append a trailing separator
//! 3. Encrypt the result with AES-128 in ECB mode under a fixed key, with
//!    zero padding
//! 4. Encode the ciphertext as lowercase hex
//!
//! The edge host is picked by the first character of the content hash.
//!
//! # Example
//!
//! ```rust
//! use deezerdl::{protocol::media::Format, url_token};
//!
//! let url = url_token::download_url(&track, Format::FLAC)?;
//! assert_eq!(url.path_segments().unwrap().next(), Some("mobile"));
//! ```

use url::Url;

use crate::{
    error::{Error, Result},
    protocol::media::Format,
    track::Track,
    util::{encrypt_ecb, md5_hex, AES_BLOCK_SIZE},
};

/// Separator between token fields. Not a printable ASCII character.
pub const SEPARATOR: u8 = 0xA4;

/// Fixed key of the token cipher.
const URL_TOKEN_KEY: &[u8; AES_BLOCK_SIZE] = b"jo6aey6haid2Teih";

/// Path prefix of download URLs on the edge hosts.
const DOWNLOAD_PATH: &str = "mobile/1";

/// Length of a content hash: an MD5 digest in hex.
const CONTENT_HASH_LENGTH: usize = 32;

/// Returns the content hash of `track` if it is 32 lowercase hex digits.
///
/// The first character becomes part of the host name, so anything else is
/// refused before a token or URL is built from it.
fn require_content_hash(track: &Track) -> Result<&str> {
    let content_hash = track.content_hash();
    if content_hash.is_empty() {
        return Err(Error::failed_precondition(format!(
            "track {} has no content hash",
            track.id()
        )));
    }

    let is_lower_hex = |b: u8| b.is_ascii_digit() || (b'a'..=b'f').contains(&b);
    if content_hash.len() != CONTENT_HASH_LENGTH || !content_hash.bytes().all(is_lower_hex) {
        return Err(Error::invalid_argument(format!(
            "content hash of track {} is not {CONTENT_HASH_LENGTH} lowercase hex digits: {content_hash:?}",
            track.id()
        )));
    }

    Ok(content_hash)
}

/// Derives the URL token for `track` in `format`.
///
/// The same track and format always yield the same token. The token is 32
/// or more lowercase hex characters, a multiple of 32 long.
///
/// # Errors
///
/// * `FailedPrecondition` if the track has no content hash
/// * `InvalidArgument` if the content hash is malformed
pub fn url_token(track: &Track, format: Format) -> Result<String> {
    let content_hash = require_content_hash(track)?;

    let fields = [
        content_hash.to_owned(),
        format.code().to_string(),
        track.id().to_string(),
        track.media_version().to_string(),
    ];
    let joined = fields.map(String::into_bytes).join(&SEPARATOR);

    let digest = md5_hex(&joined);

    let mut payload = Vec::with_capacity(digest.len() + joined.len() + 2);
    payload.extend_from_slice(digest.as_bytes());
    payload.push(SEPARATOR);
    payload.extend_from_slice(&joined);
    payload.push(SEPARATOR);

    let ciphertext = encrypt_ecb(URL_TOKEN_KEY, &payload)?;
    Ok(hex::encode(ciphertext))
}

/// Edge host serving the track, e.g. `e-cdns-proxy-4.dzcdn.net`.
///
/// # Errors
///
/// * `FailedPrecondition` if the track has no content hash
/// * `InvalidArgument` if the content hash is malformed
pub fn edge_host(track: &Track) -> Result<String> {
    let content_hash = require_content_hash(track)?;
    let shard = &content_hash[..1];

    Ok(format!("e-cdns-proxy-{shard}.dzcdn.net"))
}

/// Full download URL: `https://<edge host>/mobile/1/<token>`.
///
/// # Errors
///
/// * `FailedPrecondition` if the track has no content hash
/// * `InvalidArgument` if the content hash is malformed
pub fn download_url(track: &Track, format: Format) -> Result<Url> {
    let host = edge_host(track)?;
    let token = url_token(track, format)?;

    let url = format!("https://{host}/{DOWNLOAD_PATH}/{token}").parse::<Url>()?;
    trace!("download url for {track}: {url}");

    Ok(url)
}
