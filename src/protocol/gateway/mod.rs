//! Gateway API types for Deezer's session-bound web services.
//!
//! This module provides type-safe interfaces to the gateway methods the
//! downloader needs:
//! * Session data and the api token ([`user_data`])
//! * Song metadata, including the content hash ([`song_data`])
//!
//! Both the web gateway (`gw-light.php`) and the mobile gateway
//! (`gateway.php`) wrap their payload in the same envelope.
//!
//! # Number Handling
//!
//! The gateway transmits most numbers as strings. Fields accept both
//! representations.
//!
//! # Example
//!
//! ```rust
//! use deezerdl::protocol::gateway::{Response, SongData};
//!
//! let response: Response = serde_json::from_str(json)?;
//! let song: SongData = response.into_result()?;
//! println!("content hash: {}", song.content_hash);
//! ```

pub mod song_data;
pub mod user_data;

pub use song_data::{SongData, SongMd5};
pub use user_data::UserData;

use serde::{de::DeserializeOwned, Deserialize};

use crate::error::{Error, Result};

/// Defines a gateway API method identifier.
///
/// Each type implementing this trait is the result of a specific gateway
/// method, identified by its method name.
pub trait Method {
    /// The gateway API method name, e.g. `song.getData`.
    const METHOD: &'static str;
}

/// Response envelope of a gateway method.
///
/// ```json
/// {
///     "error": [],
///     "results": { ... }
/// }
/// ```
///
/// On failure `error` is a map from error code to message, and `results`
/// is usually an empty object that does not match the expected type. The
/// results are therefore only decoded after the error map was checked.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct Response {
    /// API status information: an empty array or object when successful
    #[serde(default)]
    pub error: serde_json::Value,

    /// Raw result payload
    #[serde(default)]
    pub results: serde_json::Value,
}

impl Response {
    /// Returns the first error code and message, if the gateway reported any.
    #[must_use]
    pub fn error(&self) -> Option<(String, String)> {
        match &self.error {
            serde_json::Value::Object(map) => map.iter().next().map(|(code, message)| {
                let message = message
                    .as_str()
                    .map_or_else(|| message.to_string(), ToOwned::to_owned);
                (code.clone(), message)
            }),
            _ => None,
        }
    }

    /// Checks the error map and decodes the results.
    ///
    /// # Errors
    ///
    /// * `Unauthenticated` when the session or api token was rejected
    /// * `NotFound` when the requested item does not exist
    /// * `Unknown` for other gateway errors
    /// * `InvalidArgument` when the results do not match `T`
    pub fn into_result<T>(self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        if let Some((code, message)) = self.error() {
            let error = format!("{code}: {message}");
            return Err(match code.as_str() {
                "VALID_TOKEN_REQUIRED" | "NEED_USER_AUTH_REQUIRED" | "GATEWAY_ERROR" => {
                    Error::unauthenticated(error)
                }
                "DATA_ERROR" => Error::not_found(error),
                _ => Error::unknown(error),
            });
        }

        serde_json::from_value(self.results).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug, Deserialize)]
    struct Ping {
        pong: bool,
    }

    #[test]
    fn successful_response() {
        let response: Response =
            serde_json::from_str(r#"{"error":[],"results":{"pong":true}}"#).unwrap();
        assert!(response.error().is_none());
        assert!(response.into_result::<Ping>().unwrap().pong);
    }

    #[test]
    fn invalid_token_is_unauthenticated() {
        let response: Response = serde_json::from_str(
            r#"{"error":{"VALID_TOKEN_REQUIRED":"Invalid CSRF token"},"results":{}}"#,
        )
        .unwrap();
        assert_eq!(
            response.error(),
            Some((
                "VALID_TOKEN_REQUIRED".to_string(),
                "Invalid CSRF token".to_string()
            ))
        );
        assert_eq!(
            response.into_result::<Ping>().unwrap_err().kind,
            ErrorKind::Unauthenticated
        );
    }

    #[test]
    fn data_error_is_not_found() {
        let response: Response =
            serde_json::from_str(r#"{"error":{"DATA_ERROR":"song not found"},"results":{}}"#)
                .unwrap();
        assert_eq!(
            response.into_result::<Ping>().unwrap_err().kind,
            ErrorKind::NotFound
        );
    }

    #[test]
    fn mismatched_results() {
        let response: Response =
            serde_json::from_str(r#"{"error":{},"results":{"ping":1}}"#).unwrap();
        assert!(response.into_result::<Ping>().is_err());
    }
}
