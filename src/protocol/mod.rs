//! Wire types for the Deezer services used by the downloader.
//!
//! # Submodules
//!
//! * [`api`] - Public REST API (album listings)
//! * [`gateway`] - Session-bound gateway API (user data, song metadata)
//! * [`media`] - Audio formats and their protocol codes
//!
//! Every response body goes through [`json`], which logs what was
//! received before handing the parsed value back.

pub mod api;
pub mod gateway;
pub mod media;

use crate::error::Result;
use serde::Deserialize;
use std::fmt::Debug;

/// Parses and logs JSON responses from Deezer APIs.
///
/// # Arguments
///
/// * `body` - Response body text to parse
/// * `origin` - Description of API endpoint for logging
///
/// # Errors
///
/// Returns error if the body is not valid JSON or does not match `T`.
///
/// # Logging
///
/// * Success: Logs parsed structure at TRACE level
/// * Parse Error: Logs raw JSON at TRACE level if valid JSON
/// * Invalid JSON: Logs error and raw text at ERROR level
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}
