//! Session cookie used to authenticate with Deezer.
//!
//! The ARL is a long-lived cookie that a logged in browser holds for
//! `deezer.com`. It grants full access to the account, so it is never
//! logged: its `Debug` output is redacted.

use std::{ops::Deref, str::FromStr};

use serde::{Deserialize, Serialize};
use veil::Redact;

use crate::error::{Error, Result};

/// Validated ARL session cookie.
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Redact, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Arl(#[redact(partial)] String);

impl Arl {
    /// Length of a valid ARL in characters.
    pub const LENGTH: usize = 192;

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Arl {
    type Err = Error;

    /// Parses an ARL, ignoring surrounding whitespace.
    ///
    /// # Errors
    ///
    /// * `OutOfRange` if it is not 192 characters long
    /// * `InvalidArgument` if it contains characters that are not allowed
    ///   in a cookie value
    fn from_str(s: &str) -> Result<Self> {
        let arl = s.trim();

        let chars = arl.chars().count();
        if chars != Self::LENGTH {
            return Err(Error::out_of_range(format!(
                "arl should be {} characters long but is {chars}",
                Self::LENGTH
            )));
        }

        if !arl.chars().all(|c| c.is_ascii_graphic() && c != ';' && c != ',') {
            return Err(Error::invalid_argument(
                "arl contains characters that are invalid in a cookie",
            ));
        }

        Ok(Self(arl.to_owned()))
    }
}

impl TryFrom<String> for Arl {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Arl> for String {
    fn from(arl: Arl) -> Self {
        arl.0
    }
}

impl Deref for Arl {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn valid() -> String {
        "a1b2c3".repeat(32)
    }

    #[test]
    fn parses_valid_arl() {
        let arl: Arl = format!("  {}\n", valid()).parse().unwrap();
        assert_eq!(arl.as_str(), valid());
        assert_eq!(arl.len(), Arl::LENGTH);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = "too short".parse::<Arl>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);

        let err = format!("{}x", valid()).parse::<Arl>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);
    }

    #[test]
    fn rejects_cookie_separators() {
        let mut arl = valid();
        arl.replace_range(0..1, ";");
        assert_eq!(
            arl.parse::<Arl>().unwrap_err().kind,
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn debug_is_redacted() {
        let arl: Arl = valid().parse().unwrap();
        assert!(!format!("{arl:?}").contains(&valid()));
    }
}
