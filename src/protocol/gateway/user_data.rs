//! Session data from Deezer's gateway API.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "USER": {
//!         "USER_ID": "123456789",
//!         "BLOG_NAME": "Username"
//!     },
//!     "checkForm": "api_token"
//! }
//! ```
//!
//! A session without a valid arl still gets a response, with `USER_ID`
//! set to `0`.

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use veil::Redact;

use super::Method;

impl Method for UserData {
    const METHOD: &'static str = "deezer.getUserData";
}

/// Session data from Deezer's gateway.
#[derive(Clone, Eq, PartialEq, Deserialize, Redact, Hash)]
pub struct UserData {
    /// User profile
    #[serde(rename = "USER")]
    pub user: User,

    /// API token for subsequent gateway calls
    #[serde(rename = "checkForm")]
    #[redact]
    pub api_token: String,
}

impl UserData {
    /// Whether the session belongs to a logged in user.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.user.id != 0
    }
}

/// User profile.
#[serde_as]
#[derive(Clone, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct User {
    /// Unique user identifier, `0` when not logged in
    #[serde(rename = "USER_ID")]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub id: u64,

    /// Display name
    #[serde(default)]
    #[serde(rename = "BLOG_NAME")]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::gateway::Response;

    #[test]
    fn logged_in_user() {
        let response: Response = serde_json::from_str(
            r#"{
                "error": [],
                "results": {
                    "USER": {"USER_ID": "123456789", "BLOG_NAME": "someone"},
                    "checkForm": "Tfq0k3hSlFe7Ai0XLtWmQAZ1jn0ODbSn"
                }
            }"#,
        )
        .unwrap();
        let data: UserData = response.into_result().unwrap();

        assert!(data.is_logged_in());
        assert_eq!(data.user.id, 123_456_789);
        assert_eq!(data.user.name, "someone");
        assert_eq!(data.api_token, "Tfq0k3hSlFe7Ai0XLtWmQAZ1jn0ODbSn");
    }

    #[test]
    fn anonymous_session() {
        let response: Response = serde_json::from_str(
            r#"{"error": [], "results": {"USER": {"USER_ID": 0}, "checkForm": "abc"}}"#,
        )
        .unwrap();
        let data: UserData = response.into_result().unwrap();
        assert!(!data.is_logged_in());
    }

    #[test]
    fn api_token_is_redacted() {
        let data = UserData {
            user: User {
                id: 1,
                name: String::new(),
            },
            api_token: "secret-token".to_string(),
        };
        assert!(!format!("{data:?}").contains("secret-token"));
    }
}
