//! Session-bound access to Deezer's metadata services.
//!
//! The [`Gateway`] resolves track IDs into everything needed for a
//! download:
//! * song metadata from the web gateway, including the content hash
//! * the content hash from the mobile gateway, when the web gateway
//!   withholds it
//! * album track listings from the public API
//!
//! # Session
//!
//! The session is bootstrapped from an ARL cookie that the user copied
//! from a logged in browser. Before the first gateway call, the landing
//! page is fetched to receive a session ID cookie (`sid`), and
//! `deezer.getUserData` returns the api token (`checkForm`) that all other
//! web gateway calls must carry.
//!
//! # Example
//!
//! ```rust
//! use deezerdl::gateway::Gateway;
//!
//! let mut gateway = Gateway::new(&config)?;
//! gateway.refresh().await?;
//!
//! let track = gateway.track(track_id).await?;
//! ```

use reqwest::{cookie::Jar, header::HeaderValue, Url};
use serde::de::DeserializeOwned;

use crate::{
    config::Config,
    error::{Error, Result},
    http::Client as HttpClient,
    protocol::{
        self,
        api::{self, Album},
        gateway::{self, song_data, Method, SongData, SongMd5, UserData},
    },
    track::{Track, TrackId},
};

pub struct Gateway {
    http_client: HttpClient,
    user_data: Option<UserData>,
    client_id: usize,
}

impl Gateway {
    /// The URL of the Deezer cookie origin.
    ///
    /// Cookies could also come from `api.deezer.com`; what matters is that
    /// the domain matches with `deezer.com`.
    const COOKIE_ORIGIN: &'static str = "https://www.deezer.com";

    /// The URL of the web gateway.
    const GATEWAY_URL: &'static str = "https://www.deezer.com/ajax/gw-light.php";

    /// The web gateway version.
    const GATEWAY_VERSION: &'static str = "1.0";

    /// The gateway input type, shared by both gateways.
    const GATEWAY_INPUT: usize = 3;

    /// The URL of the mobile gateway.
    const MOBILE_GATEWAY_URL: &'static str = "https://api.deezer.com/1.0/gateway.php";

    /// API key of the mobile application.
    const MOBILE_API_KEY: &'static str =
        "4VCYIJUCDLOUELGD1V8WBVYBNVDYOXEWSLLZDONGBBDFVXTZJRXPR29JRLQFO6ZE";

    /// The mobile gateway output type.
    const MOBILE_GATEWAY_OUTPUT: usize = 3;

    /// The URL of the public album API.
    const ALBUM_URL: &'static str = "https://api.deezer.com/album";

    /// API token to send before the real one is known.
    const NULL_API_TOKEN: &'static str = "null";

    /// Name of the session ID cookie.
    const SESSION_COOKIE: &'static str = "sid";

    /// The `Content-Type` header value for gateway requests.
    ///
    /// Although the bodies of all gateway requests are JSON, the
    /// `Content-Type` is not.
    const PLAIN_TEXT_CONTENT: HeaderValue = HeaderValue::from_static("text/plain;charset=UTF-8");

    /// An empty JSON object that is used as the default body for gateway
    /// requests.
    const EMPTY_JSON_OBJECT: &'static str = "{}";

    /// The cookie origin as a `reqwest::Url`.
    fn cookie_origin() -> Result<Url> {
        Ok(Self::COOKIE_ORIGIN.parse()?)
    }

    /// Creates a new `reqwest::cookie::Jar` with the language and, if
    /// configured, the ARL cookie.
    fn cookie_jar(config: &Config) -> Result<Jar> {
        let cookie_jar = Jar::default();
        let cookie_origin = Self::cookie_origin()?;

        let lang_cookie = format!(
            "dz_lang={}; Domain=deezer.com; Path=/; Secure; HttpOnly",
            &config.app_lang
        );
        cookie_jar.add_cookie_str(&lang_cookie, &cookie_origin);

        if let Some(ref arl) = config.arl {
            let arl_cookie = format!(
                "arl={}; Domain=deezer.com; Path=/; Secure; HttpOnly",
                arl.as_str()
            );
            cookie_jar.add_cookie_str(&arl_cookie, &cookie_origin);
        } else {
            warn!("no arl configured; downloads will fail until you log in");
        }

        Ok(cookie_jar)
    }

    /// Creates a gateway for the session of `config`.
    ///
    /// No requests are made until the first call.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the HTTP client cannot be created.
    pub fn new(config: &Config) -> Result<Self> {
        let cookie_jar = Self::cookie_jar(config)?;
        let http_client = HttpClient::new(config, cookie_jar)?;

        Ok(Self {
            http_client,
            user_data: None,
            client_id: config.client_id,
        })
    }

    /// Cookies sent to Deezer, as a header value.
    #[must_use]
    pub fn cookies(&self) -> Option<HeaderValue> {
        Self::cookie_origin()
            .ok()
            .and_then(|origin| self.http_client.cookies(&origin))
    }

    /// The session ID, once the landing page set it.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.cookies()
            .and_then(|cookies| cookie_value(&cookies, Self::SESSION_COOKIE))
    }

    /// Fetches the landing page to receive session cookies.
    async fn open_session(&self) -> Result<()> {
        self.http_client.get(Self::cookie_origin()?).await?;

        if self.session_id().is_none() {
            warn!("no session id received");
        }

        Ok(())
    }

    /// Opens the session and refreshes the user data with the api token.
    ///
    /// # Errors
    ///
    /// Will return `Err` if:
    /// - the `arl` is missing, invalid or expired
    /// - the HTTP request failed
    pub async fn refresh(&mut self) -> Result<()> {
        if self.session_id().is_none() {
            self.open_session().await?;
        }

        // Start over with the placeholder token.
        self.user_data = None;
        let data = self.request::<UserData>(Self::EMPTY_JSON_OBJECT).await?;

        if !data.is_logged_in() {
            return Err(Error::unauthenticated(
                "arl is invalid or expired; log in again with a fresh arl",
            ));
        }

        info!("logged in as {} ({})", data.user.name, data.user.id);
        self.user_data = Some(data);

        Ok(())
    }

    #[must_use]
    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.user_data.as_ref().is_some_and(UserData::is_logged_in)
    }

    /// Builds the web gateway URL for method `T`.
    fn gateway_url<T: Method>(&self) -> Result<Url> {
        // Get the API token from the user data or use the placeholder.
        let api_token = self
            .user_data
            .as_ref()
            .map_or(Self::NULL_API_TOKEN, |data| data.api_token.as_str());

        let url_str = format!(
            "{}?method={}&input={}&api_version={}&api_token={api_token}&cid={}",
            Self::GATEWAY_URL,
            T::METHOD,
            Self::GATEWAY_INPUT,
            Self::GATEWAY_VERSION,
            self.client_id,
        );

        url_str.parse::<Url>().map_err(Into::into)
    }

    /// Builds the mobile gateway URL for method `T`.
    fn mobile_gateway_url<T: Method>(&self) -> Result<Url> {
        let sid = self.session_id().unwrap_or_default();

        let url_str = format!(
            "{}?api_key={}&method={}&input={}&output={}&sid={sid}",
            Self::MOBILE_GATEWAY_URL,
            Self::MOBILE_API_KEY,
            T::METHOD,
            Self::GATEWAY_INPUT,
            Self::MOBILE_GATEWAY_OUTPUT,
        );

        url_str.parse::<Url>().map_err(Into::into)
    }

    /// Calls method `T` on the web gateway.
    ///
    /// # Errors
    ///
    /// Will return `Err` if:
    /// - no valid [`Url`] can be created out of the session data
    /// - the HTTP request fails
    /// - the gateway reports an error
    /// - the results do not match `T`
    pub async fn request<T>(&self, body: impl Into<reqwest::Body>) -> Result<T>
    where
        T: Method + DeserializeOwned,
    {
        let url = self.gateway_url::<T>()?;
        self.post::<T>(url, body).await
    }

    /// Calls method `T` on the mobile gateway.
    async fn mobile_request<T>(&self, body: impl Into<reqwest::Body>) -> Result<T>
    where
        T: Method + DeserializeOwned,
    {
        let url = self.mobile_gateway_url::<T>()?;
        self.post::<T>(url, body).await
    }

    async fn post<T>(&self, url: Url, body: impl Into<reqwest::Body>) -> Result<T>
    where
        T: Method + DeserializeOwned,
    {
        let body = self
            .http_client
            .post_text(url, Self::PLAIN_TEXT_CONTENT, body)
            .await?;

        // The user data carries the api token.
        let response: gateway::Response = if T::METHOD == UserData::METHOD {
            let response = serde_json::from_str(&body)?;
            trace!("{}: {{ ... }}", T::METHOD);
            response
        } else {
            protocol::json(&body, T::METHOD)?
        };

        response.into_result()
    }

    /// Ensures there is an api token for web gateway calls.
    async fn ensure_session(&mut self) -> Result<()> {
        if self.user_data.is_none() {
            self.refresh().await?;
        }
        Ok(())
    }

    /// Gets song metadata from the web gateway.
    ///
    /// # Errors
    ///
    /// * `Unauthenticated` if the session cannot be established
    /// * `NotFound` if there is no song with this ID
    /// * other errors on network or decoding failures
    pub async fn song(&mut self, track_id: TrackId) -> Result<SongData> {
        self.ensure_session().await?;

        let body = serde_json::to_string(&song_data::Request { song_id: track_id })?;
        self.request::<SongData>(body).await
    }

    /// Gets the content hash of a song from the mobile gateway.
    ///
    /// # Errors
    ///
    /// * `FailedPrecondition` if the mobile gateway does not provide a
    ///   content hash either
    /// * other errors on network or decoding failures
    pub async fn content_hash(&mut self, track_id: TrackId) -> Result<String> {
        self.ensure_session().await?;

        let body = serde_json::to_string(&song_data::Request { song_id: track_id })?;
        let result = self.mobile_request::<SongMd5>(body).await?;

        if result.content_hash.is_empty() {
            return Err(Error::failed_precondition(format!(
                "no content hash for track {track_id}; try refreshing the arl"
            )));
        }

        Ok(result.content_hash)
    }

    /// Resolves a track ID into a track that is ready for download.
    ///
    /// # Errors
    ///
    /// See [`song`](Self::song) and [`content_hash`](Self::content_hash).
    pub async fn track(&mut self, track_id: TrackId) -> Result<Track> {
        let song = self.song(track_id).await?;
        let mut track = Track::from(song);

        if !track.has_content_hash() {
            debug!("{track}: no content hash, trying mobile gateway");
            let content_hash = self.content_hash(track_id).await?;
            track.set_content_hash(content_hash);
        }

        Ok(track)
    }

    /// Gets an album with its track listing from the public API.
    ///
    /// # Errors
    ///
    /// * `NotFound` if there is no album with this ID
    /// * other errors on network or decoding failures
    pub async fn album(&self, album_id: u64) -> Result<Album> {
        let url = format!("{}/{album_id}", Self::ALBUM_URL).parse::<Url>()?;
        let body = self.http_client.get_text(url).await?;

        protocol::json::<api::Response<Album>>(&body, "album")?.into_result()
    }

    /// The transport of this session, for CDN downloads.
    #[must_use]
    pub fn http_client(&self) -> &HttpClient {
        &self.http_client
    }
}

/// Finds the value of cookie `name` in a `Cookie` header value.
fn cookie_value(cookies: &HeaderValue, name: &str) -> Option<String> {
    cookies.to_str().ok()?.split(';').find_map(|cookie| {
        let (key, value) = cookie.trim().split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}
