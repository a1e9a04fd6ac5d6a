//! HTTP transport for metadata calls and media downloads.
//!
//! The downloader sends two kinds of traffic:
//! * metadata calls to the gateways and the public API, which carry the
//!   session cookies and count against the account's request quota
//! * media downloads from the CDN, which are long streaming bodies on
//!   signed URLs that need neither cookies nor quota
//!
//! [`Client`] keeps a separate `reqwest::Client` for each, so a large
//! album download never delays, or is delayed by, the quota. Every
//! response is checked for a success status before it is handed out.
//!
//! # Quota
//!
//! Metadata calls are limited to 50 per 5 seconds. Bursts up to the full
//! 50 are allowed; calls beyond that wait until the window replenishes.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{
    cookie::{CookieStore, Jar},
    header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, CONTENT_TYPE},
    Body, ClientBuilder, RequestBuilder, Response, Url,
};

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Transport for one session: throttled metadata calls and unthrottled
/// CDN downloads.
pub struct Client {
    /// Cookie-bound client for metadata calls.
    api: reqwest::Client,

    /// Cookieless client for media downloads.
    cdn: reqwest::Client,

    /// Quota of metadata calls.
    quota: DefaultDirectRateLimiter,

    /// Session cookies, shared with `api`.
    cookie_jar: Arc<Jar>,
}

impl Client {
    /// Window in which at most [`QUOTA_CALLS`](Self::QUOTA_CALLS) metadata
    /// calls are made.
    const QUOTA_WINDOW: Duration = Duration::from_secs(5);

    const QUOTA_CALLS: u32 = 50;

    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Longest wait for a single read of a metadata response.
    const API_READ_TIMEOUT: Duration = Duration::from_secs(10);

    /// Longest wait for a single read of a media stream. Bounds how long a
    /// stalled download hangs before it fails.
    const CDN_READ_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates the transport for a session with `cookie_jar`.
    ///
    /// # Errors
    ///
    /// Returns an error if a client cannot be created, for example when
    /// the TLS backend fails to initialize.
    pub fn new(config: &Config, cookie_jar: Jar) -> Result<Self> {
        let cookie_jar = Arc::new(cookie_jar);

        // Not having `Accept-Language` set is non-fatal.
        let mut headers = HeaderMap::new();
        if let Ok(lang) = HeaderValue::from_str(&config.app_lang) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }

        let api = Self::builder(config)
            .read_timeout(Self::API_READ_TIMEOUT)
            .default_headers(headers)
            .cookie_provider(Arc::clone(&cookie_jar))
            .build()?;

        let cdn = Self::builder(config)
            .read_timeout(Self::CDN_READ_TIMEOUT)
            .build()?;

        Ok(Self {
            api,
            cdn,
            quota: RateLimiter::direct(Self::quota()?),
            cookie_jar,
        })
    }

    fn builder(config: &Config) -> ClientBuilder {
        reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .user_agent(&config.user_agent)
    }

    fn quota() -> Result<Quota> {
        let burst = NonZeroU32::new(Self::QUOTA_CALLS)
            .ok_or_else(|| Error::internal("quota allows no calls"))?;
        let quota = Quota::with_period(Self::QUOTA_WINDOW / Self::QUOTA_CALLS)
            .ok_or_else(|| Error::internal("quota window is zero"))?;

        Ok(quota.allow_burst(burst))
    }

    /// Returns the cookies that metadata calls send to `url`.
    #[must_use]
    pub fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.cookie_jar.cookies(url)
    }

    /// Sends a metadata call once the quota allows it.
    async fn call(&self, request: RequestBuilder) -> Result<Response> {
        // Concurrency is low, so there is no need for jitter.
        self.quota.until_ready().await;

        let response = request.send().await?;
        Ok(response.error_for_status()?)
    }

    /// Fetches `url` as a metadata call.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, or an error mapped from the
    /// status code if it is not a success.
    pub async fn get(&self, url: Url) -> Result<Response> {
        self.call(self.api.get(url)).await
    }

    /// Fetches the body of `url` as text.
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get). Also fails if the body cannot be read.
    pub async fn get_text(&self, url: Url) -> Result<String> {
        let response = self.get(url).await?;
        Ok(response.text().await?)
    }

    /// Posts `body` with `content_type` as a metadata call and returns the
    /// response body as text.
    ///
    /// # Errors
    ///
    /// See [`get_text`](Self::get_text).
    pub async fn post_text(
        &self,
        url: Url,
        content_type: HeaderValue,
        body: impl Into<Body>,
    ) -> Result<String> {
        let request = self
            .api
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body);

        let response = self.call(request).await?;
        Ok(response.text().await?)
    }

    /// Starts a media download from the CDN.
    ///
    /// Does not wait for quota and sends no cookies. The body is left
    /// unread for the caller to stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, or an error mapped from the
    /// status code if it is not a success.
    pub async fn download(&self, url: Url) -> Result<Response> {
        let response = self.cdn.get(url).send().await?;
        Ok(response.error_for_status()?)
    }
}

/// A local HTTP server with canned responses.
#[cfg(test)]
pub(crate) mod testing {
    use reqwest::Url;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// A complete response with `status` and `body`.
    pub fn response(status: &str, body: &[u8]) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        response
    }

    /// A response that announces `len` bytes but breaks off after `body`.
    pub fn truncated(len: usize, body: &[u8]) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n"
        )
        .into_bytes();
        response.extend_from_slice(body);
        response
    }

    /// Answers one connection per entry of `responses`, in order, and
    /// returns the base URL of the server.
    pub async fn serve(responses: Vec<Vec<u8>>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();

                // Read the request head before answering.
                let mut request = Vec::new();
                let mut buf = [0; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{addr}/").parse().unwrap()
    }
}
