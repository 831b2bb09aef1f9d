// API client module: a small blocking HTTP client that talks to the
// engine's JSON API. The engine keeps the session in a cookie, so the
// reqwest client is built with a cookie store and reused for every call.

use reqwest::blocking::{Client, Response};
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::config::Settings;
use crate::error::{EnrollError, Result};
use crate::model::{ApiResponse, ApiSession, ApiVersion, LoginRequest, API_VERSION};

/// Error id returned by `/login` for bad credentials.
pub const LOGIN_FAILED_ID: &str = "exception.webservices.login.failed";

const BAD_PASSWORD_RETRY_DELAY: Duration = Duration::from_secs(10);
const BAD_PASSWORD_MAX_ATTEMPTS: u32 = 60;

/// The calls the enrollment flow needs from an engine.
pub trait EngineApi {
    /// GET `path` (relative to the API root) and return the parsed envelope.
    fn get(&self, path: &str) -> Result<ApiResponse>;

    /// POST a JSON body to `path` and return the parsed envelope.
    fn post(&self, path: &str, body: &serde_json::Value) -> Result<ApiResponse>;
}

/// Blocking client bound to one engine, holding the session cookie.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client for `base_url`. `skip_validate` turns off TLS
    /// certificate validation.
    pub fn new(base_url: impl Into<String>, skip_validate: bool) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(skip_validate)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(ApiClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Open a session and log in. With `retry_badpass`, a bad password is
    /// retried for a while, since a freshly configured engine may reject
    /// the credentials until setup finishes.
    pub fn connect(settings: &Settings) -> Result<Self> {
        let api = ApiClient::new(settings.engine_url(), settings.skip_validate)?;
        LoginRetry::new(settings.retry_badpass)
            .run(|| api.login(&settings.username, &settings.password))?;
        Ok(api)
    }

    /// POST /session then POST /login.
    pub fn login(&self, username: &str, password: &str) -> Result<()> {
        let session = ApiSession {
            version: ApiVersion::parse(API_VERSION)?,
        };
        self.post_typed("session", &session)?;
        debug!("session established with API version {API_VERSION}");

        let login = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.post_typed("login", &login)?;
        info!(username, "logged in");
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // Serialize without going through `serde_json::Value` in the log path,
    // so a login body is never printed.
    fn post_typed<T: Serialize + std::fmt::Debug>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        let url = self.url(path);
        debug!(%url, ?body, "POST");
        let res = self.client.post(&url).json(body).send()?;
        parse_response(res)
    }
}

/// Retry policy for logins rejected with [`LOGIN_FAILED_ID`].
#[derive(Debug, Clone)]
pub struct LoginRetry {
    enabled: bool,
    max_attempts: u32,
    delay: Duration,
}

impl LoginRetry {
    pub fn new(enabled: bool) -> Self {
        LoginRetry {
            enabled,
            max_attempts: BAD_PASSWORD_MAX_ATTEMPTS,
            delay: BAD_PASSWORD_RETRY_DELAY,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Call `login` until it succeeds, fails with another error, or the
    /// attempts run out.
    pub fn run<F>(&self, mut login: F) -> Result<()>
    where
        F: FnMut() -> Result<()>,
    {
        let mut attempt = 1;
        loop {
            match login() {
                Ok(()) => return Ok(()),
                Err(err)
                    if self.enabled
                        && err.api_id() == Some(LOGIN_FAILED_ID)
                        && attempt < self.max_attempts =>
                {
                    warn!(
                        attempt,
                        "login rejected ({err}), retrying in {}s",
                        self.delay.as_secs()
                    );
                    thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl EngineApi for ApiClient {
    fn get(&self, path: &str) -> Result<ApiResponse> {
        let url = self.url(path);
        debug!(%url, "GET");
        let res = self.client.get(&url).send()?;
        parse_response(res)
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> Result<ApiResponse> {
        let url = self.url(path);
        debug!(%url, %body, "POST");
        let res = self.client.post(&url).json(body).send()?;
        parse_response(res)
    }
}

fn parse_response(res: Response) -> Result<ApiResponse> {
    let status = res.status();
    let text = res.text()?;
    trace!(status = status.as_u16(), body = %text, "response");
    decode_body(status.as_u16(), &text)
}

/// Decode a response body. A Delphix `ErrorResult` wins over the HTTP
/// status so callers can match on the engine's error id.
pub fn decode_body(status: u16, text: &str) -> Result<ApiResponse> {
    match serde_json::from_str::<ApiResponse>(text) {
        Ok(resp) => resp.into_result(),
        Err(_) if !(200..300).contains(&status) => Err(EnrollError::Status {
            status,
            body: text.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}
