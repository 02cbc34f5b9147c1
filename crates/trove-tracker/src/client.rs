//! Session-aware client for `ajax.php`, `login.php`, and `torrents.php`.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderName};
use reqwest::{Client, StatusCode, redirect};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::cookies::SessionCookies;
use crate::error::{TrackerError, TrackerResult};
use crate::limiter::RateLimiter;
use crate::session::{PersistedSession, SessionCache};

const USER_AGENT: &str = concat!("trove/", env!("CARGO_PKG_VERSION"));
const TORRENT_CONTENT_TYPE: &str = "application/x-bittorrent";
const FILENAME_PATTERN: &str = r#"filename="(.*)""#;

/// Connection and pacing settings for one tracker.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Site root, e.g. `https://tracker.example/`.
    pub base_url: Url,
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Requests allowed per window.
    pub rate_limit: usize,
    /// Rate window length.
    pub rate_window: Duration,
    /// Attempts made by [`MetadataClient::call_with_retry`].
    pub retry_limit: u32,
    /// Base delay; attempt `n` waits `retry_backoff * 2^n` before the next one.
    pub retry_backoff: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default)]
struct Tokens {
    authkey: Option<String>,
    passkey: Option<String>,
}

/// Client for the tracker metadata API.
pub struct MetadataClient {
    http: Client,
    base_url: Url,
    username: String,
    password: String,
    retry_limit: u32,
    retry_backoff: Duration,
    cookies: Arc<SessionCookies>,
    tokens: RwLock<Tokens>,
    limiter: RateLimiter,
    cache: Arc<dyn SessionCache>,
    login_lock: Mutex<()>,
    filename: Regex,
}

impl MetadataClient {
    /// Build a client and restore the cached session, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidSettings`] when the base URL cannot carry
    /// paths or the HTTP client cannot be built.
    pub async fn new(
        settings: ClientSettings,
        cache: Arc<dyn SessionCache>,
    ) -> TrackerResult<Self> {
        let mut base_url = settings.base_url;
        if base_url.cannot_be_a_base() {
            return Err(TrackerError::InvalidSettings {
                field: "base_url",
                reason: "url cannot be used as a base",
            });
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let cookies = Arc::new(SessionCookies::new(base_url.clone()));
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .cookie_provider(Arc::clone(&cookies))
            .timeout(settings.timeout)
            .build()
            .map_err(|source| TrackerError::transport("build_client", source))?;
        let filename = Regex::new(FILENAME_PATTERN).map_err(|_| TrackerError::InvalidSettings {
            field: "filename_pattern",
            reason: "pattern failed to compile",
        })?;

        let mut tokens = Tokens::default();
        match cache.load().await {
            Ok(Some(session)) => {
                debug!("restored tracker session from cache");
                cookies.restore(session.cookies);
                tokens.authkey = session.authkey;
                tokens.passkey = session.passkey;
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to load tracker session cache"),
        }

        Ok(Self {
            http,
            base_url,
            username: settings.username,
            password: settings.password,
            retry_limit: settings.retry_limit.max(1),
            retry_backoff: settings.retry_backoff,
            cookies,
            tokens: RwLock::new(tokens),
            limiter: RateLimiter::new(settings.rate_limit, settings.rate_window),
            cache,
            login_lock: Mutex::new(()),
            filename,
        })
    }

    /// Current auth token, if logged in.
    #[must_use]
    pub fn authkey(&self) -> Option<String> {
        self.tokens().authkey
    }

    /// Call an API action, logging in once if the session has expired.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::SessionExpired`] when the tracker still redirects
    /// after a fresh login, and the mapped API error when `status` is not `success`.
    pub async fn call(&self, action: &str, params: &[(&str, &str)]) -> TrackerResult<Value> {
        if let Some(response) = self.fetch_once(action, params).await? {
            return Ok(response);
        }
        debug!(action, "tracker session expired, logging in");
        self.login().await?;
        self.fetch_once(action, params)
            .await?
            .ok_or_else(|| TrackerError::SessionExpired {
                action: action.to_string(),
            })
    }

    /// [`Self::call`] with exponential back-off between attempts.
    ///
    /// # Errors
    ///
    /// Authentication failures are returned at once; other failures after the
    /// last attempt.
    pub async fn call_with_retry(
        &self,
        action: &str,
        params: &[(&str, &str)],
    ) -> TrackerResult<Value> {
        with_retry(self.retry_limit, self.retry_backoff, || self.call(action, params)).await
    }

    /// Log in with the configured credentials and refresh the tokens.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::LoginRejected`] when the login form is rendered
    /// again, and [`TrackerError::UnexpectedStatus`] for any other non-redirect.
    pub async fn login(&self) -> TrackerResult<()> {
        let _serialised = self.login_lock.lock().await;
        self.cookies.clear();
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Tokens::default();

        let login_url = self.endpoint("login.php")?;
        self.http
            .get(login_url.clone())
            .send()
            .await
            .map_err(|source| TrackerError::transport("login_page", source))?
            .bytes()
            .await
            .map_err(|source| TrackerError::transport("login_page", source))?;

        let response = self
            .http
            .post(login_url)
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
                ("keeplogged", "1"),
                ("login", "Login"),
            ])
            .send()
            .await
            .map_err(|source| TrackerError::transport("login", source))?;
        match response.status() {
            StatusCode::FOUND => {}
            StatusCode::OK => return Err(TrackerError::LoginRejected),
            other => {
                return Err(TrackerError::UnexpectedStatus {
                    operation: "login",
                    status: other.as_u16(),
                });
            }
        }

        let account = self
            .fetch_once("index", &[])
            .await?
            .ok_or_else(|| TrackerError::SessionExpired {
                action: "index".to_string(),
            })?;
        let token = |field: &'static str| {
            account
                .get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(TrackerError::MissingField {
                    operation: "login",
                    field,
                })
        };
        let tokens = Tokens {
            authkey: Some(token("authkey")?),
            passkey: Some(token("passkey")?),
        };
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = tokens.clone();

        let session = PersistedSession {
            cookies: self.cookies.export(),
            authkey: tokens.authkey,
            passkey: tokens.passkey,
        };
        if let Err(err) = self.cache.store(&session).await {
            warn!(error = %err, "failed to persist tracker session");
        }
        info!(username = %self.username, "logged in to tracker");
        Ok(())
    }

    /// Download a torrent file by tracker id.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::NotATorrent`] when the response is not a torrent
    /// file and [`TrackerError::MissingField`] when no filename is announced.
    pub async fn download_torrent(&self, torrent_id: i64) -> TrackerResult<(String, Vec<u8>)> {
        let tokens = self.tokens();
        let mut query = vec![
            ("action", "download".to_string()),
            ("id", torrent_id.to_string()),
        ];
        if let Some(authkey) = tokens.authkey {
            query.push(("authkey", authkey));
            query.push(("torrent_pass", tokens.passkey.unwrap_or_default()));
        }
        let response = self
            .http
            .get(self.endpoint("torrents.php")?)
            .query(&query)
            .send()
            .await
            .map_err(|source| TrackerError::transport("download_torrent", source))?;
        if response.status() != StatusCode::OK {
            return Err(TrackerError::UnexpectedStatus {
                operation: "download_torrent",
                status: response.status().as_u16(),
            });
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        if !content_type
            .as_deref()
            .is_some_and(|value| value.contains(TORRENT_CONTENT_TYPE))
        {
            return Err(TrackerError::NotATorrent { content_type });
        }
        let filename = header(CONTENT_DISPOSITION)
            .and_then(|value| {
                self.filename
                    .captures(&value)
                    .and_then(|captures| captures.get(1))
                    .map(|found| found.as_str().to_string())
            })
            .ok_or(TrackerError::MissingField {
                operation: "download_torrent",
                field: "content-disposition",
            })?;

        let bytes = response
            .bytes()
            .await
            .map_err(|source| TrackerError::transport("download_torrent", source))?;
        Ok((filename, bytes.to_vec()))
    }

    async fn fetch_once(
        &self,
        action: &str,
        params: &[(&str, &str)],
    ) -> TrackerResult<Option<Value>> {
        self.limiter.acquire().await;
        let mut query: Vec<(&str, String)> = vec![("action", action.to_string())];
        if let Some(authkey) = self.tokens().authkey {
            query.push(("auth", authkey));
        }
        query.extend(params.iter().map(|(key, value)| (*key, (*value).to_string())));

        let response = self
            .http
            .get(self.endpoint("ajax.php")?)
            .query(&query)
            .send()
            .await
            .map_err(|source| TrackerError::transport("ajax", source))?;
        match response.status() {
            StatusCode::FOUND => return Ok(None),
            StatusCode::OK => {}
            other => {
                return Err(TrackerError::UnexpectedStatus {
                    operation: "ajax",
                    status: other.as_u16(),
                });
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|source| TrackerError::transport("ajax", source))?;
        let document: Value = serde_json::from_slice(&body).map_err(|source| {
            TrackerError::Decode {
                operation: "ajax",
                source,
            }
        })?;
        parse_response(action, document).map(Some)
    }

    fn endpoint(&self, page: &str) -> TrackerResult<Url> {
        self.base_url
            .join(page)
            .map_err(|_| TrackerError::InvalidSettings {
                field: "base_url",
                reason: "page url could not be built",
            })
    }

    fn tokens(&self) -> Tokens {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn parse_response(action: &str, mut document: Value) -> TrackerResult<Value> {
    if document.get("status").and_then(Value::as_str) == Some("success") {
        return Ok(document
            .get_mut("response")
            .map(Value::take)
            .unwrap_or(Value::Null));
    }
    let message = document
        .get("error")
        .and_then(Value::as_str)
        .map_or_else(|| document.to_string(), str::to_string);
    Err(match message.as_str() {
        "bad id parameter" => TrackerError::BadId {
            action: action.to_string(),
        },
        "rate limit exceeded" => TrackerError::RateLimited {
            action: action.to_string(),
        },
        _ => TrackerError::Api {
            action: action.to_string(),
            message,
        },
    })
}

async fn with_retry<T, F, Fut>(limit: u32, backoff: Duration, mut operation: F) -> TrackerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TrackerResult<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_authentication() || attempt >= limit => return Err(err),
            Err(err) => {
                let delay = backoff.saturating_mul(2_u32.saturating_pow(attempt));
                warn!(error = %err, attempt, ?delay, "tracker request failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::JsonFileSessionCache;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn settings(server: &MockServer) -> Result<ClientSettings, Box<dyn Error>> {
        Ok(ClientSettings {
            base_url: Url::parse(&server.base_url())?,
            username: "user".into(),
            password: "secret".into(),
            rate_limit: 50,
            rate_window: Duration::from_secs(1),
            retry_limit: 3,
            retry_backoff: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        })
    }

    async fn cached_session(
        dir: &tempfile::TempDir,
        authkey: &str,
    ) -> Result<Arc<JsonFileSessionCache>, Box<dyn Error>> {
        let cache = Arc::new(JsonFileSessionCache::new(dir.path().join("session.json")));
        cache
            .store(&PersistedSession {
                authkey: Some(authkey.into()),
                passkey: Some("PASS".into()),
                ..PersistedSession::default()
            })
            .await?;
        Ok(cache)
    }

    #[tokio::test]
    async fn call_returns_the_response_payload() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/ajax.php")
                .query_param("action", "torrent")
                .query_param("id", "7")
                .query_param("auth", "AUTH");
            then.status(200)
                .json_body(json!({"status": "success", "response": {"torrent": {"id": 7}}}));
        });
        let dir = tempfile::tempdir()?;
        let cache = cached_session(&dir, "AUTH").await?;
        let client = MetadataClient::new(settings(&server)?, cache).await?;

        let response = client.call("torrent", &[("id", "7")]).await?;
        assert_eq!(response["torrent"]["id"], 7);
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn expired_session_logs_in_and_retries() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET)
                .path("/ajax.php")
                .query_param("action", "torrent")
                .query_param("auth", "STALE");
            then.status(302).header("location", "login.php");
        });
        server.mock(|when, then| {
            when.method(GET).path("/login.php");
            then.status(200).body("<form></form>");
        });
        let login = server.mock(|when, then| {
            when.method(POST).path("/login.php");
            then.status(302)
                .header("location", "index.php")
                .header("set-cookie", "session=fresh; Path=/");
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/ajax.php")
                .query_param("action", "index")
                .header("cookie", "session=fresh");
            then.status(200).json_body(
                json!({"status": "success", "response": {"authkey": "AK", "passkey": "PK"}}),
            );
        });
        let retried = server.mock(|when, then| {
            when.method(GET)
                .path("/ajax.php")
                .query_param("action", "torrent")
                .query_param("auth", "AK")
                .header("cookie", "session=fresh");
            then.status(200)
                .json_body(json!({"status": "success", "response": {"ok": true}}));
        });

        let dir = tempfile::tempdir()?;
        let cache = cached_session(&dir, "STALE").await?;
        let client = MetadataClient::new(settings(&server)?, cache.clone()).await?;

        let response = client.call("torrent", &[("id", "7")]).await?;
        assert_eq!(response["ok"], true);
        login.assert();
        retried.assert();
        assert_eq!(client.authkey().as_deref(), Some("AK"));

        let saved = cache.load().await?.ok_or("session not persisted")?;
        assert_eq!(saved.authkey.as_deref(), Some("AK"));
        assert_eq!(saved.passkey.as_deref(), Some("PK"));
        assert_eq!(saved.cookies.get("session").map(String::as_str), Some("fresh"));
        Ok(())
    }

    #[tokio::test]
    async fn rejected_login_is_not_retried() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/ajax.php");
            then.status(302).header("location", "login.php");
        });
        server.mock(|when, then| {
            when.method(GET).path("/login.php");
            then.status(200).body("<form></form>");
        });
        let login = server.mock(|when, then| {
            when.method(POST).path("/login.php");
            then.status(200).body("<form>wrong password</form>");
        });

        let dir = tempfile::tempdir()?;
        let cache = Arc::new(JsonFileSessionCache::new(dir.path().join("session.json")));
        let client = MetadataClient::new(settings(&server)?, cache).await?;

        let err = client.call_with_retry("torrent", &[("id", "7")]).await.err();
        assert!(matches!(err, Some(TrackerError::LoginRejected)));
        login.assert();
        Ok(())
    }

    #[tokio::test]
    async fn api_errors_are_classified() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET)
                .path("/ajax.php")
                .query_param("action", "torrent");
            then.status(200)
                .json_body(json!({"status": "failure", "error": "bad id parameter"}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/ajax.php")
                .query_param("action", "browse");
            then.status(200)
                .json_body(json!({"status": "failure", "error": "rate limit exceeded"}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/ajax.php")
                .query_param("action", "user");
            then.status(500);
        });

        let dir = tempfile::tempdir()?;
        let cache = cached_session(&dir, "AUTH").await?;
        let client = MetadataClient::new(settings(&server)?, cache).await?;

        assert!(matches!(
            client.call("torrent", &[]).await,
            Err(TrackerError::BadId { .. })
        ));
        assert!(matches!(
            client.call("browse", &[]).await,
            Err(TrackerError::RateLimited { .. })
        ));
        assert!(matches!(
            client.call("user", &[]).await,
            Err(TrackerError::UnexpectedStatus { status: 500, .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn download_returns_filename_and_bytes() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/torrents.php")
                .query_param("action", "download")
                .query_param("id", "7")
                .query_param("authkey", "AUTH")
                .query_param("torrent_pass", "PASS");
            then.status(200)
                .header("content-type", "application/x-bittorrent")
                .header("content-disposition", "attachment; filename=\"album.torrent\"")
                .body("d4:infod4:name5:albumee");
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/torrents.php")
                .query_param("id", "8");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html></html>");
        });

        let dir = tempfile::tempdir()?;
        let cache = cached_session(&dir, "AUTH").await?;
        let client = MetadataClient::new(settings(&server)?, cache).await?;

        let (filename, bytes) = client.download_torrent(7).await?;
        assert_eq!(filename, "album.torrent");
        assert_eq!(bytes, b"d4:infod4:name5:albumee");
        mock.assert();

        assert!(matches!(
            client.download_torrent(8).await,
            Err(TrackerError::NotATorrent { .. })
        ));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn retry_backs_off_until_the_limit() {
        let attempts = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result: TrackerResult<()> = with_retry(3, Duration::from_secs(1), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(TrackerError::Api {
                action: "torrent".into(),
                message: "temporary".into(),
            })
        })
        .await;
        assert!(matches!(result, Err(TrackerError::Api { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(6) && waited < Duration::from_millis(6_050));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_on_authentication_failure() {
        let attempts = AtomicU32::new(0);
        let result: TrackerResult<()> = with_retry(5, Duration::from_secs(1), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(TrackerError::LoginRejected)
        })
        .await;
        assert!(matches!(result, Err(TrackerError::LoginRejected)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_returns_first_success() -> TrackerResult<()> {
        let attempts = AtomicU32::new(0);
        let value = with_retry(5, Duration::from_secs(1), || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 1 {
                Err(TrackerError::RateLimited {
                    action: "torrent".into(),
                })
            } else {
                Ok(42)
            }
        })
        .await?;
        assert_eq!(value, 42);
        Ok(())
    }
}
