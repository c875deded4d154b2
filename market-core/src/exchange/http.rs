// =================================================================
// exchange/http.rs - Retrying HTTP Client
// =================================================================

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::ExchangeError;

const USER_AGENT: &str = concat!("market-feed/", env!("CARGO_PKG_VERSION"));

/// Transport settings shared by every driver
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Attempts per GET before giving up
    pub max_attempts: u32,
    /// Per-request timeout (in seconds)
    pub timeout_secs: u64,
    /// Pause between attempts (in milliseconds)
    pub retry_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            timeout_secs: 30,
            retry_delay_ms: 500,
        }
    }
}

/// HTTP client that retries idempotent requests on transport failures
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, config })
    }

    /// GET `url` with `query` appended and return the body
    ///
    /// Connect errors, timeouts and 5xx responses are retried up to
    /// `max_attempts`. Other non-success responses return immediately as
    /// [`ExchangeError::HttpStatus`] with the body kept for the caller.
    pub async fn get_text(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<String, ExchangeError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.get_once(url, query).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        "GET {} failed (attempt {}/{}): {}",
                        url, attempt, max_attempts, e
                    );
                    sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// GET `url` and decode the JSON body into `T`
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let body = self.get_text(url, query).await?;
        decode_json(&body)
    }

    /// POST a form body once, with extra headers
    ///
    /// Never retried: signed calls carry a nonce that the venue accepts once.
    pub async fn post_form(
        &self,
        url: &str,
        body: String,
        headers: &[(&'static str, String)],
    ) -> Result<String, ExchangeError> {
        debug!("Posting {} bytes to {}", body.len(), url);

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body);

        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request.send().await?;
        Self::read_body(url, response).await
    }

    async fn get_once(&self, url: &str, query: &[(&str, String)]) -> Result<String, ExchangeError> {
        debug!("Fetching {} {:?}", url, query);
        let started = Instant::now();

        let response = self.client.get(url).query(query).send().await?;
        let body = Self::read_body(url, response).await?;

        debug!(
            "Loaded {} bytes from {} in {:?}",
            body.len(),
            url,
            started.elapsed()
        );
        Ok(body)
    }

    async fn read_body(url: &str, response: reqwest::Response) -> Result<String, ExchangeError> {
        let status = response.status();
        let body = response.text().await?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExchangeError::RateLimit(url.to_string()));
        }

        if !status.is_success() {
            return Err(ExchangeError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

/// Decode a JSON body, keeping a prefix of the body in the error
pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, ExchangeError> {
    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(120).collect();
        ExchangeError::ParseError(format!("{} in body: {}", e, preview))
    })
}
