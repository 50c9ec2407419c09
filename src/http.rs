use std::fs::{self, File};
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::RetrieveError;

pub trait HttpFetch: Send + Sync {
    /// Downloads `url` to `destination`. Returns `Ok(false)` when the server
    /// does not serve the file.
    fn fetch(&self, url: &str, destination: &Path) -> Result<bool, RetrieveError>;
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, RetrieveError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("nwp-retrieve/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RetrieveError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|err| RetrieveError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, RetrieveError> {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    if attempt < MAX_RETRIES && is_retryable_status(resp.status()) {
                        attempt += 1;
                        tracing::debug!(%url, status = %resp.status(), attempt, "retrying");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * attempt as u64));
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        attempt += 1;
                        tracing::debug!(%url, error = %err, attempt, "retrying");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * attempt as u64));
                        continue;
                    }
                    return Err(RetrieveError::Http(err.to_string()));
                }
            }
        }
    }
}

impl HttpFetch for HttpClient {
    fn fetch(&self, url: &str, destination: &Path) -> Result<bool, RetrieveError> {
        let mut response = self.send_with_retries(url)?;
        if !response.status().is_success() {
            tracing::debug!(%url, status = %response.status(), "not available");
            return Ok(false);
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| RetrieveError::Filesystem(err.to_string()))?;
        }
        let mut file =
            File::create(destination).map_err(|err| RetrieveError::Filesystem(err.to_string()))?;
        response
            .copy_to(&mut file)
            .map_err(|err| RetrieveError::Http(err.to_string()))?;
        Ok(true)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
