//! Blocking HTTP downloads used by the classifier and the uploader.

use reqwest::{
    StatusCode,
    blocking::Client,
    header::{RANGE, USER_AGENT},
};
use std::{io::Read, time::Duration};
use thiserror::Error;

const AGENT: &str = concat!("md2article/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to `{url}` failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("`{url}` answered {status}")]
    Status { url: String, status: StatusCode },

    #[error("reading body of `{url}` failed")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Whether trying again could help.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Body { .. } => true,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
        }
    }
}

/// Source of remote bytes.
pub trait Fetch: Send + Sync {
    /// Download the whole resource.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Download at most `limit` leading bytes.
    fn fetch_head(&self, url: &str, limit: usize) -> Result<Vec<u8>, FetchError>;
}

/// [`Fetch`] over `reqwest::blocking`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn get(
        &self,
        url: &str,
        range: Option<usize>,
    ) -> Result<reqwest::blocking::Response, FetchError> {
        let mut request = self.client.get(url).header(USER_AGENT, AGENT);
        if let Some(limit) = range {
            request = request.header(RANGE, format!("bytes=0-{}", limit.saturating_sub(1)));
        }
        let response = request.send().map_err(|source| FetchError::Network {
            url: url.to_owned(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status,
            });
        }
        Ok(response)
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut body = Vec::new();
        self.get(url, None)?
            .read_to_end(&mut body)
            .map_err(|source| FetchError::Body {
                url: url.to_owned(),
                source,
            })?;
        Ok(body)
    }

    fn fetch_head(&self, url: &str, limit: usize) -> Result<Vec<u8>, FetchError> {
        // Servers may ignore Range, so the read is capped as well
        let mut body = Vec::with_capacity(limit);
        self.get(url, Some(limit))?
            .take(limit as u64)
            .read_to_end(&mut body)
            .map_err(|source| FetchError::Body {
                url: url.to_owned(),
                source,
            })?;
        Ok(body)
    }
}
