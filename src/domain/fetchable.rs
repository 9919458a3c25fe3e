//! Payload bytes fetched at most once.

use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

/// Transport failures while fetching a payload
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Invalid header '{0}'")]
    InvalidHeader(String),

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

enum Source {
    Remote {
        client: reqwest::Client,
        url: String,
        headers: HeaderMap,
    },
    Static,
}

enum LoadState {
    NotLoaded,
    Loaded(Vec<u8>),
    Failed(FetchError),
}

/// A URL + headers pair whose content is fetched once and cached
pub struct Fetchable {
    source: Source,
    state: LoadState,
}

impl fmt::Debug for Fetchable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            LoadState::NotLoaded => "not loaded".to_string(),
            LoadState::Loaded(bytes) => format!("{} bytes", bytes.len()),
            LoadState::Failed(e) => format!("failed: {}", e),
        };
        f.debug_struct("Fetchable")
            .field("url", &self.url())
            .field("state", &state)
            .finish()
    }
}

impl Fetchable {
    /// A payload downloaded from `url` on first access
    pub fn remote<'a>(
        client: reqwest::Client,
        url: impl Into<String>,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, FetchError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(name.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| FetchError::InvalidHeader(name.to_string()))?;
            map.insert(name, value);
        }

        Ok(Self {
            source: Source::Remote {
                client,
                url: url.into(),
                headers: map,
            },
            state: LoadState::NotLoaded,
        })
    }

    /// A pre-supplied buffer; never performs I/O
    pub fn from_static(content: Vec<u8>) -> Self {
        Self {
            source: Source::Static,
            state: LoadState::Loaded(content),
        }
    }

    /// Source URL (empty for static content)
    pub fn url(&self) -> &str {
        match &self.source {
            Source::Remote { url, .. } => url,
            Source::Static => "",
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, LoadState::Loaded(_))
    }

    /// Fetch-or-return-cached
    pub async fn content(&mut self) -> Result<&[u8], FetchError> {
        if let LoadState::NotLoaded = self.state {
            self.state = match &self.source {
                Source::Remote {
                    client,
                    url,
                    headers,
                } => match fetch(client, url, headers).await {
                    Ok(bytes) => LoadState::Loaded(bytes),
                    Err(e) => LoadState::Failed(e),
                },
                Source::Static => LoadState::Loaded(Vec::new()),
            };
        }

        match &self.state {
            LoadState::Loaded(bytes) => Ok(bytes),
            LoadState::Failed(e) => Err(e.clone()),
            LoadState::NotLoaded => Err(FetchError::Transport {
                url: self.url().to_string(),
                message: "content was not loaded".to_string(),
            }),
        }
    }
}

async fn fetch(client: &reqwest::Client, url: &str, headers: &HeaderMap) -> Result<Vec<u8>, FetchError> {
    let transport = |e: reqwest::Error| FetchError::Transport {
        url: url.to_string(),
        message: e.to_string(),
    };

    let response = client
        .get(url)
        .headers(headers.clone())
        .send()
        .await
        .map_err(transport)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().await.map_err(transport)?;
    tracing::debug!(url, size = bytes.len(), "Fetched payload");
    Ok(bytes.to_vec())
}
