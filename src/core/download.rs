use crate::error::{InstallError, Result};
use log::debug;
use std::io::Read;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("zipinstall/", env!("CARGO_PKG_VERSION"));

/// An open response body plus the length the server announced.
pub struct RemoteBody {
    pub reader: Box<dyn Read + Send>,
    /// `None` when the server sent no length or a length of zero.
    pub content_length: Option<u64>,
}

impl RemoteBody {
    pub fn new<R: Read + Send + 'static>(reader: R, content_length: Option<u64>) -> Self {
        Self {
            reader: Box::new(reader),
            content_length: content_length.filter(|len| *len > 0),
        }
    }

    /// Size to hand to a progress writer; `0` stands for unknown.
    pub fn expected_size(&self) -> u64 {
        self.content_length.unwrap_or(0)
    }
}

/// Source of remote archives.
pub trait Transport {
    fn get(&self, url: &str) -> Result<RemoteBody>;
}

/// Blocking HTTP GET via `reqwest`. Redirects are followed; any transport
/// error or non-2xx status is a network error.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| InstallError::config_error(format!("Cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<RemoteBody> {
        debug!("HTTP GET {url}");

        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| InstallError::network_error(url, e))?;

        let content_length = response.content_length();
        debug!("Response {} with length {content_length:?}", response.status());
        Ok(RemoteBody::new(response, content_length))
    }
}
