//! `reqwest`-backed [`OtaFetchPort`] for host binaries.

use super::OtaFetchPort;
use crate::error::{Error, Result};
use async_trait::async_trait;

/// Fetches the version file and build archive from an HTTP(S) host at
/// `base_url/<app>/version` and `base_url/<app>/<version>.bin`.
pub struct HttpOtaFetch {
    base_url: String,
    client: reqwest::Client,
}

impl HttpOtaFetch {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl OtaFetchPort for HttpOtaFetch {
    async fn fetch_version(&self, app: &str) -> Result<u32> {
        let url = format!("{}/{app}/version", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::bad_request(format!("version fetch {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::bad_request(format!(
                "version fetch {url}: status {}",
                response.status()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::bad_request(format!("version fetch {url}: {e}")))?;

        text.trim()
            .parse::<u32>()
            .map_err(|e| Error::malformed(format!("version file: {e}")))
    }

    async fn fetch_build(&self, app: &str, version: u32) -> Result<Vec<u8>> {
        let url = format!("{}/{app}/{version}.bin", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::bad_request(format!("build fetch {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::bad_request(format!(
                "build fetch {url}: status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::bad_request(format!("build fetch {url}: {e}")))?;

        Ok(bytes.to_vec())
    }
}
