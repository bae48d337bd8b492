//! HTTP transfer of signed URLs

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use std::time::Duration;
use tracing::debug;

use super::BlobTransport;
use crate::error::Result;

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("aml-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BlobTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        debug!(bytes = body.len(), "Downloaded signed object");
        Ok(body.to_vec())
    }

    async fn put(&self, url: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let size = data.len();
        self.client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?
            .error_for_status()?;
        debug!(bytes = size, content_type, "Uploaded signed object");
        Ok(())
    }
}
