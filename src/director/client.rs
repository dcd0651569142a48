use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A client bound to one director's address and credentials.
#[async_trait]
pub trait DirectorClient: Send + Sync {
    async fn update_cloud_config(&self, cloud_config: &[u8]) -> Result<()>;
}

pub trait DirectorClientProvider: Send + Sync {
    fn client(
        &self,
        address: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn DirectorClient>>;
}

/// Talks to the director's API over HTTPS. Directors are deployed with a
/// self-signed certificate, so verification is disabled here; the SSL CA
/// in the state record is the material a hardened client would pin.
pub struct HttpClientProvider;

impl DirectorClientProvider for HttpClientProvider {
    fn client(
        &self,
        address: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn DirectorClient>> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to build director http client")?;

        Ok(Arc::new(HttpDirectorClient {
            http,
            address: address.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }))
    }
}

pub struct HttpDirectorClient {
    http: reqwest::Client,
    address: String,
    username: String,
    password: String,
}

#[async_trait]
impl DirectorClient for HttpDirectorClient {
    async fn update_cloud_config(&self, cloud_config: &[u8]) -> Result<()> {
        let url = format!("{}/cloud_configs", self.address);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "text/yaml")
            .body(cloud_config.to_vec())
            .send()
            .await
            .with_context(|| format!("failed to reach director at {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("director rejected cloud config: {status}"));
        }
        Ok(())
    }
}
