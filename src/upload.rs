//! Client for the external upload service.
//!
//! Files are delegated wholesale: bytes go out as one multipart POST and a
//! resolvable URL comes back. Nothing downstream of this module ever sees
//! file content; the resolver and storage only consume the returned
//! reference.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a file the upload service now owns.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredUpload {
    pub url: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

#[async_trait]
pub trait UploadService: Send + Sync {
    /// Hand the bytes to the upload service and return the stored
    /// reference.
    async fn store(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredUpload>;
}

#[derive(Clone)]
pub struct UploadClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for UploadClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

impl UploadClient {
    pub fn new(base_url: Url, token: String) -> Self {
        let http = Client::builder()
            .user_agent("qr-hub/0.1")
            .build()
            .expect("reqwest client");
        UploadClient {
            http,
            base_url,
            token,
        }
    }

    /// Build the bare POST (no body) so header wiring stays testable
    /// without a live endpoint.
    pub fn build_request(&self) -> Result<reqwest::Request> {
        self.http
            .post(self.base_url.clone())
            .header("Authorization", format!("Bearer {}", self.token))
            .build()
            .context("failed to build upload request")
    }
}

#[async_trait]
impl UploadService for UploadClient {
    async fn store(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredUpload> {
        let size = bytes.len() as u64;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .context("invalid upload content type")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let res = self
            .http
            .post(self.base_url.clone())
            .header("Authorization", format!("Bearer {}", self.token))
            .multipart(form)
            .send()
            .await
            .context("failed to reach upload service")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("upload service error {}: {}", status, body));
        }

        let payload: UploadResponse = res
            .json()
            .await
            .context("invalid upload service response JSON")?;

        Ok(StoredUpload {
            url: payload.url,
            name: file_name.to_string(),
            size,
            content_type: content_type.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_sets_bearer_token() {
        let client = UploadClient::new(
            Url::parse("https://uploads.example.com/api/files").unwrap(),
            "token".into(),
        );
        let request = client.build_request().unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://uploads.example.com/api/files");
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer token"
        );
    }
}
