//! Client for the external QR rendering API.
//!
//! The service does no QR encoding of its own: it builds a fully
//! parameterized image URL and lets the remote API rasterize the code.
//! URL construction is pure and unit-tested without network; the client
//! only fetches bytes when the history download proxy asks for them.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Url};
use std::fmt;

use crate::model::StylingOptions;

pub const QR_API_BASE: &str = "https://api.qrserver.com/v1/create-qr-code/";

/// Escape set equivalent to JavaScript's `encodeURIComponent`: everything
/// but alphanumerics and `-_.!~*'()` is percent-encoded.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Build the rendering URL for a payload: percent-encoded `data`, square
/// `size`, foreground `color` with the `#` stripped, fixed `bgcolor`, and
/// an optional percent-encoded `logo`.
pub fn render_url(base: &Url, payload: &str, styling: &StylingOptions, background: &str) -> Url {
    let size = styling.size;
    let color = styling.color.strip_prefix('#').unwrap_or(&styling.color);
    let mut query = format!(
        "data={}&size={}x{}&color={}&bgcolor={}",
        utf8_percent_encode(payload, COMPONENT),
        size,
        size,
        color,
        background,
    );
    if let Some(logo) = styling.logo_url.as_deref() {
        query.push_str("&logo=");
        query.push_str(&utf8_percent_encode(logo, COMPONENT).to_string());
    }

    let mut url = base.clone();
    url.set_query(Some(&query));
    url
}

#[async_trait]
pub trait RenderService: Send + Sync {
    /// Fetch the rendered image bytes for a previously built render URL.
    async fn fetch_image(&self, url: &Url) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct RenderClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for RenderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RenderClient {
    pub fn new(base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("qr-hub/0.1")
            .build()
            .expect("reqwest client");
        RenderClient { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn image_url(&self, payload: &str, styling: &StylingOptions, background: &str) -> Url {
        render_url(&self.base_url, payload, styling, background)
    }
}

#[async_trait]
impl RenderService for RenderClient {
    async fn fetch_image(&self, url: &Url) -> Result<Vec<u8>> {
        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .context("failed to reach QR render API")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("qr render error {}: {}", status, body));
        }
        let bytes = res
            .bytes()
            .await
            .context("failed to read QR render response")?;
        Ok(bytes.to_vec())
    }
}
