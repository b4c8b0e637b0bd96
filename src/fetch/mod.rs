//! HTTP download of hub and surveillance files.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Result, bail};

/// Downloads `url`, failing on any non-success status.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        bail!("GET {} returned status {}", url, status);
    }
    Ok(resp.bytes().await?.to_vec())
}
