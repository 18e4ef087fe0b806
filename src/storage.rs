use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::config::CloudinaryConfig;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub url: String,
}

/// Durable media host.
///
/// Implementations never fail past this boundary: any failure is logged and
/// reported as `None`. The local file at `local_path` is removed on every
/// outcome.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, local_path: &Path) -> Option<UploadedMedia>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

#[derive(Clone)]
pub struct CloudinaryUploader {
    client: reqwest::Client,
    upload_url: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryUploader {
    pub fn new(cfg: &CloudinaryConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build cloudinary http client")?;
        Ok(Self {
            client,
            upload_url: format!(
                "{}/{}/auto/upload",
                cfg.api_base.trim_end_matches('/'),
                cfg.cloud_name
            ),
            api_key: cfg.api_key.clone(),
            api_secret: cfg.api_secret.clone(),
        })
    }

    async fn try_upload(&self, local_path: &Path) -> anyhow::Result<UploadedMedia> {
        let body = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("read {}", local_path.display()))?;
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let timestamp = OffsetDateTime::now_utc().unix_timestamp().to_string();
        let signature = sign_params(&[("timestamp", timestamp.as_str())], &self.api_secret);

        let form = Form::new()
            .part("file", Part::bytes(body).file_name(file_name))
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let resp = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .context("cloudinary upload request")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("cloudinary upload rejected with {status}: {text}");
        }

        let parsed: UploadResponse = resp.json().await.context("decode cloudinary response")?;
        let url = parsed
            .secure_url
            .or(parsed.url)
            .context("cloudinary response without url")?;
        Ok(UploadedMedia { url })
    }
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    async fn upload(&self, local_path: &Path) -> Option<UploadedMedia> {
        info!(path = %local_path.display(), "uploading file to media host");
        let result = self.try_upload(local_path).await;
        remove_if_exists(local_path).await;
        match result {
            Ok(media) => {
                info!(url = %media.url, "file uploaded to media host");
                Some(media)
            }
            Err(e) => {
                error!(error = ?e, path = %local_path.display(), "media upload failed");
                None
            }
        }
    }
}

/// Removes a staged file, tolerating it being gone already.
pub async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, path = %path.display(), "failed to remove staged file"),
    }
}

/// Request signature: hex sha256 of the `k=v&..` params sorted by key, followed by the secret.
fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let digest = Sha256::digest(format!("{joined}{secret}").as_bytes());
    format!("{:x}", digest)
}
