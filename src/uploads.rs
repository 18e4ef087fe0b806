use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use tempfile::TempPath;
use uuid::Uuid;

/// Writes one multipart file part to the staging directory under a fresh name.
pub async fn stage_file(
    dir: &Path,
    body: Bytes,
    content_type: Option<&str>,
    file_name: Option<&str>,
) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create staging dir {}", dir.display()))?;

    let ext = content_type
        .and_then(ext_from_mime)
        .or_else(|| file_name.and_then(ext_from_name))
        .unwrap_or("bin");
    let path = dir.join(format!("{}.{}", Uuid::new_v4(), ext));
    tokio::fs::write(&path, &body)
        .await
        .with_context(|| format!("write staged file {}", path.display()))?;
    Ok(path)
}

/// Files staged for one request.
///
/// Every file is removed when this is dropped, so a cancelled request
/// leaves nothing behind in the staging directory. Files the uploader
/// already removed are skipped silently.
#[derive(Debug, Default)]
pub struct StagedFiles {
    paths: Vec<TempPath>,
}

impl StagedFiles {
    pub async fn stage(
        &mut self,
        dir: &Path,
        body: Bytes,
        content_type: Option<&str>,
        file_name: Option<&str>,
    ) -> anyhow::Result<PathBuf> {
        let path = stage_file(dir, body, content_type, file_name).await?;
        self.paths.push(TempPath::from_path(&path));
        Ok(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

fn ext_from_name(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("jpg"),
        "png" => Some("png"),
        "webp" => Some("webp"),
        "gif" => Some("gif"),
        "heic" => Some("heic"),
        _ => None,
    }
}
