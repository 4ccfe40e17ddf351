use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::Multipart;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use arbor_types::models::Image;

use crate::error::{ApiError, ApiResult};

/// Multipart field that carries the picture.
pub const IMAGE_FIELD: &str = "image";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Scratch directory for multipart uploads.
///
/// Each upload lands at `{dir}/{field}-{unix_millis}-{suffix}` before it is
/// copied into the database row.
pub struct Uploads {
    dir: PathBuf,
}

/// Handle to a saved upload.
#[derive(Debug, Clone)]
pub struct UploadRef {
    pub path: PathBuf,
    pub content_type: String,
}

impl Uploads {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub async fn save_upload(&self, field: &str, bytes: &[u8], content_type: &str) -> Result<UploadRef> {
        let suffix = Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "{}-{}-{}",
            field,
            chrono::Utc::now().timestamp_millis(),
            &suffix[..8]
        );
        let path = self.dir.join(file_name);

        let file = fs::File::create(&path).await?;
        write_or_remove(&path, file, bytes).await?;

        debug!("Saved {} byte upload to {}", bytes.len(), path.display());
        Ok(UploadRef {
            path,
            content_type: content_type.to_string(),
        })
    }

    pub async fn read_upload(&self, upload: &UploadRef) -> Result<Vec<u8>> {
        Ok(fs::read(&upload.path).await?)
    }

    pub async fn discard(&self, upload: &UploadRef) -> Result<()> {
        match fs::remove_file(&upload.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Upload {} already gone", upload.path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Round-trip an image part through disk and hand back the stored bytes.
    pub async fn store_image(&self, part: ImagePart) -> Result<Image> {
        let upload = self.save_upload(IMAGE_FIELD, &part.data, &part.content_type).await?;
        let data = self.read_upload(&upload).await;
        // Drop the scratch file even when the read failed.
        self.discard(&upload).await?;

        Ok(Image {
            data: data?,
            content_type: upload.content_type,
        })
    }
}

/// Write `bytes` to the freshly created `path`; a partial file is removed on failure.
async fn write_or_remove<W>(path: &Path, mut out: W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        out.write_all(bytes).await?;
        out.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(out);
        if let Err(rm) = fs::remove_file(path).await {
            warn!("Failed to remove partial upload {}: {}", path.display(), rm);
        }
        return Err(e.into());
    }
    Ok(())
}

pub struct ImagePart {
    pub data: Bytes,
    pub content_type: String,
}

/// Text fields plus the optional image of a multipart form.
#[derive(Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub image: Option<ImagePart>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == IMAGE_FIELD {
                let content_type = field.content_type().unwrap_or(DEFAULT_CONTENT_TYPE).to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                // Browsers send an empty part when no file was picked
                if !data.is_empty() {
                    form.image = Some(ImagePart { data, content_type });
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Trimmed, non-empty text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}
