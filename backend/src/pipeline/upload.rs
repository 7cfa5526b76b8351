use actix_multipart::Multipart;
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

/// Form field carrying the uploaded image.
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file was selected")]
    MissingFile,
    #[error("Upload exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("Malformed multipart body: {0}")]
    Multipart(String),
    #[error("Failed to stage upload: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct StagingConfig {
    pub temp_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

/// An upload spooled to a temporary file. The file is deleted when this value
/// is dropped, whichever way the request ends.
pub struct StagedUpload {
    file: NamedTempFile,
    original_name: Option<String>,
    declared_content_type: Option<String>,
    size: usize,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    pub fn declared_content_type(&self) -> Option<&str> {
        self.declared_content_type.as_deref()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
impl StagedUpload {
    pub(crate) fn from_file(file: NamedTempFile, original_name: Option<&str>) -> Self {
        let size = std::fs::metadata(file.path()).map(|m| m.len() as usize).unwrap_or(0);
        Self {
            file,
            original_name: original_name.map(str::to_string),
            declared_content_type: None,
            size,
        }
    }
}

fn new_temp_file(config: &StagingConfig) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("xray-upload-");
    match &config.temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
}

/// Streams the `image` field of a multipart form into a temporary file.
/// Other fields are drained and ignored.
pub async fn stage_upload(
    mut payload: Multipart,
    config: &StagingConfig,
) -> Result<StagedUpload, UploadError> {
    let mut staged: Option<StagedUpload> = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?
    {
        let is_image = field.name() == Some(IMAGE_FIELD) && staged.is_none();
        if !is_image {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;
            }
            continue;
        }

        let original_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let declared_content_type = field.content_type().map(|mime| mime.to_string());

        let file = new_temp_file(config)?;
        // Writes go through tokio's blocking pool; `file` keeps ownership of
        // the path and removes it on drop.
        let mut writer = tokio::fs::File::from_std(file.as_file().try_clone()?);
        let mut size = 0usize;
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;
            size += data.len();
            if size > config.max_upload_bytes {
                return Err(UploadError::TooLarge {
                    limit: config.max_upload_bytes,
                });
            }
            writer.write_all(&data).await?;
        }
        writer.flush().await?;
        drop(writer);

        if size == 0 {
            // Browsers submit an empty part when no file was chosen.
            continue;
        }

        staged = Some(StagedUpload {
            file,
            original_name,
            declared_content_type,
            size,
        });
    }

    staged.ok_or(UploadError::MissingFile)
}
