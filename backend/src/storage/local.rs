use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{StorageError, StoredUpload};

/// URL prefix under which the upload directory is served.
pub const UPLOADS_MOUNT: &str = "/static/uploads";

/// Longest sanitized client file name kept, extension included.
pub const MAX_NAME_LEN: usize = 100;

/// Hex characters of random prefix that keep same-named uploads apart.
const PREFIX_LEN: usize = 8;

#[derive(Clone)]
pub struct LocalDiskSink {
    upload_dir: PathBuf,
}

impl LocalDiskSink {
    pub async fn new(upload_dir: PathBuf) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&upload_dir)
            .await
            .map_err(|source| StorageError::Io {
                path: upload_dir.clone(),
                source,
            })?;
        Ok(Self { upload_dir })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub async fn store(
        &self,
        source: &Path,
        original_name: Option<&str>,
        file_extension: &str,
    ) -> Result<StoredUpload, StorageError> {
        let id = Uuid::new_v4().simple().to_string();
        let file_name = match original_name.map(sanitize_filename) {
            Some(name) if !name.is_empty() => format!("{}-{}", &id[..PREFIX_LEN], name),
            _ => format!("{}.{}", id, file_extension),
        };

        let destination = self.upload_dir.join(&file_name);
        tokio::fs::copy(source, &destination)
            .await
            .map_err(|source| StorageError::Io {
                path: destination.clone(),
                source,
            })?;

        log::info!("Stored upload at {}", destination.display());
        Ok(StoredUpload {
            url: format!("{}/{}", UPLOADS_MOUNT, file_name),
            key: file_name,
        })
    }

    pub async fn remove(&self, file_name: &str) -> Result<(), StorageError> {
        let path = self.upload_dir.join(file_name);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
        log::info!("Removed upload {}", path.display());
        Ok(())
    }
}

/// Shortens `name` to `MAX_NAME_LEN` bytes, keeping a short extension.
fn cap_length(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.to_string();
    }
    let extension = name
        .rfind('.')
        .map(|dot| &name[dot..])
        .filter(|ext| ext.len() <= 10)
        .unwrap_or("");
    let stem_len = MAX_NAME_LEN - extension.len();
    format!("{}{}", &name[..stem_len], extension)
}

/// Reduces a client-supplied file name to a safe single path component made
/// of ASCII letters, digits, `.`, `_` and `-`.
pub fn sanitize_filename(name: &str) -> String {
    // Browsers on Windows may send the full client path.
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let mut cleaned = String::with_capacity(base.len());
    for ch in base.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            cleaned.push(ch);
        } else if ch.is_whitespace() {
            cleaned.push('_');
        }
    }

    cap_length(cleaned.trim_start_matches(['.', '_']).trim_end_matches(['.', '_']))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_paths_and_unsafe_characters() {
        assert_eq!(sanitize_filename("chest xray.png"), "chest_xray.png");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\dr\\scan 01.jpg"), "scan_01.jpg");
        assert_eq!(sanitize_filename(".hidden.jpg"), "hidden.jpg");
        assert_eq!(sanitize_filename("röntgen-ü.jpeg"), "rntgen-.jpeg");
        assert_eq!(sanitize_filename("..."), "");
        assert_eq!(sanitize_filename("ülü"), "l");
    }

    #[test]
    fn sanitize_caps_long_names_but_keeps_extension() {
        let long = format!("{}.jpeg", "a".repeat(300));
        let cleaned = sanitize_filename(&long);
        assert_eq!(cleaned.len(), MAX_NAME_LEN);
        assert!(cleaned.ends_with("a.jpeg"));

        let no_extension = "b".repeat(300);
        assert_eq!(sanitize_filename(&no_extension), "b".repeat(MAX_NAME_LEN));
    }

    #[actix_web::test]
    async fn stores_under_sanitized_name() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalDiskSink::new(dir.path().join("uploads")).await.unwrap();

        let source = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(source.path(), b"pixels").unwrap();

        let stored = sink
            .store(source.path(), Some("my scan.png"), "png")
            .await
            .unwrap();
        assert!(stored.key.ends_with("-my_scan.png"));
        assert_eq!(stored.key.len(), PREFIX_LEN + 1 + "my_scan.png".len());
        assert_eq!(stored.url, format!("/static/uploads/{}", stored.key));
        assert_eq!(
            std::fs::read(sink.upload_dir().join(&stored.key)).unwrap(),
            b"pixels"
        );
    }

    #[actix_web::test]
    async fn same_named_uploads_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalDiskSink::new(dir.path().to_path_buf()).await.unwrap();

        let first = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(first.path(), b"first").unwrap();
        let second = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(second.path(), b"second").unwrap();

        let a = sink.store(first.path(), Some("scan.png"), "png").await.unwrap();
        let b = sink.store(second.path(), Some("scan.png"), "png").await.unwrap();
        assert_ne!(a.key, b.key);
        assert_eq!(std::fs::read(dir.path().join(&a.key)).unwrap(), b"first");
        assert_eq!(std::fs::read(dir.path().join(&b.key)).unwrap(), b"second");
    }

    #[actix_web::test]
    async fn very_long_names_are_stored() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalDiskSink::new(dir.path().to_path_buf()).await.unwrap();
        let source = tempfile::NamedTempFile::new().unwrap();

        let name = format!("{}.png", "x".repeat(400));
        let stored = sink.store(source.path(), Some(&name), "png").await.unwrap();
        assert_eq!(stored.key.len(), PREFIX_LEN + 1 + MAX_NAME_LEN);
        assert!(dir.path().join(&stored.key).exists());
    }

    #[actix_web::test]
    async fn removes_stored_upload() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalDiskSink::new(dir.path().to_path_buf()).await.unwrap();
        let source = tempfile::NamedTempFile::new().unwrap();

        let stored = sink.store(source.path(), Some("scan.png"), "png").await.unwrap();
        sink.remove(&stored.key).await.unwrap();
        assert!(!dir.path().join(&stored.key).exists());

        let err = sink.remove(&stored.key).await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[actix_web::test]
    async fn falls_back_to_random_name() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalDiskSink::new(dir.path().to_path_buf()).await.unwrap();
        let source = tempfile::NamedTempFile::new().unwrap();

        let stored = sink.store(source.path(), Some("///"), "jpg").await.unwrap();
        assert!(stored.key.ends_with(".jpg"));
        assert_eq!(stored.key.len(), 32 + 4);

        let stored = sink.store(source.path(), None, "png").await.unwrap();
        assert!(stored.key.ends_with(".png"));
    }

    #[actix_web::test]
    async fn missing_source_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalDiskSink::new(dir.path().to_path_buf()).await.unwrap();
        let err = sink
            .store(&dir.path().join("gone.png"), Some("gone.png"), "png")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
