use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];
const DEFAULT_EXTENSION: &str = "jpg";

/// Suffix of the anonymised, contrast-enhanced wound image.
pub const WOUND_PROCESSED: &str = "processed";
/// Suffix of the prepared face crop the skin analysis ran on.
pub const SKIN_PROCESSED: &str = "skincare_processed";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Le fichier doit être une image (JPEG, PNG, etc.)")]
    NotAnImage,
    #[error("Le fichier est trop volumineux. Taille maximale: {}", size_label(*.max_bytes))]
    TooLarge { max_bytes: usize },
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encode(#[from] image::ImageError),
}

/// Reject uploads that are not declared as images or exceed `max_bytes`.
pub fn check_upload(content_type: Option<&str>, len: usize, max_bytes: usize) -> Result<(), UploadError> {
    if !content_type.is_some_and(|ct| ct.starts_with("image/")) {
        return Err(UploadError::NotAnImage);
    }
    if len > max_bytes {
        return Err(UploadError::TooLarge { max_bytes });
    }
    Ok(())
}

/// `10MB`, `15.5MB` or `489KB`. Never rounds below the real limit.
fn size_label(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * KIB;
    if bytes >= MIB {
        if bytes % MIB == 0 {
            format!("{}MB", bytes / MIB)
        } else {
            // Tenths of a MiB, rounded up.
            let tenths = (bytes * 10).div_ceil(MIB);
            format!("{}.{}MB", tenths / 10, tenths % 10)
        }
    } else {
        format!("{}KB", bytes.div_ceil(KIB))
    }
}

/// Lowercased extension of `filename` when whitelisted, `jpg` otherwise.
pub fn extension_for(filename: Option<&str>) -> &'static str {
    let Some(ext) = filename.and_then(|f| Path::new(f).extension()).and_then(|e| e.to_str()) else {
        return DEFAULT_EXTENSION;
    };
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .find(|allowed| **allowed == ext)
        .copied()
        .unwrap_or(DEFAULT_EXTENSION)
}

/// Flat directory of uploaded and processed images, named by analysis id.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Use `dir`, creating it when missing.
    pub fn open(dir: &Path) -> Result<Self, UploadError> {
        std::fs::create_dir_all(dir)?;
        tracing::info!(dir = %dir.display(), "upload directory ready");
        Ok(Self { dir: dir.to_path_buf() })
    }

    /// Write the original upload as `<id>.<ext>`.
    pub async fn save(&self, id: &Uuid, ext: &str, bytes: &[u8]) -> Result<PathBuf, UploadError> {
        let path = self.dir.join(format!("{id}.{ext}"));
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "upload stored");
        Ok(path)
    }

    /// Encode and write a processed image as `<id>_<suffix>.<ext>`. Blocking.
    pub fn save_processed(
        &self,
        id: &Uuid,
        suffix: &str,
        ext: &str,
        image: &RgbImage,
    ) -> Result<PathBuf, UploadError> {
        let path = self.dir.join(format!("{id}_{suffix}.{ext}"));
        let format = ImageFormat::from_extension(ext).unwrap_or(ImageFormat::Jpeg);
        image.save_with_format(&path, format)?;
        tracing::debug!(path = %path.display(), "processed image stored");
        Ok(path)
    }

    /// Best-effort removal.
    pub async fn remove(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove upload");
        }
    }
}
