use crate::error::{Error, Result};

use image::{ImageReader, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Decoded upload in fixed RGB channel order.
#[derive(Debug, Clone)]
pub struct RasterImage {
    data: RgbImage,
}

impl RasterImage {
    pub fn new(data: RgbImage) -> Result<Self> {
        if data.width() == 0 || data.height() == 0 {
            return Err(Error::ImageDecode(format!(
                "image has zero dimension ({}x{})",
                data.width(),
                data.height()
            )));
        }

        Ok(RasterImage { data })
    }

    pub fn width(&self) -> u32 {
        self.data.width()
    }

    pub fn height(&self) -> u32 {
        self.data.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.data.dimensions()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.data
    }
}

/// Decodes any supported format, sniffing it from the content. Alpha is dropped and
/// grayscale is expanded.
pub fn decode(bytes: &[u8]) -> Result<RasterImage> {
    let data = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| Error::ImageDecode(e.to_string()))?
        .decode()?;

    RasterImage::new(data.to_rgb8())
}

/// Raw bytes of an upload together with the client-side file name.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
}

/// An original image written to the upload directory for client display.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub path: PathBuf,
    pub url: String,
}

impl StoredImage {
    pub fn remove(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove stored image {}: {e}", self.path.display());
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
    url_prefix: String,
}

impl UploadDir {
    pub const URL_PREFIX: &'static str = "/uploads";

    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        Ok(UploadDir {
            root,
            url_prefix: Self::URL_PREFIX.to_string(),
        })
    }

    /// Creates a fresh directory under the system temp dir. It is not removed on exit.
    pub fn temporary() -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("sam_uploads_")
            .tempdir()?
            .into_path();

        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn persist(&self, upload: &Upload) -> Result<StoredImage> {
        let name = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            Self::extension(upload.filename.as_deref())
        );
        let path = self.root.join(&name);
        std::fs::write(&path, &upload.bytes)?;

        Ok(StoredImage {
            path,
            url: format!("{}/{}", self.url_prefix, name),
        })
    }

    // only short alphanumeric extensions survive, everything else is stored as .jpg
    fn extension(filename: Option<&str>) -> String {
        filename
            .and_then(|f| Path::new(f).extension())
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_else(|| ".jpg".to_string())
    }
}
