use crate::error::{IngestError, Result};
use crate::notification::ObjectReference;

/// File type of an uploaded object, decided by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Pdf,
    RasterImage,
    Unsupported,
}

impl Classification {
    /// Classify an object key by its lower-cased trailing extension
    pub fn from_key(key: &str) -> Self {
        let lower = key.to_lowercase();
        let ext = match lower.rsplit_once('.') {
            // A dot inside a directory component is not an extension
            Some((_, ext)) if !ext.contains('/') => ext,
            _ => return Classification::Unsupported,
        };

        match ext {
            "pdf" => Classification::Pdf,
            "png" | "jpg" | "jpeg" | "tif" | "tiff" => Classification::RasterImage,
            _ => Classification::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Pdf => "pdf",
            Classification::RasterImage => "raster_image",
            Classification::Unsupported => "unsupported",
        }
    }
}

/// What the pipeline does with an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Render every page, relocate the original
    RasterizeAndRelocate,
    /// Relocate the image as its own single page
    RelocateOnly,
    /// Acknowledge without touching storage
    Skip { reason: String },
}

/// Route an object to its disposition.
///
/// Unsupported extensions come back as [`IngestError::UnsupportedFileType`],
/// which callers treat as a no-op success.
pub fn route(object: &ObjectReference, upload_prefix: &str) -> Result<Disposition> {
    if !object.key.starts_with(upload_prefix) {
        return Ok(Disposition::Skip {
            reason: format!("key is outside {upload_prefix}"),
        });
    }

    match Classification::from_key(&object.key) {
        Classification::Pdf => Ok(Disposition::RasterizeAndRelocate),
        Classification::RasterImage => Ok(Disposition::RelocateOnly),
        Classification::Unsupported => Err(IngestError::UnsupportedFileType(object.key.clone())),
    }
}

/// Content type recorded on stored copies of an image
pub fn content_type_for(key: &str) -> &'static str {
    let lower = key.to_lowercase();
    match lower.rsplit_once('.').map(|(_, ext)| ext) {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}
