use serde::{Deserialize, Serialize};

/// Document kind accepted by the upload pipeline.
///
/// The upload API and the storage policy use different tokens for JPEG
/// (`"jpg"` vs `"jpeg"`); this enum owns that translation so callers never
/// hand-build either string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Jpeg,
    Png,
}

impl FileKind {
    /// Resolves a MIME type string to a kind.
    ///
    /// Accepts both `image/jpeg` and the nonstandard `image/jpg` spelling
    /// seen from mobile camera pickers.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "application/pdf" => Some(Self::Pdf),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Token for the upload API's `file_type` field.
    pub fn api_token(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Token for the storage policy's `Content-Type` field.
    pub fn storage_token(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    /// Full MIME type for the storage policy's `Content-Type` value.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}
