//! Embedding a [`MetadataFieldSet`] into image bytes.
//!
//! [`NativeSink`] rewrites metadata segments in place:
//!
//! - JPEG: EXIF APP1, XMP APP1 and IPTC-IIM in a Photoshop APP13 block
//! - PNG: `eXIf`, an XMP `iTXt` chunk and plain `iTXt` text chunks
//!
//! Pixel data is never decoded or re-encoded.

mod iptc;
mod jpeg;
mod png;
mod tiff;
mod xmp;

use anyhow::Result;
use std::path::Path;

use crate::config::BrandProfile;
use crate::error::MetadataError;
use crate::metadata::MetadataFieldSet;

/// Upload formats the sink can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// Detect the kind from magic bytes, falling back to the filename
    /// extension when the bytes are not recognized.
    pub fn detect(bytes: &[u8], filename: &str) -> crate::error::Result<Self> {
        match image::guess_format(bytes) {
            Ok(image::ImageFormat::Jpeg) => Ok(Self::Jpeg),
            Ok(image::ImageFormat::Png) => Ok(Self::Png),
            Ok(other) => Err(MetadataError::invalid(format!(
                "unsupported image format {other:?}, only JPEG and PNG are accepted"
            ))),
            Err(_) => Self::from_filename(filename).ok_or_else(|| {
                MetadataError::invalid(format!(
                    "could not detect the image format of {filename:?}, only JPEG and PNG are accepted"
                ))
            }),
        }
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "jpe" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// Extension (with dot) used for output filenames.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => ".jpg",
            Self::Png => ".png",
        }
    }
}

/// Brand contact details written into XMP `CreatorContactInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrandContact {
    pub website: String,
    pub phone: String,
}

impl From<&BrandProfile> for BrandContact {
    fn from(brand: &BrandProfile) -> Self {
        Self {
            website: brand.website.clone(),
            phone: brand.phone.clone(),
        }
    }
}

/// Writes a field set into image bytes.
///
/// Called on the blocking pool; implementations may do CPU-heavy work.
pub trait MetadataSink: Send + Sync {
    fn embed(&self, image: &[u8], kind: ImageKind, fields: &MetadataFieldSet) -> Result<Vec<u8>>;
}

/// The built-in sink, writing every schema natively.
pub struct NativeSink {
    contact: BrandContact,
}

impl NativeSink {
    pub fn new(brand: &BrandProfile) -> Self {
        Self {
            contact: BrandContact::from(brand),
        }
    }
}

impl MetadataSink for NativeSink {
    fn embed(&self, image: &[u8], kind: ImageKind, fields: &MetadataFieldSet) -> Result<Vec<u8>> {
        log::debug!("Embedding metadata into {} bytes of {kind:?}", image.len());
        match kind {
            ImageKind::Jpeg => jpeg::embed(image, fields, &self.contact),
            ImageKind::Png => png::embed(image, fields, &self.contact),
        }
    }
}
