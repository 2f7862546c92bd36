use thiserror::Error;

/// Ceiling on the decoded image size unless overridden by configuration.
pub const MAX_IMAGE_BYTES_DEFAULT: usize = 5 * 1024 * 1024;

/// Why an image payload was refused before reaching the vision model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageRejection {
    #[error("image must be a base64 data URL with an image media type")]
    InvalidFormat,
    #[error("image is about {estimated_bytes} bytes, over the {max_bytes} byte limit")]
    TooLarge {
        estimated_bytes: usize,
        max_bytes: usize,
    },
    #[error("unsupported image type {media_type}, use JPEG, PNG or WebP")]
    UnsupportedFormat { media_type: String },
}

/// Image formats the vision model accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
        }
    }

    fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            "image/jpeg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }
}

/// Checks an incoming image payload without decoding it.
///
/// The checks run in a fixed order: data URL shape, then the size estimate,
/// then the media type allow-list. An oversized GIF is therefore reported
/// as too large, not as an unsupported type.
pub fn validate_image(payload: &str, max_bytes: usize) -> Result<ImageFormat, ImageRejection> {
    if !payload.starts_with("data:image/") {
        return Err(ImageRejection::InvalidFormat);
    }
    let (header, encoded) = payload.split_once(',').ok_or(ImageRejection::InvalidFormat)?;

    // Base64 inflates by 4/3, so the decoded size is close to len * 3 / 4.
    let estimated_bytes = encoded.len() * 3 / 4;
    if estimated_bytes > max_bytes {
        return Err(ImageRejection::TooLarge {
            estimated_bytes,
            max_bytes,
        });
    }

    let media_type = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();

    ImageFormat::from_media_type(&media_type)
        .ok_or(ImageRejection::UnsupportedFormat { media_type })
}
