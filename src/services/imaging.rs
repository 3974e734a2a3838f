use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::models::tryon::UploadedImage;

/// Settings for re-encoding source images before submission.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub jpeg_quality: u8,
    pub max_dimension: u32,
}

/// Sniff the image format from its leading bytes.
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, ImagingError> {
    image::guess_format(bytes).map_err(|_| ImagingError::UnknownFormat)
}

/// MIME type for a detected format.
pub fn content_type_of(format: ImageFormat) -> &'static str {
    format.to_mime_type()
}

/// Decode, downscale to fit `max_dimension`, and re-encode as JPEG.
pub fn normalize(
    image: &UploadedImage,
    options: &NormalizeOptions,
) -> Result<UploadedImage, ImagingError> {
    let decoded = image::load_from_memory(&image.bytes).map_err(ImagingError::Decode)?;

    let resized = if decoded.width() > options.max_dimension
        || decoded.height() > options.max_dimension
    {
        decoded.resize(options.max_dimension, options.max_dimension, FilterType::Lanczos3)
    } else {
        decoded
    };

    let bytes = encode_jpeg(&resized, options.jpeg_quality)?;

    Ok(UploadedImage {
        bytes,
        content_type: "image/jpeg".to_string(),
        file_name: with_extension(&image.file_name, "jpg"),
    })
}

/// Re-encode arbitrary image bytes as PNG.
pub fn to_png(bytes: &[u8]) -> Result<Vec<u8>, ImagingError> {
    let decoded = image::load_from_memory(bytes).map_err(ImagingError::Decode)?;
    let mut out = std::io::Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .map_err(ImagingError::Encode)?;
    Ok(out.into_inner())
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImagingError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)))
        .map_err(ImagingError::Encode)?;
    Ok(out)
}

fn with_extension(file_name: &str, ext: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.{ext}"),
        _ => format!("{file_name}.{ext}"),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImagingError {
    #[error("unrecognised image format")]
    UnknownFormat,

    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(image::ImageError),
}
