//! Decoding of try-on uploads into a [`TryOnRequest`].
//!
//! Two encodings are accepted: `multipart/form-data` with `personImg` and
//! `garmentImg` file parts plus `seed` / `randomizeSeed` text fields, and JSON
//! with base64 images. Multipart file parts are spooled to temporary files in
//! the upload directory; every temporary file is removed before this module
//! returns, whichever way it returns.

use axum::extract::multipart::Field;
use axum::extract::Multipart;
use base64::Engine;
use garde::Validate;
use serde::Deserialize;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::{TryOnError, EMPTY_IMAGE};
use crate::models::tryon::{TryOnRequest, UploadedImage};
use crate::services::imaging;

const PERSON_FIELD: &str = "personImg";
const GARMENT_FIELD: &str = "garmentImg";
const SEED_FIELD: &str = "seed";
const RANDOMIZE_FIELD: &str = "randomizeSeed";

/// JSON variant of the request body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonTryOnPayload {
    #[serde(default)]
    pub person_img: Option<String>,
    #[serde(default)]
    pub garment_img: Option<String>,
    #[serde(default)]
    pub seed: Option<serde_json::Value>,
    #[serde(default)]
    pub randomize_seed: bool,
}

/// A multipart file part written to disk. Dropping it deletes the file.
struct SpooledPart {
    file: NamedTempFile,
    file_name: String,
}

impl SpooledPart {
    async fn into_image(self) -> Result<UploadedImage, TryOnError> {
        let bytes = tokio::fs::read(self.file.path())
            .await
            .map_err(|e| TryOnError::Unexpected(format!("failed to read spooled upload: {e}")))?;

        if let Err(e) = self.file.close() {
            tracing::warn!(error = %e, "Failed to remove spooled upload");
        }

        Ok(UploadedImage {
            bytes,
            content_type: String::new(),
            file_name: self.file_name,
        })
    }
}

async fn spool(field: &mut Field<'_>, dir: &Path, fallback_name: &str) -> Result<SpooledPart, TryOnError> {
    let file_name = field
        .file_name()
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback_name)
        .to_string();

    let file = tempfile::Builder::new()
        .prefix("tryon-upload-")
        .tempfile_in(dir)
        .map_err(|e| TryOnError::Unexpected(format!("failed to create spool file: {e}")))?;

    let handle = file
        .as_file()
        .try_clone()
        .map_err(|e| TryOnError::Unexpected(format!("failed to open spool file: {e}")))?;
    let mut writer = tokio::fs::File::from_std(handle);

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| TryOnError::Validation(format!("Invalid multipart body: {e}")))?
    {
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TryOnError::Unexpected(format!("failed to spool upload: {e}")))?;
    }
    writer
        .flush()
        .await
        .map_err(|e| TryOnError::Unexpected(format!("failed to spool upload: {e}")))?;

    Ok(SpooledPart { file, file_name })
}

/// Decode a multipart upload. Only the first part of each name is used.
pub async fn from_multipart(
    mut multipart: Multipart,
    upload_dir: &Path,
) -> Result<TryOnRequest, TryOnError> {
    let mut person: Option<SpooledPart> = None;
    let mut garment: Option<SpooledPart> = None;
    let mut seed_text: Option<String> = None;
    let mut randomize_text: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| TryOnError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            PERSON_FIELD if person.is_none() => {
                person = Some(spool(&mut field, upload_dir, "person.jpg").await?);
            }
            GARMENT_FIELD if garment.is_none() => {
                garment = Some(spool(&mut field, upload_dir, "garment.jpg").await?);
            }
            SEED_FIELD if seed_text.is_none() => {
                seed_text = Some(read_text(field).await?);
            }
            RANDOMIZE_FIELD if randomize_text.is_none() => {
                randomize_text = Some(read_text(field).await?);
            }
            PERSON_FIELD | GARMENT_FIELD | SEED_FIELD | RANDOMIZE_FIELD => {
                tracing::warn!(field = %name, "Ignoring repeated form field");
            }
            _ => {
                tracing::debug!(field = %name, "Ignoring unknown form field");
            }
        }
    }

    let person = match person {
        Some(part) => Some(part.into_image().await?),
        None => None,
    };
    let garment = match garment {
        Some(part) => Some(part.into_image().await?),
        None => None,
    };

    let randomize_seed = randomize_text.as_deref().map(str::trim) == Some("true");
    let seed = if randomize_seed {
        0
    } else {
        seed_text
            .as_deref()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(0)
    };

    finalize(person, garment, seed, randomize_seed)
}

async fn read_text(field: Field<'_>) -> Result<String, TryOnError> {
    field
        .text()
        .await
        .map_err(|e| TryOnError::Validation(format!("Invalid multipart body: {e}")))
}

/// Decode a JSON upload with base64 (optionally data-URI) images.
pub fn from_json(payload: JsonTryOnPayload) -> Result<TryOnRequest, TryOnError> {
    let person = decode_base64_image(payload.person_img.as_deref(), "person")?;
    let garment = decode_base64_image(payload.garment_img.as_deref(), "garment")?;

    let seed = if payload.randomize_seed {
        0
    } else {
        match payload.seed {
            None | Some(serde_json::Value::Null) => 0,
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| TryOnError::Validation(format!("Invalid seed: {n}")))?,
            Some(serde_json::Value::String(s)) => s.trim().parse::<u32>().unwrap_or(0),
            Some(other) => {
                return Err(TryOnError::Validation(format!("Invalid seed: {other}")));
            }
        }
    };

    finalize(person, garment, seed, payload.randomize_seed)
}

fn decode_base64_image(
    encoded: Option<&str>,
    stem: &str,
) -> Result<Option<UploadedImage>, TryOnError> {
    let Some(encoded) = encoded.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let data = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|_| TryOnError::Validation("Invalid base64 image".to_string()))?;

    Ok(Some(UploadedImage {
        bytes,
        content_type: String::new(),
        file_name: stem.to_string(),
    }))
}

/// Shared checks for both encodings: presence, format, seed range.
fn finalize(
    person: Option<UploadedImage>,
    garment: Option<UploadedImage>,
    seed: u32,
    randomize_seed: bool,
) -> Result<TryOnRequest, TryOnError> {
    let (Some(person), Some(garment)) = (person, garment) else {
        return Err(TryOnError::Validation(EMPTY_IMAGE.to_string()));
    };
    if person.is_empty() || garment.is_empty() {
        return Err(TryOnError::Validation(EMPTY_IMAGE.to_string()));
    }

    let request = TryOnRequest {
        person_image: with_detected_type(person)?,
        garment_image: with_detected_type(garment)?,
        seed,
        randomize_seed,
    };

    request
        .validate()
        .map_err(|report| TryOnError::Validation(format!("Invalid seed: {report}")))?;

    Ok(request)
}

fn with_detected_type(mut image: UploadedImage) -> Result<UploadedImage, TryOnError> {
    let format = imaging::detect_format(&image.bytes)
        .map_err(|_| TryOnError::UnsupportedImage(image.file_name.clone()))?;

    image.content_type = imaging::content_type_of(format).to_string();
    if !image.file_name.contains('.') {
        if let Some(ext) = format.extensions_str().first() {
            image.file_name = format!("{}.{}", image.file_name, ext);
        }
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{header, Request};

    const BOUNDARY: &str = "tryon-test-boundary";

    // 1x1 PNG
    const PNG_B64: &str =
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8DwHwAFBQIAX8jx0gAAAABJRU5ErkJggg==";

    fn png() -> Vec<u8> {
        base64::engine::general_purpose::STANDARD.decode(PNG_B64).unwrap()
    }

    enum Part<'a> {
        File(&'a str, Vec<u8>),
        Text(&'a str, &'a str),
    }

    async fn multipart(parts: Vec<Part<'_>>) -> Multipart {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File(name, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.png\"\r\nContent-Type: image/png\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(&bytes);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    fn spool_dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn multipart_decodes_images_and_fixed_seed() {
        let dir = tempfile::tempdir().unwrap();
        let form = multipart(vec![
            Part::File(PERSON_FIELD, png()),
            Part::File(GARMENT_FIELD, png()),
            Part::Text(SEED_FIELD, "42"),
            Part::Text(RANDOMIZE_FIELD, "false"),
        ])
        .await;

        let request = from_multipart(form, dir.path()).await.unwrap();

        assert_eq!(request.person_image.bytes, png());
        assert_eq!(request.person_image.content_type, "image/png");
        assert_eq!(request.garment_image.file_name, "garmentImg.png");
        assert_eq!(request.seed, 42);
        assert!(!request.randomize_seed);
        assert!(spool_dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn multipart_missing_garment_is_empty_image_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let form = multipart(vec![Part::File(PERSON_FIELD, png()), Part::Text(SEED_FIELD, "1")]).await;

        let err = from_multipart(form, dir.path()).await.unwrap_err();

        assert!(matches!(err, TryOnError::Validation(ref info) if info == EMPTY_IMAGE));
        assert!(spool_dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn multipart_zero_byte_file_is_empty_image() {
        let dir = tempfile::tempdir().unwrap();
        let form = multipart(vec![
            Part::File(PERSON_FIELD, png()),
            Part::File(GARMENT_FIELD, Vec::new()),
        ])
        .await;

        let err = from_multipart(form, dir.path()).await.unwrap_err();
        assert_eq!(err.info(), EMPTY_IMAGE);
        assert!(spool_dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn multipart_unparsable_seed_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let form = multipart(vec![
            Part::File(PERSON_FIELD, png()),
            Part::File(GARMENT_FIELD, png()),
            Part::Text(SEED_FIELD, "not-a-number"),
        ])
        .await;

        let request = from_multipart(form, dir.path()).await.unwrap();
        assert_eq!(request.seed, 0);
    }

    #[tokio::test]
    async fn multipart_first_part_wins() {
        let dir = tempfile::tempdir().unwrap();
        let form = multipart(vec![
            Part::File(PERSON_FIELD, png()),
            Part::File(PERSON_FIELD, b"second".to_vec()),
            Part::File(GARMENT_FIELD, png()),
            Part::Text(SEED_FIELD, "7"),
            Part::Text(SEED_FIELD, "8"),
        ])
        .await;

        let request = from_multipart(form, dir.path()).await.unwrap();
        assert_eq!(request.person_image.bytes, png());
        assert_eq!(request.seed, 7);
        assert!(spool_dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn multipart_non_image_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let form = multipart(vec![
            Part::File(PERSON_FIELD, b"plain text".to_vec()),
            Part::File(GARMENT_FIELD, png()),
        ])
        .await;

        let err = from_multipart(form, dir.path()).await.unwrap_err();
        assert!(matches!(err, TryOnError::UnsupportedImage(_)));
        assert!(spool_dir_is_empty(dir.path()));
    }

    #[test]
    fn json_accepts_raw_and_data_uri_base64() {
        let request = from_json(JsonTryOnPayload {
            person_img: Some(PNG_B64.to_string()),
            garment_img: Some(format!("data:image/png;base64,{PNG_B64}")),
            seed: Some(serde_json::json!(42)),
            randomize_seed: false,
        })
        .unwrap();

        assert_eq!(request.person_image.bytes, png());
        assert_eq!(request.garment_image.bytes, png());
        assert_eq!(request.person_image.file_name, "person.png");
        assert_eq!(request.seed, 42);
    }

    #[test]
    fn json_missing_image_is_empty_image() {
        let err = from_json(JsonTryOnPayload {
            person_img: Some(PNG_B64.to_string()),
            garment_img: Some(String::new()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.info(), EMPTY_IMAGE);
    }

    #[test]
    fn json_seed_out_of_range_is_rejected() {
        let payload = |seed: serde_json::Value| JsonTryOnPayload {
            person_img: Some(PNG_B64.to_string()),
            garment_img: Some(PNG_B64.to_string()),
            seed: Some(seed),
            randomize_seed: false,
        };

        assert!(matches!(
            from_json(payload(serde_json::json!(1_000_000))),
            Err(TryOnError::Validation(_))
        ));
        assert!(matches!(
            from_json(payload(serde_json::json!(-1))),
            Err(TryOnError::Validation(_))
        ));
    }

    #[test]
    fn json_randomized_ignores_requested_seed() {
        let request = from_json(JsonTryOnPayload {
            person_img: Some(PNG_B64.to_string()),
            garment_img: Some(PNG_B64.to_string()),
            seed: Some(serde_json::json!(5_000_000)),
            randomize_seed: true,
        })
        .unwrap();
        assert!(request.randomize_seed);
        assert!(request.resolve_seed() <= crate::models::tryon::MAX_SEED);
    }

    #[test]
    fn json_bad_base64_is_validation_error() {
        let err = from_json(JsonTryOnPayload {
            person_img: Some("***".to_string()),
            garment_img: Some(PNG_B64.to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, TryOnError::Validation(_)));
    }
}
