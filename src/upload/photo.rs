use crate::error::ApiError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const ALLOWED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// A photo as received from the multipart request, before any state
/// mutation has happened.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

/// Synchronous upload validation: file present, size within the configured
/// maximum, MIME type allow-listed. Rejects before anything is persisted.
pub fn validate_photo(
    photo: Option<PhotoUpload>,
    max_bytes: usize,
) -> Result<PhotoUpload, ApiError> {
    let photo = photo.ok_or_else(|| ApiError::Validation("No file provided".to_string()))?;

    if photo.bytes.is_empty() {
        return Err(ApiError::Validation("No file provided".to_string()));
    }

    if photo.bytes.len() > max_bytes {
        return Err(ApiError::Validation(format!(
            "File size exceeds maximum allowed size of {}MB",
            max_bytes / 1024 / 1024
        )));
    }

    if !ALLOWED_MIME_TYPES.contains(&photo.content_type.as_str()) {
        return Err(ApiError::Validation(format!(
            "Invalid file type. Allowed types: {}",
            ALLOWED_MIME_TYPES.join(", ")
        )));
    }

    Ok(photo)
}

/// File extension from the original filename, falling back to one inferred
/// from the MIME type.
pub fn extension_for(filename: &str, content_type: &str) -> String {
    if let Some((_, ext)) = filename.rsplit_once('.') {
        if !ext.is_empty() {
            return format!(".{}", ext.to_lowercase());
        }
    }
    match content_type {
        "image/png" => ".png",
        "image/webp" => ".webp",
        _ => ".jpg",
    }
    .to_string()
}

/// Storage key namespaced as `{staff_id}/{ISO-date}/{generated}{ext}`.
pub fn object_key(
    staff_id: u64,
    taken_at: DateTime<Utc>,
    filename: &str,
    content_type: &str,
) -> String {
    format!(
        "{}/{}/{}{}",
        staff_id,
        taken_at.format("%Y-%m-%d"),
        Uuid::new_v4(),
        extension_for(filename, content_type)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MAX: usize = 5 * 1024 * 1024;

    fn jpeg(size: usize) -> PhotoUpload {
        PhotoUpload {
            bytes: vec![0u8; size],
            filename: "selfie.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
        }
    }

    #[test]
    fn missing_file_is_rejected() {
        assert!(matches!(
            validate_photo(None, MAX),
            Err(ApiError::Validation(_))
        ));
        let empty = PhotoUpload {
            bytes: Vec::new(),
            filename: "selfie.jpg".into(),
            content_type: "image/jpeg".into(),
        };
        assert!(matches!(
            validate_photo(Some(empty), MAX),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn oversized_file_is_rejected() {
        let six_mb = jpeg(6 * 1024 * 1024);
        let err = validate_photo(Some(six_mb), MAX).unwrap_err();
        match err {
            ApiError::Validation(msg) => assert!(msg.contains("5MB")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn disallowed_mime_is_rejected_regardless_of_size() {
        let gif = PhotoUpload {
            bytes: vec![0u8; 16],
            filename: "anim.gif".into(),
            content_type: "image/gif".into(),
        };
        assert!(matches!(
            validate_photo(Some(gif), MAX),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn valid_jpeg_passes() {
        assert!(validate_photo(Some(jpeg(2 * 1024 * 1024)), MAX).is_ok());
    }

    #[test]
    fn extension_prefers_filename_over_mime() {
        assert_eq!(extension_for("photo.PNG", "image/jpeg"), ".png");
        assert_eq!(extension_for("photo", "image/webp"), ".webp");
        assert_eq!(extension_for("photo", "image/png"), ".png");
        assert_eq!(extension_for("photo", "application/octet-stream"), ".jpg");
    }

    #[test]
    fn object_key_is_namespaced_by_staff_and_date() {
        let at = Utc.with_ymd_and_hms(2025, 6, 15, 9, 0, 0).unwrap();
        let key = object_key(42, at, "selfie.jpg", "image/jpeg");
        assert!(key.starts_with("42/2025-06-15/"));
        assert!(key.ends_with(".jpg"));
    }
}
