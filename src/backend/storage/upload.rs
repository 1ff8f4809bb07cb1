//! Multipart upload intake.
//!
//! Reads multipart requests into text fields plus validated files, then
//! stores the files in object storage under a folder chosen by field name
//! and MIME type. Keys are `<folder>/<millis>-<uuid>-<sanitized-name>.<ext>`.

use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use crate::backend::error::ApiError;
use crate::backend::storage::s3::S3Client;
use crate::shared::messaging::Attachment;

/// Per-file size cap when `UPLOAD_MAX_FILE_BYTES` is unset: 100 MB.
pub const DEFAULT_MAX_FILE_BYTES: usize = 100 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "mp4", "mov", "avi", "mkv", "pdf", "ppt", "pptx", "txt",
    "mp3", "wav", "m4a", "csv",
];

const ALLOWED_MIME_TYPES: &[&str] = &[
    // images
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    // video
    "video/mp4",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
    // docs
    "application/pdf",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
    // audio
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/mp4",
    "audio/m4a",
    // csv
    "text/csv",
    "application/vnd.ms-excel",
];

/// A file read out of a multipart request, not yet stored
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// A file persisted to object storage
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub field: String,
    pub url: String,
    pub name: String,
    pub content_type: String,
    pub size: i64,
}

/// Parsed multipart request: plain text fields and validated files
#[derive(Debug, Default)]
pub struct MultipartPayload {
    pub fields: HashMap<String, String>,
    pub files: Vec<IncomingFile>,
}

impl MultipartPayload {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }
}

/// Per-file upload cap in bytes.
pub fn max_file_bytes() -> usize {
    std::env::var("UPLOAD_MAX_FILE_BYTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_FILE_BYTES)
}

fn extension_of(file_name: &str) -> Option<String> {
    let ext = file_name.rsplit_once('.')?.1;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_lowercase())
    }
}

/// A file passes when both its extension and its MIME type are on the
/// allowlist.
pub fn file_allowed(file_name: &str, content_type: &str) -> bool {
    let Some(ext) = extension_of(file_name) else {
        return false;
    };
    ALLOWED_EXTENSIONS.contains(&ext.as_str()) && ALLOWED_MIME_TYPES.contains(&content_type)
}

/// Storage folder for an upload, routed by field name first and MIME type
/// second.
pub fn folder_for(field: &str, content_type: &str) -> &'static str {
    match field {
        "profileImage" => return "users/profileImages",
        "groupImage" => return "users/groupImages",
        "paymentImage" => return "payments/images",
        "file" | "files" => {
            return if content_type.starts_with("image/") {
                "chats/images"
            } else if content_type.starts_with("video/") {
                "chats/videos"
            } else if content_type.starts_with("audio/") {
                "chats/audios"
            } else if content_type == "application/pdf" {
                "chats/pdfs"
            } else if content_type == "application/vnd.ms-powerpoint"
                || content_type
                    == "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            {
                "chats/presentations"
            } else if content_type == "text/plain" {
                "chats/text"
            } else {
                "chats/others"
            };
        }
        _ => {}
    }
    if content_type.starts_with("image/") {
        "uploads/images"
    } else if content_type.starts_with("video/") {
        "uploads/videos"
    } else if content_type.starts_with("audio/") {
        "uploads/audios"
    } else if content_type == "application/pdf" {
        "uploads/pdfs"
    } else if content_type == "text/plain" {
        "uploads/text"
    } else {
        "uploads/others"
    }
}

fn sanitize_base(file_name: &str) -> String {
    let base = match file_name.rsplit_once('.') {
        Some((base, _)) => base,
        None => file_name,
    };
    base.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Deterministic part of the key layout, split out for testing.
fn object_file_name(file_name: &str, millis: i64, unique: Uuid) -> String {
    let base = sanitize_base(file_name);
    match extension_of(file_name) {
        Some(ext) => format!("{}-{}-{}.{}", millis, unique, base, ext),
        None => format!("{}-{}-{}", millis, unique, base),
    }
}

/// Storage key for an upload.
pub fn object_key(folder: &str, file_name: &str) -> String {
    format!(
        "{}/{}",
        folder,
        object_file_name(file_name, Utc::now().timestamp_millis(), Uuid::new_v4())
    )
}

/// Read a multipart request into text fields and validated files.
///
/// Oversized files and files outside the extension/MIME allowlist fail the
/// whole request with 400.
pub async fn read_multipart(multipart: &mut Multipart) -> Result<MultipartPayload, ApiError> {
    let max_bytes = max_file_bytes();
    let mut payload = MultipartPayload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(|f| f.to_string()) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read upload: {}", e)))?;

                if bytes.len() > max_bytes {
                    return Err(ApiError::bad_request(format!(
                        "file {} exceeds the upload size limit",
                        file_name
                    )));
                }
                if !file_allowed(&file_name, &content_type) {
                    return Err(ApiError::bad_request(format!(
                        "file type not allowed: {}",
                        file_name
                    )));
                }

                payload.files.push(IncomingFile {
                    field: name,
                    file_name,
                    content_type,
                    bytes,
                });
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("invalid form field: {}", e)))?;
                payload.fields.insert(name, value);
            }
        }
    }

    Ok(payload)
}

/// Upload every file to object storage and return the stored descriptors.
pub async fn store_all(
    storage: &S3Client,
    files: Vec<IncomingFile>,
) -> Result<Vec<StoredUpload>, ApiError> {
    let mut stored = Vec::with_capacity(files.len());
    for file in files {
        let key = object_key(folder_for(&file.field, &file.content_type), &file.file_name);
        let size = file.bytes.len() as i64;
        let url = storage
            .put_object(&key, file.bytes, &file.content_type)
            .await?;
        tracing::debug!("stored upload {} at {}", file.file_name, key);
        stored.push(StoredUpload {
            field: file.field,
            url,
            name: file.file_name,
            content_type: file.content_type,
            size,
        });
    }
    Ok(stored)
}

/// First stored upload for a form field.
pub fn find_upload<'a>(uploads: &'a [StoredUpload], field: &str) -> Option<&'a StoredUpload> {
    uploads.iter().find(|u| u.field == field)
}

/// Convert stored uploads into message attachments.
pub fn to_attachments(uploads: &[StoredUpload]) -> Vec<Attachment> {
    uploads
        .iter()
        .map(|u| Attachment {
            url: u.url.clone(),
            name: Some(u.name.clone()),
            content_type: Some(u.content_type.clone()),
            size: Some(u.size),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_file_allowlist() {
        assert!(file_allowed("photo.jpg", "image/jpeg"));
        assert!(file_allowed("CLIP.MP4", "video/mp4"));
        assert!(file_allowed("notes.txt", "text/plain"));
        assert!(file_allowed("sheet.csv", "text/csv"));

        // Extension and MIME type must both pass.
        assert!(!file_allowed("script.sh", "text/plain"));
        assert!(!file_allowed("photo.jpg", "application/x-sh"));
        assert!(!file_allowed("noextension", "image/png"));
        assert!(!file_allowed("archive.zip", "application/zip"));
    }

    #[test]
    fn test_folder_routing_by_field() {
        assert_eq!(folder_for("profileImage", "image/png"), "users/profileImages");
        assert_eq!(folder_for("groupImage", "image/jpeg"), "users/groupImages");
        assert_eq!(folder_for("paymentImage", "image/png"), "payments/images");
    }

    #[test]
    fn test_folder_routing_for_chat_files() {
        assert_eq!(folder_for("file", "image/png"), "chats/images");
        assert_eq!(folder_for("files", "video/mp4"), "chats/videos");
        assert_eq!(folder_for("files", "audio/mpeg"), "chats/audios");
        assert_eq!(folder_for("file", "application/pdf"), "chats/pdfs");
        assert_eq!(
            folder_for("file", "application/vnd.ms-powerpoint"),
            "chats/presentations"
        );
        assert_eq!(folder_for("file", "text/plain"), "chats/text");
        assert_eq!(folder_for("file", "text/csv"), "chats/others");
    }

    #[test]
    fn test_folder_routing_fallback() {
        assert_eq!(folder_for("other", "image/gif"), "uploads/images");
        assert_eq!(folder_for("other", "application/pdf"), "uploads/pdfs");
        assert_eq!(folder_for("other", "application/octet-stream"), "uploads/others");
    }

    #[test]
    fn test_object_file_name_shape() {
        let unique = Uuid::nil();
        let name = object_file_name("My Photo (1).JPG", 1722470400000, unique);
        assert_eq!(name, format!("1722470400000-{}-My_Photo_1.jpg", unique));

        let plain = object_file_name("report.pdf", 7, unique);
        assert_eq!(plain, format!("7-{}-report.pdf", unique));
    }

    #[test]
    fn test_object_key_includes_folder() {
        let key = object_key("chats/images", "a.png");
        assert!(key.starts_with("chats/images/"));
        assert!(key.ends_with(".png"));
    }

    #[test]
    fn test_find_upload_and_attachments() {
        let uploads = vec![
            StoredUpload {
                field: "paymentImage".to_string(),
                url: "https://cdn.example.com/payments/images/r.png".to_string(),
                name: "r.png".to_string(),
                content_type: "image/png".to_string(),
                size: 10,
            },
            StoredUpload {
                field: "files".to_string(),
                url: "https://cdn.example.com/chats/images/p.jpg".to_string(),
                name: "p.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
                size: 20,
            },
        ];

        assert!(find_upload(&uploads, "paymentImage").is_some());
        assert!(find_upload(&uploads, "groupImage").is_none());

        let attachments = to_attachments(&uploads);
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[1].size, Some(20));
        assert_eq!(attachments[0].name.as_deref(), Some("r.png"));
    }
}
