//! Multipart form bodies carrying text fields and one optional image.

use std::collections::HashMap;

use axum::extract::Multipart;

use crate::error::ApiError;

/// Images are capped at 10 MiB.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// An uploaded image held in memory until the background upload takes it.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// The text fields of a form and the image sent under `image_field`.
#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, String>,
    pub image: Option<ImageFile>,
}

impl Form {
    /// Reads the whole body. Any part named `image_field` must be an image.
    pub async fn read(mut multipart: Multipart, image_field: &str) -> Result<Self, ApiError> {
        let mut form = Form::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == image_field {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !content_type.starts_with("image/") {
                    return Err(ApiError::BadRequest(
                        "Only image uploads are allowed".to_string(),
                    ));
                }
                let bytes = field.bytes().await?;
                if bytes.len() > MAX_IMAGE_BYTES {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "Image must be at most {} MB",
                        MAX_IMAGE_BYTES / (1024 * 1024)
                    )));
                }
                if !bytes.is_empty() {
                    form.image = Some(ImageFile {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// Returns a text field, or `""` when it was not sent.
    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or_default()
    }

    /// Parses a boolean field; `None` when absent or not a boolean.
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.text(name).trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}
