//! Multipart form handling for registration and request submission

use axum::extract::Multipart;
use bytes::BytesMut;
use chrono::{NaiveDate, NaiveTime};
use mediadesk_core::models::UploadedFile;
use std::collections::HashMap;

use crate::error::ApiError;

/// Text fields and files of one multipart body, read fully into memory
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    /// Read every part. Files larger than `max_file_bytes` are rejected while
    /// streaming; empty file parts (a form submitted without a file) are dropped.
    pub async fn read(mut multipart: Multipart, max_file_bytes: usize) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(sanitize_filename) {
                Some(filename) => {
                    let content_type = field.content_type().map(str::to_string);
                    let mut data = BytesMut::new();
                    while let Some(chunk) = field
                        .chunk()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?
                    {
                        if data.len() + chunk.len() > max_file_bytes {
                            tracing::warn!("Upload {} exceeded {} bytes", filename, max_file_bytes);
                            return Err(ApiError::PayloadTooLarge(max_file_bytes));
                        }
                        data.extend_from_slice(&chunk);
                    }
                    if filename.is_empty() || data.is_empty() {
                        continue;
                    }
                    form.files.insert(
                        name,
                        UploadedFile {
                            filename,
                            content_type,
                            data: data.freeze(),
                        },
                    );
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Invalid field {}: {}", name, e)))?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn optional(&self, name: &str) -> Option<String> {
        self.text(name).map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
    }

    pub fn require(&self, name: &str) -> Result<&str, ApiError> {
        self.text(name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest(format!("{} is required", name)))
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    #[cfg(test)]
    pub(crate) fn from_fields(fields: &[(&str, &str)]) -> Self {
        Self {
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            files: HashMap::new(),
        }
    }
}

/// Remove characters that are unsafe in stored file names
pub fn sanitize_filename(filename: &str) -> String {
    // Browsers on some platforms send the full client path
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    base.chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string()
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("{} must be a date like 2025-03-14", field)))
}

/// Accepts `HH:MM` as sent by time inputs, or `HH:MM:SS`
pub fn parse_time(field: &str, value: &str) -> Result<NaiveTime, ApiError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ApiError::BadRequest(format!("{} must be a time like 09:30", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("photo.jpg"), "photo.jpg");
        assert_eq!(sanitize_filename("C:\\Users\\asha\\stage plan.png"), "stage plan.png");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("what?.png"), "what_.png");
        assert_eq!(sanitize_filename("..hidden"), "hidden");
        assert_eq!(sanitize_filename("bad\nname.txt"), "badname.txt");
    }

    #[test]
    fn test_parse_date_and_time() {
        assert_eq!(parse_date("date", "2025-03-14").unwrap(), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert!(parse_date("date", "14/03/2025").is_err());
        assert_eq!(parse_time("time", "09:30").unwrap(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(parse_time("time", "18:05:10").unwrap(), NaiveTime::from_hms_opt(18, 5, 10).unwrap());
        assert!(parse_time("time", "25:00").is_err());
    }

    #[test]
    fn test_required_and_optional_fields() {
        let form = MultipartForm::from_fields(&[("location", "Main hall"), ("note", "  ")]);
        assert_eq!(form.require("location").unwrap(), "Main hall");
        assert!(form.require("note").is_err());
        assert!(form.require("missing").is_err());
        assert_eq!(form.optional("note"), None);
    }
}
