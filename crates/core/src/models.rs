use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Open,
    Resolved,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(RequestStatus::Open),
            "resolved" => Ok(RequestStatus::Resolved),
            other => Err(format!("Unknown request status: {}", other)),
        }
    }
}

/// Preferred messaging app for a phone number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    Whatsapp,
    Telegram,
    Both,
}

impl ContactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactType::Whatsapp => "whatsapp",
            ContactType::Telegram => "telegram",
            ContactType::Both => "both",
        }
    }
}

impl Default for ContactType {
    fn default() -> Self {
        ContactType::Whatsapp
    }
}

impl FromStr for ContactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whatsapp" => Ok(ContactType::Whatsapp),
            "telegram" => Ok(ContactType::Telegram),
            "both" => Ok(ContactType::Both),
            other => Err(format!("Unknown contact type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub profile_picture: Option<String>,
    pub primary_phone: String,
    pub primary_type: String,
    pub secondary_phone: Option<String>,
    pub secondary_type: Option<String>,
    pub is_satsangi: bool,
    pub is_ambrish: bool,
    pub department_notes: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MediaRequest {
    pub id: Uuid,
    pub request_number: String,
    pub user_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub reference_image_name: Option<String>,
    pub reference_image_drive_id: Option<String>,
    pub note: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRequest {
    pub fn status(&self) -> RequestStatus {
        self.status.parse().unwrap_or(RequestStatus::Open)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SiteSettings {
    pub drive_profile_folder: String,
    pub drive_reference_folder: String,
    pub drive_data_folder: String,
    pub updated_at: DateTime<Utc>,
}

/// An uploaded file held in memory until it is sent to storage
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
    pub primary_phone: String,
    #[serde(default)]
    pub primary_type: Option<String>,
    #[serde(default)]
    pub secondary_phone: Option<String>,
    #[serde(default)]
    pub secondary_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMediaRequestInput {
    pub customer_phone: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    #[serde(default)]
    pub note: String,
}

/// Row values for a new request, minus the number the allocator assigns
#[derive(Debug, Clone)]
pub struct NewMediaRecord {
    pub user_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub reference_image_name: Option<String>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// Fields only staff may change; `None` leaves the value untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminUserUpdate {
    pub is_satsangi: Option<bool>,
    pub is_ambrish: Option<bool>,
    pub department_notes: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSiteSettingsInput {
    pub drive_profile_folder: Option<String>,
    pub drive_reference_folder: Option<String>,
    pub drive_data_folder: Option<String>,
}

/// A request with the data-folder file that matches its number, if any
#[derive(Debug, Clone, Serialize)]
pub struct DashboardEntry {
    #[serde(flatten)]
    pub request: MediaRequest,
    pub drive_file_id: Option<String>,
    pub drive_link: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedMediaRequest {
    pub request: MediaRequest,
    /// Non-fatal problems, such as a best-effort upload that failed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
