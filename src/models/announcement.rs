//! Announcement model.

use serde::{Deserialize, Serialize};

/// A notice shown on the portal's announcement strip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    #[serde(default)]
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub urgent: bool,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub date: String,
}

/// Request body for creating a new announcement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnouncementRequest {
    pub message: String,
    #[serde(default)]
    pub urgent: bool,
    /// Defaults to today
    #[serde(default)]
    pub date: Option<String>,
}

/// Request body for updating an existing announcement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnnouncementRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}
