//! Participation certificate model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    #[default]
    Issued,
}

/// A certificate issued to a student for an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub event_name: String,
    pub issued_at: String,
    #[serde(default)]
    pub status: CertificateStatus,
}

/// Request body for issuing a certificate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCertificateRequest {
    pub user_id: String,
    pub event_name: String,
}
