//! Activity log model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of mutation an activity entry records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    EventAdded,
    EventUpdated,
    EventDeleted,
    AnnouncementAdded,
    AnnouncementUpdated,
    AnnouncementDeleted,
    CoordinatorAdded,
    CoordinatorUpdated,
    CoordinatorDeleted,
    CertificateIssued,
    EventRegistration,
    ProfileUpdated,
    UserRegistered,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::EventAdded => "event_added",
            ActivityAction::EventUpdated => "event_updated",
            ActivityAction::EventDeleted => "event_deleted",
            ActivityAction::AnnouncementAdded => "announcement_added",
            ActivityAction::AnnouncementUpdated => "announcement_updated",
            ActivityAction::AnnouncementDeleted => "announcement_deleted",
            ActivityAction::CoordinatorAdded => "coordinator_added",
            ActivityAction::CoordinatorUpdated => "coordinator_updated",
            ActivityAction::CoordinatorDeleted => "coordinator_deleted",
            ActivityAction::CertificateIssued => "certificate_issued",
            ActivityAction::EventRegistration => "event_registration",
            ActivityAction::ProfileUpdated => "profile_updated",
            ActivityAction::UserRegistered => "user_registered",
        }
    }
}

/// An append-only audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    #[serde(default)]
    pub id: String,
    pub action: ActivityAction,
    pub user_id: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub timestamp: String,
}

/// Query parameters for the activity listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityQuery {
    #[serde(default)]
    pub action: Option<ActivityAction>,
}
