//! Whole-store views returned to the client.

use serde::{Deserialize, Serialize};

use super::{ActivityLog, Announcement, Certificate, Coordinator, Event, Registration};

/// Every collection the entity store owns, as of one read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllData {
    pub events: Vec<Event>,
    pub registrations: Vec<Registration>,
    pub announcements: Vec<Announcement>,
    pub coordinators: Vec<Coordinator>,
    pub certificates: Vec<Certificate>,
    pub activity_logs: Vec<ActivityLog>,
}

/// Dashboard counters derived from the activity log and collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_users: usize,
    pub total_events: usize,
    pub total_registrations: usize,
    pub total_announcements: usize,
    pub recent_activity: Vec<ActivityLog>,
}

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: u64,
    pub generated_at: String,
}

/// Seed rows inserted on a cold start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub events: usize,
    pub coordinators: usize,
    pub announcements: usize,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        self.events == 0 && self.coordinators == 0 && self.announcements == 0
    }
}
