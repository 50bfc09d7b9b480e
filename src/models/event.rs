//! Event model and the listing filter used by the events page.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A club event students can register for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Calendar date, `YYYY-MM-DD`
    #[serde(default)]
    pub date: String,
    /// Free-form start time, e.g. "10:00 AM"
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Allowed team size, e.g. "1-4"
    #[serde(default)]
    pub team_size: String,
    #[serde(default)]
    pub price: u32,
    pub max_participants: u32,
    /// Maintained by the entity store; never accepted from callers
    #[serde(default)]
    pub registered_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_form_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Event {
    pub fn is_full(&self) -> bool {
        self.registered_count >= self.max_participants
    }

    pub fn available_slots(&self) -> u32 {
        self.max_participants.saturating_sub(self.registered_count)
    }
}

/// Request body for creating a new event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub team_size: String,
    #[serde(default)]
    pub price: u32,
    pub max_participants: u32,
    #[serde(default)]
    pub google_form_url: Option<String>,
}

/// Request body for updating an existing event.
///
/// `registeredCount` is deliberately absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_participants: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_form_url: Option<String>,
}

/// Sort order for event listings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventSort {
    #[default]
    Date,
    Name,
    Price,
}

/// Listing filter: category, free-text search and sort order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    /// Category name, or "all"
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: Option<EventSort>,
}

impl EventQuery {
    /// Filter and sort a snapshot of events.
    pub fn apply(&self, events: Vec<Event>) -> Vec<Event> {
        let category = self
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"))
            .map(str::to_lowercase);
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut result: Vec<Event> = events
            .into_iter()
            .filter(|event| match &category {
                Some(c) => event.category.to_lowercase() == *c,
                None => true,
            })
            .filter(|event| match &search {
                Some(term) => {
                    event.title.to_lowercase().contains(term)
                        || event.description.to_lowercase().contains(term)
                }
                None => true,
            })
            .collect();

        match self.sort.unwrap_or_default() {
            EventSort::Date => result.sort_by(|a, b| compare_dates(&a.date, &b.date)),
            EventSort::Name => result.sort_by(|a, b| a.title.cmp(&b.title)),
            EventSort::Price => result.sort_by_key(|e| e.price),
        }

        result
    }
}

/// Unparseable dates sort after valid ones.
fn compare_dates(a: &str, b: &str) -> Ordering {
    let parse = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
