//! Entity store: the six portal collections, mirrored live from the document store.
//!
//! Every collection is held as the latest full snapshot pushed by the document store. Queries
//! read those snapshots and never touch persistence. Mutations go out as one atomic
//! [`WriteBatch`] each, followed by a best-effort activity entry.

mod seed;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;

use crate::activity::{newest_first, ActivityRecorder};
use crate::db::{
    decode_all, to_fields, Collection, Document, DocumentStore, Filter, Snapshot, Subscription, WriteBatch,
};
use crate::errors::AppError;
use crate::models::{
    non_blank, timestamp_now, today, ActivityAction, ActivityLog, AllData, Analytics,
    Announcement, Certificate, CertificateStatus, Coordinator, CreateAnnouncementRequest,
    CreateCoordinatorRequest, CreateEventRequest, Event, EventQuery, IssueCertificateRequest,
    PaymentStatus, ProfileUpdateRequest, Registration, RegistrationRequest, RegistrationStatus,
    SeedReport, UpdateAnnouncementRequest, UpdateCoordinatorRequest, UpdateEventRequest,
    UserRecord,
};

/// Collections mirrored by the entity store. `users` is written but never watched.
pub const WATCHED: [Collection; 6] = [
    Collection::Events,
    Collection::Registrations,
    Collection::Announcements,
    Collection::Coordinators,
    Collection::Certificates,
    Collection::ActivityLogs,
];

/// Entries shown in the analytics "recent activity" list.
const RECENT_ACTIVITY: usize = 5;

pub struct EntityStore {
    docs: Arc<dyn DocumentStore>,
    activity: ActivityRecorder,
    views: Vec<Subscription>,
    revision: Arc<AtomicU64>,
    watchers: Vec<JoinHandle<()>>,
}

impl EntityStore {
    /// Subscribe to every watched collection and start the revision watchers.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn start(docs: Arc<dyn DocumentStore>) -> Self {
        let revision = Arc::new(AtomicU64::new(0));
        let views = WATCHED.iter().map(|c| docs.watch(*c)).collect();

        let watchers = WATCHED
            .into_iter()
            .map(|collection| {
                let mut sub = docs.watch(collection);
                let revision = revision.clone();
                tokio::spawn(async move {
                    while let Some(snapshot) = sub.changed().await {
                        let rev = revision.fetch_add(1, Ordering::SeqCst) + 1;
                        tracing::debug!(
                            collection = collection.name(),
                            documents = snapshot.len(),
                            revision = rev,
                            "Collection snapshot replaced"
                        );
                    }
                })
            })
            .collect();

        tracing::info!(storage = docs.kind(), "Entity store started");

        Self {
            activity: ActivityRecorder::new(docs.clone()),
            docs,
            views,
            revision,
            watchers,
        }
    }

    /// Storage variant in use.
    pub fn kind(&self) -> &'static str {
        self.docs.kind()
    }

    /// Number of snapshot pushes observed since start.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Insert the fixed sample rows into whichever of events, coordinators and announcements
    /// are empty.
    ///
    /// Each collection is checked with a one-shot query, so two processes starting together
    /// against one empty database can both seed it. Seeding logs no activity.
    pub async fn seed_if_empty(&self) -> Result<SeedReport, AppError> {
        Ok(SeedReport {
            events: self.seed_collection(Collection::Events, &seed::events()).await?,
            coordinators: self
                .seed_collection(Collection::Coordinators, &seed::coordinators())
                .await?,
            announcements: self
                .seed_collection(Collection::Announcements, &seed::announcements())
                .await?,
        })
    }

    async fn seed_collection<T: Serialize>(
        &self,
        collection: Collection,
        rows: &[T],
    ) -> Result<usize, AppError> {
        if !self.docs.query(collection, &Filter::All).await?.is_empty() {
            tracing::debug!(collection = collection.name(), "Collection already populated");
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        for row in rows {
            batch = batch.insert(collection, to_fields(row)?);
        }
        self.docs.commit(batch).await?;

        tracing::info!(collection = collection.name(), count = rows.len(), "Seeded empty collection");
        Ok(rows.len())
    }

    fn snapshot(&self, collection: Collection) -> Snapshot {
        match self.views.iter().find(|v| v.collection() == collection) {
            Some(view) => view.current(),
            None => self.docs.watch(collection).current(),
        }
    }

    fn entities<T: DeserializeOwned>(&self, collection: Collection) -> Vec<T> {
        decode_all(collection, &self.snapshot(collection))
    }

    fn find<T: DeserializeOwned>(&self, collection: Collection, id: &str) -> Option<T> {
        let snapshot = self.snapshot(collection);
        let doc = snapshot.iter().find(|doc| doc.id == id)?;
        match doc.decode() {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!(collection = collection.name(), %id, "Malformed document: {}", e);
                None
            }
        }
    }

    /// Register `user_id` for `event_id`.
    ///
    /// The registration insert and the `registeredCount` increment commit together, and the
    /// batch itself rejects a duplicate pair or a full event, so concurrent callers cannot
    /// overbook or double-register.
    pub async fn register_for_event(
        &self,
        user_id: &str,
        event_id: &str,
        data: RegistrationRequest,
    ) -> Result<Registration, AppError> {
        if user_id.trim().is_empty() {
            return Err(AppError::Unauthorized(
                "Sign in to register for events".to_string(),
            ));
        }

        let duplicate = self
            .entities::<Registration>(Collection::Registrations)
            .iter()
            .any(|r| r.user_id == user_id && r.event_id == event_id);
        if duplicate {
            return Err(AppError::AlreadyRegistered);
        }

        let event: Event = self
            .find(Collection::Events, event_id)
            .ok_or_else(|| not_found("Event", event_id))?;
        if event.is_full() {
            return Err(AppError::EventFull);
        }

        let mut registration = Registration {
            id: String::new(),
            user_id: user_id.to_string(),
            event_id: event_id.to_string(),
            registered_at: timestamp_now(),
            status: RegistrationStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            name: non_blank(data.name),
            email: non_blank(data.email),
            phone: non_blank(data.phone),
            team_name: non_blank(data.team_name),
        };

        let batch = WriteBatch::new()
            .insert_unique(
                Collection::Registrations,
                to_fields(&registration)?,
                &["userId", "eventId"],
            )
            .increment_bounded(
                Collection::Events,
                event_id,
                "registeredCount",
                "maxParticipants",
            );

        let ids = self.docs.commit(batch).await.map_err(|e| match e {
            AppError::Conflict(_) => AppError::AlreadyRegistered,
            AppError::LimitReached(_) => AppError::EventFull,
            AppError::NotFound(_) => not_found("Event", event_id),
            other => other,
        })?;
        registration.id = first_id(ids)?;

        tracing::info!(
            %user_id,
            %event_id,
            registration_id = %registration.id,
            slots_left = event.available_slots().saturating_sub(1),
            "Registered for event"
        );

        self.activity
            .record_best_effort(
                ActivityAction::EventRegistration,
                user_id,
                json!({
                    "eventId": event_id,
                    "eventName": event.title,
                    "registrationId": registration.id,
                }),
            )
            .await;

        Ok(registration)
    }

    pub fn get_user_registrations(&self, user_id: &str) -> Vec<Registration> {
        self.entities::<Registration>(Collection::Registrations)
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect()
    }

    pub fn get_event_registrations(&self, event_id: &str) -> Vec<Registration> {
        self.entities::<Registration>(Collection::Registrations)
            .into_iter()
            .filter(|r| r.event_id == event_id)
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.entities(Collection::Events)
    }

    /// Events filtered and sorted for the listing page.
    pub fn list_events(&self, query: &EventQuery) -> Vec<Event> {
        query.apply(self.events())
    }

    pub fn get_event(&self, id: &str) -> Result<Event, AppError> {
        self.find(Collection::Events, id)
            .ok_or_else(|| not_found("Event", id))
    }

    /// Create an event. `registeredCount` always starts at zero.
    pub async fn add_event(&self, actor: &str, request: CreateEventRequest) -> Result<Event, AppError> {
        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("Event title is required".to_string()));
        }
        if request.max_participants == 0 {
            return Err(AppError::Validation(
                "maxParticipants must be greater than zero".to_string(),
            ));
        }

        let mut event = Event {
            id: String::new(),
            title,
            description: request.description,
            date: request.date.trim().to_string(),
            time: request.time,
            venue: request.venue,
            category: request.category,
            image: non_blank(request.image),
            team_size: request.team_size,
            price: request.price,
            max_participants: request.max_participants,
            registered_count: 0,
            google_form_url: non_blank(request.google_form_url),
            created_by: Some(actor.to_string()),
        };
        event.id = self.docs.insert(Collection::Events, to_fields(&event)?).await?;

        tracing::info!(event_id = %event.id, title = %event.title, "Event added");
        self.activity
            .record_best_effort(
                ActivityAction::EventAdded,
                actor,
                json!({"eventId": event.id, "eventName": event.title}),
            )
            .await;

        Ok(event)
    }

    /// Patch an event.
    ///
    /// `maxParticipants` may not drop below the current `registeredCount`; the check runs
    /// inside the same batch as the patch.
    pub async fn update_event(
        &self,
        actor: &str,
        id: &str,
        mut request: UpdateEventRequest,
    ) -> Result<Event, AppError> {
        let current = self.get_event(id)?;

        if let Some(title) = request.title.take() {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(AppError::Validation("Event title is required".to_string()));
            }
            request.title = Some(title);
        }

        let mut batch = WriteBatch::new();
        if let Some(max) = request.max_participants {
            if max == 0 {
                return Err(AppError::Validation(
                    "maxParticipants must be greater than zero".to_string(),
                ));
            }
            if max < current.registered_count {
                return Err(below_registered(current.registered_count));
            }
            batch = batch.guard(Collection::Events, id, "registeredCount", u64::from(max));
        }
        batch = batch.update(Collection::Events, id, to_fields(&request)?);

        self.docs.commit(batch).await.map_err(|e| match e {
            AppError::LimitReached(_) => below_registered(current.registered_count),
            AppError::NotFound(_) => not_found("Event", id),
            other => other,
        })?;

        let updated = self.get_event(id)?;
        tracing::info!(event_id = %id, "Event updated");
        self.activity
            .record_best_effort(
                ActivityAction::EventUpdated,
                actor,
                json!({"eventId": id, "eventName": updated.title}),
            )
            .await;

        Ok(updated)
    }

    /// Delete an event together with every registration for it.
    pub async fn delete_event(&self, actor: &str, id: &str) -> Result<(), AppError> {
        let title = self
            .find::<Event>(Collection::Events, id)
            .map(|e| e.title)
            .unwrap_or_else(|| "Unknown Event".to_string());
        let removed = self.get_event_registrations(id).len();

        let batch = WriteBatch::new()
            .delete(Collection::Events, id)
            .delete_where(
                Collection::Registrations,
                Filter::field_equals("eventId", id),
            );
        self.docs.commit(batch).await.map_err(|e| match e {
            AppError::NotFound(_) => not_found("Event", id),
            other => other,
        })?;

        tracing::info!(event_id = %id, registrations_removed = removed, "Event deleted");
        self.activity
            .record_best_effort(
                ActivityAction::EventDeleted,
                actor,
                json!({"eventId": id, "eventName": title, "registrationsRemoved": removed}),
            )
            .await;

        Ok(())
    }

    pub fn announcements(&self) -> Vec<Announcement> {
        self.entities(Collection::Announcements)
    }

    /// Post an announcement. The date defaults to today.
    pub async fn add_announcement(
        &self,
        actor: &str,
        request: CreateAnnouncementRequest,
    ) -> Result<Announcement, AppError> {
        let message = required(&request.message, "Announcement message is required")?;

        let mut announcement = Announcement {
            id: String::new(),
            message,
            urgent: request.urgent,
            date: non_blank(request.date).unwrap_or_else(today),
        };
        announcement.id = self
            .docs
            .insert(Collection::Announcements, to_fields(&announcement)?)
            .await?;

        self.activity
            .record_best_effort(
                ActivityAction::AnnouncementAdded,
                actor,
                json!({"announcementId": announcement.id, "message": announcement.message}),
            )
            .await;

        Ok(announcement)
    }

    pub async fn update_announcement(
        &self,
        actor: &str,
        id: &str,
        mut request: UpdateAnnouncementRequest,
    ) -> Result<Announcement, AppError> {
        if let Some(message) = request.message.take() {
            request.message = Some(required(&message, "Announcement message is required")?);
        }

        let updated: Announcement = self
            .patch(Collection::Announcements, "Announcement", id, to_fields(&request)?)
            .await?;

        self.activity
            .record_best_effort(
                ActivityAction::AnnouncementUpdated,
                actor,
                json!({"announcementId": id, "message": updated.message}),
            )
            .await;

        Ok(updated)
    }

    pub async fn delete_announcement(&self, actor: &str, id: &str) -> Result<(), AppError> {
        let message = self
            .find::<Announcement>(Collection::Announcements, id)
            .map(|a| a.message)
            .unwrap_or_else(|| "Unknown Announcement".to_string());

        self.remove(Collection::Announcements, "Announcement", id).await?;

        self.activity
            .record_best_effort(
                ActivityAction::AnnouncementDeleted,
                actor,
                json!({"announcementId": id, "message": message}),
            )
            .await;

        Ok(())
    }

    pub fn coordinators(&self) -> Vec<Coordinator> {
        self.entities(Collection::Coordinators)
    }

    pub async fn add_coordinator(
        &self,
        actor: &str,
        request: CreateCoordinatorRequest,
    ) -> Result<Coordinator, AppError> {
        let name = required(&request.name, "Coordinator name is required")?;

        let mut coordinator = Coordinator {
            id: String::new(),
            name,
            department: request.department,
            role: request.role,
            phone: request.phone,
            email: request.email.trim().to_string(),
            photo: non_blank(request.photo),
        };
        coordinator.id = self
            .docs
            .insert(Collection::Coordinators, to_fields(&coordinator)?)
            .await?;

        self.activity
            .record_best_effort(
                ActivityAction::CoordinatorAdded,
                actor,
                json!({"coordinatorId": coordinator.id, "name": coordinator.name}),
            )
            .await;

        Ok(coordinator)
    }

    pub async fn update_coordinator(
        &self,
        actor: &str,
        id: &str,
        mut request: UpdateCoordinatorRequest,
    ) -> Result<Coordinator, AppError> {
        if let Some(name) = request.name.take() {
            request.name = Some(required(&name, "Coordinator name is required")?);
        }

        let updated: Coordinator = self
            .patch(Collection::Coordinators, "Coordinator", id, to_fields(&request)?)
            .await?;

        self.activity
            .record_best_effort(
                ActivityAction::CoordinatorUpdated,
                actor,
                json!({"coordinatorId": id, "name": updated.name}),
            )
            .await;

        Ok(updated)
    }

    pub async fn delete_coordinator(&self, actor: &str, id: &str) -> Result<(), AppError> {
        let name = self
            .find::<Coordinator>(Collection::Coordinators, id)
            .map(|c| c.name)
            .unwrap_or_else(|| "Unknown Coordinator".to_string());

        self.remove(Collection::Coordinators, "Coordinator", id).await?;

        self.activity
            .record_best_effort(
                ActivityAction::CoordinatorDeleted,
                actor,
                json!({"coordinatorId": id, "name": name}),
            )
            .await;

        Ok(())
    }

    pub fn certificates(&self) -> Vec<Certificate> {
        self.entities(Collection::Certificates)
    }

    pub fn user_certificates(&self, user_id: &str) -> Vec<Certificate> {
        self.certificates()
            .into_iter()
            .filter(|c| c.user_id == user_id)
            .collect()
    }

    /// Issue a certificate. The activity entry is attributed to the recipient.
    pub async fn issue_certificate(
        &self,
        request: IssueCertificateRequest,
    ) -> Result<Certificate, AppError> {
        let user_id = required(&request.user_id, "userId is required")?;
        let event_name = required(&request.event_name, "eventName is required")?;

        let mut certificate = Certificate {
            id: String::new(),
            user_id,
            event_name,
            issued_at: timestamp_now(),
            status: CertificateStatus::Issued,
        };
        certificate.id = self
            .docs
            .insert(Collection::Certificates, to_fields(&certificate)?)
            .await?;

        tracing::info!(certificate_id = %certificate.id, user_id = %certificate.user_id, "Certificate issued");
        self.activity
            .record_best_effort(
                ActivityAction::CertificateIssued,
                &certificate.user_id,
                json!({"certificateId": certificate.id, "eventName": certificate.event_name}),
            )
            .await;

        Ok(certificate)
    }

    /// Patch the user record written at registration, if there is one.
    ///
    /// Returns the updated record, or `None` for accounts that predate user records.
    pub async fn update_profile(
        &self,
        user_id: &str,
        request: ProfileUpdateRequest,
    ) -> Result<Option<UserRecord>, AppError> {
        let request = ProfileUpdateRequest {
            name: non_blank(request.name),
            email: non_blank(request.email).map(|e| e.to_lowercase()),
        };
        if request.name.is_none() && request.email.is_none() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }
        let patch = to_fields(&request)?;

        let records = self
            .docs
            .query(Collection::Users, &Filter::field_equals("uid", user_id))
            .await?;

        let mut batch = WriteBatch::new();
        for record in &records {
            batch = batch.update(Collection::Users, &record.id, patch.clone());
        }
        self.docs.commit(batch).await?;

        let updated = match records.first() {
            Some(record) => {
                let mut data = record.data.clone();
                data.extend(patch.clone());
                Some(Document::new(record.id.clone(), data).decode::<UserRecord>()?)
            }
            None => {
                tracing::debug!(%user_id, "No user record to patch");
                None
            }
        };

        self.activity
            .record_best_effort(ActivityAction::ProfileUpdated, user_id, Value::Object(patch))
            .await;

        Ok(updated)
    }

    /// Activity entries newest first, optionally limited to one action.
    pub fn activity_log(&self, action: Option<ActivityAction>) -> Vec<ActivityLog> {
        let mut logs: Vec<ActivityLog> = self
            .entities::<ActivityLog>(Collection::ActivityLogs)
            .into_iter()
            .filter(|log| action.map_or(true, |a| log.action == a))
            .collect();
        newest_first(&mut logs);
        logs
    }

    pub fn analytics(&self) -> Analytics {
        let logs = self.activity_log(None);
        Analytics {
            total_users: logs
                .iter()
                .filter(|l| l.action == ActivityAction::UserRegistered)
                .count(),
            total_events: self.snapshot(Collection::Events).len(),
            total_registrations: logs
                .iter()
                .filter(|l| l.action == ActivityAction::EventRegistration)
                .count(),
            total_announcements: self.snapshot(Collection::Announcements).len(),
            recent_activity: logs.into_iter().take(RECENT_ACTIVITY).collect(),
        }
    }

    /// Owned copy of every collection, activity newest first.
    pub fn get_all_data(&self) -> AllData {
        AllData {
            events: self.events(),
            registrations: self.entities(Collection::Registrations),
            announcements: self.announcements(),
            coordinators: self.coordinators(),
            certificates: self.certificates(),
            activity_logs: self.activity_log(None),
        }
    }

    async fn patch<T: DeserializeOwned>(
        &self,
        collection: Collection,
        what: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<T, AppError> {
        self.docs
            .update(collection, id, patch)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => not_found(what, id),
                other => other,
            })?;
        tracing::info!(collection = collection.name(), %id, "Document updated");
        self.find(collection, id).ok_or_else(|| not_found(what, id))
    }

    async fn remove(&self, collection: Collection, what: &str, id: &str) -> Result<(), AppError> {
        self.docs
            .delete(collection, id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => not_found(what, id),
                other => other,
            })?;
        tracing::info!(collection = collection.name(), %id, "Document deleted");
        Ok(())
    }
}

impl Drop for EntityStore {
    fn drop(&mut self) {
        for watcher in &self.watchers {
            watcher.abort();
        }
    }
}

fn not_found(what: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{} {} not found", what, id))
}

fn below_registered(registered: u32) -> AppError {
    AppError::Validation(format!(
        "maxParticipants cannot be lower than the {} existing registrations",
        registered
    ))
}

fn required(value: &str, message: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        Err(AppError::Validation(message.to_string()))
    } else {
        Ok(value.to_string())
    }
}

fn first_id(ids: Vec<String>) -> Result<String, AppError> {
    ids.into_iter()
        .next()
        .ok_or_else(|| AppError::Internal("Insert returned no id".to_string()))
}
