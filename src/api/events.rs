//! Event API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::auth::{require_admin, require_user};
use crate::models::{
    CreateEventRequest, Event, EventQuery, Registration, RegistrationRequest, UpdateEventRequest,
};
use crate::AppState;

/// GET /api/events - List events, optionally filtered by category and search text.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> ApiResult<Vec<Event>> {
    let revision_id = state.entities.revision();
    success(state.entities.list_events(&query), revision_id)
}

/// POST /api/events - Create a new event.
pub async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> ApiResult<Event> {
    let revision_id = state.entities.revision();
    let admin = match require_admin(&state.session).await {
        Ok(user) => user,
        Err(e) => return error(e, revision_id),
    };

    match state.entities.add_event(&admin.uid, request).await {
        Ok(event) => success(event, state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/events/:id - Update an event.
pub async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateEventRequest>,
) -> ApiResult<Event> {
    let revision_id = state.entities.revision();
    let admin = match require_admin(&state.session).await {
        Ok(user) => user,
        Err(e) => return error(e, revision_id),
    };

    match state.entities.update_event(&admin.uid, &id, request).await {
        Ok(event) => success(event, state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/events/:id - Delete an event and its registrations.
pub async fn delete_event(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let revision_id = state.entities.revision();
    let admin = match require_admin(&state.session).await {
        Ok(user) => user,
        Err(e) => return error(e, revision_id),
    };

    match state.entities.delete_event(&admin.uid, &id).await {
        Ok(()) => success((), state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/events/:id/registrations - Registrations for one event. Admin only.
pub async fn list_event_registrations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Registration>> {
    let revision_id = state.entities.revision();

    if let Err(e) = require_admin(&state.session).await {
        return error(e, revision_id);
    }
    if let Err(e) = state.entities.get_event(&id) {
        return error(e, revision_id);
    }
    success(state.entities.get_event_registrations(&id), revision_id)
}

/// POST /api/events/:id/registrations - Register the signed-in user.
pub async fn register_for_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<RegistrationRequest>>,
) -> ApiResult<Registration> {
    let revision_id = state.entities.revision();
    let user = match require_user(&state.session).await {
        Ok(user) => user,
        Err(e) => return error(e, revision_id),
    };
    let request = body.map(|Json(request)| request).unwrap_or_default();

    match state
        .entities
        .register_for_event(&user.uid, &id, request)
        .await
    {
        Ok(registration) => success(registration, state.entities.revision()),
        Err(e) => error(e, revision_id),
    }
}
