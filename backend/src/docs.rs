#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    handlers::{
        admin::{FeedStatusResponse, SessionSearchQuery},
        sessions::SessionBoardResponse,
    },
    models::{
        identity::{AccessScope, UserRole},
        session::{MentorRef, SessionStatus},
        session_payload::{SessionCard, SessionPayload, SessionResponse},
    },
    services::{
        live_sessions::FeedStatus,
        session_status::{SessionAction, SessionLabel},
    },
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        my_sessions_doc,
        admin_list_sessions_doc,
        admin_create_session_doc,
        admin_update_session_doc,
        admin_delete_session_doc,
        admin_feed_status_doc,
        admin_retry_feed_doc
    ),
    components(
        schemas(
            // board
            SessionBoardResponse,
            SessionCard,
            SessionAction,
            SessionLabel,
            FeedStatus,
            // admin
            SessionPayload,
            SessionResponse,
            SessionSearchQuery,
            FeedStatusResponse,
            // shared
            MentorRef,
            SessionStatus,
            UserRole,
            AccessScope
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Sessions", description = "Student session board"),
        (name = "Admin", description = "Session management and live feed control")
    ),
    security(("BearerAuth" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();

        let mut bearer = Http::new(HttpAuthScheme::Bearer);
        bearer.bearer_format = Some("JWT".to_string());

        components.add_security_scheme("BearerAuth", SecurityScheme::Http(bearer));
    }
}

#[utoipa::path(
    get,
    path = "/api/sessions",
    responses(
        (status = 200, description = "Featured, upcoming and past sessions", body = SessionBoardResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "Sessions"
)]
fn my_sessions_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/sessions",
    params(SessionSearchQuery),
    responses(
        (status = 200, body = [SessionResponse]),
        (status = 403, description = "Caller is not an admin")
    ),
    tag = "Admin"
)]
fn admin_list_sessions_doc() {}

#[utoipa::path(
    post,
    path = "/api/admin/sessions",
    request_body = SessionPayload,
    responses(
        (status = 201, body = SessionResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Permission denied"),
        (status = 503, description = "Session store unavailable")
    ),
    tag = "Admin"
)]
fn admin_create_session_doc() {}

#[utoipa::path(
    put,
    path = "/api/admin/sessions/{id}",
    params(("id" = String, Path, description = "Session ID")),
    request_body = SessionPayload,
    responses(
        (status = 200, body = SessionResponse),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Session not found")
    ),
    tag = "Admin"
)]
fn admin_update_session_doc() {}

#[utoipa::path(
    delete,
    path = "/api/admin/sessions/{id}",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, body = serde_json::Value),
        (status = 404, description = "Session not found")
    ),
    tag = "Admin"
)]
fn admin_delete_session_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/sessions/feed",
    responses((status = 200, body = FeedStatusResponse)),
    tag = "Admin"
)]
fn admin_feed_status_doc() {}

#[utoipa::path(
    post,
    path = "/api/admin/sessions/feed/retry",
    responses(
        (status = 202, description = "Reconnect requested", body = FeedStatusResponse),
        (status = 400, description = "Feed is already live")
    ),
    tag = "Admin"
)]
fn admin_retry_feed_doc() {}
