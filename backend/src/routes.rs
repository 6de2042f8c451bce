use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{docs::ApiDoc, handlers, middleware as auth_middleware, state::AppState};

/// Builds the full API router over `state`.
pub fn router(state: AppState) -> Router {
    // Build user-protected routes (auth required)
    let user_routes = Router::new()
        .route("/api/sessions", get(handlers::sessions::my_sessions))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::auth,
        ));

    // Build admin-protected routes (auth + admin role)
    let admin_routes = Router::new()
        .route(
            "/api/admin/sessions",
            get(handlers::admin::list_sessions).post(handlers::admin::create_session),
        )
        .route(
            "/api/admin/sessions/{id}",
            put(handlers::admin::update_session).delete(handlers::admin::delete_session),
        )
        .route(
            "/api/admin/sessions/feed",
            get(handlers::admin::feed_status),
        )
        .route(
            "/api/admin/sessions/feed/retry",
            post(handlers::admin::retry_feed),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::auth_admin,
        ));

    let cors = cors_layer(&state.config.cors_allow_origins);

    Router::new()
        .merge(SwaggerUi::new("/api/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(user_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(24 * 60 * 60))
}
