use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    clients::health::HealthChecker,
    config::Config,
    models::response::{ApiResponse, PaginationMeta},
    store::{NotificationStore, Page, StoreError},
};

const MAX_PAGE_SIZE: u64 = 100;

pub struct AppState {
    store: Arc<dyn NotificationStore>,
    health_checker: Arc<HealthChecker>,
    admin_token: String,
}

pub async fn run_api_server(
    config: &Config,
    store: Arc<dyn NotificationStore>,
    health_checker: Arc<HealthChecker>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState {
        store,
        health_checker,
        admin_token: config.admin_token.clone(),
    });

    let app = Router::new()
        .route("/api/v1/notifications/{recipient_id}", get(list_notifications))
        .route(
            "/api/v1/notifications/{recipient_id}/unread/count",
            get(unread_count),
        )
        .route(
            "/api/v1/notifications/{recipient_id}/{id}/read",
            post(mark_read),
        )
        .route(
            "/api/v1/notifications/{recipient_id}/read-all",
            post(mark_all_read),
        )
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "API server started");

    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<u64>,
    size: Option<u64>,
    unread: Option<bool>,
}

fn internal_error(e: StoreError) -> Response {
    warn!(error = %e, "Store operation failed");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error(
            "internal_error".to_string(),
            "Request could not be completed".to_string(),
        )),
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error(
            "not_found".to_string(),
            "Notification not found".to_string(),
        )),
    )
        .into_response()
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(recipient_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    let page = Page::new(
        query.page.unwrap_or(1),
        query.size.unwrap_or(20).clamp(1, MAX_PAGE_SIZE),
    );
    let unread_only = query.unread.unwrap_or(false);

    let listed = if unread_only {
        state.store.find_unread_by_recipient(&recipient_id, page).await
    } else {
        state.store.find_by_recipient(&recipient_id, page).await
    };

    let notifications = match listed {
        Ok(notifications) => notifications,
        Err(e) => return internal_error(e),
    };

    let counted = if unread_only {
        state.store.count_unread(&recipient_id).await
    } else {
        state.store.count_by_recipient(&recipient_id).await
    };

    let total = match counted {
        Ok(total) => total,
        Err(e) => return internal_error(e),
    };

    let response = ApiResponse::success(notifications, "Notifications retrieved".to_string())
        .with_meta(PaginationMeta::new(total, page.page, page.size));

    (StatusCode::OK, Json(response)).into_response()
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    Path(recipient_id): Path<String>,
) -> Response {
    match state.store.count_unread(&recipient_id).await {
        Ok(count) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                serde_json::json!({ "unread": count }),
                "Unread count retrieved".to_string(),
            )),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path((recipient_id, id)): Path<(String, i64)>,
) -> Response {
    match state.store.mark_read(id, &recipient_id, Utc::now()).await {
        Ok(notification) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                notification,
                "Notification marked read".to_string(),
            )),
        )
            .into_response(),
        Err(StoreError::NotFound) => not_found(),
        Err(e) => internal_error(e),
    }
}

async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Path(recipient_id): Path<String>,
) -> Response {
    match state.store.mark_all_read(&recipient_id, Utc::now()).await {
        Ok(updated) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                serde_json::json!({ "updated": updated }),
                "Notifications marked read".to_string(),
            )),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// Admin-only composite health view. Always 200-shaped: a DOWN pipeline is
/// reported in the payload, not as a transport-level error.
async fn health_check(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let authorized = headers
        .get("x-admin-token")
        .and_then(|value| value.to_str().ok())
        .map(|token| token == state.admin_token)
        .unwrap_or(false);

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error(
                "unauthorized".to_string(),
                "Admin token required".to_string(),
            )),
        )
            .into_response();
    }

    let snapshot = state.health_checker.check_all().await;

    (StatusCode::OK, Json(snapshot)).into_response()
}
