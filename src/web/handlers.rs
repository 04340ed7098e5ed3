//! HTTP request handlers.

use super::presenter;
use super::AppState;
use crate::scheduler::{RefreshOutcome, SchedulerState};
use crate::session::Dashboard;

use axum::{
    extract::State,
    response::{Html, IntoResponse, Json, Redirect},
};
use serde::Serialize;

// ============================================================================
// Dashboard
// ============================================================================

pub async fn handle_dashboard(State(state): State<AppState>) -> impl IntoResponse {
    let dashboard = state.session.current().await;
    Html(presenter::render_page(&state.config.title, &dashboard))
}

// ============================================================================
// API
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub scheduler: SchedulerState,
    #[serde(flatten)]
    pub dashboard: Dashboard,
}

pub async fn handle_status_json(State(state): State<AppState>) -> impl IntoResponse {
    let dashboard = state.session.current().await;
    Json(StatusResponse {
        scheduler: state.scheduler.state(),
        dashboard: dashboard.as_ref().clone(),
    })
}

/// Manual retry. Always lands back on the dashboard.
pub async fn handle_refresh(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.refresh_now().await {
        RefreshOutcome::Completed(overall) => tracing::info!("Manual refresh: {:?}", overall),
        RefreshOutcome::Failed => tracing::warn!("Manual refresh failed"),
        RefreshOutcome::Skipped => {}
    }
    // 303 See Other.
    Redirect::to("/")
}

// ============================================================================
// Static
// ============================================================================

pub async fn handle_favicon() -> impl IntoResponse {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
        <circle cx="50" cy="50" r="45" fill="#2fa84f"/>
        <path d="M22 52 L42 70 L78 32" stroke="white" stroke-width="9" fill="none" stroke-linecap="round"/>
    </svg>"##;

    (
        [(axum::http::header::CONTENT_TYPE, "image/svg+xml")],
        svg,
    )
}
