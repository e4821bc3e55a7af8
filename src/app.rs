use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/members/:year/:month", get(handlers::get_members))
        .route("/api/add_member", post(handlers::add_member))
        .route("/api/member/:year/:month/:name", delete(handlers::delete_member))
        .route("/api/member_role", put(handlers::update_role))
        .route("/api/member_orders", put(handlers::update_orders))
        .route("/api/copy_previous_month", post(handlers::copy_previous_month))
        .route("/api/attendance", post(handlers::set_attendance))
        .route("/api/monthly_report/:year/:month", get(handlers::monthly_report))
        .route("/api/dates/:year/:month", get(handlers::meeting_dates))
        .route("/api/export/all", get(handlers::export_all))
        .route("/api/export/:year/:month", get(handlers::export_month))
        .route("/api/import_month_data", post(handlers::import_month))
        .route("/api/backup/create", post(handlers::create_backup))
        .route("/api/backup/list", get(handlers::list_backups))
        .route("/api/backup/restore", post(handlers::restore_backup))
        .route("/api/backup/download/:filename", get(handlers::download_backup))
        .route("/api/backup/:filename", delete(handlers::delete_backup))
        .route("/api/github/status", get(handlers::github_status))
        .route("/api/github/sync", post(handlers::github_sync))
        .with_state(state)
}
