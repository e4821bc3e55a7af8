use crate::backup::{BackupInfo, BackupKind};
use crate::dates::{meeting_dates_of, month_key};
use crate::errors::AppError;
use crate::models::{
    AttendanceRequest, BackupCreateRequest, BackupCreatedResponse, BackupRestoreRequest,
    FullExport, GithubHealth, GithubStatusResponse, HealthResponse, ImportRequest, MemberRequest,
    MonthExport, MonthRequest, MonthRoster, MonthlyReport, NumberInput, OrdersRequest,
    SyncResponse, UNASSIGNED_ROLE, WriteResponse,
};
use crate::roster::{parse_import, AttendanceKey};
use crate::state::AppState;
use crate::stats::build_monthly_report;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Local;
use tracing::{info, warn};

const EXPORT_VERSION: &str = "1.0";

type JsonBody<T> = Result<Json<T>, JsonRejection>;

fn validate_year_month(year: Option<i64>, month: Option<i64>) -> Result<(i32, u32), AppError> {
    let year = year
        .filter(|year| (1..=9999).contains(year))
        .ok_or_else(|| AppError::bad_request("year must be an integer between 1 and 9999"))?;
    let month = month
        .filter(|month| (1..=12).contains(month))
        .ok_or_else(|| AppError::bad_request("month must be an integer between 1 and 12"))?;
    Ok((year as i32, month as u32))
}

fn body_year_month(year: &NumberInput, month: &NumberInput) -> Result<(i32, u32), AppError> {
    validate_year_month(year.as_i64(), month.as_i64())
}

fn path_year_month(year: &str, month: &str) -> Result<(i32, u32), AppError> {
    validate_year_month(year.trim().parse().ok(), month.trim().parse().ok())
}

fn required_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name is required"));
    }
    Ok(name)
}

fn role_or_default(role: &str) -> &str {
    match role.trim() {
        "" => UNASSIGNED_ROLE,
        role => role,
    }
}

fn member_missing(name: &str, year: i32, month: u32) -> AppError {
    AppError::bad_request(format!("member {name} not found in {}", month_key(year, month)))
}

pub async fn get_members(
    State(state): State<AppState>,
    Path((year, month)): Path<(String, String)>,
) -> Result<Json<MonthRoster>, AppError> {
    let (year, month) = path_year_month(&year, &month)?;
    let mut data = state.data.lock().await;
    if data.ensure_month(year, month) {
        let key = month_key(year, month);
        state.persist(&data, &format!("Initialize {key}")).await?;
    }
    Ok(Json(data.roster(year, month).cloned().unwrap_or_default()))
}

pub async fn add_member(
    State(state): State<AppState>,
    body: JsonBody<MemberRequest>,
) -> Result<Json<WriteResponse>, AppError> {
    let Json(payload) = body?;
    let (year, month) = body_year_month(&payload.year, &payload.month)?;
    let name = required_name(&payload.name)?;
    let role = role_or_default(&payload.role);
    let key = month_key(year, month);

    let mut data = state.data.lock().await;
    if !data.add_member(year, month, name, role) {
        return Err(AppError::bad_request(format!("member {name} already exists in {key}")));
    }
    let outcome = state
        .persist(&data, &format!("Add member {name} to {key}"))
        .await?;
    info!(month = %key, member = %name, "member added");
    Ok(Json(WriteResponse::ok(outcome.warning())))
}

pub async fn delete_member(
    State(state): State<AppState>,
    Path((year, month, name)): Path<(String, String, String)>,
) -> Result<Json<WriteResponse>, AppError> {
    let (year, month) = path_year_month(&year, &month)?;
    let name = required_name(&name)?;

    let mut data = state.data.lock().await;
    if !data.delete_member(year, month, name) {
        return Err(member_missing(name, year, month));
    }
    let key = month_key(year, month);
    let outcome = state
        .persist(&data, &format!("Remove member {name} from {key}"))
        .await?;
    info!(month = %key, member = %name, "member deleted");
    Ok(Json(WriteResponse::ok(outcome.warning())))
}

pub async fn update_role(
    State(state): State<AppState>,
    body: JsonBody<MemberRequest>,
) -> Result<Json<WriteResponse>, AppError> {
    let Json(payload) = body?;
    let (year, month) = body_year_month(&payload.year, &payload.month)?;
    let name = required_name(&payload.name)?;
    let role = role_or_default(&payload.role);

    let mut data = state.data.lock().await;
    if !data.set_role(year, month, name, role) {
        return Err(member_missing(name, year, month));
    }
    let outcome = state
        .persist(&data, &format!("Change role of {name} to {role}"))
        .await?;
    Ok(Json(WriteResponse::ok(outcome.warning())))
}

pub async fn update_orders(
    State(state): State<AppState>,
    body: JsonBody<OrdersRequest>,
) -> Result<Json<WriteResponse>, AppError> {
    let Json(payload) = body?;
    let (year, month) = body_year_month(&payload.year, &payload.month)?;
    let key = month_key(year, month);

    let mut data = state.data.lock().await;
    if !data.reorder(year, month, &payload.orders) {
        return Err(AppError::bad_request(format!("no roster for {key}")));
    }
    let outcome = state
        .persist(&data, &format!("Reorder members of {key}"))
        .await?;
    Ok(Json(WriteResponse::ok(outcome.warning())))
}

pub async fn copy_previous_month(
    State(state): State<AppState>,
    body: JsonBody<MonthRequest>,
) -> Result<Json<WriteResponse>, AppError> {
    let Json(payload) = body?;
    let (year, month) = body_year_month(&payload.year, &payload.month)?;
    let key = month_key(year, month);

    let mut data = state.data.lock().await;
    if !data.copy_previous_month(year, month) {
        return Err(AppError::bad_request(format!(
            "no members in the month before {key}"
        )));
    }
    let outcome = state
        .persist(&data, &format!("Copy previous month into {key}"))
        .await?;
    info!(month = %key, "roster copied from previous month");
    Ok(Json(WriteResponse::ok(outcome.warning())))
}

pub async fn set_attendance(
    State(state): State<AppState>,
    body: JsonBody<AttendanceRequest>,
) -> Result<Json<WriteResponse>, AppError> {
    let Json(payload) = body?;
    let (year, month) = body_year_month(&payload.year, &payload.month)?;
    let name = required_name(&payload.name)?;
    let key = AttendanceKey::parse(&payload.date).ok_or_else(|| {
        AppError::bad_request(format!(
            "date must be YYYY-MM-DD or extra1-extra3, got {:?}",
            payload.date
        ))
    })?;
    let status = match payload.status.as_i64() {
        Some(0) => 0,
        Some(1) => 1,
        _ => return Err(AppError::bad_request("status must be 0 or 1")),
    };

    let mut data = state.data.lock().await;
    if !data.set_attendance(year, month, name, &key, status) {
        return Err(member_missing(name, year, month));
    }
    let outcome = state
        .persist(
            &data,
            &format!("Set attendance of {name} on {} to {status}", payload.date.trim()),
        )
        .await?;
    Ok(Json(WriteResponse::ok(outcome.warning())))
}

pub async fn monthly_report(
    State(state): State<AppState>,
    Path((year, month)): Path<(String, String)>,
) -> Result<Json<MonthlyReport>, AppError> {
    let (year, month) = path_year_month(&year, &month)?;
    let data = state.data.lock().await;
    Ok(Json(build_monthly_report(&data, year, month)))
}

pub async fn meeting_dates(
    Path((year, month)): Path<(String, String)>,
) -> Result<Json<Vec<String>>, AppError> {
    let (year, month) = path_year_month(&year, &month)?;
    Ok(Json(meeting_dates_of(year, month)))
}

pub async fn export_all(State(state): State<AppState>) -> Json<FullExport> {
    let data = state.data.lock().await;
    Json(FullExport {
        export_date: Local::now().to_rfc3339(),
        version: EXPORT_VERSION.to_string(),
        data: data.clone(),
    })
}

pub async fn export_month(
    State(state): State<AppState>,
    Path((year, month)): Path<(String, String)>,
) -> Result<Json<MonthExport>, AppError> {
    let (year, month) = path_year_month(&year, &month)?;
    let data = state.data.lock().await;
    Ok(Json(MonthExport {
        export_date: Local::now().to_rfc3339(),
        version: EXPORT_VERSION.to_string(),
        year,
        month,
        members: data.roster(year, month).cloned().unwrap_or_default(),
    }))
}

pub async fn import_month(
    State(state): State<AppState>,
    body: JsonBody<ImportRequest>,
) -> Result<(StatusCode, Json<WriteResponse>), AppError> {
    let Json(payload) = body?;
    let (year, month) = body_year_month(&payload.year, &payload.month)?;
    let key = month_key(year, month);

    let roster = match parse_import(&payload.data) {
        Ok(roster) => roster,
        Err(err) => {
            warn!(month = %key, "import rejected: {err}");
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(WriteResponse::failed(err.to_string())),
            ));
        }
    };

    let mut data = state.data.lock().await;
    state
        .backups
        .create(&data, BackupKind::Auto, Some(format!("before importing {key}")))
        .await?;
    let count = data.replace_month(year, month, roster);
    let outcome = state
        .persist(&data, &format!("Import {count} members into {key}"))
        .await?;
    info!(month = %key, count, "month imported");
    Ok((StatusCode::OK, Json(WriteResponse::ok(outcome.warning()))))
}

pub async fn create_backup(
    State(state): State<AppState>,
    body: Option<Json<BackupCreateRequest>>,
) -> Result<Json<BackupCreatedResponse>, AppError> {
    let description = body.and_then(|Json(request)| request.description);
    let filename = state.snapshot(BackupKind::Manual, description).await?;
    Ok(Json(BackupCreatedResponse {
        success: true,
        filename,
    }))
}

pub async fn list_backups(State(state): State<AppState>) -> Result<Json<Vec<BackupInfo>>, AppError> {
    Ok(Json(state.backups.list().await?))
}

pub async fn restore_backup(
    State(state): State<AppState>,
    body: JsonBody<BackupRestoreRequest>,
) -> Result<Json<WriteResponse>, AppError> {
    let Json(payload) = body?;
    let filename = payload.filename.trim();
    let restored = state.backups.load(filename).await?;

    let mut data = state.data.lock().await;
    state
        .backups
        .create(&data, BackupKind::Auto, Some(format!("before restoring {filename}")))
        .await?;
    *data = restored;
    let outcome = state
        .persist(&data, &format!("Restore backup {filename}"))
        .await?;
    info!(file = %filename, "backup restored");
    Ok(Json(WriteResponse::ok(outcome.warning())))
}

pub async fn download_backup(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = state.backups.read(&filename).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

pub async fn delete_backup(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<WriteResponse>, AppError> {
    state.backups.delete(&filename).await?;
    Ok(Json(WriteResponse::ok(None)))
}

pub async fn github_status(State(state): State<AppState>) -> Json<GithubStatusResponse> {
    match state.persistence.remote() {
        Some(remote) => Json(remote.status().await),
        None => Json(GithubStatusResponse {
            enabled: false,
            connected: false,
            repo: None,
            branch: None,
            path: None,
            sha: None,
            last_sync: None,
            last_error: None,
        }),
    }
}

pub async fn github_sync(State(state): State<AppState>) -> Result<Json<SyncResponse>, AppError> {
    let remote = state
        .persistence
        .remote()
        .ok_or_else(|| AppError::bad_request("GitHub storage is not enabled"))?;

    let data = state.data.lock().await;
    let sha = remote.sync(&data).await.map_err(AppError::internal)?;
    info!(sha = %sha, "data synced to GitHub");
    Ok(Json(SyncResponse { success: true, sha }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = match state.persistence.remote() {
        Some(remote) => remote.is_connected().await,
        None => false,
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Local::now().to_rfc3339(),
        storage: state.persistence.kind().to_string(),
        github: GithubHealth {
            configured: state.persistence.remote().is_some(),
            connected,
        },
    })
}
