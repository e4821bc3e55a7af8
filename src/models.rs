use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Role given to members whose role is missing from an imported payload.
pub const UNASSIGNED_ROLE: &str = "unassigned";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberRecord {
    #[serde(default = "unassigned_role")]
    pub role: String,
    #[serde(default)]
    pub attendance: BTreeMap<String, u8>,
    #[serde(default, rename = "extraAttendance")]
    pub extra_attendance: BTreeMap<String, u8>,
    #[serde(default)]
    pub order: i64,
}

impl MemberRecord {
    pub fn new(role: impl Into<String>, order: i64) -> Self {
        Self {
            role: role.into(),
            attendance: BTreeMap::new(),
            extra_attendance: BTreeMap::new(),
            order,
        }
    }
}

fn unassigned_role() -> String {
    UNASSIGNED_ROLE.to_string()
}

/// Members in the order they were added to the month.
pub type MonthRoster = IndexMap<String, MemberRecord>;

/// The whole persisted document: month key to roster.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct AttendanceData {
    pub months: BTreeMap<String, MonthRoster>,
}

/// A year, month or status as sent by clients: either a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberInput {
    Int(i64),
    Text(String),
}

impl NumberInput {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MonthRequest {
    pub year: NumberInput,
    pub month: NumberInput,
}

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub year: NumberInput,
    pub month: NumberInput,
    pub name: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderUpdate {
    pub name: String,
    pub order: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrdersRequest {
    pub year: NumberInput,
    pub month: NumberInput,
    pub orders: Vec<OrderUpdate>,
}

#[derive(Debug, Deserialize)]
pub struct AttendanceRequest {
    pub year: NumberInput,
    pub month: NumberInput,
    pub name: String,
    pub date: String,
    pub status: NumberInput,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub year: NumberInput,
    pub month: NumberInput,
    pub data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriteResponse {
    pub fn ok(warning: Option<String>) -> Self {
        Self {
            success: true,
            warning,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            warning: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MemberStats {
    pub regular: u32,
    pub wednesday: u32,
    pub extra: u32,
    pub total: u32,
    pub required_total: u32,
    pub required_wednesday: u32,
    pub meets_requirement: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemberReport {
    pub name: String,
    pub role: String,
    pub order: i64,
    pub attendance: BTreeMap<String, u8>,
    #[serde(rename = "extraAttendance")]
    pub extra_attendance: BTreeMap<String, u8>,
    pub stats: MemberStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_members: usize,
    pub meeting_count: usize,
    pub meeting_requirement: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub year: i32,
    pub month: u32,
    pub dates: Vec<String>,
    pub members: Vec<MemberReport>,
    pub summary: ReportSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FullExport {
    #[serde(rename = "exportDate")]
    pub export_date: String,
    pub version: String,
    pub data: AttendanceData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MonthExport {
    #[serde(rename = "exportDate")]
    pub export_date: String,
    pub version: String,
    pub year: i32,
    pub month: u32,
    pub members: MonthRoster,
}

#[derive(Debug, Deserialize)]
pub struct BackupCreateRequest {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BackupRestoreRequest {
    pub filename: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupCreatedResponse {
    pub success: bool,
    pub filename: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GithubHealth {
    pub configured: bool,
    pub connected: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: String,
    pub github: GithubHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GithubStatusResponse {
    pub enabled: bool,
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    pub sha: String,
}
