//! Timestamped snapshots of the whole attendance store.

use crate::errors::AppError;
use crate::models::AttendanceData;
use crate::state::AppState;
use chrono::{DateTime, Duration, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::{fs, task::JoinHandle, time::MissedTickBehavior};
use tracing::{error, info, warn};

/// Automatic backups older than this are removed by [`BackupManager::cleanup`].
const AUTO_RETENTION_DAYS: i64 = 30;

const FILE_PREFIX: &str = "backup_";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Auto,
    Manual,
}

impl BackupKind {
    fn tag(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupArchive {
    pub timestamp: String,
    pub kind: BackupKind,
    #[serde(default)]
    pub description: Option<String>,
    pub data: AttendanceData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    pub filename: String,
    pub timestamp: String,
    pub kind: BackupKind,
    pub description: Option<String>,
    pub size: u64,
    pub months: usize,
}

/// Checks a client supplied name before it touches the filesystem and returns its kind.
pub fn validate_filename(filename: &str) -> Result<BackupKind, AppError> {
    let invalid = || AppError::bad_request(format!("invalid backup file name: {filename}"));

    let stem = filename
        .strip_prefix(FILE_PREFIX)
        .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
        .ok_or_else(invalid)?;
    if !stem
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid());
    }

    if stem.starts_with("auto_") {
        Ok(BackupKind::Auto)
    } else if stem.starts_with("manual_") {
        Ok(BackupKind::Manual)
    } else {
        Err(invalid())
    }
}

pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn create(
        &self,
        data: &AttendanceData,
        kind: BackupKind,
        description: Option<String>,
    ) -> Result<String, AppError> {
        self.create_at(data, kind, description, Local::now()).await
    }

    async fn create_at(
        &self,
        data: &AttendanceData,
        kind: BackupKind,
        description: Option<String>,
        at: DateTime<Local>,
    ) -> Result<String, AppError> {
        fs::create_dir_all(&self.dir).await?;

        let stamp = at.format("%Y%m%d_%H%M%S_%3f");
        let mut filename = format!("{FILE_PREFIX}{}_{stamp}{FILE_SUFFIX}", kind.tag());
        let mut suffix = 1;
        while fs::try_exists(self.dir.join(&filename)).await? {
            filename = format!("{FILE_PREFIX}{}_{stamp}-{suffix}{FILE_SUFFIX}", kind.tag());
            suffix += 1;
        }

        let archive = BackupArchive {
            timestamp: at.to_rfc3339(),
            kind,
            description: description.filter(|text| !text.trim().is_empty()),
            data: data.clone(),
        };
        fs::write(self.dir.join(&filename), serde_json::to_vec_pretty(&archive)?).await?;
        info!(file = %filename, "backup created");
        Ok(filename)
    }

    /// Newest first. Files that fail to parse are skipped.
    pub async fn list(&self) -> Result<Vec<BackupInfo>, AppError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut backups: Vec<(DateTime<FixedOffset>, BackupInfo)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().to_string();
            if validate_filename(&filename).is_err() {
                continue;
            }
            match self.describe(&filename).await {
                Ok(info) => backups.push(info),
                Err(err) => warn!(file = %filename, "skipping unreadable backup: {err}"),
            }
        }

        backups.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(backups.into_iter().map(|(_, info)| info).collect())
    }

    async fn describe(
        &self,
        filename: &str,
    ) -> Result<(DateTime<FixedOffset>, BackupInfo), Box<dyn std::error::Error + Send + Sync>>
    {
        let bytes = fs::read(self.dir.join(filename)).await?;
        let archive: BackupArchive = serde_json::from_slice(&bytes)?;
        let created = DateTime::parse_from_rfc3339(&archive.timestamp)?;
        Ok((
            created,
            BackupInfo {
                filename: filename.to_string(),
                timestamp: archive.timestamp,
                kind: archive.kind,
                description: archive.description,
                size: bytes.len() as u64,
                months: archive.data.months.len(),
            },
        ))
    }

    /// Raw archive bytes, for downloads.
    pub async fn read(&self, filename: &str) -> Result<Vec<u8>, AppError> {
        validate_filename(filename)?;
        match fs::read(self.dir.join(filename)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found(format!("backup not found: {filename}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn load(&self, filename: &str) -> Result<AttendanceData, AppError> {
        let bytes = self.read(filename).await?;
        let archive: BackupArchive = serde_json::from_slice(&bytes)
            .map_err(|err| AppError::bad_request(format!("backup {filename} is corrupt: {err}")))?;
        Ok(archive.data)
    }

    /// Manual backups can only be removed by hand on the server.
    pub async fn delete(&self, filename: &str) -> Result<(), AppError> {
        if validate_filename(filename)? == BackupKind::Manual {
            return Err(AppError::forbidden("manual backups cannot be deleted"));
        }
        match fs::remove_file(self.dir.join(filename)).await {
            Ok(()) => {
                info!(file = %filename, "backup deleted");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found(format!("backup not found: {filename}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Removes automatic backups past retention and returns how many were deleted.
    pub async fn cleanup(&self) -> Result<usize, AppError> {
        self.cleanup_at(Local::now()).await
    }

    async fn cleanup_at(&self, now: DateTime<Local>) -> Result<usize, AppError> {
        let cutoff = now - Duration::days(AUTO_RETENTION_DAYS);
        let mut removed = 0;
        for backup in self.list().await? {
            if backup.kind != BackupKind::Auto {
                continue;
            }
            let expired = DateTime::parse_from_rfc3339(&backup.timestamp)
                .is_ok_and(|created| created < cutoff);
            if expired {
                fs::remove_file(self.dir.join(&backup.filename)).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "old automatic backups removed");
        }
        Ok(removed)
    }
}

/// Takes an automatic backup every `period`; ticks missed while busy are skipped.
pub fn spawn_scheduler(state: AppState, period: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(err) = state
                .snapshot(BackupKind::Auto, Some("scheduled backup".to_string()))
                .await
            {
                error!("scheduled backup failed: {}", err.message);
            }
            if let Err(err) = state.backups.cleanup().await {
                error!("backup cleanup failed: {}", err.message);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttendanceData {
        let mut data = AttendanceData::default();
        data.add_member(2025, 3, "Kim", "pacer");
        data
    }

    #[test]
    fn file_names_are_validated() {
        assert_eq!(
            validate_filename("backup_auto_20250301_120000_000.json").unwrap(),
            BackupKind::Auto
        );
        assert_eq!(
            validate_filename("backup_manual_20250301_120000_000-1.json").unwrap(),
            BackupKind::Manual
        );
        assert!(validate_filename("../backup_auto_x.json").is_err());
        assert!(validate_filename("backup_auto_../../etc.json").is_err());
        assert!(validate_filename("backup_other_1.json").is_err());
        assert!(validate_filename("state.json").is_err());
    }

    #[tokio::test]
    async fn create_list_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path().join("backups"));
        let older = Local::now() - Duration::hours(1);

        let first = manager
            .create_at(&sample(), BackupKind::Auto, None, older)
            .await
            .unwrap();
        let second = manager
            .create(&AttendanceData::default(), BackupKind::Manual, Some("before import".into()))
            .await
            .unwrap();

        let listed = manager.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].filename, second);
        assert_eq!(listed[0].description.as_deref(), Some("before import"));
        assert_eq!(listed[1].filename, first);
        assert_eq!(listed[1].months, 1);

        assert_eq!(manager.load(&first).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn same_instant_gets_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path());
        let at = Local::now();
        let a = manager.create_at(&sample(), BackupKind::Auto, None, at).await.unwrap();
        let b = manager.create_at(&sample(), BackupKind::Auto, None, at).await.unwrap();
        assert_ne!(a, b);
        assert!(validate_filename(&b).is_ok());
    }

    #[tokio::test]
    async fn manual_backups_cannot_be_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path());
        let manual = manager
            .create(&sample(), BackupKind::Manual, None)
            .await
            .unwrap();
        let auto = manager.create(&sample(), BackupKind::Auto, None).await.unwrap();

        let err = manager.delete(&manual).await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::FORBIDDEN);
        manager.delete(&auto).await.unwrap();

        let err = manager.delete(&auto).await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
        assert_eq!(manager.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cleanup_only_removes_old_automatic_backups() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path());
        let now = Local::now();
        let old = now - Duration::days(45);

        manager.create_at(&sample(), BackupKind::Auto, None, old).await.unwrap();
        let old_manual = manager
            .create_at(&sample(), BackupKind::Manual, None, old)
            .await
            .unwrap();
        let recent = manager
            .create_at(&sample(), BackupKind::Auto, None, now - Duration::days(3))
            .await
            .unwrap();

        assert_eq!(manager.cleanup_at(now).await.unwrap(), 1);
        let remaining: Vec<String> = manager
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.filename)
            .collect();
        assert_eq!(remaining, vec![recent, old_manual]);
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path().join("never-created"));
        assert!(manager.list().await.unwrap().is_empty());
        let err = manager.read("backup_auto_1.json").await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }
}
