use crate::backup::{BackupKind, BackupManager};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::AttendanceData;
use crate::storage::{Persistence, SaveOutcome};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub data: Arc<Mutex<AttendanceData>>,
    pub persistence: Arc<Persistence>,
    pub backups: Arc<BackupManager>,
}

impl AppState {
    pub fn new(persistence: Persistence, backups: BackupManager, data: AttendanceData) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            persistence: Arc::new(persistence),
            backups: Arc::new(backups),
        }
    }

    /// Builds the backends from `config` and waits for the first load.
    ///
    /// Nothing can serve requests before this returns, so handlers never see
    /// an uninitialised store. A failed load degrades to an empty store.
    pub async fn initialize(config: &Config) -> Self {
        let persistence = Persistence::from_config(config);
        let data = persistence.load().await;
        Self::new(persistence, BackupManager::new(config.backup_dir.clone()), data)
    }

    pub async fn persist(
        &self,
        data: &AttendanceData,
        message: &str,
    ) -> Result<SaveOutcome, AppError> {
        self.persistence.save(data, message).await
    }

    /// Backs up the current in-memory store.
    pub async fn snapshot(
        &self,
        kind: BackupKind,
        description: Option<String>,
    ) -> Result<String, AppError> {
        let data = self.data.lock().await.clone();
        self.backups.create(&data, kind, description).await
    }
}
