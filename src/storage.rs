use crate::config::Config;
use crate::errors::AppError;
use crate::github::{GithubClient, GithubError};
use crate::models::{AttendanceData, GithubStatusResponse};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{error, info, warn};

/// What a save actually reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Local,
    Synced { sha: String },
    /// Durable on disk but the remote copy is behind.
    LocalOnly { reason: String },
}

impl SaveOutcome {
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::LocalOnly { reason } => {
                Some(format!("saved locally, GitHub sync failed: {reason}"))
            }
            _ => None,
        }
    }
}

/// The attendance document as one JSON file on disk.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files load as an empty store.
    pub async fn load(&self) -> AttendanceData {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(data) => data,
                Err(err) => {
                    error!("failed to parse data file {}: {err}", self.path.display());
                    AttendanceData::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("no data file at {}, starting empty", self.path.display());
                AttendanceData::default()
            }
            Err(err) => {
                error!("failed to read data file {}: {err}", self.path.display());
                AttendanceData::default()
            }
        }
    }

    pub async fn save(&self, data: &AttendanceData) -> Result<(), AppError> {
        let payload = serde_json::to_vec_pretty(data)?;
        self.write_bytes(&payload).await
    }

    async fn write_bytes(&self, payload: &[u8]) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, payload).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RemoteState {
    sha: Option<String>,
    connected: bool,
    last_sync: Option<DateTime<Local>>,
    last_error: Option<String>,
}

impl RemoteState {
    fn record_success(&mut self, sha: String) {
        self.sha = Some(sha);
        self.connected = true;
        self.last_sync = Some(Local::now());
        self.last_error = None;
    }

    fn record_failure(&mut self, err: &GithubError) {
        // A stale sha still means GitHub answered.
        self.connected = matches!(err, GithubError::Conflict(_));
        self.last_error = Some(err.to_string());
    }
}

/// The attendance document as one file in a GitHub repository, mirrored to disk.
pub struct RemoteStore {
    client: GithubClient,
    local: LocalStore,
    state: Mutex<RemoteState>,
}

impl RemoteStore {
    pub fn new(client: GithubClient, local: LocalStore) -> Self {
        Self {
            client,
            local,
            state: Mutex::new(RemoteState::default()),
        }
    }

    pub async fn load(&self) -> AttendanceData {
        match self.client.get_file().await {
            Ok(file) => {
                let data = match serde_json::from_slice(&file.content) {
                    Ok(data) => data,
                    Err(err) => {
                        error!("remote data file is not valid JSON: {err}; using local copy");
                        self.state.lock().await.sha = Some(file.sha);
                        return self.local.load().await;
                    }
                };
                info!(sha = %file.sha, "loaded data from GitHub");
                self.state.lock().await.record_success(file.sha);
                if let Err(err) = self.local.write_bytes(&file.content).await {
                    warn!("failed to mirror remote data locally: {}", err.message);
                }
                data
            }
            Err(err) if err.is_not_found() => {
                info!("remote data file missing, creating it");
                let data = AttendanceData::default();
                if let Err(err) = self.save(&data, "Initialize attendance data").await {
                    error!("failed to create data file: {}", err.message);
                }
                data
            }
            Err(err) => {
                warn!("GitHub unavailable ({err}), loading local copy");
                self.state.lock().await.record_failure(&err);
                self.local.load().await
            }
        }
    }

    /// Writes with the last known sha; never retries a rejected write.
    pub async fn save(&self, data: &AttendanceData, message: &str) -> Result<SaveOutcome, AppError> {
        let payload = serde_json::to_vec_pretty(data)?;
        let mut state = self.state.lock().await;
        let result = self
            .client
            .put_file(&payload, message, state.sha.as_deref())
            .await;

        match result {
            Ok(sha) => {
                state.record_success(sha.clone());
                drop(state);
                self.local.write_bytes(&payload).await?;
                Ok(SaveOutcome::Synced { sha })
            }
            Err(err) => {
                warn!("GitHub save failed, keeping local copy only: {err}");
                state.record_failure(&err);
                drop(state);
                self.local.write_bytes(&payload).await?;
                Ok(SaveOutcome::LocalOnly {
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Refreshes the sha from GitHub and pushes `data` over the remote copy.
    pub async fn sync(&self, data: &AttendanceData) -> Result<String, GithubError> {
        let payload = serde_json::to_vec_pretty(data)
            .map_err(|err| GithubError::InvalidResponse(err.to_string()))?;
        let mut state = self.state.lock().await;

        let current = match self.client.get_file().await {
            Ok(file) => Some(file.sha),
            Err(err) if err.is_not_found() => None,
            Err(err) => {
                state.record_failure(&err);
                return Err(err);
            }
        };

        match self
            .client
            .put_file(&payload, "Sync attendance data", current.as_deref())
            .await
        {
            Ok(sha) => {
                state.record_success(sha.clone());
                Ok(sha)
            }
            Err(err) => {
                state.record_failure(&err);
                Err(err)
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    /// Probes the repository and reports the tracked sync state.
    pub async fn status(&self) -> GithubStatusResponse {
        let probe = self.client.check_repository().await;
        let mut state = self.state.lock().await;
        match probe {
            Ok(()) => state.connected = true,
            Err(err) => state.record_failure(&err),
        }

        let config = self.client.config();
        GithubStatusResponse {
            enabled: true,
            connected: state.connected,
            repo: Some(config.repo_slug()),
            branch: Some(config.branch.clone()),
            path: Some(config.file_path.clone()),
            sha: state.sha.clone(),
            last_sync: state.last_sync.map(|at| at.to_rfc3339()),
            last_error: state.last_error.clone(),
        }
    }

    /// The sha the next write will be checked against.
    pub async fn tracked_sha(&self) -> Option<String> {
        self.state.lock().await.sha.clone()
    }
}

/// Storage backend, fixed at startup.
pub enum Persistence {
    Local(LocalStore),
    Remote(RemoteStore),
}

impl Persistence {
    pub fn from_config(config: &Config) -> Self {
        let local = LocalStore::new(config.data_path.clone());
        let Some(github) = config.github.clone() else {
            return Self::Local(local);
        };
        match GithubClient::new(github) {
            Ok(client) => {
                info!(repo = %client.config().repo_slug(), "using GitHub storage");
                Self::Remote(RemoteStore::new(client, local))
            }
            Err(err) => {
                error!("failed to build GitHub client ({err}), using local storage");
                Self::Local(local)
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Remote(_) => "github",
        }
    }

    pub fn remote(&self) -> Option<&RemoteStore> {
        match self {
            Self::Remote(remote) => Some(remote),
            Self::Local(_) => None,
        }
    }

    pub async fn load(&self) -> AttendanceData {
        match self {
            Self::Local(local) => local.load().await,
            Self::Remote(remote) => remote.load().await,
        }
    }

    pub async fn save(&self, data: &AttendanceData, message: &str) -> Result<SaveOutcome, AppError> {
        match self {
            Self::Local(local) => {
                local.save(data).await?;
                Ok(SaveOutcome::Local)
            }
            Self::Remote(remote) => remote.save(data, message).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GithubConfig;

    fn sample() -> AttendanceData {
        let mut data = AttendanceData::default();
        data.add_member(2025, 3, "Kim", "pacer");
        data
    }

    #[tokio::test]
    async fn local_round_trip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("nested/data.json"));

        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await, sample());
    }

    #[tokio::test]
    async fn persisted_document_is_the_month_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("data.json"));
        store.save(&sample()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["2025-03"]["Kim"]["role"], "pacer");
        assert_eq!(raw["2025-03"]["Kim"]["order"], 0);
    }

    #[tokio::test]
    async fn missing_or_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = LocalStore::new(dir.path().join("absent.json"));
        assert_eq!(missing.load().await, AttendanceData::default());

        let corrupt_path = dir.path().join("corrupt.json");
        std::fs::write(&corrupt_path, b"{ not json").unwrap();
        assert_eq!(LocalStore::new(corrupt_path).load().await, AttendanceData::default());
    }

    #[tokio::test]
    async fn unreachable_github_falls_back_to_local() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(dir.path().join("data.json"));
        local.save(&sample()).await.unwrap();

        let client = GithubClient::new(GithubConfig {
            api_url: "http://127.0.0.1:1".into(),
            token: "token".into(),
            owner: "club".into(),
            repo: "attendance".into(),
            branch: "main".into(),
            file_path: "data.json".into(),
        })
        .unwrap();
        let remote = RemoteStore::new(client, local.clone());

        assert_eq!(remote.load().await, sample());
        assert!(!remote.is_connected().await);

        let mut updated = sample();
        updated.add_member(2025, 3, "Lee", "photo");
        let outcome = remote.save(&updated, "Add member").await.unwrap();
        assert!(matches!(outcome, SaveOutcome::LocalOnly { .. }));
        assert!(outcome.warning().is_some());
        assert_eq!(local.load().await, updated);
        assert_eq!(remote.tracked_sha().await, None);
    }
}
