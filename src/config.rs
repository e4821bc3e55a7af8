use std::{env, path::PathBuf, time::Duration};
use tracing::warn;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_PATH: &str = "data/attendance.json";
const DEFAULT_BACKUP_DIR: &str = "data/backups";
const DEFAULT_BACKUP_INTERVAL_HOURS: u64 = 24;
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_GITHUB_BRANCH: &str = "main";
const DEFAULT_GITHUB_FILE_PATH: &str = "data/attendance.json";

/// Where the remote copy of the store lives.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_url: String,
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub file_path: String,
}

impl GithubConfig {
    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_interval: Duration,
    pub github: Option<GithubConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = parse_or(var("PORT"), "PORT", DEFAULT_PORT);
        let hours = parse_or(
            var("BACKUP_INTERVAL_HOURS"),
            "BACKUP_INTERVAL_HOURS",
            DEFAULT_BACKUP_INTERVAL_HOURS,
        )
        .max(1);

        let github = match (var("GITHUB_TOKEN"), var("GITHUB_REPO")) {
            (Some(token), Some(slug)) => match slug.trim().split_once('/') {
                Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => {
                    Some(GithubConfig {
                        api_url: var("GITHUB_API_URL")
                            .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string())
                            .trim_end_matches('/')
                            .to_string(),
                        token: token.trim().to_string(),
                        owner: owner.to_string(),
                        repo: repo.to_string(),
                        branch: var("GITHUB_BRANCH")
                            .unwrap_or_else(|| DEFAULT_GITHUB_BRANCH.to_string()),
                        file_path: var("GITHUB_FILE_PATH")
                            .unwrap_or_else(|| DEFAULT_GITHUB_FILE_PATH.to_string()),
                    })
                }
                _ => {
                    warn!("GITHUB_REPO must look like owner/repo, got {slug:?}; using local storage");
                    None
                }
            },
            _ => None,
        };

        Self {
            port,
            data_path: PathBuf::from(
                var("APP_DATA_PATH").unwrap_or_else(|| DEFAULT_DATA_PATH.to_string()),
            ),
            backup_dir: PathBuf::from(
                var("BACKUP_DIR").unwrap_or_else(|| DEFAULT_BACKUP_DIR.to_string()),
            ),
            backup_interval: Duration::from_secs(hours.saturating_mul(60 * 60)),
            github,
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring invalid {key}={raw:?}");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_use_local_storage() {
        let config = config(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.data_path, PathBuf::from("data/attendance.json"));
        assert_eq!(config.backup_interval, Duration::from_secs(24 * 3600));
        assert!(config.github.is_none());
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let config = config(&[("PORT", "eighty"), ("BACKUP_INTERVAL_HOURS", "0")]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.backup_interval, Duration::from_secs(3600));
    }

    #[test]
    fn huge_backup_interval_saturates() {
        let hours = u64::MAX.to_string();
        let config = config(&[("BACKUP_INTERVAL_HOURS", hours.as_str())]);
        assert_eq!(config.backup_interval, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn github_requires_token_and_repo() {
        assert!(config(&[("GITHUB_TOKEN", "t")]).github.is_none());
        assert!(config(&[("GITHUB_TOKEN", "t"), ("GITHUB_REPO", "norepo")]).github.is_none());

        let github = config(&[
            ("GITHUB_TOKEN", "t"),
            ("GITHUB_REPO", "club/attendance"),
            ("GITHUB_API_URL", "http://127.0.0.1:9/"),
        ])
        .github
        .unwrap();
        assert_eq!(github.repo_slug(), "club/attendance");
        assert_eq!(github.api_url, "http://127.0.0.1:9");
        assert_eq!(github.branch, "main");
        assert_eq!(github.file_path, "data/attendance.json");
    }
}
