use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::progress::LimitPolicy;

/// Which publishing step runs after the fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Multipart upload to an anonymous file host.
    #[default]
    FileHost,
    /// Hand the locator to a remote staging service and collect its files.
    RemoteStaging,
    /// Upload through a scripted web form in a headless browser.
    BrowserUpload,
}

/// Progress forwarding policy (`[progress]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Minimum time between forwarded notifications, in milliseconds.
    pub interval_ms: u64,
    /// When set, forward by byte delta instead of by time.
    pub min_bytes_delta: Option<u64>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            min_bytes_delta: None,
        }
    }
}

impl ProgressConfig {
    pub fn policy(&self) -> LimitPolicy {
        match self.min_bytes_delta {
            Some(delta) => LimitPolicy::ByteDelta(delta),
            None => LimitPolicy::Interval(Duration::from_millis(self.interval_ms)),
        }
    }
}

/// Plain HTTP transfer settings (`[http]`), used by the HTTP source and the file host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    /// Abort when throughput stays below this many bytes/s for `low_speed_time_secs`.
    pub low_speed_limit: u32,
    pub low_speed_time_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit: 1024,
            low_speed_time_secs: 60,
            user_agent: format!("mirror/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Local torrent engine (`[torrent]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TorrentConfig {
    /// Transmission JSON-RPC endpoint.
    pub rpc_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub metadata_poll_ms: u64,
    pub transfer_poll_ms: u64,
    /// Upper bound on the metadata wait; unbounded when missing.
    pub metadata_timeout_secs: Option<u64>,
}

impl Default for TorrentConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:9091/transmission/rpc".to_string(),
            username: None,
            password: None,
            metadata_poll_ms: 1000,
            transfer_poll_ms: 5000,
            metadata_timeout_secs: None,
        }
    }
}

/// Anonymous file host (`[file_host]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileHostConfig {
    pub endpoint: String,
    /// Multipart field carrying the file.
    pub field_name: String,
}

impl Default for FileHostConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://transfer.sh/".to_string(),
            field_name: "file".to_string(),
        }
    }
}

/// Remote staging service (`[staging]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub base_url: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub token: Option<String>,
    pub poll_secs: u64,
    /// Upper bound on waiting for the container; unbounded when missing.
    pub timeout_secs: Option<u64>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            token: None,
            poll_secs: 5,
            timeout_secs: None,
        }
    }
}

/// Scripted web-form upload (`[browser]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub page_url: String,
    pub file_input_selector: String,
    /// Clicked after the file is attached, when the page needs an explicit submit.
    pub submit_selector: Option<String>,
    pub link_selector: String,
    pub poll_ms: u64,
    pub timeout_secs: u64,
    /// Throughput assumed when synthesizing upload progress (bytes/s).
    pub assumed_rate_bytes_per_sec: u64,
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://127.0.0.1:4444".to_string(),
            page_url: "https://example.com/upload".to_string(),
            file_input_selector: "input[type=file]".to_string(),
            submit_selector: None,
            link_selector: "a.download-link".to_string(),
            poll_ms: 2000,
            timeout_secs: 600,
            assumed_rate_bytes_per_sec: 2 * 1024 * 1024,
            headless: true,
        }
    }
}

/// Global configuration loaded from `~/.config/mirror/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Publishing step to run after the fetch.
    #[serde(default)]
    pub sink: SinkKind,
    /// Root for per-job workspaces (default: `~/.cache/mirror/jobs`).
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Drop a finished job's snapshot after this many seconds; kept until the next start when missing.
    #[serde(default)]
    pub finished_retention_secs: Option<u64>,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub torrent: TorrentConfig,
    #[serde(default)]
    pub file_host: FileHostConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            download_dir: None,
            finished_retention_secs: None,
            progress: ProgressConfig::default(),
            http: HttpConfig::default(),
            torrent: TorrentConfig::default(),
            file_host: FileHostConfig::default(),
            staging: StagingConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl MirrorConfig {
    /// Root directory for job workspaces, falling back to the XDG cache dir.
    pub fn resolved_download_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.download_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("mirror")?;
        Ok(xdg_dirs.get_cache_home().join("mirror").join("jobs"))
    }

    pub fn finished_retention(&self) -> Option<Duration> {
        self.finished_retention_secs.map(Duration::from_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mirror")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MirrorConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MirrorConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MirrorConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = MirrorConfig::default();
        assert_eq!(cfg.sink, SinkKind::FileHost);
        assert_eq!(cfg.torrent.metadata_poll_ms, 1000);
        assert_eq!(cfg.torrent.transfer_poll_ms, 5000);
        assert!(cfg.torrent.metadata_timeout_secs.is_none());
        assert!(cfg.staging.timeout_secs.is_none());
        assert_eq!(cfg.file_host.endpoint, "https://transfer.sh/");
        assert!(cfg.finished_retention().is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = MirrorConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: MirrorConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.sink, cfg.sink);
        assert_eq!(parsed.progress.interval_ms, cfg.progress.interval_ms);
        assert_eq!(parsed.browser.link_selector, cfg.browser.link_selector);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: MirrorConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.sink, SinkKind::FileHost);
        assert_eq!(cfg.http.connect_timeout_secs, 30);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            sink = "remote_staging"
            download_dir = "/srv/mirror"
            finished_retention_secs = 600

            [progress]
            min_bytes_delta = 1048576

            [torrent]
            metadata_timeout_secs = 120

            [staging]
            base_url = "https://staging.example/api"
            token = "secret"
            poll_secs = 3
        "#;
        let cfg: MirrorConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.sink, SinkKind::RemoteStaging);
        assert_eq!(cfg.download_dir, Some(PathBuf::from("/srv/mirror")));
        assert_eq!(cfg.finished_retention(), Some(Duration::from_secs(600)));
        assert_eq!(cfg.progress.policy(), LimitPolicy::ByteDelta(1_048_576));
        assert_eq!(cfg.torrent.metadata_timeout_secs, Some(120));
        assert_eq!(cfg.torrent.transfer_poll_ms, 5000);
        assert_eq!(cfg.staging.token.as_deref(), Some("secret"));
        assert_eq!(cfg.staging.poll_secs, 3);
    }

    #[test]
    fn progress_defaults_to_interval_policy() {
        let cfg = ProgressConfig::default();
        assert_eq!(
            cfg.policy(),
            LimitPolicy::Interval(Duration::from_millis(1000))
        );
    }

    #[test]
    fn sink_kind_names() {
        let cfg: MirrorConfig = toml::from_str("sink = \"browser_upload\"").unwrap();
        assert_eq!(cfg.sink, SinkKind::BrowserUpload);
        assert!(toml::from_str::<MirrorConfig>("sink = \"ftp\"").is_err());
    }

    #[test]
    fn explicit_download_dir_wins() {
        let mut cfg = MirrorConfig::default();
        cfg.download_dir = Some(PathBuf::from("/tmp/mirror-jobs"));
        assert_eq!(
            cfg.resolved_download_dir().unwrap(),
            PathBuf::from("/tmp/mirror-jobs")
        );
    }
}
