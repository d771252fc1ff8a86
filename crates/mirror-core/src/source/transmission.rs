//! Transmission daemon as the torrent engine, over its JSON-RPC interface.
//!
//! The daemon must be able to write to the job workspace (same host, same user
//! or a shared directory).

use std::path::Path;
use std::sync::Mutex;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{TorrentEngine, TorrentHandle, TorrentState, TorrentStatus};
use crate::config::TorrentConfig;
use crate::error::MirrorError;
use crate::http::{json_request, HttpOptions, Method};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

/// `tr_stat_errtype` value for local (fatal) errors.
const ERROR_LOCAL: i64 = 3;
const STATUS_SEED_WAIT: i64 = 5;
const STATUS_SEED: i64 = 6;

const STATUS_FIELDS: &[&str] = &[
    "hashString",
    "name",
    "status",
    "error",
    "errorString",
    "metadataPercentComplete",
    "sizeWhenDone",
    "leftUntilDone",
    "rateDownload",
];

#[derive(Debug, Deserialize)]
struct RpcReply {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddedTorrent {
    hash_string: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTorrent {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: i64,
    #[serde(default)]
    error: i64,
    #[serde(default)]
    error_string: String,
    #[serde(default)]
    metadata_percent_complete: f64,
    #[serde(default)]
    size_when_done: u64,
    #[serde(default)]
    left_until_done: u64,
    #[serde(default)]
    rate_download: u64,
}

impl RpcTorrent {
    fn into_status(self) -> TorrentStatus {
        if self.error == ERROR_LOCAL {
            let reason = if self.error_string.is_empty() {
                "torrent engine reported a local error".to_string()
            } else {
                self.error_string
            };
            return TorrentStatus {
                state: TorrentState::Failed(reason),
                name: None,
                total_bytes: None,
                bytes_done: 0,
                download_rate: 0,
            };
        }
        if self.metadata_percent_complete < 1.0 {
            return TorrentStatus {
                state: TorrentState::Metadata,
                name: None,
                total_bytes: None,
                bytes_done: 0,
                download_rate: self.rate_download,
            };
        }
        let done = self.size_when_done.saturating_sub(self.left_until_done);
        let complete = matches!(self.status, STATUS_SEED_WAIT | STATUS_SEED)
            || (self.size_when_done > 0 && self.left_until_done == 0);
        TorrentStatus {
            state: if complete {
                TorrentState::Complete
            } else {
                TorrentState::Downloading
            },
            name: Some(self.name),
            total_bytes: Some(self.size_when_done),
            bytes_done: done,
            download_rate: self.rate_download,
        }
    }
}

/// [`TorrentEngine`] backed by a running `transmission-daemon`.
pub struct TransmissionEngine {
    rpc_url: String,
    opts: HttpOptions,
    session_id: Mutex<Option<String>>,
}

impl TransmissionEngine {
    pub fn new(rpc_url: impl Into<String>, opts: HttpOptions) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            opts,
            session_id: Mutex::new(None),
        }
    }

    pub fn from_config(cfg: &TorrentConfig) -> Self {
        let mut opts = HttpOptions::api();
        if let Some(user) = &cfg.username {
            opts = opts.with_credentials(user.clone(), cfg.password.clone().unwrap_or_default());
        }
        Self::new(cfg.rpc_url.clone(), opts)
    }

    fn current_session(&self) -> Option<String> {
        match self.session_id.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_session(&self, id: String) {
        match self.session_id.lock() {
            Ok(mut g) => *g = Some(id),
            Err(poisoned) => *poisoned.into_inner() = Some(id),
        }
    }

    /// One RPC call. A 409 carries a fresh session id; the call is retried once with it.
    fn call(&self, method: &str, arguments: Value) -> Result<Value, MirrorError> {
        let body = json!({ "method": method, "arguments": arguments });
        for _ in 0..2 {
            let headers: Vec<(String, String)> = self
                .current_session()
                .map(|id| vec![(SESSION_HEADER.to_string(), id)])
                .unwrap_or_default();
            let resp = json_request(Method::Post, &self.rpc_url, &headers, Some(&body), &self.opts)
                .map_err(|e| MirrorError::DownloadFailed(format!("torrent engine: {}", e)))?;
            if resp.code == 409 {
                match resp.headers.get(SESSION_HEADER) {
                    Some(id) => {
                        tracing::debug!("transmission session id refreshed");
                        self.store_session(id.to_string());
                        continue;
                    }
                    None => break,
                }
            }
            if !resp.is_success() {
                return Err(MirrorError::DownloadFailed(format!(
                    "torrent engine {} returned HTTP {}",
                    method, resp.code
                )));
            }
            return decode_reply(method, &resp.body);
        }
        Err(MirrorError::DownloadFailed(format!(
            "torrent engine {}: session handshake failed",
            method
        )))
    }
}

fn decode_reply(method: &str, body: &[u8]) -> Result<Value, MirrorError> {
    let reply: RpcReply = serde_json::from_slice(body)
        .map_err(|e| MirrorError::DownloadFailed(format!("torrent engine {}: bad reply: {}", method, e)))?;
    if reply.result != "success" {
        return Err(MirrorError::DownloadFailed(format!(
            "torrent engine {}: {}",
            method, reply.result
        )));
    }
    Ok(reply.arguments)
}

fn parse_added(arguments: &Value) -> Result<AddedTorrent, MirrorError> {
    let entry = arguments
        .get("torrent-added")
        .or_else(|| arguments.get("torrent-duplicate"))
        .ok_or_else(|| MirrorError::DownloadFailed("torrent-add reply has no torrent".into()))?;
    serde_json::from_value(entry.clone())
        .map_err(|e| MirrorError::DownloadFailed(format!("torrent-add reply: {}", e)))
}

fn parse_status(arguments: &Value) -> Result<TorrentStatus, MirrorError> {
    #[derive(Deserialize)]
    struct Torrents {
        #[serde(default)]
        torrents: Vec<RpcTorrent>,
    }
    let parsed: Torrents = serde_json::from_value(arguments.clone())
        .map_err(|e| MirrorError::DownloadFailed(format!("torrent-get reply: {}", e)))?;
    parsed
        .torrents
        .into_iter()
        .next()
        .map(RpcTorrent::into_status)
        .ok_or_else(|| MirrorError::DownloadFailed("torrent is no longer known to the engine".into()))
}

impl TorrentEngine for TransmissionEngine {
    fn add_magnet(&self, uri: &str, save_dir: &Path) -> Result<TorrentHandle, MirrorError> {
        let args = self.call(
            "torrent-add",
            json!({
                "filename": uri,
                "download-dir": save_dir.to_string_lossy(),
                "paused": false,
            }),
        )?;
        let added = parse_added(&args)?;
        tracing::debug!(hash = %added.hash_string, name = ?added.name, "transmission torrent-add");
        Ok(TorrentHandle(added.hash_string))
    }

    fn status(&self, handle: &TorrentHandle) -> Result<TorrentStatus, MirrorError> {
        let args = self.call(
            "torrent-get",
            json!({ "ids": [handle.0], "fields": STATUS_FIELDS }),
        )?;
        parse_status(&args)
    }

    fn remove(&self, handle: &TorrentHandle) -> Result<(), MirrorError> {
        self.call(
            "torrent-remove",
            json!({ "ids": [handle.0], "delete-local-data": false }),
        )?;
        Ok(())
    }
}
