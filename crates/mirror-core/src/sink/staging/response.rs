//! Staging service replies, decoded once at the service boundary.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::http::HttpResponse;
use crate::sink::Link;

pub type ContainerId = String;

/// Either `{"error": "..."}` or the expected payload.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reply<T> {
    Failure { error: String },
    Success(T),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct Added {
    pub container_id: ContainerId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct ContainerList {
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedFile {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl StagedFile {
    pub fn to_link(&self) -> Link {
        Link {
            display_name: self.name.clone(),
            url: self.url.clone(),
            size_bytes: self.size_bytes,
        }
    }
}

/// A torrent the service is still resolving inside a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedTorrent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
    /// Fraction done, 0.0 to 1.0.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl StagedTorrent {
    pub fn is_failed(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "error" | "failed" | "dead"
        )
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "finished" | "completed" | "complete" | "seeding"
        )
    }
}

/// A remote grouping of the files produced from one added locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub files: Vec<StagedFile>,
    #[serde(default)]
    pub torrents: Vec<StagedTorrent>,
}

fn failure_message(resp: &HttpResponse) -> String {
    let text = resp.text();
    let text = text.trim();
    if text.is_empty() {
        format!("staging service returned HTTP {}", resp.code)
    } else {
        format!("staging service returned HTTP {}: {}", resp.code, text)
    }
}

/// Decode a reply carrying a payload. A structured `{error}` wins over the status code.
pub(crate) fn decode<T: DeserializeOwned>(resp: &HttpResponse) -> Result<T, MirrorError> {
    match serde_json::from_slice::<Reply<T>>(&resp.body) {
        Ok(Reply::Failure { error }) => Err(MirrorError::RemoteService(error)),
        Ok(Reply::Success(value)) if resp.is_success() => Ok(value),
        Ok(Reply::Success(_)) => Err(MirrorError::RemoteService(failure_message(resp))),
        Err(_) if !resp.is_success() => Err(MirrorError::RemoteService(failure_message(resp))),
        Err(e) => Err(MirrorError::remote(format!("malformed staging reply: {}", e))),
    }
}

/// Decode an acknowledgement; an empty 2xx body counts as success.
pub(crate) fn decode_ack(resp: &HttpResponse) -> Result<(), MirrorError> {
    if resp.is_success() && resp.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    decode::<serde_json::Value>(resp).map(|_| ())
}
