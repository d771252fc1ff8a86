//! Control socket: server (during `mirror serve`) and client (`start`, `cancel`, `status`).
//!
//! Protocol: one command per line (`start <locator>`, `cancel <id>`,
//! `status [id]`), one JSON object per reply line. Successful replies are job
//! status payloads; failures are `{"error_kind": ..., "message": ...}`.

use anyhow::{Context, Result};
use mirror_core::{JobId, JobManager};
use serde_json::{json, Value};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Start(String),
    Cancel(JobId),
    Status(Option<JobId>),
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let id = |s: &str| s.parse::<JobId>().map_err(|_| format!("bad job id {:?}", s));
        match verb {
            "start" if !rest.is_empty() => Ok(ControlCommand::Start(rest.to_string())),
            "cancel" => Ok(ControlCommand::Cancel(id(rest)?)),
            "status" if rest.is_empty() => Ok(ControlCommand::Status(None)),
            "status" => Ok(ControlCommand::Status(Some(id(rest)?))),
            _ => Err(format!("unknown command {:?}", line)),
        }
    }

    pub fn to_line(&self) -> String {
        match self {
            ControlCommand::Start(locator) => format!("start {}\n", locator),
            ControlCommand::Cancel(id) => format!("cancel {}\n", id),
            ControlCommand::Status(Some(id)) => format!("status {}\n", id),
            ControlCommand::Status(None) => "status\n".to_string(),
        }
    }
}

fn error_reply(kind: &str, message: impl std::fmt::Display) -> Value {
    json!({ "error_kind": kind, "message": message.to_string() })
}

fn payload_of(manager: &JobManager, id: JobId) -> Value {
    match manager.status(id) {
        Ok(job) => json!(job.status_payload()),
        Err(e) => error_reply(e.kind(), e),
    }
}

/// Apply one command line to the manager and build the reply object.
pub fn handle_line(manager: &JobManager, line: &str) -> Value {
    let cmd = match ControlCommand::parse(line) {
        Ok(cmd) => cmd,
        Err(msg) => return error_reply("bad_request", msg),
    };
    tracing::debug!(?cmd, "control command");
    match cmd {
        ControlCommand::Start(locator) => match manager.start(&locator) {
            Ok(id) => payload_of(manager, id),
            Err(e) => error_reply(e.kind(), e),
        },
        ControlCommand::Cancel(id) => match manager.cancel(id) {
            Ok(()) => payload_of(manager, id),
            Err(e) => error_reply(e.kind(), e),
        },
        ControlCommand::Status(Some(id)) => payload_of(manager, id),
        ControlCommand::Status(None) => match manager.current() {
            Some(job) => json!(job.status_payload()),
            None => error_reply("not_found", "no job has run yet"),
        },
    }
}

/// Binds `path` (replacing a stale socket) and serves commands until the task is aborted.
pub fn spawn_control_listener(
    manager: JobManager,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener =
        UnixListener::bind(&path).with_context(|| format!("bind control socket {}", path.display()))?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let manager = manager.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut lines = BufReader::new(read).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            if line.trim().is_empty() {
                                continue;
                            }
                            let mut reply = handle_line(&manager, &line).to_string();
                            reply.push('\n');
                            if write.write_all(reply.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Sends one command and returns the reply line.
pub async fn send_command(socket_path: &Path, cmd: &ControlCommand) -> Result<String> {
    if !socket_path.exists() {
        anyhow::bail!(
            "no control socket at {} (is `mirror serve` running?)",
            socket_path.display()
        );
    }
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect {}", socket_path.display()))?;
    let (read, mut write) = stream.into_split();
    write.write_all(cmd.to_line().as_bytes()).await?;
    let mut lines = BufReader::new(read).lines();
    let reply = lines
        .next_line()
        .await?
        .context("control socket closed without a reply")?;
    Ok(reply)
}

/// The rejection carried by `reply`, if the server refused the command.
pub fn reply_error(reply: &Value) -> Option<RejectedCommand> {
    let kind = reply.get("error_kind")?.as_str()?;
    // A failed job's status payload also has error_kind; it carries a state too.
    if reply.get("state").is_some() {
        return None;
    }
    Some(RejectedCommand {
        kind: kind.to_string(),
        message: reply
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// A command the server rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCommand {
    pub kind: String,
    pub message: String,
}

impl std::fmt::Display for RejectedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for RejectedCommand {}
