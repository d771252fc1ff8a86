//! `mirror start | cancel | status` – talk to a running `mirror serve`.

use anyhow::Result;
use mirror_core::control::default_control_socket_path;

use crate::cli::control_socket::{reply_error, send_command, ControlCommand};

async fn send(cmd: ControlCommand) -> Result<()> {
    let path = default_control_socket_path()?;
    let reply = send_command(&path, &cmd).await?;
    let value: serde_json::Value = serde_json::from_str(&reply)?;
    if let Some(rejected) = reply_error(&value) {
        return Err(rejected.into());
    }
    println!("{}", reply);
    Ok(())
}

pub async fn run_start(locator: &str) -> Result<()> {
    send(ControlCommand::Start(locator.to_string())).await
}

pub async fn run_cancel(id: u64) -> Result<()> {
    send(ControlCommand::Cancel(id)).await
}

pub async fn run_status(id: Option<u64>) -> Result<()> {
    send(ControlCommand::Status(id)).await
}
