//! `mirror serve` – job manager behind the control socket until Ctrl-C.

use anyhow::Result;
use mirror_core::config::MirrorConfig;
use mirror_core::control::default_control_socket_path;
use mirror_core::JobManagerBuilder;

use crate::cli::control_socket;

pub async fn run_serve(cfg: &MirrorConfig) -> Result<()> {
    let manager = JobManagerBuilder::from_config(cfg)?.build()?;
    let socket_path = default_control_socket_path()?;
    let listener = control_socket::spawn_control_listener(manager.clone(), &socket_path)?;
    tracing::info!(path = %socket_path.display(), sink = ?cfg.sink, "control socket listening");
    println!("Listening on {}", socket_path.display());

    tokio::signal::ctrl_c().await?;
    listener.abort();

    if let Some(job) = manager.current() {
        if !job.state.is_terminal() {
            tracing::info!(job_id = job.id, "shutting down, cancelling running job");
            manager.cancel(job.id)?;
            let _ = manager.wait(job.id).await;
        }
    }
    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::debug!(path = %socket_path.display(), "remove control socket: {}", e);
    }
    Ok(())
}
