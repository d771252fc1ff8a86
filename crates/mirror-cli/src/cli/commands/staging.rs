//! `mirror staging ...` – administrative operations on the staging service.

use anyhow::{Context, Result};
use mirror_core::config::MirrorConfig;
use mirror_core::sink::RemoteStagingSink;

use crate::cli::StagingAction;

pub async fn run_staging(cfg: &MirrorConfig, action: StagingAction) -> Result<()> {
    let sink = RemoteStagingSink::from_config(&cfg.staging);
    // The client is blocking curl.
    tokio::task::spawn_blocking(move || -> Result<()> {
        match action {
            StagingAction::List => {
                let containers = sink.list_all()?;
                if containers.is_empty() {
                    println!("No containers.");
                }
                for c in containers {
                    println!("{}  {}", c.id, c.name.as_deref().unwrap_or("-"));
                    for f in &c.files {
                        let size = f
                            .size_bytes
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "-".to_string());
                        println!("  file {:<10} {:<12} {}  {}", f.id, size, f.name, f.url);
                    }
                    for t in &c.torrents {
                        println!("  torrent {} {} {:.0}%", t.name, t.status, t.progress * 100.0);
                    }
                }
            }
            StagingAction::DeleteFile { id } => {
                sink.delete_file(&id)?;
                println!("Deleted file {id}");
            }
            StagingAction::DeleteFolder { id } => {
                sink.delete_folder(&id)?;
                println!("Deleted folder {id}");
            }
        }
        Ok(())
    })
    .await
    .context("staging task")?
}
