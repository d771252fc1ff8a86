//! `mirror run <locator>` – one job in this process, progress on stdout.

use anyhow::Result;
use mirror_core::config::MirrorConfig;
use mirror_core::progress::{ChannelObserver, JobEvent};
use mirror_core::{JobManagerBuilder, Progress};
use std::sync::Arc;

const MIB: f64 = 1_048_576.0;

/// One human-readable progress line.
pub(crate) fn progress_line(p: &Progress) -> String {
    let done_mib = p.bytes_done as f64 / MIB;
    let total = p
        .bytes_total
        .map(|t| format!("{:.1} MiB", t as f64 / MIB))
        .unwrap_or_else(|| "?".to_string());
    let pct = p
        .fraction()
        .map(|f| format!(" ({:.1}%)", f * 100.0))
        .unwrap_or_default();
    let eta = p
        .eta_secs
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    let estimated = if p.estimated { "  (estimated)" } else { "" };
    format!(
        "  {:.1} / {}{}  {:.2} MiB/s  ETA {}{}",
        done_mib,
        total,
        pct,
        p.rate_bytes_per_sec / MIB,
        eta,
        estimated
    )
}

pub async fn run_job(cfg: &MirrorConfig, locator: &str) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let manager = JobManagerBuilder::from_config(cfg)?
        .observer(Arc::new(ChannelObserver::new(tx)))
        .build()?;
    let id = manager.start(locator)?;
    println!("Job {id} started");

    let canceller = manager.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling job {id}...");
            let _ = canceller.cancel(id);
        }
    });

    let mut outcome = None;
    while let Some(event) = rx.recv().await {
        match event {
            JobEvent::Stage { stage, .. } => println!("{}...", stage.as_str()),
            JobEvent::Progress { progress, .. } => println!("{}", progress_line(&progress)),
            JobEvent::Finished { outcome: result, .. } => {
                outcome = Some(result);
                break;
            }
        }
    }
    ctrl_c.abort();

    match outcome {
        Some(Ok(links)) => {
            for link in links {
                match link.size_bytes {
                    Some(size) => println!("{}  {}  ({} bytes)", link.display_name, link.url, size),
                    None => println!("{}  {}", link.display_name, link.url),
                }
            }
            Ok(())
        }
        Some(Err(e)) => Err(anyhow::anyhow!("job {} {}: {}", id, e.kind(), e)),
        None => Err(anyhow::anyhow!("job {} ended without a result", id)),
    }
}
