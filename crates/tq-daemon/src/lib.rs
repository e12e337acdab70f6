//! Scheduler daemon: periodic reconcile-then-admit loop over the queue
//! store, pid-file guarded against a second instance on the same host.

pub mod pidfile;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tq_core::{Error, Home, PayloadStore, QueueItem, QueueStore, Status};
use tq_remote::{RemoteAdapter, SearchFilter};

pub use pidfile::PidFile;

/// Remote's fixed concurrency cap.
pub const DEFAULT_CAP: u32 = 5;

#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub n_active: u32,
    pub reconciled: usize,
    pub submitted: usize,
    pub errored: usize,
}

/// One iteration of the daemon's control loop. Runs synchronously;
/// the async loop in [`run`] drives this via `spawn_blocking`.
pub fn tick(home: &Home, adapter: &dyn RemoteAdapter, k: u32) -> Result<TickSummary> {
    let payloads = PayloadStore::new(home.clone());
    let mut store = QueueStore::new(home.clone());
    store.load()?; // 1. refresh state

    let active = adapter.search(&SearchFilter::active())?; // 2. poll remote active count
    let n_active = active.total_elements as u32;
    let mut summary = TickSummary {
        n_active,
        ..Default::default()
    };

    if n_active >= k {
        tracing::info!(n_active, k, "remote at capacity, skipping admission this tick");
        return Ok(summary);
    }

    let active_remote_ids: HashSet<i64> = active.content.iter().map(|j| j.job_id).collect();
    let stale: Vec<QueueItem> = store
        .filter(&tq_core::Filter {
            statuses: Some(vec![Status::Submitted]),
            ..Default::default()
        })
        .into_iter()
        .filter(|item| {
            item.remote_job_id
                .is_some_and(|id| !active_remote_ids.contains(&id))
        })
        .collect();

    for mut item in stale {
        match item.complete(adapter, &payloads) {
            Ok(()) => summary.reconciled += 1,
            Err(Error::Remote(err)) => {
                tracing::warn!(uid = %item.uid, error = %err, "reconciliation poll failed, marking errored");
                item.error(Some(err.to_string()));
                summary.errored += 1;
            }
            Err(other) => return Err(other.into()),
        }
        store.upsert(vec![item], true)?;
    }

    let slots = (k - n_active) as usize;
    for mut item in store.next(slots) {
        match item.submit(adapter, &payloads) {
            Ok(()) => summary.submitted += 1,
            Err(Error::Remote(err)) => {
                tracing::warn!(uid = %item.uid, error = %err, "submit failed, marking errored to avoid a retry storm");
                item.error(Some(err.to_string()));
                summary.errored += 1;
            }
            Err(other) => return Err(other.into()),
        }
        store.upsert(vec![item], true)?;
    }

    Ok(summary)
}

/// Runs the tick loop until a shutdown signal arrives. Sleeps at the start
/// of each iteration so startup never busy-loops. Claims `pidfile` for the
/// process's own pid and releases it on the way out.
pub async fn run(
    home: Home,
    adapter: Arc<dyn RemoteAdapter + Send + Sync>,
    tick_duration: Duration,
    k: u32,
    pidfile: PidFile,
) -> Result<()> {
    pidfile.claim(std::process::id() as i32)?;
    let result = run_loop(home, adapter, tick_duration, k).await;
    if let Err(err) = pidfile.release() {
        tracing::warn!(error = %err, "failed to remove pid file on shutdown");
    }
    result
}

async fn run_loop(
    home: Home,
    adapter: Arc<dyn RemoteAdapter + Send + Sync>,
    tick_duration: Duration,
    k: u32,
) -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(tick_duration) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
        }

        let home = home.clone();
        let adapter = adapter.clone();
        let outcome = tokio::task::spawn_blocking(move || tick(&home, adapter.as_ref(), k)).await;
        match outcome {
            Ok(Ok(summary)) => tracing::info!(?summary, "tick complete"),
            Ok(Err(err)) => tracing::error!(error = %format!("{err:#}"), "tick failed, continuing"),
            Err(join_err) => tracing::error!(error = %join_err, "tick task panicked, continuing"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tq_core::{Admin, ReportType};
    use tq_remote::{DummyRemoteAdapter, RemoteState};

    fn env() -> (tempfile::TempDir, Home) {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::new(dir.path());
        (dir, home)
    }

    #[test]
    fn happy_path_submits_then_completes_over_two_ticks() {
        let (_dir, home) = env();
        let admin = Admin::new(home.clone());
        admin.add("r", b"{}", ReportType::RouteAnalysis, 5).unwrap();

        let adapter = DummyRemoteAdapter::new();
        let summary = tick(&home, &adapter, DEFAULT_CAP).unwrap();
        assert_eq!(summary.submitted, 1);

        let next = admin.list_next(5).unwrap();
        assert!(next.is_empty());
        let submitted_item = admin
            .list(&tq_core::Filter {
                statuses: Some(vec![Status::Submitted]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(submitted_item.len(), 1);
        let remote_job_id = submitted_item[0].remote_job_id.unwrap();

        adapter.set_state(remote_job_id, RemoteState::Done);
        let summary = tick(&home, &adapter, DEFAULT_CAP).unwrap();
        assert_eq!(summary.reconciled, 1);

        let completed = admin
            .list(&tq_core::Filter {
                statuses: Some(vec![Status::Completed]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn admission_cap_blocks_submission() {
        let (_dir, home) = env();
        let admin = Admin::new(home.clone());
        for i in 0..3 {
            admin
                .add(format!("job-{i}"), format!("{{\"i\":{i}}}").as_bytes(), ReportType::RouteAnalysis, 1)
                .unwrap();
        }

        let adapter = DummyRemoteAdapter::new();
        // saturate the remote with 5 unrelated active jobs
        for i in 0..5 {
            adapter
                .submit_route(&serde_json::json!({"name": format!("other-{i}")}))
                .unwrap();
        }

        let summary = tick(&home, &adapter, DEFAULT_CAP).unwrap();
        assert_eq!(summary.submitted, 0);
        assert_eq!(admin.list_next(5).unwrap().len(), 3);
    }

    #[test]
    fn priority_ordering_within_one_tick() {
        let (_dir, home) = env();
        let admin = Admin::new(home.clone());
        admin.add("low", b"{\"n\":1}", ReportType::RouteAnalysis, 1).unwrap();
        admin.add("high", b"{\"n\":9}", ReportType::RouteAnalysis, 9).unwrap();
        admin.add("mid", b"{\"n\":5}", ReportType::RouteAnalysis, 5).unwrap();

        let adapter = DummyRemoteAdapter::new();
        tick(&home, &adapter, DEFAULT_CAP).unwrap();

        let submitted = admin
            .list(&tq_core::Filter {
                statuses: Some(vec![Status::Submitted]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(submitted.len(), 3);
    }
}
