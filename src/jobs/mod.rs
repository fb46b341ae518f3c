//! Scheduled background jobs.

mod ledger_sync;
mod reconciliation;

pub use ledger_sync::{LedgerSyncJob, LedgerSyncReport};
pub use reconciliation::{ReconciliationJob, ReconciliationReport};

use chrono::{DateTime, Duration as ChronoDuration, TimeZone};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Next occurrence of `hour:minute` strictly after `now`, in `now`'s timezone.
///
/// Returns `None` when the wall-clock time does not exist on the following
/// two days (DST gaps).
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32, minute: u32) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();
    (0..=2).find_map(|offset| {
        let date = today.checked_add_signed(ChronoDuration::days(offset))?;
        let naive = date.and_hms_opt(hour, minute, 0)?;
        tz.from_local_datetime(&naive)
            .earliest()
            .filter(|candidate| candidate > now)
    })
}

/// Wait for `duration` unless shutdown arrives first. Returns false on shutdown.
pub async fn sleep_or_shutdown(duration: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if *shutdown_rx.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        changed = shutdown_rx.changed() => changed.is_ok() && !*shutdown_rx.borrow(),
    }
}

/// Run `job` every day at `hour:minute` local time until shutdown.
///
/// A running job is never interrupted; shutdown only stops rescheduling.
pub async fn run_daily<F, Fut>(
    name: &str,
    hour: u32,
    minute: u32,
    mut shutdown_rx: watch::Receiver<bool>,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!("Scheduling {} daily at {:02}:{:02}", name, hour, minute);
    loop {
        let now = chrono::Local::now();
        let wait = match next_daily_run(&now, hour, minute) {
            Some(next) => {
                info!("Next {} run at {}", name, next);
                (next - now).to_std().unwrap_or(Duration::ZERO)
            }
            None => {
                warn!("Could not compute next {} run, retrying in an hour", name);
                Duration::from_secs(3600)
            }
        };

        if !sleep_or_shutdown(wait, &mut shutdown_rx).await {
            break;
        }
        job().await;
    }
    info!("{} scheduler stopped", name);
}

/// Run `job` after `initial_delay`, then every `interval` until shutdown
pub async fn run_periodic<F, Fut>(
    name: &str,
    initial_delay: Duration,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(
        "Scheduling {} every {}ms after {}ms",
        name,
        interval.as_millis(),
        initial_delay.as_millis()
    );
    let mut delay = initial_delay;
    while sleep_or_shutdown(delay, &mut shutdown_rx).await {
        job().await;
        delay = interval;
    }
    info!("{} scheduler stopped", name);
}
