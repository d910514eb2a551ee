//! Background timers for the overdue scan and the notification retry sweep

use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{interval, interval_at, Instant, MissedTickBehavior},
};

use crate::config::SchedulerConfig;

use super::{notifications::NotificationService, scanner::OverdueScanner};

/// Start both loops. The overdue scan fires immediately, then on its interval.
pub fn spawn(
    config: &SchedulerConfig,
    scanner: OverdueScanner,
    notifications: NotificationService,
) -> Vec<JoinHandle<()>> {
    if !config.enabled {
        tracing::info!("Scheduler disabled");
        return Vec::new();
    }

    let scan_period = Duration::from_secs(config.overdue_scan_interval_minutes.max(1) * 60);
    let retry_period = Duration::from_secs(config.retry_interval_minutes.max(1) * 60);

    tracing::info!(
        scan_minutes = config.overdue_scan_interval_minutes,
        retry_minutes = config.retry_interval_minutes,
        "Scheduler started"
    );

    let scan = tokio::spawn(async move {
        let mut ticker = interval(scan_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = scanner.run().await {
                tracing::error!("Overdue scan failed: {}", e);
            }
        }
    });

    let retry = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + retry_period, retry_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = notifications.retry_failed().await {
                tracing::error!("Notification retry sweep failed: {}", e);
            }
        }
    });

    vec![scan, retry]
}
