// Scheduler configuration - explicit knobs, wired in by the host application

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for the recurring-invoice scheduler.
///
/// The engine never reads the environment; the embedding application loads
/// whatever configuration source it likes and passes the values in here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Sleep between background scans.
    pub check_interval: Duration,

    /// Threshold for the automatic overdue-reminder sweep, in days past the
    /// invoice due date.
    pub reminder_days_overdue: i64,

    /// Run the reminder sweep after each timer-driven scan.
    pub auto_reminders_enabled: bool,

    /// Upper bound on how long `stop()` waits for the background task to
    /// finish its current scan and exit.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            // Scan hourly
            check_interval: Duration::from_secs(3600),
            reminder_days_overdue: 7,
            auto_reminders_enabled: true,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}
