//! Notification boundary.
//!
//! The engine hands the run's alerts to a NotificationSink after the run
//! commits. Transports (email, chat) live outside the core; LogNotifier
//! writes the digest to the log.

use crate::{
    alert::{Alert, AlertPriority},
    error::HealthResult,
};

/// A run's alerts split by priority, each group in generation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedAlerts {
    pub critical: Vec<Alert>,
    pub high:     Vec<Alert>,
    pub medium:   Vec<Alert>,
}

impl GroupedAlerts {
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        let mut grouped = Self::default();
        for a in alerts {
            match a.priority {
                AlertPriority::Critical => grouped.critical.push(a.clone()),
                AlertPriority::High     => grouped.high.push(a.clone()),
                AlertPriority::Medium   => grouped.medium.push(a.clone()),
            }
        }
        grouped
    }

    pub fn total(&self) -> usize {
        self.critical.len() + self.high.len() + self.medium.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Groups in presentation order.
    pub fn groups(&self) -> [(AlertPriority, &[Alert]); 3] {
        [
            (AlertPriority::Critical, self.critical.as_slice()),
            (AlertPriority::High, self.high.as_slice()),
            (AlertPriority::Medium, self.medium.as_slice()),
        ]
    }

    pub fn subject(&self) -> String {
        format!(
            "Customer Risk Alert - {} alerts ({} critical)",
            self.total(),
            self.critical.len()
        )
    }
}

pub trait NotificationSink: Send {
    fn notify(&self, subject: &str, alerts: &GroupedAlerts) -> HealthResult<()>;
}

/// Writes the digest through the `log` facade.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, subject: &str, alerts: &GroupedAlerts) -> HealthResult<()> {
        log::info!("{subject}");
        for (priority, group) in alerts.groups() {
            for a in group {
                log::info!("[{}] {}: {}", priority.as_str(), a.alert_type.as_str(), a.message);
            }
        }
        Ok(())
    }
}
