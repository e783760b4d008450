use async_trait::async_trait;
use chrono::{DateTime, Utc};
use homeflow_core::hook::{AlertHook, Hook, HookResult};
use homeflow_core::{full_alert_name, Context, SystemAlert};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

pub const ALERT_HOOK_NAME: &str = "alerts";

/// An alert as currently known to the [`AlertBook`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlert {
    pub name: String,
    pub category: String,
    pub severity: u8,
    pub message: String,
    /// How often the alert was raised while active
    pub counter: u64,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ActiveAlert {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

/// Deduplicating store of system alerts.
///
/// Alerts are keyed by `category.name`; raising an active alert again only
/// bumps its counter. Expired alerts are ignored by queries and replaced
/// when raised again.
#[derive(Default)]
pub struct AlertBook {
    alerts: RwLock<BTreeMap<String, ActiveAlert>>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `alert`; returns true if it was not active before
    pub fn raise(&self, alert: &SystemAlert) -> bool {
        let now = Utc::now();
        let expires_at = alert
            .expires_in
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| now + d);

        let mut alerts = self.alerts.write();
        match alerts.get_mut(&alert.full_name()) {
            Some(existing) if !existing.is_expired(now) => {
                existing.counter += 1;
                existing.last = now;
                existing.severity = alert.severity;
                existing.message = alert.message.clone();
                existing.expires_at = expires_at;
                false
            }
            _ => {
                tracing::warn!(
                    "System alert {} (severity {}): {}",
                    alert.full_name(),
                    alert.severity,
                    alert.message
                );
                alerts.insert(
                    alert.full_name(),
                    ActiveAlert {
                        name: alert.name.clone(),
                        category: alert.category.clone(),
                        severity: alert.severity,
                        message: alert.message.clone(),
                        counter: 1,
                        first: now,
                        last: now,
                        expires_at,
                    },
                );
                true
            }
        }
    }

    /// Removes an alert; returns true if it was active
    pub fn reset(&self, name: &str, category: &str) -> bool {
        let now = Utc::now();
        self.alerts
            .write()
            .remove(&full_alert_name(name, category))
            .map_or(false, |a| !a.is_expired(now))
    }

    /// Active alerts ordered by severity, then by full name
    pub fn active(&self) -> Vec<ActiveAlert> {
        let now = Utc::now();
        let mut active: Vec<ActiveAlert> = self
            .alerts
            .read()
            .values()
            .filter(|a| !a.is_expired(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.name.cmp(&b.name))
        });
        active
    }

    pub fn get(&self, name: &str, category: &str) -> Option<ActiveAlert> {
        let now = Utc::now();
        self.alerts
            .read()
            .get(&full_alert_name(name, category))
            .filter(|a| !a.is_expired(now))
            .cloned()
    }
}

impl Hook for AlertBook {
    fn name(&self) -> &str {
        ALERT_HOOK_NAME
    }

    fn as_alert_hook(&self) -> Option<&dyn AlertHook> {
        Some(self)
    }
}

#[async_trait]
impl AlertHook for AlertBook {
    async fn on_system_alert(&self, _ctx: &Context, alert: &SystemAlert) -> HookResult {
        self.raise(alert);
        Ok(())
    }

    async fn on_reset_system_alert(&self, _ctx: &Context, name: &str, category: &str) -> HookResult {
        if self.reset(name, category) {
            tracing::info!("System alert {} reset", full_alert_name(name, category));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn repeated_alerts_are_counted_once() {
        let book = AlertBook::new();
        let alert = SystemAlert::new("flowTimeout.slow", "system", 2, "timed out");
        assert!(book.raise(&alert));
        assert!(!book.raise(&alert));
        let active = book.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].counter, 2);
    }

    #[test]
    fn expired_alerts_are_not_active() {
        let book = AlertBook::new();
        let alert = SystemAlert::new("gone", "test", 1, "").expires_in(Duration::ZERO);
        book.raise(&alert);
        assert!(book.active().is_empty());
        assert!(book.get("gone", "test").is_none());
        assert!(book.raise(&alert), "an expired alert counts as new");
    }

    #[test]
    fn reset_removes_alert() {
        let book = AlertBook::new();
        book.raise(&SystemAlert::new("a", "c", 3, "x"));
        assert!(book.reset("a", "c"));
        assert!(!book.reset("a", "c"));
        assert!(book.active().is_empty());
    }
}
