use std::time::Duration;

/// Severity used for engine faults such as timeouts and panics
pub const SEVERITY_FAULT: u8 = 2;
/// Severity used for misbehaving hooks
pub const SEVERITY_HOOK: u8 = 3;

/// Time-bounded notification raised on timeouts, hook failures and runtime faults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemAlert {
    pub name: String,
    pub category: String,
    pub severity: u8,
    pub message: String,
    pub expires_in: Option<Duration>,
}

impl SystemAlert {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        severity: u8,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            severity,
            message: message.into(),
            expires_in: None,
        }
    }

    pub fn expires_in(mut self, duration: Duration) -> Self {
        self.expires_in = Some(duration);
        self
    }

    /// `category.name`, or just the name without a category
    pub fn full_name(&self) -> String {
        full_alert_name(&self.name, &self.category)
    }
}

pub fn full_alert_name(name: &str, category: &str) -> String {
    if category.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", category, name)
    }
}
