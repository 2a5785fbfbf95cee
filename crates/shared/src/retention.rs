//! Retention data categories

use serde::{Deserialize, Serialize};

/// Data category covered by a retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionCategory {
    StaffActivity,
    Attendance,
    Audit,
}

impl RetentionCategory {
    /// Sweep order: most-innocuous first, so a failure partway through a
    /// tenant leaves the less sensitive categories already cleaned.
    pub const SWEEP_ORDER: &'static [RetentionCategory] = &[
        RetentionCategory::StaffActivity,
        RetentionCategory::Attendance,
        RetentionCategory::Audit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionCategory::StaffActivity => "staff_activity",
            RetentionCategory::Attendance => "attendance",
            RetentionCategory::Audit => "audit",
        }
    }

    /// Table holding this category's rows.
    pub fn table(&self) -> &'static str {
        match self {
            RetentionCategory::StaffActivity => "activity_events",
            RetentionCategory::Attendance => "attendance_records",
            RetentionCategory::Audit => "audit_events",
        }
    }

    /// Column the retention cutoff is compared against.
    pub fn timestamp_column(&self) -> &'static str {
        match self {
            RetentionCategory::StaffActivity => "occurred_at",
            RetentionCategory::Attendance => "created_at",
            RetentionCategory::Audit => "created_at",
        }
    }
}

impl std::fmt::Display for RetentionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_order_is_least_sensitive_first() {
        assert_eq!(
            RetentionCategory::SWEEP_ORDER,
            &[
                RetentionCategory::StaffActivity,
                RetentionCategory::Attendance,
                RetentionCategory::Audit,
            ]
        );
    }
}
