//! Account roles

use serde::{Deserialize, Serialize};

/// Role a user holds within a tenant site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Staff,
    Volunteer,
    /// Parent/guardian accounts never count toward usage billing.
    Parent,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Staff => "staff",
            UserRole::Volunteer => "volunteer",
            UserRole::Parent => "parent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "staff" => Some(UserRole::Staff),
            "volunteer" => Some(UserRole::Volunteer),
            "parent" => Some(UserRole::Parent),
            _ => None,
        }
    }

    /// Whether activity by this role counts toward the active-user metric.
    pub fn counts_toward_usage(&self) -> bool {
        matches!(self, UserRole::Staff | UserRole::Volunteer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_excluded_from_usage() {
        assert!(UserRole::Staff.counts_toward_usage());
        assert!(UserRole::Volunteer.counts_toward_usage());
        assert!(!UserRole::Parent.counts_toward_usage());
    }

    #[test]
    fn unknown_role_is_none() {
        assert_eq!(UserRole::from_str("admin"), None);
        assert_eq!(UserRole::from_str(""), None);
    }
}
