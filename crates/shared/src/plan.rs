//! Billing plan codes

use serde::{Deserialize, Serialize};

/// Plan an organisation is billed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanCode {
    Free,
    Starter,
    Standard,
    Premium,
}

impl PlanCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanCode::Free => "free",
            PlanCode::Starter => "starter",
            PlanCode::Standard => "standard",
            PlanCode::Premium => "premium",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "free" => Some(PlanCode::Free),
            "starter" => Some(PlanCode::Starter),
            "standard" => Some(PlanCode::Standard),
            "premium" => Some(PlanCode::Premium),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
