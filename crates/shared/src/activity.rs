//! Activity kinds and the usage-qualifying allow-list
//!
//! An activity event records one staff/volunteer action at a site. Only the
//! kinds on [`ActivityKind::QUALIFYING`] count toward the rolling 30-day
//! active-user metric. Changing the allow-list is a versioned domain decision:
//! bump [`ACTIVITY_ALLOWLIST_VERSION`] alongside any edit so downstream
//! reports can tell which definition a counter was computed under.

use serde::{Deserialize, Serialize};

/// Version of the qualifying-activity allow-list.
///
/// v1: attendance + rota actions.
/// v2: added register_taken.
/// v3: added session_note_added; message_sent explicitly excluded.
pub const ACTIVITY_ALLOWLIST_VERSION: u32 = 3;

/// A staff/volunteer action recorded against a tenant site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Attendance entered for a session
    AttendanceRecorded,
    /// Register completed for a session
    RegisterTaken,
    /// Rota slot accepted
    RotaAccepted,
    /// Rota slot declined
    RotaDeclined,
    /// Free-text note added to a session
    SessionNoteAdded,
    /// In-app message sent (does not qualify for usage metering)
    MessageSent,
}

impl ActivityKind {
    /// Kinds that count toward the 30-day active-user metric.
    ///
    /// Rota declines qualify: declining a slot is still engagement with the
    /// product. Messaging does not, it is too easy to generate passively.
    pub const QUALIFYING: &'static [ActivityKind] = &[
        ActivityKind::AttendanceRecorded,
        ActivityKind::RegisterTaken,
        ActivityKind::RotaAccepted,
        ActivityKind::RotaDeclined,
        ActivityKind::SessionNoteAdded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::AttendanceRecorded => "attendance_recorded",
            ActivityKind::RegisterTaken => "register_taken",
            ActivityKind::RotaAccepted => "rota_accepted",
            ActivityKind::RotaDeclined => "rota_declined",
            ActivityKind::SessionNoteAdded => "session_note_added",
            ActivityKind::MessageSent => "message_sent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "attendance_recorded" => Some(ActivityKind::AttendanceRecorded),
            "register_taken" => Some(ActivityKind::RegisterTaken),
            "rota_accepted" => Some(ActivityKind::RotaAccepted),
            "rota_declined" => Some(ActivityKind::RotaDeclined),
            "session_note_added" => Some(ActivityKind::SessionNoteAdded),
            "message_sent" => Some(ActivityKind::MessageSent),
            _ => None,
        }
    }

    pub fn qualifies(&self) -> bool {
        Self::QUALIFYING.contains(self)
    }

    /// Allow-list as text values, for binding into `kind = ANY($n)` queries.
    pub fn qualifying_strs() -> Vec<String> {
        Self::QUALIFYING.iter().map(|k| k.as_str().to_string()).collect()
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
