//! Payment notification kinds.

use serde::{Deserialize, Serialize};

/// Which reminder a notification is; part of the dedup identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Overdue,
    DueToday,
    Reminder,
    DeadlineSet,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Overdue => "overdue",
            NotificationKind::DueToday => "due_today",
            NotificationKind::Reminder => "reminder",
            NotificationKind::DeadlineSet => "deadline_set",
        }
    }

    /// Classify a pending payment by whole days until its due date.
    pub fn classify(days_until_due: i64, reminder_days: i64) -> Option<Self> {
        match days_until_due {
            d if d < 0 => Some(NotificationKind::Overdue),
            0 => Some(NotificationKind::DueToday),
            d if d == reminder_days => Some(NotificationKind::Reminder),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
