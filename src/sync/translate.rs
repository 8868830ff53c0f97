//! Translation between tracker vocabulary and local task fields

use crate::jira::StatusCategory;
use tasks::{TaskPriority, TaskStatus};

/// Local status for a remote status category. A missing category reads as `new`.
pub fn local_status(category: Option<StatusCategory>) -> TaskStatus {
    match category {
        Some(StatusCategory::Indeterminate) => TaskStatus::InProgress,
        Some(StatusCategory::Done) => TaskStatus::Completed,
        Some(StatusCategory::New) | None => TaskStatus::Todo,
    }
}

/// Completion percentage implied by a status
pub fn completion_for(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Todo | TaskStatus::Cancelled => 0,
        TaskStatus::InProgress => 50,
        TaskStatus::Completed => 100,
    }
}

/// Local priority for a remote priority name
pub fn local_priority(name: &str) -> TaskPriority {
    let name = name.trim();
    if name.eq_ignore_ascii_case("highest") || name.eq_ignore_ascii_case("high") {
        TaskPriority::High
    } else if name.eq_ignore_ascii_case("low") || name.eq_ignore_ascii_case("lowest") {
        TaskPriority::Low
    } else {
        TaskPriority::Medium
    }
}

/// Category a local status should be pushed to. `Cancelled` has no counterpart.
pub fn push_target(status: TaskStatus) -> Option<StatusCategory> {
    match status {
        TaskStatus::InProgress => Some(StatusCategory::Indeterminate),
        TaskStatus::Completed => Some(StatusCategory::Done),
        TaskStatus::Todo => Some(StatusCategory::New),
        TaskStatus::Cancelled => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_status() {
        assert_eq!(local_status(Some(StatusCategory::New)), TaskStatus::Todo);
        assert_eq!(
            local_status(Some(StatusCategory::Indeterminate)),
            TaskStatus::InProgress
        );
        assert_eq!(local_status(Some(StatusCategory::Done)), TaskStatus::Completed);
        assert_eq!(local_status(None), TaskStatus::Todo);
    }

    #[test]
    fn test_completion() {
        assert_eq!(completion_for(TaskStatus::Todo), 0);
        assert_eq!(completion_for(TaskStatus::InProgress), 50);
        assert_eq!(completion_for(TaskStatus::Completed), 100);
    }

    #[test]
    fn test_priority() {
        assert_eq!(local_priority("Highest"), TaskPriority::High);
        assert_eq!(local_priority("High"), TaskPriority::High);
        assert_eq!(local_priority("Medium"), TaskPriority::Medium);
        assert_eq!(local_priority("Low"), TaskPriority::Low);
        assert_eq!(local_priority("Lowest"), TaskPriority::Low);
        assert_eq!(local_priority("Blocker"), TaskPriority::Medium);
        assert_eq!(local_priority(""), TaskPriority::Medium);
    }

    #[test]
    fn test_status_round_trip() {
        for category in [
            StatusCategory::New,
            StatusCategory::Indeterminate,
            StatusCategory::Done,
        ] {
            assert_eq!(push_target(local_status(Some(category))), Some(category));
        }
        assert_eq!(push_target(TaskStatus::Cancelled), None);
    }
}
