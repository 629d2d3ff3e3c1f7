//! Read-only views over a snapshot, for status bars and badges.

use crate::types::{UploadItem, UploadStatus};

/// Items still waiting or in flight.
pub fn active_count(items: &[UploadItem]) -> usize {
    items
        .iter()
        .filter(|i| matches!(i.status, UploadStatus::Queued | UploadStatus::Uploading))
        .count()
}

/// Mean progress over queued, uploading and done items, rounded.
///
/// Failed items are left out so a dead upload does not pin the bar.
pub fn overall_progress(items: &[UploadItem]) -> u8 {
    let (count, total) = items
        .iter()
        .filter_map(|i| match i.status {
            UploadStatus::Done => Some(100u32),
            UploadStatus::Queued | UploadStatus::Uploading => Some(u32::from(i.progress)),
            _ => None,
        })
        .fold((0u32, 0u32), |(n, sum), p| (n + 1, sum + p));

    if count == 0 {
        return 0;
    }
    (f64::from(total) / f64::from(count)).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(status: UploadStatus, progress: u8) -> UploadItem {
        UploadItem {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: "f".into(),
            file_size: 1,
            target_path: String::new(),
            status,
            progress,
            error: None,
            retry_count: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn empty_queue() {
        assert_eq!(active_count(&[]), 0);
        assert_eq!(overall_progress(&[]), 0);
    }

    #[test]
    fn counts_queued_and_uploading() {
        let items = vec![
            item(UploadStatus::Queued, 0),
            item(UploadStatus::Uploading, 50),
            item(UploadStatus::Done, 100),
            item(UploadStatus::Failed, 20),
        ];
        assert_eq!(active_count(&items), 2);
    }

    #[test]
    fn average_excludes_failed() {
        let items = vec![
            item(UploadStatus::Queued, 0),
            item(UploadStatus::Uploading, 50),
            item(UploadStatus::Done, 100),
            item(UploadStatus::Failed, 20),
        ];
        assert_eq!(overall_progress(&items), 50);
    }

    #[test]
    fn average_rounds() {
        let items = vec![
            item(UploadStatus::Uploading, 33),
            item(UploadStatus::Uploading, 34),
        ];
        // 33.5 rounds away from zero.
        assert_eq!(overall_progress(&items), 34);
    }

    #[test]
    fn only_failed_is_zero() {
        assert_eq!(overall_progress(&[item(UploadStatus::Failed, 60)]), 0);
    }
}
