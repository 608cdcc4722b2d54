//! Which worker task runs next for a dataset.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Dataset, DatasetStatus, PublicationStatus};

/// A processing step run by the background workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Task {
    Download,
    Analyze,
    Validate,
    Index,
    Extend,
    Finalize,
    Publish,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Download => "download",
            Task::Analyze => "analyze",
            Task::Validate => "validate",
            Task::Index => "index",
            Task::Extend => "extend",
            Task::Finalize => "finalize",
            Task::Publish => "publish",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the task that moves the dataset to its next status.
///
/// A dataset with a pending draft is driven by the draft status. Datasets in
/// `error` or `draft` wait for a patch and return `None`.
pub fn next_task(dataset: &Dataset) -> Option<Task> {
    let status = match (&dataset.draft_reason, &dataset.draft) {
        (Some(_), Some(draft)) => draft.status,
        _ => dataset.status,
    };

    match status {
        DatasetStatus::Remote | DatasetStatus::Imported => Some(Task::Download),
        DatasetStatus::Uploaded | DatasetStatus::Loaded => Some(Task::Analyze),
        DatasetStatus::Analyzed if dataset.is_rest => Some(Task::Index),
        DatasetStatus::Analyzed | DatasetStatus::ValidationUpdated if dataset.has_file() => {
            Some(Task::Validate)
        }
        DatasetStatus::Analyzed | DatasetStatus::Validated => Some(Task::Index),
        DatasetStatus::Indexed => Some(Task::Extend),
        DatasetStatus::Extended => Some(Task::Finalize),
        DatasetStatus::Finalized if has_pending_publications(dataset) => Some(Task::Publish),
        DatasetStatus::ValidationUpdated
        | DatasetStatus::Finalized
        | DatasetStatus::Error
        | DatasetStatus::Draft => meta_only_publish(dataset),
    }
}

fn has_pending_publications(dataset: &Dataset) -> bool {
    dataset.publications.iter().flatten().any(|p| {
        matches!(
            p.status,
            PublicationStatus::Waiting | PublicationStatus::Deleted
        )
    })
}

// metadata-only datasets never go through the pipeline but still publish
fn meta_only_publish(dataset: &Dataset) -> Option<Task> {
    (dataset.is_meta_only && has_pending_publications(dataset)).then_some(Task::Publish)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DraftReason, FileInfo, Publication};

    fn with_status(status: DatasetStatus) -> Dataset {
        let mut dataset = Dataset::new("ds");
        dataset.status = status;
        dataset
    }

    fn with_file(mut dataset: Dataset) -> Dataset {
        dataset.file = Some(FileInfo {
            name: "data.csv".to_string(),
            size: 120,
            mimetype: Some("text/csv".to_string()),
        });
        dataset
    }

    #[test]
    fn test_file_pipeline() {
        let expected = [
            (DatasetStatus::Remote, Some(Task::Download)),
            (DatasetStatus::Imported, Some(Task::Download)),
            (DatasetStatus::Uploaded, Some(Task::Analyze)),
            (DatasetStatus::Loaded, Some(Task::Analyze)),
            (DatasetStatus::Analyzed, Some(Task::Validate)),
            (DatasetStatus::ValidationUpdated, Some(Task::Validate)),
            (DatasetStatus::Validated, Some(Task::Index)),
            (DatasetStatus::Indexed, Some(Task::Extend)),
            (DatasetStatus::Extended, Some(Task::Finalize)),
            (DatasetStatus::Finalized, None),
            (DatasetStatus::Error, None),
        ];
        for (status, task) in expected {
            assert_eq!(next_task(&with_file(with_status(status))), task, "{}", status);
        }
    }

    #[test]
    fn test_rest_skips_validation() {
        let mut dataset = with_status(DatasetStatus::Analyzed);
        dataset.is_rest = true;
        assert_eq!(next_task(&dataset), Some(Task::Index));
    }

    #[test]
    fn test_pending_publications() {
        let mut dataset = with_status(DatasetStatus::Finalized);
        dataset.publications = Some(vec![Publication {
            id: "p1".to_string(),
            catalog: "c1".to_string(),
            status: PublicationStatus::Waiting,
        }]);
        assert_eq!(next_task(&dataset), Some(Task::Publish));

        let mut meta = with_status(DatasetStatus::Draft);
        meta.is_meta_only = true;
        meta.publications = dataset.publications.clone();
        assert_eq!(next_task(&meta), Some(Task::Publish));
    }

    #[test]
    fn test_draft_status_drives_tasks() {
        let mut dataset = with_file(with_status(DatasetStatus::Finalized));
        dataset.draft_reason = Some(DraftReason::file_updated());
        dataset.draft = Some(Box::new(with_status(DatasetStatus::Loaded)));
        assert_eq!(next_task(&dataset), Some(Task::Analyze));
        assert_eq!(Task::Analyze.to_string(), "analyze");
    }
}
