//! Per-folder and per-run totals

use std::ops::AddAssign;

/// Message counters for one folder pair (or a whole run)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    /// Copied to the target (or would have been, in fake mode)
    pub copied: usize,
    /// Already present on the target
    pub skipped: usize,
    /// Removed from the target by sync
    pub deleted: usize,
    /// Removed from the source by wipe
    pub wiped: usize,
    /// Body fetch or append failed
    pub failed: usize,
    /// Metadata could not be read; not classified
    pub unreadable: usize,
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        self.copied += rhs.copied;
        self.skipped += rhs.skipped;
        self.deleted += rhs.deleted;
        self.wiped += rhs.wiped;
        self.failed += rhs.failed;
        self.unreadable += rhs.unreadable;
    }
}

/// Outcome of one folder pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderReport {
    pub source_folder: String,
    pub target_folder: String,
    pub counts: Counts,
    /// Set when the pair was abandoned before or during indexing
    pub error: Option<String>,
}

impl FolderReport {
    pub fn new(source_folder: impl Into<String>, target_folder: impl Into<String>) -> Self {
        Self {
            source_folder: source_folder.into(),
            target_folder: target_folder.into(),
            counts: Counts::default(),
            error: None,
        }
    }

    /// Pair that could not be processed at all
    pub fn failed(
        source_folder: impl Into<String>,
        target_folder: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(source_folder, target_folder)
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Why the run ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    /// Every source folder was processed
    #[default]
    Completed,
    /// Stopped after the first copy
    Once,
    /// Stopped by an external interrupt
    Interrupted,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Folder pairs in processing order, including a partial last one
    pub folders: Vec<FolderReport>,
    pub stopped: StopReason,
}

impl RunReport {
    pub fn totals(&self) -> Counts {
        let mut totals = Counts::default();
        for folder in &self.folders {
            totals += folder.counts;
        }
        totals
    }

    /// Report for the folder pair whose source is `name`
    pub fn folder(&self, name: &str) -> Option<&FolderReport> {
        self.folders.iter().find(|f| f.source_folder == name)
    }

    /// Folder pairs that were abandoned
    pub fn failed_folders(&self) -> impl Iterator<Item = &FolderReport> {
        self.folders.iter().filter(|f| f.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.folders.iter().any(FolderReport::is_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_sum_folders() {
        let mut inbox = FolderReport::new("INBOX", "INBOX");
        inbox.counts.copied = 3;
        inbox.counts.failed = 1;
        let mut sent = FolderReport::new("Sent", "Sent");
        sent.counts.skipped = 4;
        sent.counts.deleted = 2;

        let report = RunReport {
            folders: vec![inbox, sent],
            stopped: StopReason::Completed,
        };
        let totals = report.totals();
        assert_eq!(totals.copied, 3);
        assert_eq!(totals.skipped, 4);
        assert_eq!(totals.deleted, 2);
        assert_eq!(totals.failed, 1);
        assert_eq!(report.folder("Sent").unwrap().counts.skipped, 4);
        assert!(report.folder("Drafts").is_none());
    }

    #[test]
    fn test_failed_folders() {
        let mut inbox = FolderReport::new("INBOX", "INBOX");
        inbox.counts.copied = 1;
        let broken = FolderReport::failed("Broken", "Broken", "select failed");

        let report = RunReport {
            folders: vec![inbox, broken],
            stopped: StopReason::Completed,
        };
        assert!(report.has_failures());
        let failed: Vec<_> = report.failed_folders().map(|f| f.source_folder.as_str()).collect();
        assert_eq!(failed, vec!["Broken"]);
        assert_eq!(report.totals().copied, 1);
        assert!(!report.folder("INBOX").unwrap().is_failed());
    }
}
