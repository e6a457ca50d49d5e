use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::JiraError;

use super::fields::{MilestoneDateSet, MilestoneField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Partial,
    Skipped,
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Skipped => "skipped",
            SyncStatus::Failed => "failed",
        })
    }
}

/// Why one milestone was not copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum SkipReason {
    NotApplicableToSource,
    NoValueOnSource,
    InvalidSourceValue(String),
    NotPresentOnDestination,
    AlreadyUpToDate,
    RejectedByDestination(String),
}

impl SkipReason {
    /// Skips that mean something went wrong, as opposed to nothing to do.
    pub fn is_problem(&self) -> bool {
        matches!(
            self,
            SkipReason::InvalidSourceValue(_) | SkipReason::RejectedByDestination(_)
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotApplicableToSource => f.write_str("not applicable to source"),
            SkipReason::NoValueOnSource => f.write_str("no value on source"),
            SkipReason::InvalidSourceValue(reason) => write!(f, "invalid source value: {reason}"),
            SkipReason::NotPresentOnDestination => f.write_str("not present on destination"),
            SkipReason::AlreadyUpToDate => f.write_str("already up to date"),
            SkipReason::RejectedByDestination(message) => write!(f, "rejected by destination: {message}"),
        }
    }
}

/// Coarse class of a failure, for reports and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Auth,
    Permission,
    Validation,
    NotFound,
    Transient,
    Other,
}

impl From<&JiraError> for ErrorKind {
    fn from(err: &JiraError) -> Self {
        match err {
            JiraError::Auth(_) => ErrorKind::Auth,
            JiraError::Permission(_) => ErrorKind::Permission,
            JiraError::Validation { .. } => ErrorKind::Validation,
            JiraError::NotFound(_) => ErrorKind::NotFound,
            JiraError::RateLimited { .. } | JiraError::Network(_) => ErrorKind::Transient,
            _ => ErrorKind::Other,
        }
    }
}

/// Outcome of syncing one source/destination pair.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    /// `None` when auto sync found no engineering issue to read from.
    pub source_key: Option<String>,
    pub target_key: String,
    pub dry_run: bool,
    pub fields_copied: BTreeSet<MilestoneField>,
    pub fields_skipped: BTreeMap<MilestoneField, SkipReason>,
    /// Source values, for rendering.
    pub values: MilestoneDateSet,
    pub status: SyncStatus,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub notes: Vec<String>,
    /// The failure should end a bulk run.
    #[serde(skip)]
    fatal: bool,
}

impl SyncResult {
    pub fn new(source_key: Option<&str>, target_key: &str, dry_run: bool) -> Self {
        Self {
            source_key: source_key.map(str::to_string),
            target_key: target_key.to_string(),
            dry_run,
            fields_copied: BTreeSet::new(),
            fields_skipped: BTreeMap::new(),
            values: MilestoneDateSet::new(),
            status: SyncStatus::Skipped,
            error: None,
            error_kind: None,
            notes: Vec::new(),
            fatal: false,
        }
    }

    pub fn skipped(source_key: Option<&str>, target_key: &str, dry_run: bool, note: impl Into<String>) -> Self {
        let mut result = Self::new(source_key, target_key, dry_run);
        result.notes.push(note.into());
        result
    }

    pub fn failed(source_key: Option<&str>, target_key: &str, dry_run: bool, err: &JiraError) -> Self {
        let mut result = Self::new(source_key, target_key, dry_run);
        result.fail(err);
        result
    }

    /// Marks the result failed. Nothing counts as copied afterwards.
    pub fn fail(&mut self, err: &JiraError) {
        self.fields_copied.clear();
        self.status = SyncStatus::Failed;
        self.error = Some(err.to_string());
        self.error_kind = Some(ErrorKind::from(err));
        self.fatal = err.is_fatal();
    }

    /// Derives the status from the copied and skipped sets.
    pub fn settle(&mut self) {
        if self.status == SyncStatus::Failed {
            return;
        }
        let problems = self.fields_skipped.values().any(SkipReason::is_problem);
        self.status = match (self.fields_copied.is_empty(), problems) {
            (true, _) => SyncStatus::Skipped,
            (false, true) => SyncStatus::Partial,
            (false, false) => SyncStatus::Success,
        };
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

/// Aggregate of a bulk run, results in encounter order.
#[derive(Debug, Clone, Serialize)]
pub struct BulkSyncReport {
    pub project: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub results: Vec<SyncResult>,
    pub attempted: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub skipped: usize,
    pub failed: usize,
    pub aborted: Option<String>,
    pub cancelled: bool,
}

impl BulkSyncReport {
    pub fn new(project: &str, dry_run: bool) -> Self {
        Self {
            project: project.to_string(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
            attempted: 0,
            succeeded: 0,
            partial: 0,
            skipped: 0,
            failed: 0,
            aborted: None,
            cancelled: false,
        }
    }

    pub fn record(&mut self, result: SyncResult) {
        self.attempted += 1;
        match result.status {
            SyncStatus::Success => self.succeeded += 1,
            SyncStatus::Partial => self.partial += 1,
            SyncStatus::Skipped => self.skipped += 1,
            SyncStatus::Failed => self.failed += 1,
        }
        self.results.push(result);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Whether the run should end with a failing exit code.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.aborted.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_status() {
        let mut result = SyncResult::new(Some("AV-1"), "IDEA-1", false);
        result.settle();
        assert_eq!(result.status, SyncStatus::Skipped);

        result.fields_copied.insert(MilestoneField::PrdDueDate);
        result
            .fields_skipped
            .insert(MilestoneField::StartDate, SkipReason::NoValueOnSource);
        result.settle();
        assert_eq!(result.status, SyncStatus::Success);

        result.fields_skipped.insert(
            MilestoneField::GaEstimatedDate,
            SkipReason::InvalidSourceValue("unrecognized date format".into()),
        );
        result.settle();
        assert_eq!(result.status, SyncStatus::Partial);
    }

    #[test]
    fn test_fail_clears_copied_fields() {
        let mut result = SyncResult::new(Some("AV-1"), "IDEA-1", false);
        result.fields_copied.insert(MilestoneField::PrdDueDate);
        result.fail(&JiraError::Permission("cannot edit IDEA-1".into()));
        result.settle();

        assert_eq!(result.status, SyncStatus::Failed);
        assert!(result.fields_copied.is_empty());
        assert_eq!(result.error_kind, Some(ErrorKind::Permission));
        assert!(!result.is_fatal());

        let denied = SyncResult::failed(Some("AV-1"), "IDEA-1", false, &JiraError::Auth("token expired".into()));
        assert!(denied.is_fatal());
        assert_eq!(denied.error_kind, Some(ErrorKind::Auth));
    }

    #[test]
    fn test_report_counts() {
        let mut report = BulkSyncReport::new("IDEA", true);
        let mut ok = SyncResult::new(Some("AV-1"), "IDEA-1", true);
        ok.fields_copied.insert(MilestoneField::StartDate);
        ok.settle();
        report.record(ok);
        report.record(SyncResult::skipped(None, "IDEA-2", true, "no link"));
        report.record(SyncResult::failed(
            Some("AV-3"),
            "IDEA-3",
            true,
            &JiraError::NotFound("AV-3".into()),
        ));

        assert_eq!(report.attempted, 3);
        assert_eq!((report.succeeded, report.skipped, report.failed), (1, 1, 1));
        assert!(report.has_failures());
    }

    #[test]
    fn test_skip_reason_text() {
        assert_eq!(
            SkipReason::NotApplicableToSource.to_string(),
            "not applicable to source"
        );
        assert_eq!(SkipReason::AlreadyUpToDate.to_string(), "already up to date");
    }
}
