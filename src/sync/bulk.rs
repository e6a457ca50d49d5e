use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use log::{info, warn};

use crate::error::Result;
use crate::jira::IssueData;

use super::engine::SyncEngine;
use super::report::{BulkSyncReport, SyncStatus};

pub const DEFAULT_BULK_DELAY: Duration = Duration::from_millis(300);

/// Cooperative stop signal, checked between ideas.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reported after each idea.
#[derive(Debug, Clone, Copy)]
pub struct BulkProgress<'a> {
    pub processed: usize,
    pub total: usize,
    pub key: &'a str,
    pub status: SyncStatus,
}

/// Runs auto sync over every idea of a project, one at a time.
pub struct BulkDriver<'a> {
    engine: &'a SyncEngine,
    delay: Duration,
}

impl<'a> BulkDriver<'a> {
    pub fn new(engine: &'a SyncEngine) -> Self {
        Self {
            engine,
            delay: DEFAULT_BULK_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn bulk_sync(
        &self,
        project: &str,
        dry_run: bool,
        progress: &mut dyn FnMut(&BulkProgress<'_>),
        cancel: &CancelFlag,
    ) -> Result<BulkSyncReport> {
        let ideas = self.enumerate_ideas(project).await?;
        let total = ideas.len();
        info!("Found {total} ideas in {project}");

        let mut report = BulkSyncReport::new(project, dry_run);

        for (index, idea) in ideas.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Bulk sync of {project} cancelled after {index} of {total} ideas");
                report.cancelled = true;
                break;
            }

            let result = self.engine.auto_sync_issue(idea, dry_run).await;
            let fatal = result.is_fatal().then(|| result.error.clone().unwrap_or_default());

            progress(&BulkProgress {
                processed: index + 1,
                total,
                key: &idea.key,
                status: result.status,
            });
            report.record(result);

            if let Some(reason) = fatal {
                warn!("Aborting bulk sync of {project}: {reason}");
                report.aborted = Some(reason);
                break;
            }

            if index + 1 < total && !self.delay.is_zero() {
                self.engine.client().sleeper().sleep(self.delay).await;
            }
        }

        report.finish();
        info!(
            "Bulk sync of {project}: {} attempted, {} succeeded, {} partial, {} skipped, {} failed",
            report.attempted, report.succeeded, report.partial, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn enumerate_ideas(&self, project: &str) -> Result<Vec<IssueData>> {
        let jql = format!(
            "project = \"{project}\" AND issuetype = \"{}\" ORDER BY key ASC",
            self.engine.mapper().idea_issue_type()
        );
        let fields = ["*all"];
        self.engine
            .client()
            .search_issues(&jql, &fields)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jira::retry::testing::RecordingSleeper;
    use crate::jira::testing::test_client;
    use crate::sync::links::LinkResolver;
    use crate::sync::mapper::FieldMapper;
    use crate::sync::testing::{
        delivery_link, issue_json, mock_fields, mock_issue, mock_update, AV_PRD, IDEA_PRD,
    };
    use mockito::{Matcher, ServerGuard};
    use serde_json::{json, Value};

    const DELAY: Duration = Duration::from_millis(5);

    fn engine(server: &ServerGuard) -> (SyncEngine, Arc<RecordingSleeper>) {
        let (client, sleeper) = test_client(&server.url());
        let engine = SyncEngine::new(
            client,
            FieldMapper::new("Idea"),
            LinkResolver::new("Polaris work item link"),
        );
        (engine, sleeper)
    }

    /// IDEA-1..=IDEA-n, each linked to AV-n which has a PRD due date.
    async fn mock_linked_ideas(server: &mut ServerGuard, n: usize) {
        mock_fields(server).await;

        let ideas: Vec<Value> = (1..=n)
            .map(|i| {
                issue_json(
                    &format!("IDEA-{i}"),
                    "Idea",
                    json!({ IDEA_PRD: null, "issuelinks": [delivery_link(&format!("AV-{i}"))] }),
                )
            })
            .collect();
        server
            .mock("GET", "/rest/api/3/search/jql")
            .match_query(Matcher::UrlEncoded(
                "jql".into(),
                "project = \"IDEA\" AND issuetype = \"Idea\" ORDER BY key ASC".into(),
            ))
            .with_status(200)
            .with_body(json!({ "issues": ideas, "isLast": true }).to_string())
            .create_async()
            .await;

        for i in 1..=n {
            mock_issue(
                server,
                issue_json(&format!("AV-{i}"), "Epic", json!({ AV_PRD: "2024-06-01" })),
            )
            .await;
        }
    }

    #[tokio::test]
    async fn test_one_permission_error_does_not_stop_the_run() {
        let mut server = mockito::Server::new_async().await;
        mock_linked_ideas(&mut server, 10).await;
        for i in 1..=10 {
            let status = if i == 4 { 403 } else { 204 };
            mock_update(&mut server, &format!("IDEA-{i}"), status).await;
        }
        let (engine, sleeper) = engine(&server);
        let mut seen = Vec::new();

        let report = BulkDriver::new(&engine)
            .with_delay(DELAY)
            .bulk_sync(
                "IDEA",
                false,
                &mut |p| seen.push((p.processed, p.total, p.key.to_string())),
                &CancelFlag::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.attempted, 10);
        assert_eq!(report.succeeded, 9);
        assert_eq!(report.failed, 1);
        assert_eq!(report.results[3].target_key, "IDEA-4");
        assert_eq!(report.results[3].status, SyncStatus::Failed);
        assert!(report.aborted.is_none());
        assert!(report.finished_at.is_some());

        let keys: Vec<&str> = report.results.iter().map(|r| r.target_key.as_str()).collect();
        assert_eq!(keys[0], "IDEA-1");
        assert_eq!(keys[9], "IDEA-10");
        assert_eq!(seen.len(), 10);
        assert_eq!(seen[9], (10, 10, "IDEA-10".to_string()));

        // no delay after the last idea
        assert_eq!(sleeper.recorded(), vec![DELAY; 9]);
    }

    #[tokio::test]
    async fn test_cancel_stops_between_ideas() {
        let mut server = mockito::Server::new_async().await;
        mock_linked_ideas(&mut server, 5).await;
        for i in 1..=5 {
            mock_update(&mut server, &format!("IDEA-{i}"), 204).await;
        }
        let (engine, _) = engine(&server);
        let cancel = CancelFlag::new();
        let flag = cancel.clone();

        let report = BulkDriver::new(&engine)
            .with_delay(Duration::ZERO)
            .bulk_sync(
                "IDEA",
                false,
                &mut |p| {
                    if p.processed == 2 {
                        flag.cancel();
                    }
                },
                &cancel,
            )
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.attempted, 2);
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_run() {
        let mut server = mockito::Server::new_async().await;
        mock_linked_ideas(&mut server, 3).await;
        mock_update(&mut server, "IDEA-1", 204).await;
        server
            .mock("PUT", "/rest/api/3/issue/IDEA-2")
            .with_status(401)
            .with_body("Client must be authenticated to access this resource.")
            .create_async()
            .await;
        let untouched = server
            .mock("PUT", "/rest/api/3/issue/IDEA-3")
            .expect(0)
            .create_async()
            .await;
        let (engine, _) = engine(&server);

        let report = BulkDriver::new(&engine)
            .with_delay(Duration::ZERO)
            .bulk_sync("IDEA", false, &mut |_| {}, &CancelFlag::new())
            .await
            .unwrap();

        untouched.assert_async().await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, 1);
        let reason = report.aborted.as_deref().unwrap();
        assert!(reason.starts_with("Authentication failed"));
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let mut server = mockito::Server::new_async().await;
        mock_linked_ideas(&mut server, 2).await;
        let put = server
            .mock("PUT", Matcher::Regex(r"^/rest/api/3/issue/".into()))
            .expect(0)
            .create_async()
            .await;
        let (engine, _) = engine(&server);

        let report = BulkDriver::new(&engine)
            .with_delay(Duration::ZERO)
            .bulk_sync("IDEA", true, &mut |_| {}, &CancelFlag::new())
            .await
            .unwrap();

        put.assert_async().await;
        assert!(report.dry_run);
        assert_eq!(report.succeeded, 2);
        assert!(report.results.iter().all(|r| r.dry_run));
    }

    #[tokio::test]
    async fn test_failed_enumeration_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/api/3/search/jql")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"errorMessages":["The value 'NOPE' does not exist for the field 'project'."]}"#)
            .create_async()
            .await;
        let (engine, _) = engine(&server);

        let err = BulkDriver::new(&engine)
            .bulk_sync("NOPE", false, &mut |_| {}, &CancelFlag::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("does not exist"));
    }
}
