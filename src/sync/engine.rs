use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JiraError, LinkError, Result};
use crate::jira::types::Myself;
use crate::jira::{browse_url, IssueData, IssueRef, JiraClient};

use super::fields::{FieldValue, MilestoneDateSet, MilestoneField};
use super::links::{LinkResolution, LinkResolver, Reference};
use super::mapper::{FieldMapper, FieldSchema};
use super::report::{SkipReason, SyncResult};

/// What auto sync does when an idea has several delivery links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    /// Leave the idea alone and report the candidates.
    #[default]
    Skip,
    /// Sync from the tie-break winner and note the others.
    Warn,
}

/// Stage one of auto sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSyncPlan {
    Sync { source: IssueRef, note: Option<String> },
    Skip(String),
}

/// Milestone values and other populated fields of one issue.
#[derive(Debug, Clone, Serialize)]
pub struct IssueFieldListing {
    pub issue: IssueRef,
    pub summary: String,
    pub is_idea: bool,
    pub url: String,
    pub dates: MilestoneDateSet,
    pub field_ids: BTreeMap<MilestoneField, String>,
    /// Every populated field, present only when requested.
    pub other_fields: Vec<FieldEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldEntry {
    pub id: String,
    pub name: String,
    pub value: String,
}

/// Textual references from `issue` to `target`.
#[derive(Debug, Clone, Serialize)]
pub struct LinkCheck {
    pub issue: String,
    pub target: String,
    pub references: Vec<Reference>,
}

/// Whether `issue` mentions `target` anywhere.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceCheck {
    pub issue: String,
    pub target: String,
    pub referenced: bool,
}

/// The engineering issue auto sync would read for `idea`.
#[derive(Debug, Clone, Serialize)]
pub struct LinkLookup {
    pub idea: String,
    #[serde(flatten)]
    pub resolution: LinkResolution,
}

#[derive(Debug, Clone, Serialize)]
pub struct MappingReport {
    pub milestones: Vec<&'static str>,
    pub link_type: String,
    pub idea_issue_type: String,
    pub schema: Option<FieldSchema>,
}

impl MappingReport {
    /// The recognized names without any project schema.
    pub fn recognized(link_type: &str, idea_issue_type: &str) -> Self {
        Self {
            milestones: MilestoneField::ALL.iter().map(|f| f.label()).collect(),
            link_type: link_type.to_string(),
            idea_issue_type: idea_issue_type.to_string(),
            schema: None,
        }
    }
}

/// Copies milestone dates between Jira issues and Product Discovery ideas.
pub struct SyncEngine {
    client: JiraClient,
    mapper: FieldMapper,
    resolver: LinkResolver,
    ambiguity: AmbiguityPolicy,
}

impl SyncEngine {
    pub fn new(client: JiraClient, mapper: FieldMapper, resolver: LinkResolver) -> Self {
        Self {
            client,
            mapper,
            resolver,
            ambiguity: AmbiguityPolicy::default(),
        }
    }

    pub fn with_ambiguity_policy(mut self, ambiguity: AmbiguityPolicy) -> Self {
        self.ambiguity = ambiguity;
        self
    }

    pub fn client(&self) -> &JiraClient {
        &self.client
    }

    pub fn mapper(&self) -> &FieldMapper {
        &self.mapper
    }

    /// Copies every milestone set on `source_key` to `target_key`.
    ///
    /// Never returns an error: fetch and write failures end up in the result.
    pub async fn sync_one(&self, source_key: &str, target_key: &str, dry_run: bool) -> SyncResult {
        let issues = async {
            let source = self.client.fetch_issue(source_key).await?;
            let target = self.client.fetch_issue(target_key).await?;
            Ok::<_, JiraError>((source, target))
        };

        match issues.await {
            Ok((source, target)) => self.sync_issues(&source, &target, dry_run).await,
            Err(err) => {
                warn!("Cannot sync {source_key} -> {target_key}: {err}");
                SyncResult::failed(Some(source_key), target_key, dry_run, &err)
            }
        }
    }

    /// Sync between two already fetched issues.
    pub async fn sync_issues(&self, source: &IssueData, target: &IssueData, dry_run: bool) -> SyncResult {
        let mut result = SyncResult::new(Some(&source.key), &target.key, dry_run);

        if let Err(err) = self.copy_dates(source, target, &mut result).await {
            warn!("Sync {} -> {} failed: {err}", source.key, target.key);
            result.fail(&err);
        }
        result.settle();

        info!(
            "{} -> {}: {} ({} copied, {} skipped)",
            source.key,
            target.key,
            result.status,
            result.fields_copied.len(),
            result.fields_skipped.len()
        );
        result
    }

    async fn copy_dates(&self, source: &IssueData, target: &IssueData, result: &mut SyncResult) -> Result<()> {
        let source_schema = self.mapper.resolve_schema(&self.client, source).await?;
        let target_schema = self.mapper.resolve_schema(&self.client, target).await?;

        let source_dates = self.mapper.read_dates(source, &source_schema);
        let target_dates = self.mapper.read_dates(target, &target_schema);
        result.values = source_dates.clone();

        let to_copy = diff(&source_dates, &target_dates, &mut result.fields_skipped);
        if to_copy.populated_count() == 0 {
            debug!("Nothing to copy from {} to {}", source.key, target.key);
            return Ok(());
        }

        let mut payload = self.mapper.build_update_payload(&to_copy, &target_schema);
        let mut pending: BTreeMap<String, MilestoneField> = to_copy
            .populated()
            .filter_map(|(field, _)| target_schema.slot(field).map(|slot| (slot.id.clone(), field)))
            .collect();

        if result.dry_run {
            result.fields_copied = pending.into_values().collect();
            result.notes.push(format!(
                "Dry run: {} field(s) would be updated on {}",
                result.fields_copied.len(),
                target.key
            ));
            return Ok(());
        }

        match self.client.update_fields(&target.key, &payload).await {
            Ok(()) => {}
            Err(JiraError::Validation {
                message,
                field_errors,
            }) => {
                let rejected: Vec<String> = pending
                    .keys()
                    .filter(|id| field_errors.contains_key(*id))
                    .cloned()
                    .collect();
                if rejected.is_empty() || rejected.len() == pending.len() {
                    return Err(JiraError::Validation {
                        message,
                        field_errors,
                    });
                }

                for id in &rejected {
                    payload.shift_remove(id);
                    if let Some(field) = pending.remove(id) {
                        let reason = field_errors.get(id).cloned().unwrap_or_default();
                        result
                            .fields_skipped
                            .insert(field, SkipReason::RejectedByDestination(reason));
                    }
                }
                warn!(
                    "{} rejected {} field(s); retrying without them",
                    target.key,
                    rejected.len()
                );
                self.client.update_fields(&target.key, &payload).await?;
            }
            Err(err) => return Err(err),
        }

        result.fields_copied = pending.into_values().collect::<BTreeSet<_>>();
        Ok(())
    }

    /// Decides which engineering issue, if any, feeds `idea`.
    pub async fn plan_auto_sync(&self, idea: &IssueData) -> Result<AutoSyncPlan> {
        if !self.mapper.is_idea(idea) {
            return Ok(AutoSyncPlan::Skip(format!(
                "{} has issue type {}, expected {}",
                idea.key,
                idea.issue_type(),
                self.mapper.idea_issue_type()
            )));
        }

        let resolution = match self.resolver.resolve_links(&self.client, idea).await {
            Ok(resolution) => resolution,
            Err(LinkError::Jira(err)) => return Err(err),
            Err(err) => return Ok(AutoSyncPlan::Skip(err.to_string())),
        };

        match (resolution, self.ambiguity) {
            (LinkResolution::Unique(source), _) => Ok(AutoSyncPlan::Sync { source, note: None }),
            (ambiguous, AmbiguityPolicy::Skip) => match ambiguous.into_unique(&idea.key) {
                Ok(source) => Ok(AutoSyncPlan::Sync { source, note: None }),
                Err(err) => Ok(AutoSyncPlan::Skip(err.to_string())),
            },
            (ambiguous, AmbiguityPolicy::Warn) => {
                let source = ambiguous.chosen().clone();
                let note = ambiguous
                    .into_unique(&idea.key)
                    .err()
                    .map(|err| err.to_string());
                Ok(AutoSyncPlan::Sync { source, note })
            }
        }
    }

    /// Finds the idea's engineering issue and copies its dates onto the idea.
    pub async fn auto_sync(&self, idea_key: &str, dry_run: bool) -> SyncResult {
        match self.client.fetch_issue(idea_key).await {
            Ok(idea) => self.auto_sync_issue(&idea, dry_run).await,
            Err(err) => {
                warn!("Cannot load {idea_key}: {err}");
                SyncResult::failed(None, idea_key, dry_run, &err)
            }
        }
    }

    pub async fn auto_sync_issue(&self, idea: &IssueData, dry_run: bool) -> SyncResult {
        let (source, note) = match self.plan_auto_sync(idea).await {
            Ok(AutoSyncPlan::Sync { source, note }) => (source, note),
            Ok(AutoSyncPlan::Skip(reason)) => {
                info!("Skipping {}: {reason}", idea.key);
                return SyncResult::skipped(None, &idea.key, dry_run, reason);
            }
            Err(err) => {
                warn!("Cannot resolve links of {}: {err}", idea.key);
                return SyncResult::failed(None, &idea.key, dry_run, &err);
            }
        };

        let mut result = match self.client.fetch_issue(&source.key).await {
            Ok(source_issue) => self.sync_issues(&source_issue, idea, dry_run).await,
            Err(err) => SyncResult::failed(Some(&source.key), &idea.key, dry_run, &err),
        };
        if let Some(note) = note {
            result.notes.insert(0, note);
        }
        result
    }

    pub async fn check_reference(&self, issue_key: &str, target_key: &str) -> Result<ReferenceCheck> {
        let referenced = self.resolver.check_reference(&self.client, issue_key, target_key).await?;
        Ok(ReferenceCheck {
            issue: issue_key.to_string(),
            target: target_key.to_string(),
            referenced,
        })
    }

    pub async fn find_references(&self, issue_key: &str, target_key: &str) -> Result<Vec<Reference>> {
        self.resolver.find_references(&self.client, issue_key, target_key).await
    }

    /// References in both directions between two issues.
    pub async fn check_links(&self, first: &str, second: &str) -> Result<[LinkCheck; 2]> {
        let forward = self.find_references(first, second).await?;
        let backward = self.find_references(second, first).await?;
        Ok([
            LinkCheck {
                issue: first.to_string(),
                target: second.to_string(),
                references: forward,
            },
            LinkCheck {
                issue: second.to_string(),
                target: first.to_string(),
                references: backward,
            },
        ])
    }

    pub async fn find_linked_issue(&self, idea_key: &str) -> std::result::Result<LinkLookup, LinkError> {
        let resolution = self.resolver.find_linked_issue(&self.client, idea_key).await?;
        Ok(LinkLookup {
            idea: idea_key.to_string(),
            resolution,
        })
    }

    /// Read-only view of an issue's milestones and, with `all`, every populated field.
    pub async fn list_fields(&self, key: &str, all: bool) -> Result<IssueFieldListing> {
        let issue = self.client.fetch_issue(key).await?;
        let schema = self.mapper.resolve_schema(&self.client, &issue).await?;
        let is_idea = self.mapper.is_idea(&issue);

        let other_fields = if all {
            let mut names = self.mapper.field_names(&self.client).await?;
            names.extend(issue.names.clone());

            let mut entries: Vec<FieldEntry> = issue
                .fields
                .iter()
                .filter_map(|(id, value)| {
                    let value = render_value(value)?;
                    Some(FieldEntry {
                        id: id.clone(),
                        name: names.get(id).cloned().unwrap_or_else(|| id.clone()),
                        value,
                    })
                })
                .collect();
            entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            entries
        } else {
            Vec::new()
        };

        Ok(IssueFieldListing {
            url: browse_url(self.client.base_url(), &issue.key, is_idea),
            summary: issue.summary().to_string(),
            issue: issue.issue_ref(),
            is_idea,
            dates: self.mapper.read_dates(&issue, &schema),
            field_ids: schema
                .slots()
                .filter_map(|(field, slot)| slot.map(|slot| (field, slot.id.clone())))
                .collect(),
            other_fields,
        })
    }

    /// Recognized milestone names and, for `project`, where they live.
    pub async fn show_mapping(&self, project: Option<&str>) -> Result<MappingReport> {
        let schema = match project {
            Some(project) => {
                let schema = self.mapper.resolve_project_schema(&self.client, project).await?;
                Some(FieldSchema::clone(&schema))
            }
            None => None,
        };

        Ok(MappingReport {
            schema,
            ..MappingReport::recognized(self.resolver.link_type(), self.mapper.idea_issue_type())
        })
    }

    pub async fn test_connection(&self) -> Result<Myself> {
        let me = self.client.myself().await?;
        info!("Connected to {} as {}", self.client.base_url(), me.display_name);
        Ok(me)
    }
}

/// Field-level diff. Returns the values to write; records every skip.
fn diff(
    source: &MilestoneDateSet,
    target: &MilestoneDateSet,
    skipped: &mut BTreeMap<MilestoneField, SkipReason>,
) -> MilestoneDateSet {
    let mut to_copy = MilestoneDateSet::new();

    for field in MilestoneField::ALL {
        let skip = match (source.get(field), target.get(field)) {
            (FieldValue::NotPresent, _) => SkipReason::NotApplicableToSource,
            (FieldValue::Unset, _) => SkipReason::NoValueOnSource,
            (FieldValue::Invalid { reason, .. }, _) => SkipReason::InvalidSourceValue(reason.clone()),
            (_, FieldValue::NotPresent) => SkipReason::NotPresentOnDestination,
            (FieldValue::Set { date }, current) if current.date() == Some(*date) => {
                SkipReason::AlreadyUpToDate
            }
            (value @ FieldValue::Set { .. }, _) => {
                to_copy.insert(field, value.clone());
                continue;
            }
        };
        skipped.insert(field, skip);
    }

    to_copy
}

/// Short text for a populated field value, `None` when empty.
fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) => ["displayName", "name", "value", "key"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| Some(value.to_string())),
        other => Some(other.to_string()),
    }
}
