use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};

use crate::error::Result;
use crate::jira::{FieldDefinition, IssueData, JiraClient};

use super::fields::{parse_value, FieldFormat, FieldValue, MilestoneDateSet, MilestoneField};

/// Where a milestone lives in one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSlot {
    pub id: String,
    pub format: FieldFormat,
}

/// Milestone name → field id for one issue type of one project.
/// `None` means issues of that type carry no such field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSchema {
    pub project: String,
    pub issue_type: String,
    pub is_idea: bool,
    slots: BTreeMap<MilestoneField, Option<FieldSlot>>,
}

impl FieldSchema {
    pub fn new(project: impl Into<String>, issue_type: impl Into<String>, is_idea: bool) -> Self {
        Self {
            project: project.into(),
            issue_type: issue_type.into(),
            is_idea,
            slots: MilestoneField::ALL.into_iter().map(|f| (f, None)).collect(),
        }
    }

    pub fn with_slot(mut self, field: MilestoneField, id: impl Into<String>, format: FieldFormat) -> Self {
        self.slots.insert(
            field,
            Some(FieldSlot {
                id: id.into(),
                format,
            }),
        );
        self
    }

    pub fn slot(&self, field: MilestoneField) -> Option<&FieldSlot> {
        self.slots.get(&field).and_then(Option::as_ref)
    }

    pub fn slots(&self) -> impl Iterator<Item = (MilestoneField, Option<&FieldSlot>)> {
        self.slots.iter().map(|(field, slot)| (*field, slot.as_ref()))
    }
}

/// Jira configures custom fields per project and issue type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SchemaKey {
    project: String,
    issue_type: String,
}

impl SchemaKey {
    fn of(issue: &IssueData) -> Self {
        Self {
            project: issue.project_key(),
            issue_type: issue.issue_type().to_lowercase(),
        }
    }
}

/// Schemas resolved during this run.
#[derive(Default)]
pub struct SchemaCache {
    schemas: Mutex<HashMap<SchemaKey, Arc<FieldSchema>>>,
}

/// Maps milestone names to field ids and converts values both ways.
pub struct FieldMapper {
    idea_issue_type: String,
    definitions: OnceCell<Vec<FieldDefinition>>,
    cache: SchemaCache,
}

impl FieldMapper {
    pub fn new(idea_issue_type: impl Into<String>) -> Self {
        Self {
            idea_issue_type: idea_issue_type.into(),
            definitions: OnceCell::new(),
            cache: SchemaCache::default(),
        }
    }

    pub fn is_idea(&self, issue: &IssueData) -> bool {
        issue.issue_type().eq_ignore_ascii_case(&self.idea_issue_type)
    }

    pub fn idea_issue_type(&self) -> &str {
        &self.idea_issue_type
    }

    /// Global field list, fetched once per mapper.
    pub async fn definitions(&self, client: &JiraClient) -> Result<&[FieldDefinition]> {
        let definitions = self
            .definitions
            .get_or_try_init(|| async {
                let definitions = client.list_field_definitions().await?;
                debug!("Loaded {} field definitions", definitions.len());
                Ok::<_, crate::error::JiraError>(definitions)
            })
            .await?;
        Ok(definitions.as_slice())
    }

    /// Field id → display name.
    pub async fn field_names(&self, client: &JiraClient) -> Result<HashMap<String, String>> {
        Ok(self
            .definitions(client)
            .await?
            .iter()
            .map(|def| (def.id.clone(), def.name.clone()))
            .collect())
    }

    /// Resolves (and memoizes) the milestone schema for issues like `issue`.
    ///
    /// The issue payload (fetched with `fields=*all`) lists every field
    /// configured for its project and issue type, so presence is read from
    /// the issue itself. Other issue types of the same project are resolved
    /// separately.
    pub async fn resolve_schema(&self, client: &JiraClient, issue: &IssueData) -> Result<Arc<FieldSchema>> {
        let key = SchemaKey::of(issue);
        let mut schemas = self.cache.schemas.lock().await;
        if let Some(schema) = schemas.get(&key) {
            return Ok(Arc::clone(schema));
        }

        let definitions = self.definitions(client).await?;
        let present: HashSet<&str> = issue.fields.keys().map(String::as_str).collect();
        let schema = build_schema(
            &key.project,
            issue.issue_type(),
            self.is_idea(issue),
            definitions,
            &present,
        );

        debug!(
            "Resolved schema for {} issues of {}: {} of {} milestone fields present",
            schema.issue_type,
            schema.project,
            schema.slots().filter(|(_, slot)| slot.is_some()).count(),
            MilestoneField::ALL.len()
        );

        let schema = Arc::new(schema);
        schemas.insert(key, Arc::clone(&schema));
        Ok(schema)
    }

    /// Schema of the most recently updated issue's type in `project`.
    ///
    /// A project with no issues has every milestone not present.
    pub async fn resolve_project_schema(&self, client: &JiraClient, project: &str) -> Result<Arc<FieldSchema>> {
        let sample = client
            .first_issue(&format!("project = \"{project}\" ORDER BY updated DESC"))
            .await?;
        match sample {
            Some(sample) => self.resolve_schema(client, &sample).await,
            None => {
                info!("Project {project} has no issues; no milestone fields available");
                Ok(Arc::new(FieldSchema::new(project, "", false)))
            }
        }
    }

    /// Reads every milestone of `issue` through `schema`.
    pub fn read_dates(&self, issue: &IssueData, schema: &FieldSchema) -> MilestoneDateSet {
        read_dates(issue, schema)
    }

    /// Field id → serialized value for the populated entries of `dates`.
    pub fn build_update_payload(&self, dates: &MilestoneDateSet, schema: &FieldSchema) -> IndexMap<String, Value> {
        build_update_payload(dates, schema)
    }
}

fn build_schema(
    project: &str,
    issue_type: &str,
    is_idea: bool,
    definitions: &[FieldDefinition],
    present: &HashSet<&str>,
) -> FieldSchema {
    let mut schema = FieldSchema::new(project, issue_type, is_idea);

    for field in MilestoneField::ALL {
        let mut candidates: Vec<&FieldDefinition> = definitions
            .iter()
            .filter(|def| def.custom && MilestoneField::from_label(&def.name) == Some(field))
            .filter(|def| present.contains(def.id.as_str()))
            .collect();

        // Ideas store dates in string fields, classic projects in date pickers
        candidates.sort_by_key(|def| {
            let format = FieldFormat::from_schema_type(def.schema_type());
            let preferred = (format == FieldFormat::JpdInterval) == is_idea;
            (!preferred, custom_field_number(&def.id), def.id.clone())
        });

        if let Some(def) = candidates.first() {
            schema = schema.with_slot(field, def.id.clone(), FieldFormat::from_schema_type(def.schema_type()));
        }
    }

    schema
}

fn custom_field_number(id: &str) -> u64 {
    id.strip_prefix("customfield_")
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

pub fn read_dates(issue: &IssueData, schema: &FieldSchema) -> MilestoneDateSet {
    let mut dates = MilestoneDateSet::new();
    for (field, slot) in schema.slots() {
        let value = match slot {
            None => FieldValue::NotPresent,
            Some(slot) => issue
                .field(&slot.id)
                .map_or(FieldValue::NotPresent, parse_value),
        };
        dates.insert(field, value);
    }
    dates
}

pub fn build_update_payload(dates: &MilestoneDateSet, schema: &FieldSchema) -> IndexMap<String, Value> {
    dates
        .populated()
        .filter_map(|(field, date)| {
            schema
                .slot(field)
                .map(|slot| (slot.id.clone(), slot.format.serialize(date)))
        })
        .collect()
}
