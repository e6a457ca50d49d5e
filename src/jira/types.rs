use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamp format used by Jira for `created`/`updated`.
const JIRA_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// An issue or idea as returned by `GET /rest/api/3/issue/{key}`.
///
/// Fields are kept as raw JSON because custom field ids differ per instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueData {
    #[serde(default)]
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Field id → display name, present when requested with `expand=names`.
    #[serde(default)]
    pub names: HashMap<String, String>,
}

impl IssueData {
    pub fn field(&self, id: &str) -> Option<&Value> {
        self.fields.get(id)
    }

    pub fn summary(&self) -> &str {
        self.fields
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn issue_type(&self) -> &str {
        self.fields
            .get("issuetype")
            .and_then(|t| t.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Project key from the `project` field, falling back to the key prefix.
    pub fn project_key(&self) -> String {
        self.fields
            .get("project")
            .and_then(|p| p.get("key"))
            .and_then(Value::as_str)
            .map_or_else(|| project_of(&self.key).to_string(), str::to_string)
    }

    pub fn updated(&self) -> Option<DateTime<FixedOffset>> {
        self.fields
            .get("updated")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_str(s, JIRA_TIMESTAMP_FORMAT).ok())
    }

    pub fn issue_ref(&self) -> IssueRef {
        IssueRef {
            key: self.key.clone(),
            project: self.project_key(),
            issue_type: self.issue_type().to_string(),
        }
    }

    /// Issue links seen from this issue, in both directions.
    pub fn links(&self) -> Vec<IssueLink> {
        let Some(raw) = self.fields.get("issuelinks") else {
            return Vec::new();
        };
        let Ok(links) = serde_json::from_value::<Vec<RawIssueLink>>(raw.clone()) else {
            return Vec::new();
        };

        links
            .into_iter()
            .filter_map(|link| {
                let (other, direction, label) = match (link.outward_issue, link.inward_issue) {
                    (Some(issue), _) => (issue, LinkDirection::Outward, link.link_type.outward),
                    (None, Some(issue)) => (issue, LinkDirection::Inward, link.link_type.inward),
                    (None, None) => return None,
                };
                let target_issue_type = other
                    .fields
                    .and_then(|f| f.issuetype)
                    .map(|t| t.name)
                    .unwrap_or_default();
                Some(IssueLink {
                    source_key: self.key.clone(),
                    target_key: other.key,
                    target_issue_type,
                    link_type_name: link.link_type.name,
                    direction,
                    label: label.unwrap_or_default(),
                })
            })
            .collect()
    }
}

/// Resolved identity of an issue or idea.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueRef {
    pub key: String,
    pub project: String,
    pub issue_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Outward,
    Inward,
}

/// A typed relation from `source_key` to `target_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLink {
    pub source_key: String,
    pub target_key: String,
    pub target_issue_type: String,
    pub link_type_name: String,
    pub direction: LinkDirection,
    /// Human-readable verb, e.g. "is implemented by".
    pub label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIssueLink {
    #[serde(rename = "type")]
    link_type: RawLinkType,
    outward_issue: Option<LinkedIssue>,
    inward_issue: Option<LinkedIssue>,
}

#[derive(Debug, Deserialize)]
struct RawLinkType {
    name: String,
    inward: Option<String>,
    outward: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkedIssue {
    key: String,
    fields: Option<LinkedIssueFields>,
}

#[derive(Debug, Deserialize)]
struct LinkedIssueFields {
    issuetype: Option<NamedType>,
}

#[derive(Debug, Deserialize)]
struct NamedType {
    name: String,
}

/// Entry of `GET /rest/api/3/field`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub schema: Option<FieldSchemaType>,
}

impl FieldDefinition {
    pub fn schema_type(&self) -> &str {
        self.schema
            .as_ref()
            .map_or("unknown", |schema| schema.field_type.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchemaType {
    #[serde(rename = "type")]
    pub field_type: String,
}

/// One page of `GET /rest/api/3/search/jql`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub issues: Vec<IssueData>,
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub is_last: Option<bool>,
}

/// Authenticated account, from `GET /rest/api/3/myself`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Myself {
    pub display_name: String,
    pub email_address: Option<String>,
}

/// Project prefix of an issue key ("AV-123" → "AV").
pub fn project_of(key: &str) -> &str {
    key.rsplit_once('-').map_or(key, |(project, _)| project)
}

/// Orders keys by project, then numerically by issue number.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    fn split(key: &str) -> (&str, u64) {
        match key.rsplit_once('-') {
            Some((project, number)) => (project, number.parse().unwrap_or(u64::MAX)),
            None => (key, u64::MAX),
        }
    }
    split(a).cmp(&split(b)).then_with(|| a.cmp(b))
}
