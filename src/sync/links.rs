use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use crate::error::{LinkError, Result};
use crate::jira::types::{compare_keys, project_of};
use crate::jira::{IssueData, IssueRef, JiraClient};

const EXCERPT_CHARS: usize = 100;

/// Result of looking up an idea's engineering issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LinkResolution {
    Unique(IssueRef),
    /// Several candidates; `chosen` is the tie-break winner and `candidates`
    /// lists all of them in tie-break order.
    Ambiguous {
        chosen: IssueRef,
        candidates: Vec<IssueRef>,
    },
}

impl LinkResolution {
    pub fn chosen(&self) -> &IssueRef {
        match self {
            LinkResolution::Unique(issue) => issue,
            LinkResolution::Ambiguous { chosen, .. } => chosen,
        }
    }

    /// Treats ambiguity as an error.
    pub fn into_unique(self, idea: &str) -> std::result::Result<IssueRef, LinkError> {
        match self {
            LinkResolution::Unique(issue) => Ok(issue),
            LinkResolution::Ambiguous { chosen, candidates } => Err(LinkError::AmbiguousLink {
                idea: idea.to_string(),
                chosen: chosen.key,
                candidates: candidates.into_iter().map(|c| c.key).collect(),
            }),
        }
    }
}

/// A place in an issue where another issue's key shows up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub field: String,
    pub excerpt: String,
}

/// Finds formally linked engineering issues and textual references.
pub struct LinkResolver {
    link_type: String,
}

impl LinkResolver {
    pub fn new(link_type: impl Into<String>) -> Self {
        Self {
            link_type: link_type.into(),
        }
    }

    pub fn link_type(&self) -> &str {
        &self.link_type
    }

    pub async fn find_linked_issue(
        &self,
        client: &JiraClient,
        idea_key: &str,
    ) -> std::result::Result<LinkResolution, LinkError> {
        let idea = client.fetch_issue(idea_key).await?;
        self.resolve_links(client, &idea).await
    }

    /// Picks the engineering issue among `idea`'s links.
    ///
    /// Only links of the configured type pointing outside the idea's project
    /// count. With several candidates the most recently updated wins, then
    /// the lowest key.
    pub async fn resolve_links(
        &self,
        client: &JiraClient,
        idea: &IssueData,
    ) -> std::result::Result<LinkResolution, LinkError> {
        let idea_project = idea.project_key();
        let mut candidates: Vec<IssueRef> = Vec::new();

        for link in idea.links() {
            if !link.link_type_name.eq_ignore_ascii_case(&self.link_type) {
                continue;
            }
            let target_project = project_of(&link.target_key);
            if target_project.eq_ignore_ascii_case(&idea_project) {
                continue;
            }
            if candidates.iter().any(|c| c.key == link.target_key) {
                continue;
            }
            candidates.push(IssueRef {
                project: target_project.to_string(),
                key: link.target_key,
                issue_type: link.target_issue_type,
            });
        }

        match candidates.len() {
            0 => Err(LinkError::NoLinkFound {
                idea: idea.key.clone(),
                link_type: self.link_type.clone(),
            }),
            1 => Ok(LinkResolution::Unique(candidates.remove(0))),
            n => {
                debug!("{} has {n} linked candidates, applying tie-break", idea.key);
                let mut ranked = Vec::with_capacity(n);
                for candidate in candidates {
                    match client.fetch_issue(&candidate.key).await {
                        Ok(issue) => ranked.push((issue.updated(), issue.issue_ref())),
                        Err(err) if err.is_fatal() => return Err(err.into()),
                        // Unreadable candidates rank after every readable one
                        Err(err) => {
                            warn!("Cannot read {} while ranking links of {}: {err}", candidate.key, idea.key);
                            ranked.push((None, candidate));
                        }
                    }
                }
                ranked.sort_by(|(a_updated, a), (b_updated, b)| {
                    b_updated
                        .cmp(a_updated)
                        .then_with(|| compare_keys(&a.key, &b.key))
                });

                let candidates: Vec<IssueRef> = ranked.into_iter().map(|(_, issue)| issue).collect();
                let chosen = candidates[0].clone();
                warn!(
                    "{} links to {} engineering issues; most recently updated is {}",
                    idea.key,
                    candidates.len(),
                    chosen.key
                );
                Ok(LinkResolution::Ambiguous { chosen, candidates })
            }
        }
    }

    /// Whether `issue_key` mentions `target_key` anywhere.
    pub async fn check_reference(&self, client: &JiraClient, issue_key: &str, target_key: &str) -> Result<bool> {
        Ok(!self.find_references(client, issue_key, target_key).await?.is_empty())
    }

    /// Every field (and issue link) of `issue_key` that contains `target_key`.
    pub async fn find_references(
        &self,
        client: &JiraClient,
        issue_key: &str,
        target_key: &str,
    ) -> Result<Vec<Reference>> {
        let issue = client.fetch_issue(issue_key).await?;
        Ok(scan_references(&issue, target_key))
    }
}

/// Case-insensitive substring scan over links and all field values.
pub fn scan_references(issue: &IssueData, target_key: &str) -> Vec<Reference> {
    let needle = target_key.to_uppercase();
    let mut references = Vec::new();

    for link in issue.links() {
        if link.target_key.eq_ignore_ascii_case(target_key) {
            references.push(Reference {
                field: "Issue Links".to_string(),
                excerpt: format!("{} → {}", link.label, link.target_key),
            });
        }
    }

    let mut ids: Vec<&String> = issue.fields.keys().filter(|id| *id != "issuelinks").collect();
    ids.sort();

    for id in ids {
        let mut texts = Vec::new();
        collect_strings(&issue.fields[id.as_str()], &mut texts);

        if let Some(hit) = texts.iter().find(|text| text.to_uppercase().contains(&needle)) {
            let name = issue.names.get(id.as_str()).unwrap_or(id);
            references.push(Reference {
                field: name.clone(),
                excerpt: excerpt(hit),
            });
        }
    }

    references
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_strings(item, out)),
        _ => {}
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() > EXCERPT_CHARS {
        let cut: String = text.chars().take(EXCERPT_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
