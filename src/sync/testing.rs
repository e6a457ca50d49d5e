//! Mock-server fixtures shared by the engine, resolver and bulk tests.

use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};

/// Field list with a classic (date) and a JPD (string) variant of each milestone.
pub const FIELDS_BODY: &str = r#"[
    {"id":"summary","name":"Summary","custom":false,"schema":{"type":"string"}},
    {"id":"customfield_11188","name":"PRD Due Date","custom":true,"schema":{"type":"date"}},
    {"id":"customfield_12652","name":"PRD Due Date","custom":true,"schema":{"type":"string"}},
    {"id":"customfield_10015","name":"Start date","custom":true,"schema":{"type":"date"}},
    {"id":"customfield_13039","name":"Start Date","custom":true,"schema":{"type":"string"}},
    {"id":"customfield_10071","name":"GA Estimated Date","custom":true,"schema":{"type":"datetime"}}
]"#;

/// Classic project milestone ids.
pub const AV_PRD: &str = "customfield_11188";
pub const AV_START: &str = "customfield_10015";
/// Idea project milestone ids.
pub const IDEA_PRD: &str = "customfield_12652";
pub const IDEA_START: &str = "customfield_13039";

/// Issue JSON with the standard identity fields filled in.
pub fn issue_json(key: &str, issue_type: &str, extra: Value) -> Value {
    let project = key.rsplit_once('-').map_or(key, |(p, _)| p);
    let mut fields = json!({
        "summary": format!("Summary of {key}"),
        "issuetype": { "name": issue_type },
        "project": { "key": project },
        "updated": "2024-05-01T10:00:00.000+0000",
    });
    if let (Some(fields), Value::Object(extra)) = (fields.as_object_mut(), extra) {
        fields.extend(extra);
    }
    json!({ "id": "1", "key": key, "fields": fields })
}

pub async fn mock_fields(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", "/rest/api/3/field")
        .with_status(200)
        .with_body(FIELDS_BODY)
        .create_async()
        .await
}

/// Answers the "most recently updated issue of the project" search with `sample`.
pub async fn mock_project_sample(server: &mut ServerGuard, sample: Value) -> Mock {
    let project = sample["fields"]["project"]["key"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    server
        .mock("GET", "/rest/api/3/search/jql")
        .match_query(Matcher::UrlEncoded(
            "jql".into(),
            format!("project = \"{project}\" ORDER BY updated DESC"),
        ))
        .with_status(200)
        .with_body(json!({ "issues": [sample], "isLast": true }).to_string())
        .create_async()
        .await
}

pub async fn mock_issue(server: &mut ServerGuard, body: Value) -> Mock {
    let key = body["key"].as_str().unwrap_or_default().to_string();
    server
        .mock("GET", format!("/rest/api/3/issue/{key}").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await
}

pub async fn mock_update(server: &mut ServerGuard, key: &str, status: usize) -> Mock {
    server
        .mock("PUT", format!("/rest/api/3/issue/{key}").as_str())
        .with_status(status)
        .create_async()
        .await
}

/// JPD link payload pointing from an idea to `target`.
pub fn delivery_link(target: &str) -> Value {
    json!({
        "type": {
            "name": "Polaris work item link",
            "inward": "is implemented by",
            "outward": "implements"
        },
        "inwardIssue": { "key": target, "fields": { "issuetype": { "name": "Epic" } } }
    })
}
