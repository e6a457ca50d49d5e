/// Builds the web URL for an issue or idea.
///
/// Ideas live under the Product Discovery UI, everything else under `/browse`.
///
/// # Arguments
///
/// * `base_url` - Jira instance base URL (e.g., <https://example.atlassian.net>)
/// * `key` - Issue key (e.g., "IDEA-42")
/// * `is_idea` - Whether the issue is a JPD idea
pub fn browse_url(base_url: &str, key: &str, is_idea: bool) -> String {
    let base_url = base_url.trim_end_matches('/');
    if is_idea {
        format!("{base_url}/jira/discovery/browse/{key}")
    } else {
        format!("{base_url}/browse/{key}")
    }
}
