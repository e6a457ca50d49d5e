use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{stream, Stream, TryStreamExt};
use indexmap::IndexMap;
use log::{debug, warn};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use url::Url;

use crate::auth::Credentials;
use crate::error::{JiraError, Result};

use super::retry::{parse_retry_after, Attempt, RetryPolicy, Sleeper, TokioSleeper};
use super::types::{FieldDefinition, IssueData, Myself, SearchPage};

pub(crate) const PAGE_SIZE: usize = 50;
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(200);

/// Authenticated Jira REST v3 client.
///
/// Every call goes through the same pacing and retry path: requests are spaced
/// by `min_interval`, 429/5xx and dropped connections are retried per the
/// [`RetryPolicy`], and everything else is classified into a [`JiraError`].
pub struct JiraClient {
    client: Client,
    api_url: Url,
    base_url: String,
    credentials: Credentials,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl JiraClient {
    pub fn new(credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("jpd-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| JiraError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base_url = credentials.url.trim_end_matches('/').to_string();
        let api_url = Url::parse(&format!("{base_url}/"))
            .map_err(|e| JiraError::Config(format!("Invalid Jira URL: {e}")))?
            .join("rest/api/3/")
            .map_err(|e| JiraError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            base_url,
            credentials,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            min_interval: DEFAULT_MIN_INTERVAL,
            last_request: Mutex::new(None),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[cfg(test)]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|e| JiraError::Config(format!("Invalid endpoint {path}: {e}")))
    }

    /// Fetches an issue with every field and the id → name expansion.
    pub async fn fetch_issue(&self, key: &str) -> Result<IssueData> {
        let url = self.endpoint(&format!("issue/{key}"))?;
        let what = format!("GET issue {key}");
        self.send_json(&what, || {
            self.client
                .get(url.clone())
                .query(&[("fields", "*all"), ("expand", "names")])
        })
        .await
    }

    /// Lazily pages through a JQL search.
    ///
    /// Pages are only requested as the stream is polled.
    pub fn search_issues<'a>(
        &'a self,
        jql: &'a str,
        fields: &'a [&'a str],
    ) -> impl Stream<Item = Result<IssueData>> + 'a {
        let fields = fields.join(",");
        stream::try_unfold(Some(None::<String>), move |state| {
            let fields = fields.clone();
            async move {
                let Some(token) = state else {
                    return Ok::<_, JiraError>(None);
                };
                let page = self
                    .search_page(jql, &fields, PAGE_SIZE, token.as_deref())
                    .await?;
                debug!("Search page returned {} issues", page.issues.len());

                let next = match page.next_page_token {
                    Some(next) if !page.is_last.unwrap_or(false) && !page.issues.is_empty() => {
                        Some(Some(next))
                    }
                    _ => None,
                };
                Ok::<_, JiraError>(Some((page.issues, next)))
            }
        })
        .map_ok(|issues| stream::iter(issues.into_iter().map(Ok::<_, JiraError>)))
        .try_flatten()
    }

    /// First issue matching `jql` with all fields, if any.
    pub async fn first_issue(&self, jql: &str) -> Result<Option<IssueData>> {
        let page = self.search_page(jql, "*all", 1, None).await?;
        Ok(page.issues.into_iter().next())
    }

    async fn search_page(
        &self,
        jql: &str,
        fields: &str,
        max_results: usize,
        next_page_token: Option<&str>,
    ) -> Result<SearchPage> {
        let url = self.endpoint("search/jql")?;
        let max_results = max_results.to_string();
        self.send_json("search", || {
            let mut request = self.client.get(url.clone()).query(&[
                ("jql", jql),
                ("fields", fields),
                ("maxResults", max_results.as_str()),
            ]);
            if let Some(token) = next_page_token {
                request = request.query(&[("nextPageToken", token)]);
            }
            request
        })
        .await
    }

    /// Writes a partial field payload. The same body is resent on retry.
    pub async fn update_fields(&self, key: &str, fields: &IndexMap<String, Value>) -> Result<()> {
        let url = self.endpoint(&format!("issue/{key}"))?;
        let body = json!({ "fields": fields });
        let what = format!("PUT issue {key}");
        self.send(&what, || self.client.request(Method::PUT, url.clone()).json(&body))
            .await?;
        Ok(())
    }

    pub async fn list_field_definitions(&self) -> Result<Vec<FieldDefinition>> {
        let url = self.endpoint("field")?;
        self.send_json("GET fields", || self.client.get(url.clone()))
            .await
    }

    pub async fn myself(&self) -> Result<Myself> {
        let url = self.endpoint("myself")?;
        self.send_json("GET myself", || self.client.get(url.clone()))
            .await
    }

    async fn send_json<T, F>(&self, what: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let response = self.send(what, build).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        self.retry
            .run(&self.sleeper, what, |_| {
                let request = self.credentials.apply(build());
                async move { self.attempt(request).await }
            })
            .await
    }

    async fn attempt(&self, request: RequestBuilder) -> Attempt<Response> {
        self.pace().await;

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                warn!("Network error: {e}");
                return Attempt::Retry {
                    status: None,
                    retry_after: None,
                };
            }
            Err(e) => return Attempt::Fail(e.into()),
        };

        let status = response.status();
        if status.is_success() {
            return Attempt::Done(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Attempt::Retry {
                status: Some(status.as_u16()),
                retry_after: parse_retry_after(response.headers().get("retry-after")),
            };
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Attempt::Fail(classify_failure(status, &body))
    }

    /// Keeps consecutive requests at least `min_interval` apart.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                self.sleeper.sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Jira's standard error body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    error_messages: Vec<String>,
    #[serde(default)]
    errors: BTreeMap<String, String>,
}

fn classify_failure(status: StatusCode, body: &str) -> JiraError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = {
        let mut parts = parsed.error_messages.clone();
        parts.extend(parsed.errors.iter().map(|(field, msg)| format!("{field}: {msg}")));
        if parts.is_empty() {
            body.trim().to_string()
        } else {
            parts.join("; ")
        }
    };

    match status {
        StatusCode::UNAUTHORIZED => JiraError::Auth(message),
        StatusCode::FORBIDDEN => JiraError::Permission(message),
        StatusCode::NOT_FOUND => JiraError::NotFound(message),
        StatusCode::BAD_REQUEST => JiraError::Validation {
            message,
            field_errors: parsed.errors,
        },
        _ => JiraError::UnexpectedStatus {
            status: status.as_u16(),
            message,
        },
    }
}
