mod client;
pub mod retry;
pub mod types;
mod urls;

pub use client::JiraClient;
pub use retry::RetryPolicy;
pub use types::{FieldDefinition, IssueData, IssueRef};
pub use urls::browse_url;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use super::retry::testing::RecordingSleeper;
    use super::{JiraClient, RetryPolicy};
    use crate::auth::{Credentials, Token};

    /// Client pointed at a mock server, with instant sleeps and a small retry budget.
    pub fn test_client(url: &str) -> (JiraClient, Arc<RecordingSleeper>) {
        let recorder = Arc::new(RecordingSleeper::default());
        let client = JiraClient::new(Credentials::basic(url, "pm@example.com", Token::from("t0k")))
            .unwrap()
            .with_sleeper(recorder.clone())
            .with_min_interval(Duration::ZERO)
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
            });
        (client, recorder)
    }
}
