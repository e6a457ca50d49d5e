use std::fmt;

/// Secret API token. Never printed in full.
#[derive(Clone)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// How requests authenticate against Jira.
#[derive(Debug, Clone)]
pub enum Auth {
    /// Atlassian Cloud: account email plus API token.
    Basic { email: String, token: Token },
    /// Data Center personal access token.
    Bearer(Token),
}

/// Connection settings handed to the engine by the front end.
///
/// The engine only reads these; storing them is up to the caller.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub url: String,
    pub auth: Auth,
}

impl Credentials {
    pub fn basic(url: impl Into<String>, email: impl Into<String>, token: Token) -> Self {
        Self {
            url: url.into(),
            auth: Auth::Basic {
                email: email.into(),
                token,
            },
        }
    }

    pub fn bearer(url: impl Into<String>, token: Token) -> Self {
        Self {
            url: url.into(),
            auth: Auth::Bearer(token),
        }
    }

    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::Basic { email, token } => request.basic_auth(email, Some(token.as_str())),
            Auth::Bearer(token) => request.bearer_auth(token.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token::from("super-secret");
        assert_eq!(format!("{token:?}"), "Token(***)");
        assert_eq!(token.as_str(), "super-secret");
    }

    #[test]
    fn test_credentials_debug_hides_token() {
        let creds = Credentials::basic(
            "https://example.atlassian.net",
            "pm@example.com",
            Token::from("abc123"),
        );
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("pm@example.com"));
        assert!(!rendered.contains("abc123"));
    }
}
