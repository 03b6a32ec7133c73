use std::fmt;

use serde::{Deserialize, Serialize};

/// A string that never shows up in `Debug`/`Display` output.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// How a provider authenticates API calls and clone URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(Secret),
    Basic { username: String, password: Secret },
}

impl Credentials {
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token(Secret::new(token))
    }

    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: Secret::new(password),
        }
    }

    /// Userinfo pair for a clone URL. Token auth uses the host's conventional username.
    #[must_use]
    pub fn userinfo<'a>(&'a self, token_user: &'a str) -> (&'a str, &'a str) {
        match self {
            Self::Token(t) => (token_user, t.expose()),
            Self::Basic { username, password } => (username.as_str(), password.expose()),
        }
    }

    /// Attach these credentials to an API request.
    #[must_use]
    pub fn apply(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Token(t) => req.bearer_auth(t.expose()),
            Self::Basic { username, password } => req.basic_auth(username, Some(password.expose())),
        }
    }
}
