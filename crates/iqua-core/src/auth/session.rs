use chrono::{DateTime, Utc};

/// Number of token characters shown in log output.
const TOKEN_LOG_PREFIX_LEN: usize = 10;

#[derive(Debug, Clone)]
struct SessionData {
    token: String,
    acquired_at: DateTime<Utc>,
}

/// In-memory holder for the bearer token.
///
/// The token is set by a successful login and cleared when the API rejects it.
/// `logins` counts how many tokens this session has been given.
#[derive(Debug, Default)]
pub struct Session {
    data: Option<SessionData>,
    logins: u32,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly issued token
    pub fn update(&mut self, token: String) {
        self.data = Some(SessionData {
            token,
            acquired_at: Utc::now(),
        });
        self.logins += 1;
    }

    /// Drop the current token so the next request logs in again
    pub fn clear(&mut self) {
        self.data = None;
    }

    /// Get the bearer token if one is held
    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.token.as_str())
    }

    pub fn acquired_at(&self) -> Option<DateTime<Utc>> {
        self.data.as_ref().map(|d| d.acquired_at)
    }

    pub fn logins(&self) -> u32 {
        self.logins
    }

    /// Shortened token for log lines
    pub fn token_hint(&self) -> Option<String> {
        self.token()
            .map(|t| t.chars().take(TOKEN_LOG_PREFIX_LEN).collect::<String>() + "...")
    }
}
