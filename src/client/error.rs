use reqwest::StatusCode;

/// Why the client dropped its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// `logout()` was called
    UserRequested,
    /// The server blacklisted the access token
    TokenRevoked,
    /// The session was closed, possibly from another device
    SessionRevoked,
    /// The refresh call failed or timed out
    RefreshFailed,
    /// A request was still unauthorized after refreshing
    Unauthorized,
}

impl LogoutReason {
    /// Map a server error code that ends the session.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "token_revoked" => Some(LogoutReason::TokenRevoked),
            "session_revoked" => Some(LogoutReason::SessionRevoked),
            "refresh_invalid" => Some(LogoutReason::RefreshFailed),
            _ => None,
        }
    }
}

/// Outcome of a failed refresh. Cloned to every caller waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh cookie held")]
    NoCookie,
    #[error("refresh rejected with status {status}")]
    Rejected {
        status: StatusCode,
        code: Option<String>,
    },
    #[error("refresh timed out")]
    Timeout,
    #[error("refresh transport failure: {0}")]
    Transport(String),
    /// The session was ended locally while the refresh was in flight
    #[error("session ended during refresh")]
    Cancelled,
}

impl RefreshError {
    /// The server refused the refresh, or there is nothing to refresh with.
    /// Timeouts and transport failures leave the session in place so a later
    /// call can try again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RefreshError::Rejected { .. } | RefreshError::NoCookie)
    }

    pub fn logout_reason(&self) -> LogoutReason {
        match self {
            RefreshError::Rejected { code: Some(code), .. } => {
                LogoutReason::from_code(code).unwrap_or(LogoutReason::RefreshFailed)
            }
            _ => LogoutReason::RefreshFailed,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("request failed with status {status}: {message}")]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },
    #[error("session ended: {0:?}")]
    LoggedOut(LogoutReason),
    #[error("refresh failed: {0}")]
    Refresh(#[from] RefreshError),
}
