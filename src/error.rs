use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Load-time failures reading the input sheet. All of these abort the run.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read input file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("input file has no header row")]
    MissingHeaders,

    #[error("input is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("implausible response from {url}: status {status}, {len} bytes")]
    Implausible { url: String, status: u16, len: usize },

    #[error("JSON parse error for {context}: {source}")]
    Parse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
}

/// Why one add-to-cart attempt did not end in a confirmed cart entry.
///
/// None of these are fatal: the orchestrator records them and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("browser session error: {0}")]
    Session(String),

    #[error("page did not render within {secs}s")]
    LoadTimeout { secs: u64 },

    #[error("account is not logged in")]
    NotLoggedIn,

    #[error("request blocked by a robot check")]
    Blocked,

    #[error("login state could not be determined")]
    UnknownLoginState,

    #[error("add-to-cart control is missing")]
    ControlMissing,

    #[error("clicking add-to-cart failed: {0}")]
    ClickFailed(String),

    #[error("add-to-cart was not confirmed")]
    NotConfirmed,
}

impl CartError {
    /// Blocked sessions switch the rest of the item's attempts onto the proxy
    pub fn escalates_proxy(&self) -> bool {
        matches!(self, Self::Blocked)
    }

    /// Short tag stored alongside each failed attempt
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Session(_) => "session",
            Self::LoadTimeout { .. } => "load_timeout",
            Self::NotLoggedIn => "not_logged_in",
            Self::Blocked => "blocked",
            Self::UnknownLoginState => "unknown_login_state",
            Self::ControlMissing => "control_missing",
            Self::ClickFailed(_) => "click_failed",
            Self::NotConfirmed => "not_confirmed",
        }
    }
}

impl From<thirtyfour::error::WebDriverError> for CartError {
    fn from(err: thirtyfour::error::WebDriverError) -> Self {
        Self::Session(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_blocked_escalates_to_proxy() {
        assert!(CartError::Blocked.escalates_proxy());
        for err in [
            CartError::NotLoggedIn,
            CartError::LoadTimeout { secs: 40 },
            CartError::NotConfirmed,
            CartError::ControlMissing,
            CartError::Session("boom".into()),
        ] {
            assert!(!err.escalates_proxy(), "{err} should not escalate");
        }
    }

    #[test]
    fn missing_columns_lists_every_column() {
        let err = InputError::MissingColumns(vec!["Item Name".into(), "Max Cost ($)".into()]);
        assert_eq!(
            err.to_string(),
            "input is missing required columns: Item Name, Max Cost ($)"
        );
    }
}
