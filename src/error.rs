//! Typed failure model for the serving path.
//! This module provides the denial taxonomy shared by the resolver and the HTTP
//! layer, along with the mappings to client-visible status codes and message
//! catalog keys, plus the error type raised while loading the group table.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Terminal, non-retryable denial classes for a file request.
///
/// The client-visible message deliberately collapses the security-sensitive
/// distinctions (traversal vs. genuinely missing, unreadable vs. wrong type);
/// the status code and the resolver's log lines keep them apart for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServeError {
    UnknownGroup,
    Unauthorized,
    MissingFile,
    UnreadableFile,
    DisallowedType,
}

impl ServeError {
    /// Map to the HTTP status code used in direct mode when no fallback applies.
    pub fn http_status(&self) -> u16 {
        match self {
            ServeError::UnknownGroup => 400,
            ServeError::Unauthorized => 403,
            ServeError::MissingFile => 404,
            // Unreadable and type-rejected files answer 500 rather than 404 so
            // operators can separate them from traversal/missing in access logs.
            ServeError::UnreadableFile => 500,
            ServeError::DisallowedType => 500,
        }
    }

    /// Message catalog key for the client-visible text.
    pub fn message_key(&self) -> &'static str {
        match self {
            ServeError::UnknownGroup => "unknown-group",
            ServeError::Unauthorized => "unauthorized",
            ServeError::MissingFile | ServeError::UnreadableFile | ServeError::DisallowedType => {
                "unknown-file"
            }
        }
    }

    /// Whether the group's configured fallback file may stand in for this
    /// denial. Group-level misconfiguration has no group to take a fallback
    /// from, and permission denials must not leak bytes at all.
    pub fn fallback_eligible(&self) -> bool {
        matches!(
            self,
            ServeError::MissingFile | ServeError::UnreadableFile | ServeError::DisallowedType
        )
    }
}

impl Display for ServeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServeError::UnknownGroup => "unknown group",
            ServeError::Unauthorized => "unauthorized",
            ServeError::MissingFile => "missing or escaping file",
            ServeError::UnreadableFile => "unreadable file",
            ServeError::DisallowedType => "disallowed file type",
        };
        write!(f, "{} ({})", name, self.http_status())
    }
}

impl std::error::Error for ServeError {}

/// Errors raised while loading and validating the group table.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read group file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("group file {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("group '{group}': base path '{path}' cannot be canonicalized: {source}")]
    BadBasePath {
        group: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("group '{group}': base path '{path}' is not a directory")]
    BaseNotDirectory { group: String, path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(ServeError::UnknownGroup.http_status(), 400);
        assert_eq!(ServeError::Unauthorized.http_status(), 403);
        assert_eq!(ServeError::MissingFile.http_status(), 404);
        assert_eq!(ServeError::UnreadableFile.http_status(), 500);
        assert_eq!(ServeError::DisallowedType.http_status(), 500);
    }

    #[test]
    fn message_keys_collapse_file_errors() {
        assert_eq!(ServeError::UnknownGroup.message_key(), "unknown-group");
        assert_eq!(ServeError::Unauthorized.message_key(), "unauthorized");
        // Traversal/missing, unreadable and type-rejected files all present the
        // same generic text to the client.
        assert_eq!(ServeError::MissingFile.message_key(), "unknown-file");
        assert_eq!(ServeError::UnreadableFile.message_key(), "unknown-file");
        assert_eq!(ServeError::DisallowedType.message_key(), "unknown-file");
    }

    #[test]
    fn fallback_eligibility() {
        assert!(!ServeError::UnknownGroup.fallback_eligible());
        assert!(!ServeError::Unauthorized.fallback_eligible());
        assert!(ServeError::MissingFile.fallback_eligible());
        assert!(ServeError::UnreadableFile.fallback_eligible());
        assert!(ServeError::DisallowedType.fallback_eligible());
    }
}
