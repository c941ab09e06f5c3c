use thiserror::Error;

/// Error types for the heatmap pipeline.
///
/// Most "no data" situations are not errors at all: the fetch layer degrades
/// failed pages to missing data and the later stages pass empty input through.
/// What remains here are transport failures seen by the retry loop, malformed
/// responses, configuration problems and local I/O.
///
/// # Error Handling Examples
///
/// ```rust,no_run
/// use lastfm_heatmap::{HeatmapConfig, HeatmapError};
///
/// match HeatmapConfig::from_env() {
///     Ok(config) => println!("Using API at {}", config.api_url),
///     Err(HeatmapError::Config(msg)) => eprintln!("Configuration error: {}", msg),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum HeatmapError {
    /// HTTP/network related errors.
    ///
    /// Connection failures, timeouts, DNS errors and body read failures.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The API answered with a non-success status code.
    ///
    /// Any Last.fm error code found in the body is kept for diagnostics; the
    /// request is retried regardless.
    #[error(
        "Unexpected HTTP status {status}{}",
        .api_code.map(|code| format!(" (Last.fm error {code})")).unwrap_or_default()
    )]
    Status {
        /// The HTTP status code returned
        status: u16,
        /// Last.fm error code from the response body, if it had one
        api_code: Option<i64>,
    },

    /// Last.fm returned its own error payload (`{"error": 6, "message": ...}`)
    /// with a success status.
    ///
    /// Code 6 is "user not found", code 29 is "rate limit exceeded".
    #[error("Last.fm API error {code}: {message}")]
    Api {
        /// Last.fm error code
        code: i64,
        /// Human readable message from Last.fm
        message: String,
    },

    /// The response body is missing the expected top-level keys.
    ///
    /// On the first page this means the user has no history.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Failed to parse a response body.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// A scrobble timestamp could not be parsed in strict mode.
    #[error("Invalid scrobble timestamp: {0}")]
    Timestamp(String),

    /// Missing or invalid configuration, e.g. no API key.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested color palette name is not known.
    #[error("Unknown color palette: {0}")]
    UnknownPalette(String),

    /// Rasterizing or encoding the heatmap image failed.
    #[error("Render error: {0}")]
    Render(String),

    /// Reading or writing the result store failed.
    #[error("Result store error: {0}")]
    Store(String),

    /// File system I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors outside of response parsing.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HeatmapError {
    /// Whether repeating the same request could plausibly succeed.
    ///
    /// Every non-success status and unreadable body is retried, whatever
    /// error code the body carries. Error payloads sent with a success status
    /// are only retried for the codes Last.fm documents as temporary.
    pub fn is_retryable(&self) -> bool {
        match self {
            HeatmapError::Http(_) | HeatmapError::Status { .. } | HeatmapError::Parse(_) => true,
            // 8: operation failed, 11: service offline, 16: temporary error, 29: rate limit
            HeatmapError::Api { code, .. } => matches!(code, 8 | 11 | 16 | 29),
            _ => false,
        }
    }

    /// Whether this error comes from configuration rather than data.
    pub fn is_config(&self) -> bool {
        matches!(self, HeatmapError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(HeatmapError::Http("reset".to_string()).is_retryable());
        assert!(HeatmapError::Status { status: 503, api_code: None }.is_retryable());
        assert!(HeatmapError::Status { status: 404, api_code: None }.is_retryable());
        assert!(HeatmapError::Status {
            status: 404,
            api_code: Some(6)
        }
        .is_retryable());
        assert!(HeatmapError::Api {
            code: 29,
            message: "Rate limit exceeded".to_string()
        }
        .is_retryable());
        assert!(!HeatmapError::Api {
            code: 6,
            message: "User not found".to_string()
        }
        .is_retryable());
        assert!(!HeatmapError::MalformedResponse("no recenttracks".to_string()).is_retryable());
    }

    #[test]
    fn test_status_display_names_api_code() {
        let err = HeatmapError::Status {
            status: 403,
            api_code: Some(10),
        };
        assert_eq!(err.to_string(), "Unexpected HTTP status 403 (Last.fm error 10)");
        let err = HeatmapError::Status {
            status: 502,
            api_code: None,
        };
        assert_eq!(err.to_string(), "Unexpected HTTP status 502");
    }

    #[test]
    fn test_config_is_distinct_from_data_errors() {
        assert!(HeatmapError::Config("LASTFM_API_KEY not set".to_string()).is_config());
        assert!(!HeatmapError::Parse("bad json".to_string()).is_config());
    }
}
