use std::fmt;

/// Structured error type for media resolution.
///
/// Every failure inside a download source is converted into one of these
/// variants at the source boundary; only the pipeline decides whether a
/// variant means "try the fallback" or "give up".
#[derive(Debug)]
pub enum DownloadError {
    /// Reference did not yield a usable identifier (empty or shorter than 3 chars)
    InvalidReference(String),
    /// Primary API rejected the key (HTTP 401)
    AuthFailure(String),
    /// Primary API quota exhausted or key expired (HTTP 403, `requests_remaining <= 0`)
    QuotaExhausted(String),
    /// Connection error or request timeout talking to the primary API
    Network(String),
    /// Primary API answered with an unexpected status code
    HttpStatus(u16, String),
    /// Response body could not be understood
    MalformedResponse(String),
    /// Download finished but produced a zero-byte file (already deleted)
    EmptyArtifact(String),
    /// No cookie file available for yt-dlp
    NoCredential,
    /// yt-dlp failed: non-zero exit, spawn failure, deadline or missing output file
    ExtractionTool(String),
    /// Primary API request exceeded its deadline
    Timeout(String),
    /// Local filesystem failure
    Io(std::io::Error),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::InvalidReference(r) => write!(f, "invalid media reference: {:?}", r),
            DownloadError::AuthFailure(msg) => write!(f, "authentication failed: {}", msg),
            DownloadError::QuotaExhausted(msg) => write!(f, "quota exhausted: {}", msg),
            DownloadError::Network(msg) => write!(f, "network error: {}", msg),
            DownloadError::HttpStatus(code, msg) => write!(f, "HTTP {}: {}", code, msg),
            DownloadError::MalformedResponse(msg) => write!(f, "malformed response: {}", msg),
            DownloadError::EmptyArtifact(file) => write!(f, "downloaded file is empty: {}", file),
            DownloadError::NoCredential => write!(f, "no cookie file available"),
            DownloadError::ExtractionTool(msg) => write!(f, "yt-dlp failed: {}", msg),
            DownloadError::Timeout(msg) => write!(f, "timed out: {}", msg),
            DownloadError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DownloadError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl DownloadError {
    /// Returns subcategory for logs
    pub fn subcategory(&self) -> &'static str {
        match self {
            DownloadError::InvalidReference(_) => "invalid_reference",
            DownloadError::AuthFailure(_) => "auth_failure",
            DownloadError::QuotaExhausted(_) => "quota_exhausted",
            DownloadError::Network(_) => "network",
            DownloadError::HttpStatus(..) => "http_status",
            DownloadError::MalformedResponse(_) => "malformed_response",
            DownloadError::EmptyArtifact(_) => "empty_artifact",
            DownloadError::NoCredential => "no_credential",
            DownloadError::ExtractionTool(_) => "extraction_tool",
            DownloadError::Timeout(_) => "timeout",
            DownloadError::Io(_) => "io",
        }
    }

    /// Whether the pipeline may still try another source after this failure.
    ///
    /// An invalid reference is the only failure that is terminal before any
    /// source has run; every primary-stage failure falls through.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DownloadError::InvalidReference(_))
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        DownloadError::Io(e)
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DownloadError::Timeout(e.to_string())
        } else if e.is_decode() {
            DownloadError::MalformedResponse(e.to_string())
        } else {
            DownloadError::Network(e.to_string())
        }
    }
}

impl From<crate::core::process::ProcessError> for DownloadError {
    fn from(e: crate::core::process::ProcessError) -> Self {
        match e {
            crate::core::process::ProcessError::TimedOut(t) => {
                DownloadError::ExtractionTool(format!("yt-dlp exceeded {}s", t.as_secs()))
            }
            crate::core::process::ProcessError::Spawn(e) => {
                DownloadError::ExtractionTool(format!("cannot run yt-dlp: {}", e))
            }
            crate::core::process::ProcessError::Wait(e) => {
                DownloadError::ExtractionTool(format!("lost yt-dlp output: {}", e))
            }
        }
    }
}
