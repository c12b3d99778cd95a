use std::fmt;

/// Error kind for pipeline errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed log entry — fails the whole batch.
    Decode,
    /// A measurement point failed type/shape checks — isolated to that point.
    Validation,
    /// Store temporarily unavailable — retried with bounded attempts.
    Store,
    /// Unrecognized query selector or bad query parameters.
    Query,
    Io,
    Config,
}

/// Pipeline error — returned by stores, sinks and the dispatcher.
#[derive(Debug)]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Decode, message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Validation, message: msg.into() }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Store, message: msg.into() }
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Query, message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for PipelineError {}

// ---------------------------------------------------------------------------
// From impls: standard error types → PipelineError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        Self::decode(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for PipelineError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_context_prepends_and_keeps_kind() {
        let e = PipelineError::store("connection refused").with_context("shard 0");
        assert_eq!(e.kind, ErrorKind::Store);
        assert_eq!(e.message, "shard 0: connection refused");
    }

    #[test]
    fn json_errors_map_to_decode() {
        let e: PipelineError =
            serde_json::from_str::<serde_json::Value>("{not json").unwrap_err().into();
        assert_eq!(e.kind, ErrorKind::Decode);
    }
}
