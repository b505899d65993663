use thiserror::Error;

/// Failure of one pass through the fetch pipeline.
#[derive(Debug, Error)]
pub enum FetchError<E> {
    /// The upstream exchange failed at the transport level.
    #[error("upstream request failed: {0}")]
    Upstream(E),

    /// A partial response carried no bytes to check the overlap against.
    #[error("reading response: partial content is empty")]
    EmptyPartial,

    /// The inbound request cannot be proxied.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The YAML document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A field holds an unusable value.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
