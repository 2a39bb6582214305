//! Forwarding failures.

/// Why an outbound call could not be completed.
///
/// Every variant travels through the same error channel: the caller of
/// [`Forwarder::forward`](super::Forwarder::forward) decides what the
/// downstream client sees.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The target URL could not be parsed.
    #[error("invalid target url '{url}': {source}")]
    InvalidTarget {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The outbound request could not be constructed.
    #[error("failed to build upstream request: {0}")]
    Build(String),

    /// Connection refused, DNS failure, reset, protocol error.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// The outbound call exceeded its timeout.
    #[error("upstream request timed out")]
    Timeout,

    /// The body claimed an encoding it could not be decoded with.
    #[error("failed to decode upstream body: {0}")]
    Decode(#[from] std::io::Error),

    /// The resolved target left the service it was resolved against.
    #[error("target '{url}' is outside the configured service")]
    OutsideService { url: String },

    /// The body delivery task went away before finishing.
    #[error("upstream body was abandoned")]
    Abandoned,
}

impl ForwardError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::InvalidTarget { .. } => "invalid_target",
            ForwardError::Build(_) => "build",
            ForwardError::Transport(_) => "transport",
            ForwardError::Timeout => "timeout",
            ForwardError::Decode(_) => "decode",
            ForwardError::OutsideService { .. } => "outside_service",
            ForwardError::Abandoned => "abandoned",
        }
    }
}

impl From<hyper_util::client::legacy::Error> for ForwardError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = std::error::Error::source(cause);
        }
        ForwardError::Transport(message)
    }
}
