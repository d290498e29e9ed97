use thiserror::Error;

/// Errors raised by history/quote providers.
///
/// Only `Access` is eligible for fallback substitution: a symbol the primary
/// does not carry may exist on another provider. `LimitExceeded` never falls
/// back (the run is out of budget, not the symbol out of data), and transport
/// or parse failures propagate untouched so an outage is never misreported
/// as "data missing".
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("access error for {symbol}: {reason}")]
    Access { symbol: String, reason: String },

    #[error("request budget exhausted for provider '{provider}': {detail}")]
    LimitExceeded { provider: String, detail: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Parse(String),
}

impl ProviderError {
    pub fn access(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Access {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Whether a fallback provider may be consulted after this error.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, Self::Access { .. })
    }

    /// Whether the retry layer may re-issue the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Configuration and input-loading errors. These are fatal and must surface
/// before any fetch begins.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
