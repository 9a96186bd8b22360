use std::path::PathBuf;

use thiserror::Error;

/// Failure reading or writing the configuration store
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config store {path} is not a JSON object: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config store: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("config store lock poisoned")]
    Poisoned,
}

/// Failure dispatching a request through the routing client
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A routed request could not be given its proxy. Never falls back to direct.
    #[error("proxy {proxy} could not be applied: {source}")]
    ProxyUnavailable {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request requires a proxy but none was configured")]
    MissingProxy,
    #[error("failed to load trust bundle {path}: {reason}")]
    TrustBundle { path: PathBuf, reason: String },
    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure of the operator status surface
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Render an error together with its source chain on one line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
