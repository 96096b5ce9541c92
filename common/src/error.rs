use thiserror::Error;

/// Failures that end the publishing part of a boot cycle.
///
/// Both are resolved the same way: nothing is published and the node goes
/// back to sleep for the error interval.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleError {
    #[error("wifi association failed after {attempts} attempts")]
    NetworkUnavailable { attempts: u32 },
    #[error("mqtt broker unreachable after {attempts} attempts")]
    BrokerUnavailable { attempts: u32 },
}

/// Rejected configuration documents.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("`{0}` must not be empty")]
    Empty(&'static str),
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}
