use thiserror::Error;

/// Failures while computing a decision.
///
/// A policy *decline* is not an error: it comes back as
/// `SizingDecision::Decline` or `AveragingDecision::NoAction`. These variants
/// mean the decision could not be computed at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("missing or non-finite input: {field}")]
    MissingInput { field: &'static str },

    #[error("position already holds the maximum of {max} entries")]
    EntryLimit { max: u32 },

    #[error("invalid fill: {0}")]
    InvalidFill(String),
}

/// Configuration problems, raised once at load/validation time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(
        "unsupported config version {0} (supported: {supported})",
        supported = crate::config::CONFIG_VERSION
    )]
    UnsupportedVersion(u32),

    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, PolicyError>;

/// Returns the value when it is finite, otherwise a `MissingInput` error naming `field`.
pub(crate) fn finite(value: f64, field: &'static str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PolicyError::MissingInput { field })
    }
}

/// Like [`finite`] for optional indicator values.
pub(crate) fn required(value: Option<f64>, field: &'static str) -> Result<f64> {
    match value {
        Some(v) => finite(v, field),
        None => Err(PolicyError::MissingInput { field }),
    }
}
