use thiserror::Error;

/// Errors raised while resolving or validating a simulation configuration.
///
/// These all fail fast at construction time; nothing here is retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid raid type {0:?}: expected \"mds_<data>_<parity>\"")]
    InvalidRaidType(String),
    #[error("invalid distribution parameters {0:?}: expected shape > 0, scale > 0, location >= 0")]
    InvalidDistribution(String),
    #[error("unknown parameter preset {0:?}")]
    UnknownPreset(String),
    #[error("confidence level {0} has no entry in the lookup table")]
    UnknownConfidenceLevel(f64),
    #[error("damage model needs a trace file but none was configured")]
    MissingTrace,
    #[error(transparent)]
    Trace(#[from] TraceError),
}

/// Errors raised while loading a damage trace file.
///
/// I/O errors propagate straight to the caller; nothing here is retried.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to read trace file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed trace header: expected {expected:?}, found {found:?}")]
    BadHeader { expected: String, found: String },
    #[error("malformed trace value on line {line}: {value:?}")]
    BadValue { line: usize, value: String },
    #[error("trace too short: need at least {need} values, found {found}")]
    TooShort { need: usize, found: usize },
}
